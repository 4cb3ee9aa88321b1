// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uaView Integration Tests
//!
//! Integration tests for `uaview-engine`, run against an in-memory OPC UA
//! server.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities, fixtures, and helpers
//!   - `fixtures`: Address spaces, profiles and settings
//!   - `mocks`: [`MockServer`](common::MockServer), a scriptable transport
//!   - `harness`: [`EngineHarness`](common::EngineHarness) and recording hooks
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p uaview-tests
//!
//! # Run one suite
//! cargo test -p uaview-tests --test integration_session
//! cargo test -p uaview-tests --test integration_address_space
//! cargo test -p uaview-tests --test integration_attributes
//! cargo test -p uaview-tests --test integration_subscription
//! cargo test -p uaview-tests --test integration_bridge
//! cargo test -p uaview-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Session Tests (`integration_session.rs`)
//! - Connect, authentication and profile errors
//! - State transitions as seen by the UI
//! - Keep-alive loss detection, reconnect and reconnect failure
//!
//! ### Address Space Tests (`integration_address_space.rs`)
//! - Lazy browsing, caching and duplicate references
//! - Concurrent expansion of the same node
//! - Reset on reconnect
//!
//! ### Attribute Tests (`integration_attributes.rs`)
//! - Per-class display rows
//! - Per-attribute failure isolation
//! - Superseded selections
//!
//! ### Subscription Tests (`integration_subscription.rs`)
//! - Idempotent subscribe, rejection and unsubscribe
//! - Notification ordering
//! - Restore after reconnect
//!
//! ### Bridge Tests (`integration_bridge.rs`)
//! - Per-tick event budget and hook dispatch
//! - Command queue backpressure and shutdown
//!
//! ### Configuration Tests (`integration_config.rs`)
//! - Profile and settings documents

pub mod common;
