// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Common Test Utilities
//!
//! Shared test utilities, fixtures, and helpers for integration tests.
//!
//! ## Module Structure
//!
//! - `fixtures`: Pre-built address spaces, profiles and settings
//! - `mocks`: In-memory OPC UA server
//! - `harness`: Engine harness and recording bridge hooks

pub mod fixtures;
pub mod harness;
pub mod mocks;

// Re-exports for convenience
pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize test logging. Call this at the start of each test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,uaview_engine=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
