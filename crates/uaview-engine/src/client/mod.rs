// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection to an OPC UA server.
//!
//! - **Transport**: the wire boundary, one trait covering the services the
//!   engine uses
//! - **Session**: lifecycle, request timeouts, keep-alive and reconnect
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Engine task                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SessionLayer<T>                            │
//! │      (state machine, connect / reconnect / disconnect)          │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │  Arc<Session<T>>
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        UaTransport                              │
//! │    OpcUaClientTransport (feature "real-transport") or a mock    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod session;
pub mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use session::{KeepAlive, Session, SessionInfo, SessionLayer, SessionState, SessionStats};
pub use transport::{
    ActivatedSession, CreatedSubscription, IdentityToken, ItemNotification, MonitoredItemRequest,
    MonitoredItemResult, Notification, ReadValueId, ReferenceDescription, SubscriptionRequest,
    TransportEvent, TransportEventSink, TransportEventStream, UaTransport,
};

#[cfg(feature = "real-transport")]
pub use real_transport::OpcUaClientTransport;
