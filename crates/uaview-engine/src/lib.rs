// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine for the uaView OPC UA terminal client.
//!
//! The engine owns the server session, the browsed address space, attribute
//! reads and data-change subscriptions. A terminal front end talks to it only
//! through the [`bridge`]: it queues [`Command`]s and drains [`EngineEvent`]s
//! once per render tick, so the UI thread never blocks on the network.
//!
//! # Features
//!
//! - Named server profiles with None / Sign / SignAndEncrypt security
//! - Anonymous and user-name login
//! - Lazy, cached browsing of the hierarchical address space
//! - Full attribute reads with per-attribute failure isolation
//! - One managed subscription with idempotent monitored items
//! - Keep-alive, automatic reconnect and subscription restore
//!
//! # Error Handling
//!
//! ```text
//! UaError
//! ├── Connection      - Endpoint discovery, channel and handshake failures
//! ├── Authentication  - Rejected or unsupported identity tokens
//! ├── Browse          - Browse service failures
//! ├── Read            - Read service failures
//! ├── Subscription    - Subscription and monitored item failures
//! ├── Protocol        - Malformed or mismatched responses
//! ├── TransportLost   - The connection is gone
//! ├── Configuration   - Invalid profiles or settings
//! └── Bridge          - Command queue full or engine stopped
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uaview_engine::{Engine, EngineSettings, NodeRef, ProfileSet};
//!
//! let profiles = ProfileSet::from_json_str(&std::fs::read_to_string("profiles.json")?)?;
//! let (mut bridge, handle) = Engine::spawn(transport, profiles, EngineSettings::default())?;
//!
//! bridge.connect("plant-a")?;
//! bridge.expand(NodeRef::root())?;
//!
//! loop {
//!     bridge.drain(&mut view);
//!     view.render();
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod address_space;
pub mod attributes;
pub mod bridge;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod subscription;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use error::{
    AuthenticationError, BridgeError, BrowseError, ConfigError, ConnectionError, ErrorCode,
    ErrorKind, ErrorSeverity, ProtocolError, ReadError, SubscriptionError, UaError, UaResult,
};

pub use types::{
    AttributeId, LocalizedText, NodeClass, NodeId, NodeIdentifier, NodeRef, QualifiedName,
    SecurityMode, SecurityPolicy, StatusCode,
};

pub use value::{DataValue, ExtensionBody, Quality, UaValue};

pub use config::{
    EngineSettings, EngineSettingsBuilder, MonitoredItemSettings, ProfileSet, ServerProfile,
    SubscriptionSettings,
};

pub use client::{
    IdentityToken, Session, SessionInfo, SessionLayer, SessionState, SessionStats, UaTransport,
};

#[cfg(feature = "real-transport")]
pub use client::OpcUaClientTransport;

pub use address_space::{AddressSpaceCache, BrowseStatistics, NodeBrowser};
pub use attributes::{read_attributes, AttributeSet, AttributeSource, AttributeValue};
pub use bridge::{BridgeHooks, Command, DisconnectReason, EngineEvent, UiBridge};
pub use engine::{Engine, EngineHandle};
pub use logging::{init_logging, LogFormat};
pub use subscription::{
    ItemRef, ItemStatus, MonitoredItem, NotificationHandler, RestoreReport, SubscriptionManager,
    SubscriptionStats,
};
