// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! [`UaTransport`] is the seam between the engine and a protocol stack. The
//! engine never touches sockets or encodings; it calls these typed service
//! primitives and consumes [`TransportEvent`]s from the sink it hands over
//! when opening a channel.
//!
//! Every method takes `&self`, so a browse, a read and notification delivery
//! can all be in flight on the same connection at once.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{EngineSettings, ServerProfile};
use crate::error::UaResult;
use crate::types::{AttributeId, LocalizedText, NodeClass, NodeId, QualifiedName, StatusCode};
use crate::value::DataValue;

// =============================================================================
// Events
// =============================================================================

/// Asynchronous events raised by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A publish response carrying data changes.
    DataChange(Notification),

    /// The connection dropped while a channel was open.
    ConnectionLost {
        /// Why the connection dropped.
        reason: String,
    },
}

/// Sink the transport pushes events into.
///
/// Unbounded because protocol stacks deliver from synchronous callbacks that
/// cannot wait for capacity.
pub type TransportEventSink = mpsc::UnboundedSender<TransportEvent>;

/// Receiving end of [`TransportEventSink`].
pub type TransportEventStream = mpsc::UnboundedReceiver<TransportEvent>;

// =============================================================================
// Identity
// =============================================================================

/// User identity presented on session activation.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// Anonymous login.
    Anonymous,
    /// User name and password.
    UserName {
        /// User name.
        user: String,
        /// Password.
        password: String,
    },
}

impl IdentityToken {
    /// Returns the user name, if any.
    pub fn user(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::UserName { user, .. } => Some(user),
        }
    }

    /// Returns the token type name.
    pub fn token_type(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::UserName { .. } => "UserName",
        }
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { user, .. } => f
                .debug_struct("UserName")
                .field("user", user)
                .field("password", &"***")
                .finish(),
        }
    }
}

// =============================================================================
// Service payloads
// =============================================================================

/// Result of a successful ActivateSession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatedSession {
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Authentication token for subsequent requests.
    pub auth_token: NodeId,
    /// Session timeout granted by the server.
    pub revised_timeout: Duration,
}

/// One operation of a Read request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadValueId {
    /// Node to read.
    pub node_id: NodeId,
    /// Attribute to read.
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    /// Creates a read operation.
    pub fn new(node_id: NodeId, attribute_id: AttributeId) -> Self {
        Self {
            node_id,
            attribute_id,
        }
    }
}

/// One reference returned by Browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDescription {
    /// Target node id.
    pub node_id: NodeId,
    /// Target browse name.
    pub browse_name: QualifiedName,
    /// Target display name.
    pub display_name: LocalizedText,
    /// Target node class.
    pub node_class: NodeClass,
    /// Reference type id.
    pub reference_type: NodeId,
    /// Target type definition.
    pub type_definition: Option<NodeId>,
    /// Whether the reference is forward.
    pub is_forward: bool,
}

/// CreateSubscription parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    /// Requested publishing interval.
    pub publishing_interval: Duration,
    /// Lifetime count.
    pub lifetime_count: u32,
    /// Max keep-alive count.
    pub keepalive_count: u32,
    /// Max notifications per publish.
    pub max_notifications_per_publish: u32,
    /// Priority.
    pub priority: u8,
}

impl From<&crate::config::SubscriptionSettings> for SubscriptionRequest {
    fn from(settings: &crate::config::SubscriptionSettings) -> Self {
        Self {
            publishing_interval: settings.publishing_interval,
            lifetime_count: settings.lifetime_count,
            keepalive_count: settings.keepalive_count,
            max_notifications_per_publish: settings.max_notifications_per_publish,
            priority: settings.priority,
        }
    }
}

/// CreateSubscription result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreatedSubscription {
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// Publishing interval granted by the server.
    pub revised_publishing_interval: Duration,
}

/// One item of a CreateMonitoredItems request.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemRequest {
    /// Client handle echoed back in notifications.
    pub client_handle: u32,
    /// Node to monitor.
    pub node_id: NodeId,
    /// Attribute to monitor.
    pub attribute_id: AttributeId,
    /// Requested sampling interval.
    pub sampling_interval: Duration,
    /// Server-side queue size.
    pub queue_size: u32,
    /// Discard oldest on overflow.
    pub discard_oldest: bool,
}

/// One item of a CreateMonitoredItems response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitoredItemResult {
    /// Creation status.
    pub status: StatusCode,
    /// Server-assigned monitored item id.
    pub monitored_item_id: u32,
    /// Sampling interval granted by the server.
    pub revised_sampling_interval: Duration,
}

/// A data change notification for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Subscription the notification belongs to.
    pub subscription_id: u32,
    /// Per-subscription sequence number.
    pub sequence_number: u32,
    /// Changed items in server order.
    pub items: Vec<ItemNotification>,
    /// When the client received it.
    pub received_at: DateTime<Utc>,
}

/// One changed item inside a [`Notification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemNotification {
    /// Client handle of the monitored item.
    pub client_handle: u32,
    /// The new value.
    pub value: DataValue,
}

// =============================================================================
// UaTransport
// =============================================================================

/// Abstract transport for OPC UA services.
///
/// A transport holds at most one open channel. `open_secure_channel`
/// replaces the event sink, so events from a previous channel are never
/// delivered to the new one.
#[async_trait]
pub trait UaTransport: Send + Sync + 'static {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Discovers endpoints and opens a secure channel matching the profile.
    async fn open_secure_channel(
        &self,
        profile: &ServerProfile,
        settings: &EngineSettings,
        events: TransportEventSink,
    ) -> UaResult<()>;

    /// Creates and activates a session on the open channel.
    ///
    /// Fails with an authentication error when the identity is rejected.
    async fn activate_session(&self, identity: &IdentityToken) -> UaResult<ActivatedSession>;

    /// Closes the session and channel. Safe to call when nothing is open.
    async fn close(&self) -> UaResult<()>;

    // =========================================================================
    // View and Attribute Services
    // =========================================================================

    /// Browses forward hierarchical references of `node_id`.
    ///
    /// Implementations follow continuation points so the result is complete.
    async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<ReferenceDescription>>;

    /// Reads attributes; returns one result per operation, in order.
    async fn read(&self, nodes: &[ReadValueId]) -> UaResult<Vec<DataValue>>;

    // =========================================================================
    // Subscription Services
    // =========================================================================

    /// Creates a subscription.
    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> UaResult<CreatedSubscription>;

    /// Deletes a subscription and all its monitored items.
    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()>;

    /// Creates monitored items; returns one result per item, in order.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>>;

    /// Deletes monitored items; returns one status per id, in order.
    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>>;

    /// Returns a short name for logging.
    fn name(&self) -> &str {
        "opcua"
    }
}
