// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! An in-memory OPC UA server implementing [`UaTransport`].
//!
//! ## Design Principles
//!
//! - Configurable address space and credentials
//! - Error injection per service, including connection loss
//! - Recording of interactions for verification
//! - Server-pushed data changes under test control

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use uaview_engine::client::transport::{
    ActivatedSession, CreatedSubscription, IdentityToken, ItemNotification, MonitoredItemRequest,
    MonitoredItemResult, Notification, ReadValueId, ReferenceDescription, SubscriptionRequest,
    TransportEvent, TransportEventSink, UaTransport,
};
use uaview_engine::{
    AttributeId, AuthenticationError, BrowseError, ConnectionError, DataValue, EngineSettings,
    LocalizedText, NodeClass, NodeId, NodeRef, QualifiedName, ServerProfile, StatusCode,
    SubscriptionError, UaError, UaResult, UaValue,
};

// =============================================================================
// MockNode
// =============================================================================

/// One node of the mock address space.
#[derive(Debug, Clone)]
pub struct MockNode {
    /// Node id.
    pub node_id: NodeId,
    /// Node class.
    pub node_class: NodeClass,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Display name.
    pub display_name: String,
    /// Description, if any.
    pub description: Option<String>,
    /// DataType for variables.
    pub data_type: Option<NodeId>,
    /// Current value for variables.
    pub value: Option<UaValue>,
    /// Access level for variables.
    pub access_level: u8,
    /// Attributes that read back with a bad status.
    pub bad_attributes: HashMap<AttributeId, StatusCode>,
    /// Children in browse order.
    pub children: Vec<NodeId>,
}

impl MockNode {
    fn new(node_id: NodeId, node_class: NodeClass, name: &str) -> Self {
        Self {
            browse_name: QualifiedName::new(node_id.namespace_index, name),
            display_name: name.to_string(),
            node_id,
            node_class,
            description: None,
            data_type: None,
            value: None,
            access_level: 0,
            bad_attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Creates an Object node.
    pub fn object(node_id: NodeId, name: &str) -> Self {
        Self::new(node_id, NodeClass::Object, name)
    }

    /// Creates a readable Variable node.
    pub fn variable(node_id: NodeId, name: &str, data_type: NodeId, value: UaValue) -> Self {
        let mut node = Self::new(node_id, NodeClass::Variable, name);
        node.data_type = Some(data_type);
        node.value = Some(value);
        node.access_level = 0x01;
        node
    }

    /// Creates a Method node.
    pub fn method(node_id: NodeId, name: &str) -> Self {
        Self::new(node_id, NodeClass::Method, name)
    }

    /// Sets the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Sets the access level mask.
    pub fn with_access_level(mut self, mask: u8) -> Self {
        self.access_level = mask;
        self
    }

    /// Makes `attribute` read back with `status`.
    pub fn with_bad_attribute(mut self, attribute: AttributeId, status: StatusCode) -> Self {
        self.bad_attributes.insert(attribute, status);
        self
    }

    /// Returns the tree reference for this node.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(
            self.node_id.clone(),
            self.node_class,
            self.display_name.clone(),
            self.browse_name.clone(),
        )
    }

    fn reference(&self) -> ReferenceDescription {
        ReferenceDescription {
            node_id: self.node_id.clone(),
            browse_name: self.browse_name.clone(),
            display_name: LocalizedText::new(self.display_name.clone()),
            node_class: self.node_class,
            reference_type: NodeId::numeric(0, 35),
            type_definition: None,
            is_forward: true,
        }
    }

    fn read(&self, attribute: AttributeId) -> DataValue {
        if let Some(status) = self.bad_attributes.get(&attribute) {
            return DataValue::bad(*status);
        }
        let value = match attribute {
            AttributeId::NodeId => Some(UaValue::NodeId(self.node_id.clone())),
            AttributeId::NodeClass => Some(UaValue::Int32(self.node_class.value() as i32)),
            AttributeId::BrowseName => Some(UaValue::QualifiedName(self.browse_name.clone())),
            AttributeId::DisplayName => {
                Some(UaValue::LocalizedText(LocalizedText::new(self.display_name.clone())))
            }
            AttributeId::Description => Some(UaValue::LocalizedText(LocalizedText::new(
                self.description.clone().unwrap_or_default(),
            ))),
            AttributeId::DataType if self.node_class == NodeClass::Variable => {
                self.data_type.clone().map(UaValue::NodeId)
            }
            AttributeId::Value if self.node_class == NodeClass::Variable => self.value.clone(),
            AttributeId::AccessLevel | AttributeId::UserAccessLevel
                if self.node_class == NodeClass::Variable =>
            {
                Some(UaValue::Byte(self.access_level))
            }
            AttributeId::Executable | AttributeId::UserExecutable
                if self.node_class == NodeClass::Method =>
            {
                Some(UaValue::Boolean(true))
            }
            _ => None,
        };
        match value {
            Some(value) => DataValue::new(value).with_timestamps(Utc::now()),
            None => DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
        }
    }
}

// =============================================================================
// MockServer
// =============================================================================

#[derive(Debug, Default)]
struct MockSubscription {
    // monitored item id -> (client handle, node)
    items: HashMap<u32, (u32, NodeId)>,
    sequence: u32,
}

#[derive(Debug, Default)]
struct ServerState {
    nodes: HashMap<NodeId, MockNode>,
    sink: Option<TransportEventSink>,
    channel_open: bool,
    session_active: bool,
    subscriptions: HashMap<u32, MockSubscription>,
    credentials: Option<(String, String)>,
    rejected_nodes: HashSet<NodeId>,
    failing_browse: HashSet<NodeId>,
    item_limit: Option<usize>,
    identities: Vec<IdentityToken>,
}

/// An in-memory OPC UA server.
#[derive(Debug)]
pub struct MockServer {
    state: Mutex<ServerState>,
    browse_latency: Mutex<Duration>,
    read_latency: Mutex<Duration>,
    reachable: AtomicBool,
    fail_keepalive: AtomicBool,
    fail_create_subscription: AtomicBool,
    next_id: AtomicU32,
    open_count: AtomicU64,
    close_count: AtomicU64,
    browse_count: AtomicU64,
    read_count: AtomicU64,
    keepalive_count: AtomicU64,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Creates a reachable server with only the RootFolder.
    pub fn new() -> Self {
        let server = Self {
            state: Mutex::new(ServerState::default()),
            browse_latency: Mutex::new(Duration::ZERO),
            read_latency: Mutex::new(Duration::ZERO),
            reachable: AtomicBool::new(true),
            fail_keepalive: AtomicBool::new(false),
            fail_create_subscription: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
            open_count: AtomicU64::new(0),
            close_count: AtomicU64::new(0),
            browse_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            keepalive_count: AtomicU64::new(0),
        };
        server.add_node(None, MockNode::object(NodeId::ROOT_FOLDER, "Root"));
        server
    }

    // =========================================================================
    // Address space
    // =========================================================================

    /// Adds `node` under `parent`. Replaces an existing node with the same id.
    pub fn add_node(&self, parent: Option<&NodeId>, node: MockNode) {
        let mut state = self.state.lock();
        let node_id = node.node_id.clone();
        if let Some(parent) = parent {
            if let Some(parent) = state.nodes.get_mut(parent) {
                if !parent.children.contains(&node_id) {
                    parent.children.push(node_id.clone());
                }
            }
        }
        let children = state
            .nodes
            .get(&node_id)
            .map(|existing| existing.children.clone())
            .unwrap_or_default();
        state.nodes.insert(node_id, MockNode { children, ..node });
    }

    /// Adds an extra reference from `parent` to an existing node.
    pub fn add_reference(&self, parent: &NodeId, child: &NodeId) {
        if let Some(parent) = self.state.lock().nodes.get_mut(parent) {
            parent.children.push(child.clone());
        }
    }

    /// Returns the tree reference for an existing node.
    pub fn node_ref(&self, node_id: &NodeId) -> Option<NodeRef> {
        self.state.lock().nodes.get(node_id).map(MockNode::node_ref)
    }

    /// Changes the current value of a variable without notifying.
    pub fn set_value(&self, node_id: &NodeId, value: UaValue) {
        if let Some(node) = self.state.lock().nodes.get_mut(node_id) {
            node.value = Some(value);
        }
    }

    // =========================================================================
    // Behavior
    // =========================================================================

    /// Requires user name login with these credentials.
    pub fn require_credentials(&self, user: &str, password: &str) {
        self.state.lock().credentials = Some((user.to_string(), password.to_string()));
    }

    /// Makes the server (un)reachable for new channels.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fails CurrentTime reads used as keep-alive probes.
    pub fn set_fail_keepalive(&self, fail: bool) {
        self.fail_keepalive.store(fail, Ordering::SeqCst);
    }

    /// Fails CreateSubscription.
    pub fn set_fail_create_subscription(&self, fail: bool) {
        self.fail_create_subscription.store(fail, Ordering::SeqCst);
    }

    /// Rejects monitored items on `node_id`.
    pub fn reject_monitoring(&self, node_id: &NodeId) {
        self.state.lock().rejected_nodes.insert(node_id.clone());
    }

    /// Accepts monitored items on `node_id` again.
    pub fn accept_monitoring(&self, node_id: &NodeId) {
        self.state.lock().rejected_nodes.remove(node_id);
    }

    /// Fails Browse on `node_id`.
    pub fn fail_browse(&self, node_id: &NodeId) {
        self.state.lock().failing_browse.insert(node_id.clone());
    }

    /// Lets Browse on `node_id` succeed again.
    pub fn heal_browse(&self, node_id: &NodeId) {
        self.state.lock().failing_browse.remove(node_id);
    }

    /// Limits the number of monitored items across subscriptions.
    pub fn set_item_limit(&self, limit: usize) {
        self.state.lock().item_limit = Some(limit);
    }

    /// Delays every Browse by `latency`.
    pub fn set_browse_latency(&self, latency: Duration) {
        *self.browse_latency.lock() = latency;
    }

    /// Delays every attribute Read (not keep-alive probes) by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        *self.read_latency.lock() = latency;
    }

    // =========================================================================
    // Server-side events
    // =========================================================================

    /// Drops the connection: the client is told and all server state is lost.
    pub fn lose_connection(&self, reason: &str) {
        let sink = {
            let mut state = self.state.lock();
            state.channel_open = false;
            state.session_active = false;
            state.subscriptions.clear();
            state.sink.take()
        };
        tracing::debug!(reason, "Mock server dropping connection");
        if let Some(sink) = sink {
            let _ = sink.send(TransportEvent::ConnectionLost {
                reason: reason.to_string(),
            });
        }
    }

    /// Publishes `value` for every monitored item on `node_id`.
    ///
    /// Returns the number of notifications sent.
    pub fn push_value(&self, node_id: &NodeId, value: DataValue) -> usize {
        let mut state = self.state.lock();
        let Some(sink) = state.sink.clone() else {
            return 0;
        };

        let mut sent = 0;
        for (subscription_id, subscription) in state.subscriptions.iter_mut() {
            let items: Vec<ItemNotification> = subscription
                .items
                .values()
                .filter(|(_, node)| node == node_id)
                .map(|(handle, _)| ItemNotification {
                    client_handle: *handle,
                    value: value.clone(),
                })
                .collect();
            if items.is_empty() {
                continue;
            }
            subscription.sequence = subscription.sequence.wrapping_add(1);
            let notification = Notification {
                subscription_id: *subscription_id,
                sequence_number: subscription.sequence,
                items,
                received_at: Utc::now(),
            };
            if sink.send(TransportEvent::DataChange(notification)).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Sends an arbitrary notification on the current channel.
    pub fn push_notification(&self, notification: Notification) -> bool {
        match self.state.lock().sink.clone() {
            Some(sink) => sink.send(TransportEvent::DataChange(notification)).is_ok(),
            None => false,
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Number of secure channels opened.
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Number of close calls.
    pub fn close_count(&self) -> u64 {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Number of Browse calls.
    pub fn browse_count(&self) -> u64 {
        self.browse_count.load(Ordering::SeqCst)
    }

    /// Number of attribute Read calls, excluding keep-alive probes.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of keep-alive probes received.
    pub fn keepalive_count(&self) -> u64 {
        self.keepalive_count.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Number of live monitored items across subscriptions.
    pub fn item_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .map(|s| s.items.len())
            .sum()
    }

    /// Nodes currently monitored, sorted.
    pub fn monitored_nodes(&self) -> Vec<NodeId> {
        let state = self.state.lock();
        let mut nodes: Vec<NodeId> = state
            .subscriptions
            .values()
            .flat_map(|s| s.items.values().map(|(_, node)| node.clone()))
            .collect();
        nodes.sort();
        nodes
    }

    /// The current subscription id, if exactly one exists.
    pub fn subscription_id(&self) -> Option<u32> {
        let state = self.state.lock();
        match state.subscriptions.len() {
            1 => state.subscriptions.keys().next().copied(),
            _ => None,
        }
    }

    /// Identities presented on activation, in order.
    pub fn identities(&self) -> Vec<IdentityToken> {
        self.state.lock().identities.clone()
    }

    /// Returns `true` while a session is active.
    pub fn is_session_active(&self) -> bool {
        self.state.lock().session_active
    }

    fn allocate_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_session(&self) -> UaResult<()> {
        if self.state.lock().session_active {
            Ok(())
        } else {
            Err(UaError::transport_lost("BadSessionClosed"))
        }
    }
}

// =============================================================================
// UaTransport
// =============================================================================

#[async_trait]
impl UaTransport for MockServer {
    async fn open_secure_channel(
        &self,
        profile: &ServerProfile,
        _settings: &EngineSettings,
        events: TransportEventSink,
    ) -> UaResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::refused(&profile.endpoint_url).into());
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.channel_open = true;
        state.session_active = false;
        state.sink = Some(events);
        Ok(())
    }

    async fn activate_session(&self, identity: &IdentityToken) -> UaResult<ActivatedSession> {
        let mut state = self.state.lock();
        if !state.channel_open {
            return Err(UaError::not_connected());
        }
        state.identities.push(identity.clone());

        if let Some((user, password)) = &state.credentials {
            let accepted = matches!(
                identity,
                IdentityToken::UserName { user: u, password: p } if u == user && p == password
            );
            if !accepted {
                return Err(AuthenticationError::rejected(
                    identity.user(),
                    StatusCode::BAD_IDENTITY_TOKEN_REJECTED,
                )
                .into());
            }
        }

        state.session_active = true;
        let id = self.allocate_id();
        Ok(ActivatedSession {
            session_id: NodeId::numeric(1, id),
            auth_token: NodeId::string(1, format!("token-{id}")),
            revised_timeout: Duration::from_secs(60),
        })
    }

    async fn close(&self) -> UaResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.channel_open = false;
        state.session_active = false;
        state.subscriptions.clear();
        state.sink = None;
        Ok(())
    }

    async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<ReferenceDescription>> {
        self.browse_count.fetch_add(1, Ordering::SeqCst);
        let latency = *self.browse_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.ensure_session()?;

        let state = self.state.lock();
        if state.failing_browse.contains(node_id) {
            return Err(BrowseError::bad_status(node_id, StatusCode::BAD_USER_ACCESS_DENIED).into());
        }
        let node = state
            .nodes
            .get(node_id)
            .ok_or_else(|| BrowseError::bad_status(node_id, StatusCode::BAD_NODE_ID_UNKNOWN))?;
        Ok(node
            .children
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .map(MockNode::reference)
            .collect())
    }

    async fn read(&self, nodes: &[ReadValueId]) -> UaResult<Vec<DataValue>> {
        let probe = nodes.len() == 1 && nodes[0].node_id == NodeId::SERVER_CURRENT_TIME;
        if probe {
            self.keepalive_count.fetch_add(1, Ordering::SeqCst);
            self.ensure_session()?;
            if self.fail_keepalive.load(Ordering::SeqCst) {
                return Err(UaError::transport_lost("keep-alive probe unanswered"));
            }
            return Ok(vec![DataValue::new(UaValue::DateTime(Utc::now())).with_timestamps(Utc::now())]);
        }

        self.read_count.fetch_add(1, Ordering::SeqCst);
        let latency = *self.read_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.ensure_session()?;

        let state = self.state.lock();
        Ok(nodes
            .iter()
            .map(|request| match state.nodes.get(&request.node_id) {
                Some(node) => node.read(request.attribute_id),
                None => DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN),
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> UaResult<CreatedSubscription> {
        self.ensure_session()?;
        if self.fail_create_subscription.load(Ordering::SeqCst) {
            return Err(SubscriptionError::creation_failed(
                StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS,
                "CreateSubscription",
            )
            .into());
        }
        let subscription_id = self.allocate_id();
        self.state
            .lock()
            .subscriptions
            .insert(subscription_id, MockSubscription::default());
        Ok(CreatedSubscription {
            subscription_id,
            revised_publishing_interval: request.publishing_interval,
        })
    }

    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
        self.ensure_session()?;
        match self.state.lock().subscriptions.remove(&subscription_id) {
            Some(_) => Ok(()),
            None => Err(SubscriptionError::creation_failed(
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                "DeleteSubscription",
            )
            .into()),
        }
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>> {
        self.ensure_session()?;
        let mut state = self.state.lock();
        let mut total: usize = state.subscriptions.values().map(|s| s.items.len()).sum();
        let limit = state.item_limit;
        if !state.subscriptions.contains_key(&subscription_id) {
            return Err(SubscriptionError::creation_failed(
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                "CreateMonitoredItems",
            )
            .into());
        }

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let status = if !state.nodes.contains_key(&item.node_id) {
                StatusCode::BAD_NODE_ID_UNKNOWN
            } else if state.rejected_nodes.contains(&item.node_id) {
                StatusCode::BAD_NOT_SUPPORTED
            } else if limit.is_some_and(|limit| total >= limit) {
                StatusCode::BAD_TOO_MANY_MONITORED_ITEMS
            } else {
                StatusCode::GOOD
            };

            if status.is_good() {
                let monitored_item_id = self.allocate_id();
                if let Some(subscription) = state.subscriptions.get_mut(&subscription_id) {
                    subscription
                        .items
                        .insert(monitored_item_id, (item.client_handle, item.node_id.clone()));
                }
                total += 1;
                results.push(MonitoredItemResult {
                    status,
                    monitored_item_id,
                    revised_sampling_interval: item.sampling_interval,
                });
            } else {
                results.push(MonitoredItemResult {
                    status,
                    monitored_item_id: 0,
                    revised_sampling_interval: Duration::ZERO,
                });
            }
        }
        Ok(results)
    }

    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>> {
        self.ensure_session()?;
        let mut state = self.state.lock();
        let Some(subscription) = state.subscriptions.get_mut(&subscription_id) else {
            return Ok(vec![StatusCode::BAD_SUBSCRIPTION_ID_INVALID; monitored_item_ids.len()]);
        };
        Ok(monitored_item_ids
            .iter()
            .map(|id| match subscription.items.remove(id) {
                Some(_) => StatusCode::GOOD,
                None => StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
