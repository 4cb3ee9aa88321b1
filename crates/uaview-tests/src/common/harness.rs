// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Drives a running engine the way a terminal front end would: commands go
//! in through the [`UiBridge`], events come back out and are awaited with a
//! deadline.
//!
//! ## Design Principles
//!
//! - One engine per test over a shared [`MockServer`]
//! - Every wait is bounded; a missing event fails the test with context
//! - Skipped events are kept for later assertions

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use uaview_engine::client::session::SessionState;
use uaview_engine::{
    AttributeSet, BridgeHooks, DataValue, DisconnectReason, Engine, EngineEvent, EngineHandle,
    EngineSettings, ErrorKind, ItemRef, MonitoredItem, NodeId, NodeRef, ProfileSet, UiBridge,
};

use super::fixtures::{ProfileFixtures, SettingsFixtures};
use super::mocks::MockServer;

/// How long any single wait may take before the test fails.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// EngineHarness
// =============================================================================

/// A running engine over a mock server.
pub struct EngineHarness {
    /// The server behind the engine.
    pub server: Arc<MockServer>,
    /// The UI end of the bridge.
    pub bridge: UiBridge,
    /// The engine task.
    pub handle: EngineHandle,
    history: Vec<EngineEvent>,
}

impl EngineHarness {
    /// Starts an engine with the standard profiles and quiet settings.
    pub fn start(server: Arc<MockServer>) -> Self {
        Self::start_with(server, ProfileFixtures::profiles(), SettingsFixtures::quiet())
    }

    /// Starts an engine with explicit profiles and settings.
    pub fn start_with(
        server: Arc<MockServer>,
        profiles: ProfileSet,
        settings: EngineSettings,
    ) -> Self {
        let (bridge, handle) = match Engine::spawn(Arc::clone(&server), profiles, settings) {
            Ok(started) => started,
            Err(e) => panic!("engine failed to start: {e}"),
        };
        Self {
            server,
            bridge,
            handle,
            history: Vec::new(),
        }
    }

    /// Every event received so far, in order.
    pub fn history(&self) -> &[EngineEvent] {
        &self.history
    }

    /// Forgets the recorded history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Waits for the next event, or `None` after [`EVENT_TIMEOUT`].
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        match tokio::time::timeout(EVENT_TIMEOUT, self.bridge.next_event()).await {
            Ok(Some(event)) => {
                self.history.push(event.clone());
                Some(event)
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Waits for the first event matching `predicate`; panics on timeout.
    pub async fn wait_for<F>(&mut self, what: &str, predicate: F) -> EngineEvent
    where
        F: Fn(&EngineEvent) -> bool,
    {
        loop {
            match self.next_event().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => continue,
                None => panic!(
                    "timed out waiting for {what}; history: {:#?}",
                    self.history
                ),
            }
        }
    }

    /// Returns `true` if no event arrives within `window`.
    pub async fn is_quiet_for(&mut self, window: Duration) -> bool {
        match tokio::time::timeout(window, self.bridge.next_event()).await {
            Ok(Some(event)) => {
                self.history.push(event);
                false
            }
            Ok(None) | Err(_) => true,
        }
    }

    // =========================================================================
    // Command helpers
    // =========================================================================

    /// Connects and waits for `Connected`.
    pub async fn connect(&mut self, profile: &str) {
        self.send(|b| b.connect(profile));
        let expected = profile.to_string();
        self.wait_for("connected", move |e| {
            matches!(e, EngineEvent::Connected { profile } if *profile == expected)
        })
        .await;
    }

    /// Disconnects and waits for `Disconnected`.
    pub async fn disconnect(&mut self) -> DisconnectReason {
        self.send(UiBridge::disconnect);
        match self
            .wait_for("disconnected", |e| matches!(e, EngineEvent::Disconnected(_)))
            .await
        {
            EngineEvent::Disconnected(reason) => reason,
            _ => unreachable!(),
        }
    }

    /// Expands `node` and waits for its children.
    pub async fn expand(&mut self, node: NodeRef) -> Vec<NodeRef> {
        let node_id = node.node_id.clone();
        self.send(|b| b.expand(node));
        match self
            .wait_for("children", move |e| {
                matches!(e, EngineEvent::ChildrenLoaded { node, .. } if *node == node_id)
            })
            .await
        {
            EngineEvent::ChildrenLoaded { children, .. } => children,
            _ => unreachable!(),
        }
    }

    /// Selects `node` and waits for its attributes.
    pub async fn select(&mut self, node: NodeRef) -> AttributeSet {
        let node_id = node.node_id.clone();
        self.send(|b| b.select(node));
        match self
            .wait_for("attributes", move |e| {
                matches!(e, EngineEvent::AttributesLoaded { node, .. } if *node == node_id)
            })
            .await
        {
            EngineEvent::AttributesLoaded { attributes, .. } => *attributes,
            _ => unreachable!(),
        }
    }

    /// Subscribes to `node` and waits for the monitored item.
    pub async fn subscribe(&mut self, node: NodeRef) -> MonitoredItem {
        let node_id = node.node_id.clone();
        self.send(|b| b.subscribe(node));
        match self
            .wait_for("subscribed", move |e| {
                matches!(e, EngineEvent::Subscribed(item) if item.node.node_id == node_id)
            })
            .await
        {
            EngineEvent::Subscribed(item) => *item,
            _ => unreachable!(),
        }
    }

    /// Waits for the next value change of `item`.
    pub async fn next_value(&mut self, item: ItemRef) -> DataValue {
        match self
            .wait_for("value change", move |e| {
                matches!(e, EngineEvent::ValueChanged { item: i, .. } if *i == item)
            })
            .await
        {
            EngineEvent::ValueChanged { value, .. } => value,
            _ => unreachable!(),
        }
    }

    /// Waits for the next error event.
    pub async fn next_error(&mut self) -> (ErrorKind, String) {
        match self
            .wait_for("error", |e| matches!(e, EngineEvent::Error { .. }))
            .await
        {
            EngineEvent::Error { kind, message } => (kind, message),
            _ => unreachable!(),
        }
    }

    /// Looks up a node the mock server knows.
    pub fn node(&self, node_id: &NodeId) -> NodeRef {
        match self.server.node_ref(node_id) {
            Some(node) => node,
            None => panic!("mock server has no node {node_id}"),
        }
    }

    /// Shuts the engine down and waits for the task to end.
    pub async fn shutdown(self) {
        if let Err(e) = self.bridge.shutdown() {
            panic!("shutdown command rejected: {e}");
        }
        if tokio::time::timeout(EVENT_TIMEOUT, self.handle.join())
            .await
            .is_err()
        {
            panic!("engine did not stop");
        }
    }

    fn send<F>(&self, command: F)
    where
        F: FnOnce(&UiBridge) -> uaview_engine::UaResult<()>,
    {
        if let Err(e) = command(&self.bridge) {
            panic!("command rejected: {e}");
        }
    }
}

// =============================================================================
// RecordingHooks
// =============================================================================

/// One call made by [`UiBridge::drain`].
#[derive(Debug, Clone, PartialEq)]
pub enum HookCall {
    /// `on_state_changed`.
    StateChanged(SessionState, SessionState),
    /// `on_connected`.
    Connected(String),
    /// `on_disconnected`.
    Disconnected(DisconnectReason),
    /// `on_children_loaded` with the child count.
    ChildrenLoaded(NodeId, usize),
    /// `on_attributes_loaded`.
    AttributesLoaded(NodeId),
    /// `on_subscribed`.
    Subscribed(ItemRef),
    /// `on_unsubscribed`.
    Unsubscribed(ItemRef),
    /// `on_value_changed`.
    ValueChanged(ItemRef, DataValue),
    /// `on_error`.
    Error(ErrorKind, String),
}

/// [`BridgeHooks`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    /// Calls in dispatch order.
    pub calls: Vec<HookCall>,
}

impl RecordingHooks {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded value changes.
    pub fn value_changes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HookCall::ValueChanged(..)))
            .count()
    }

    /// Returns `true` if `on_connected` was called for `profile`.
    pub fn saw_connected(&self, profile: &str) -> bool {
        self.calls
            .iter()
            .any(|c| matches!(c, HookCall::Connected(p) if p == profile))
    }
}

impl BridgeHooks for RecordingHooks {
    fn on_connected(&mut self, profile: &str) {
        self.calls.push(HookCall::Connected(profile.to_string()));
    }

    fn on_disconnected(&mut self, reason: &DisconnectReason) {
        self.calls.push(HookCall::Disconnected(reason.clone()));
    }

    fn on_children_loaded(&mut self, node: &NodeId, children: &[NodeRef]) {
        self.calls
            .push(HookCall::ChildrenLoaded(node.clone(), children.len()));
    }

    fn on_attributes_loaded(&mut self, node: &NodeId, _attributes: &AttributeSet) {
        self.calls.push(HookCall::AttributesLoaded(node.clone()));
    }

    fn on_value_changed(&mut self, item: ItemRef, value: &DataValue, _timestamp: Option<DateTime<Utc>>) {
        self.calls.push(HookCall::ValueChanged(item, value.clone()));
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.calls.push(HookCall::Error(kind, message.to_string()));
    }

    fn on_state_changed(&mut self, old: SessionState, new: SessionState) {
        self.calls.push(HookCall::StateChanged(old, new));
    }

    fn on_subscribed(&mut self, item: &MonitoredItem) {
        self.calls.push(HookCall::Subscribed(item.item_ref));
    }

    fn on_unsubscribed(&mut self, item: ItemRef) {
        self.calls.push(HookCall::Unsubscribed(item));
    }
}
