// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The engine actor.
//!
//! One task owns the [`SessionLayer`], the [`SubscriptionManager`] and the
//! cache handle, and is the only writer of session and subscription state.
//! It multiplexes three inputs:
//!
//! ```text
//!   UI commands ──────┐
//!   transport events ─┼──▶ select! ──▶ handlers ──▶ EngineEvent ──▶ UI
//!   task completions ─┘
//! ```
//!
//! Browse and attribute reads run as spawned tasks tagged with a
//! [`RequestId`]. A completion whose id is no longer registered was
//! cancelled (superseded selection, disconnect or reconnect) and is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::address_space::AddressSpaceCache;
use crate::attributes::{read_attributes, AttributeSet};
use crate::bridge::{self, Command, DisconnectReason, EngineEvent, EventSender, UiBridge};
use crate::client::session::{KeepAlive, Session, SessionLayer, SessionState, SessionStats};
use crate::client::transport::{TransportEvent, TransportEventStream, UaTransport};
use crate::config::{EngineSettings, ProfileSet};
use crate::error::{UaError, UaResult};
use crate::subscription::{
    ItemRef, NotificationHandler, SubscriptionManager, SubscriptionStats, ValueChange,
};
use crate::types::{NodeId, NodeRef};

/// Identifies one spawned browse or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// Completions flowing back into the actor.
enum Internal {
    Browsed {
        request: RequestId,
        node: NodeId,
        result: UaResult<Vec<NodeRef>>,
    },
    AttributesRead {
        request: RequestId,
        node: NodeId,
        result: UaResult<AttributeSet>,
    },
    KeepAliveExhausted {
        epoch: u64,
        error: UaError,
    },
}

/// Forwards value changes to the UI as [`EngineEvent::ValueChanged`].
struct BridgeNotifier {
    events: EventSender,
}

#[async_trait]
impl NotificationHandler for BridgeNotifier {
    async fn on_value_change(&self, change: ValueChange) {
        self.events
            .emit(EngineEvent::ValueChanged {
                item: change.item,
                value: change.value,
                timestamp: change.timestamp,
            })
            .await;
    }
}

// =============================================================================
// EngineHandle
// =============================================================================

/// Handle to a running engine task.
#[derive(Debug)]
pub struct EngineHandle {
    task: JoinHandle<()>,
    cache: Arc<AddressSpaceCache>,
    session_stats: Arc<SessionStats>,
    subscription_stats: Arc<SubscriptionStats>,
}

impl EngineHandle {
    /// Read-only view of the address space cache, e.g. for breadcrumbs.
    pub fn cache(&self) -> &Arc<AddressSpaceCache> {
        &self.cache
    }

    /// Session counters.
    pub fn session_stats(&self) -> &SessionStats {
        &self.session_stats
    }

    /// Subscription counters.
    pub fn subscription_stats(&self) -> &SubscriptionStats {
        &self.subscription_stats
    }

    /// Returns `true` once the engine task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the engine to stop after a shutdown command.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Engine task panicked");
            }
        }
    }

    /// Stops the engine without a clean disconnect.
    pub fn abort(&self) {
        self.task.abort();
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The engine actor. Create with [`Engine::spawn`].
pub struct Engine<T: UaTransport> {
    layer: SessionLayer<T>,
    profiles: ProfileSet,
    settings: EngineSettings,
    cache: Arc<AddressSpaceCache>,
    subscriptions: SubscriptionManager,
    events: EventSender,
    commands: mpsc::Receiver<Command>,
    transport_events: Option<TransportEventStream>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    in_flight: HashMap<RequestId, AbortHandle>,
    selection: Option<RequestId>,
    next_request: u64,
    epoch: u64,
    keep_alive: Option<KeepAlive>,
    state_changes: Arc<Mutex<Vec<(SessionState, SessionState)>>>,
    last_profile: Option<String>,
}

impl<T: UaTransport> Engine<T> {
    /// Starts the engine on the current tokio runtime.
    ///
    /// Returns the UI's end of the bridge and a handle to the task.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `settings` are invalid.
    pub fn spawn(
        transport: Arc<T>,
        profiles: ProfileSet,
        settings: EngineSettings,
    ) -> UaResult<(UiBridge, EngineHandle)> {
        settings.validate()?;

        let (bridge, commands, events) = bridge::channel(
            settings.command_channel_capacity,
            settings.event_channel_capacity,
            settings.max_events_per_tick,
        );
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let state_changes = Arc::new(Mutex::new(Vec::new()));
        let mut layer = SessionLayer::new(transport, settings.clone());
        let recorded = Arc::clone(&state_changes);
        layer.set_state_change_callback(move |old, new| recorded.lock().push((old, new)));

        let mut subscriptions =
            SubscriptionManager::new(settings.subscription.clone(), settings.monitored_item.clone());
        subscriptions.on_notification(Arc::new(BridgeNotifier {
            events: events.clone(),
        }));

        let cache = Arc::new(AddressSpaceCache::new());
        let session_stats = layer.stats_handle();
        let subscription_stats = subscriptions.stats_handle();

        let engine = Self {
            layer,
            profiles,
            settings,
            cache: Arc::clone(&cache),
            subscriptions,
            events,
            commands,
            transport_events: None,
            internal_tx,
            internal_rx,
            in_flight: HashMap::new(),
            selection: None,
            next_request: 0,
            epoch: 0,
            keep_alive: None,
            state_changes,
            last_profile: None,
        };

        tracing::info!(
            profiles = engine.profiles.len(),
            application = engine.settings.application_name.as_str(),
            "Engine started"
        );
        let task = tokio::spawn(engine.run());

        Ok((
            bridge,
            EngineHandle {
                task,
                cache,
                session_stats,
                subscription_stats,
            },
        ))
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.shutdown().await;
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
                event = recv_transport(&mut self.transport_events) => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => self.transport_events = None,
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,
            }
        }
        tracing::info!("Engine stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, command: Command) {
        tracing::debug!(command = command.name(), "Command received");
        match command {
            Command::Connect { profile } => self.connect(&profile).await,
            Command::Disconnect => self.disconnect(DisconnectReason::Requested).await,
            Command::Expand { node } => self.expand(node).await,
            Command::Select { node } => self.select(node).await,
            Command::Subscribe { node } => self.subscribe(node).await,
            Command::Unsubscribe { item } => self.unsubscribe(item).await,
            Command::Shutdown => {}
        }
    }

    async fn connect(&mut self, profile_name: &str) {
        let profile = match self.profiles.get(profile_name) {
            Ok(profile) => profile.clone(),
            Err(e) => {
                e.log("connect");
                self.emit(EngineEvent::error("connect", None, &e)).await;
                return;
            }
        };

        let result = self.layer.connect(&profile).await;
        self.flush_state_changes().await;

        let (session, events) = match result {
            Ok(established) => established,
            Err(e) => {
                self.emit(EngineEvent::error("connect", None, &e)).await;
                return;
            }
        };

        self.activate(Arc::clone(&session), events);
        self.emit(EngineEvent::Connected {
            profile: profile.name.clone(),
        })
        .await;

        if self.last_profile.as_deref() == Some(profile.name.as_str()) {
            self.restore_subscriptions(&session).await;
        } else {
            self.drop_subscriptions().await;
        }
        self.last_profile = Some(profile.name);
    }

    async fn disconnect(&mut self, reason: DisconnectReason) {
        if self.layer.state() == SessionState::Disconnected {
            return;
        }
        self.deactivate();
        self.layer.disconnect().await;
        self.flush_state_changes().await;

        self.cache.invalidate();
        self.drop_subscriptions().await;
        self.last_profile = None;
        self.emit(EngineEvent::Disconnected(reason)).await;
    }

    async fn expand(&mut self, node: NodeRef) {
        let Some(session) = self.active_session("expand", &node.node_id).await else {
            return;
        };

        let request = self.next_request_id();
        let cache = Arc::clone(&self.cache);
        let tx = self.internal_tx.clone();
        let node_id = node.node_id;
        let task = tokio::spawn(async move {
            let result = cache.get_children(session.as_ref(), &node_id).await;
            send_internal(&tx, Internal::Browsed {
                request,
                node: node_id,
                result,
            });
        });
        self.in_flight.insert(request, task.abort_handle());
    }

    async fn select(&mut self, node: NodeRef) {
        if let Some(previous) = self.selection.take() {
            if let Some(handle) = self.in_flight.remove(&previous) {
                handle.abort();
                tracing::debug!(request = previous.0, "Superseded attribute read");
            }
        }

        let Some(session) = self.active_session("select", &node.node_id).await else {
            return;
        };

        let request = self.next_request_id();
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let result = read_attributes(session.as_ref(), &node).await;
            send_internal(&tx, Internal::AttributesRead {
                request,
                node: node.node_id,
                result,
            });
        });
        self.in_flight.insert(request, task.abort_handle());
        self.selection = Some(request);
    }

    async fn subscribe(&mut self, node: NodeRef) {
        let Some(session) = self.active_session("subscribe", &node.node_id).await else {
            return;
        };

        match self.subscriptions.subscribe(session.as_ref(), &node).await {
            Ok(item) => self.emit(EngineEvent::Subscribed(Box::new(item))).await,
            Err(e) => {
                e.log("subscribe");
                self.emit(EngineEvent::error("subscribe", Some(&node.node_id), &e))
                    .await;
                if let UaError::TransportLost { reason } = e {
                    self.recover(&reason).await;
                }
            }
        }
    }

    async fn unsubscribe(&mut self, item: ItemRef) {
        let session = self.layer.session().map(Arc::clone);
        if self
            .subscriptions
            .unsubscribe(session.as_deref(), item)
            .await
            .is_some()
        {
            self.emit(EngineEvent::Unsubscribed { item }).await;
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("Engine shutting down");
        self.disconnect(DisconnectReason::Shutdown).await;
        self.cancel_all();
    }

    // =========================================================================
    // Transport Events
    // =========================================================================

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DataChange(notification) => {
                self.subscriptions.handle_notification(notification).await;
            }
            TransportEvent::ConnectionLost { reason } => self.recover(&reason).await,
        }
    }

    /// One reconnect attempt followed by a resubscribe.
    async fn recover(&mut self, reason: &str) {
        if !self.layer.begin_reconnect(reason) {
            return;
        }
        self.flush_state_changes().await;
        self.deactivate();
        self.subscriptions.on_session_lost();

        let result = self.layer.reconnect().await;
        self.flush_state_changes().await;

        match result {
            Ok((session, events)) => {
                self.activate(Arc::clone(&session), events);
                let profile = session.info().profile_name.clone();
                self.emit(EngineEvent::Connected { profile }).await;
                self.restore_subscriptions(&session).await;
            }
            Err(e) => {
                self.cache.invalidate();
                self.emit(EngineEvent::error("reconnect", None, &e)).await;
                self.emit(EngineEvent::Disconnected(DisconnectReason::ReconnectFailed {
                    message: e.to_string(),
                }))
                .await;
            }
        }
    }

    // =========================================================================
    // Completions
    // =========================================================================

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Browsed {
                request,
                node,
                result,
            } => {
                if self.in_flight.remove(&request).is_none() {
                    tracing::debug!(request = request.0, node = %node, "Dropping cancelled browse");
                    return;
                }
                match result {
                    Ok(children) => {
                        self.emit(EngineEvent::ChildrenLoaded { node, children }).await
                    }
                    Err(e) if e.is_cancelled() => {
                        tracing::debug!(node = %node, "Browse cancelled");
                    }
                    Err(e) => {
                        e.log("expand");
                        self.emit(EngineEvent::error("expand", Some(&node), &e)).await;
                    }
                }
            }
            Internal::AttributesRead {
                request,
                node,
                result,
            } => {
                if self.selection == Some(request) {
                    self.selection = None;
                }
                if self.in_flight.remove(&request).is_none() {
                    tracing::debug!(request = request.0, node = %node, "Dropping cancelled read");
                    return;
                }
                match result {
                    Ok(attributes) => {
                        self.emit(EngineEvent::AttributesLoaded {
                            node,
                            attributes: Box::new(attributes),
                        })
                        .await
                    }
                    Err(e) => {
                        e.log("select");
                        self.emit(EngineEvent::error("select", Some(&node), &e)).await;
                    }
                }
            }
            Internal::KeepAliveExhausted { epoch, error } => {
                if epoch != self.epoch {
                    return;
                }
                error.log("keep-alive");
                self.recover(&error.to_string()).await;
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Wires up a freshly established session.
    fn activate(&mut self, session: Arc<Session<T>>, events: TransportEventStream) {
        self.epoch += 1;
        self.transport_events = Some(events);
        self.cache.invalidate();

        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        self.keep_alive = Some(KeepAlive::spawn(
            session,
            self.settings.keepalive_interval,
            self.settings.keepalive_failure_threshold,
            move |error| send_internal(&tx, Internal::KeepAliveExhausted { epoch, error }),
        ));
    }

    /// Tears down everything tied to the current session.
    fn deactivate(&mut self) {
        if let Some(keep_alive) = self.keep_alive.take() {
            keep_alive.stop();
        }
        self.transport_events = None;
        self.cancel_all();
    }

    fn cancel_all(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::debug!(requests = self.in_flight.len(), "Cancelling in-flight requests");
        }
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        self.selection = None;
    }

    async fn restore_subscriptions(&mut self, session: &Arc<Session<T>>) {
        if self.subscriptions.is_empty() {
            return;
        }
        match self.subscriptions.restore(session.as_ref()).await {
            Ok(report) => {
                for rejected in &report.rejected {
                    self.emit(EngineEvent::Unsubscribed {
                        item: rejected.item,
                    })
                    .await;
                }
                if let Some(e) = report.to_error() {
                    e.log("restore");
                    self.emit(EngineEvent::error("restore", None, &e)).await;
                }
            }
            Err(e) => {
                e.log("restore");
                self.emit(EngineEvent::error("restore", None, &e)).await;
            }
        }
    }

    async fn drop_subscriptions(&mut self) {
        let dropped: Vec<ItemRef> = self.subscriptions.items().map(|i| i.item_ref).collect();
        self.subscriptions.clear();
        for item in dropped {
            self.emit(EngineEvent::Unsubscribed { item }).await;
        }
    }

    async fn active_session(&self, operation: &str, node: &NodeId) -> Option<Arc<Session<T>>> {
        match self.layer.session() {
            Some(session) if self.layer.state().is_active() => Some(Arc::clone(session)),
            _ => {
                let e = UaError::not_connected();
                self.emit(EngineEvent::error(operation, Some(node), &e)).await;
                None
            }
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    async fn flush_state_changes(&mut self) {
        let changes = std::mem::take(&mut *self.state_changes.lock());
        for (old, new) in changes {
            self.emit(EngineEvent::StateChanged { old, new }).await;
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if !self.events.emit(event).await {
            tracing::trace!("UI bridge closed, event dropped");
        }
    }
}

async fn recv_transport(events: &mut Option<TransportEventStream>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn send_internal(tx: &mpsc::UnboundedSender<Internal>, internal: Internal) {
    if tx.send(internal).is_err() {
        tracing::trace!("Engine stopped, completion dropped");
    }
}
