// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session lifecycle.
//!
//! [`SessionLayer`] drives the connection state machine:
//!
//! ```text
//! Disconnected → Connecting → SecureChannelOpen → SessionActive
//!                                                  │        │
//!                                          Reconnecting   Closing
//!                                                  │        │
//!                                                  └→ Disconnected
//! ```
//!
//! Each successful connect or reconnect yields a fresh [`Session`]. A session
//! that has been superseded or lost is marked dead and refuses requests with
//! [`UaError::TransportLost`], so stale handles held by in-flight tasks fail
//! fast instead of talking to the wrong connection.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::transport::{
    CreatedSubscription, MonitoredItemRequest, MonitoredItemResult, ReadValueId,
    ReferenceDescription, SubscriptionRequest, TransportEventStream, UaTransport,
};
use crate::config::{EngineSettings, ServerProfile};
use crate::error::{ConnectionError, UaError, UaResult};
use crate::types::{AttributeId, NodeId, StatusCode};
use crate::value::DataValue;

// =============================================================================
// SessionState
// =============================================================================

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Discovering endpoints and opening the channel.
    Connecting,
    /// Channel open, session not yet activated.
    SecureChannelOpen,
    /// Session active; requests are accepted.
    SessionActive,
    /// Re-establishing after a connection loss.
    Reconnecting,
    /// Closing on request.
    Closing,
}

impl SessionState {
    /// Returns `true` if requests are accepted.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::SessionActive)
    }

    /// Returns `true` while moving between stable states.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::SecureChannelOpen | Self::Reconnecting | Self::Closing
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::SecureChannelOpen => "SecureChannelOpen",
            Self::SessionActive => "SessionActive",
            Self::Reconnecting => "Reconnecting",
            Self::Closing => "Closing",
        })
    }
}

// =============================================================================
// SessionInfo
// =============================================================================

/// Identity of one established session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Profile the session was opened with.
    pub profile_name: String,
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Authentication token.
    pub auth_token: NodeId,
    /// Session timeout granted by the server.
    pub revised_timeout: Duration,
    /// Wall-clock time the session became active.
    pub established_at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

/// One live session on a transport.
///
/// Typed request methods take `&self` and may run concurrently.
pub struct Session<T: UaTransport> {
    transport: Arc<T>,
    info: SessionInfo,
    request_timeout: Duration,
    alive: AtomicBool,
    last_activity: Mutex<Instant>,
    stats: Arc<SessionStats>,
}

impl<T: UaTransport> Session<T> {
    fn new(
        transport: Arc<T>,
        info: SessionInfo,
        request_timeout: Duration,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            transport,
            info,
            request_timeout,
            alive: AtomicBool::new(true),
            last_activity: Mutex::new(Instant::now()),
            stats,
        }
    }

    /// Returns the session identity.
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Returns `true` until the session is lost or closed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the session dead; later requests fail with `TransportLost`.
    pub fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            tracing::debug!(session_id = %self.info.session_id, "Session marked dead");
        }
    }

    /// Returns the time since the last successful request.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Browses forward hierarchical references of a node.
    pub async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<ReferenceDescription>> {
        self.call(self.transport.browse(node_id)).await
    }

    /// Reads attributes; one result per operation.
    pub async fn read(&self, nodes: &[ReadValueId]) -> UaResult<Vec<DataValue>> {
        self.call(self.transport.read(nodes)).await
    }

    /// Creates a subscription.
    pub async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> UaResult<CreatedSubscription> {
        self.call(self.transport.create_subscription(request)).await
    }

    /// Deletes a subscription.
    pub async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
        self.call(self.transport.delete_subscription(subscription_id))
            .await
    }

    /// Creates monitored items.
    pub async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>> {
        self.call(self.transport.create_monitored_items(subscription_id, items))
            .await
    }

    /// Deletes monitored items.
    pub async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>> {
        self.call(
            self.transport
                .delete_monitored_items(subscription_id, monitored_item_ids),
        )
        .await
    }

    /// Reads the server's CurrentTime as a liveness probe.
    pub async fn keep_alive(&self) -> UaResult<DataValue> {
        self.stats.keepalives_sent.fetch_add(1, Ordering::Relaxed);
        let probe = [ReadValueId::new(
            NodeId::SERVER_CURRENT_TIME,
            AttributeId::Value,
        )];

        let result = self
            .read(&probe)
            .await
            .and_then(|mut values| match values.pop() {
                Some(value) if value.status.is_good() => Ok(value),
                Some(value) => Err(UaError::transport_lost(format!(
                    "keep-alive read returned {}",
                    value.status
                ))),
                None => Err(UaError::transport_lost("keep-alive read returned no result")),
            });

        if result.is_err() {
            self.stats.keepalive_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn call<R>(&self, request: impl Future<Output = UaResult<R>>) -> UaResult<R> {
        if !self.is_alive() {
            return Err(UaError::transport_lost("session is no longer active"));
        }
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(UaError::connection(ConnectionError::timed_out(
                &self.info.endpoint_url,
                self.request_timeout,
            ))),
        };

        match &result {
            Ok(_) => *self.last_activity.lock() = Instant::now(),
            Err(_) => {
                self.stats.request_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}

impl<T: UaTransport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("profile", &self.info.profile_name)
            .field("session_id", &self.info.session_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// =============================================================================
// SessionLayer
// =============================================================================

type StateCallback = Box<dyn Fn(SessionState, SessionState) + Send + Sync>;

/// Owns the connection state machine and the current session.
///
/// Mutating methods take `&mut self`; the engine actor is the only owner.
pub struct SessionLayer<T: UaTransport> {
    transport: Arc<T>,
    settings: EngineSettings,
    state: SessionState,
    current: Option<Arc<Session<T>>>,
    profile: Option<ServerProfile>,
    stats: Arc<SessionStats>,
    on_state_change: Option<StateCallback>,
}

impl<T: UaTransport> SessionLayer<T> {
    /// Creates a layer in `Disconnected`.
    pub fn new(transport: Arc<T>, settings: EngineSettings) -> Self {
        Self {
            transport,
            settings,
            state: SessionState::Disconnected,
            current: None,
            profile: None,
            stats: Arc::new(SessionStats::default()),
            on_state_change: None,
        }
    }

    /// Registers a callback invoked on every state transition.
    pub fn set_state_change_callback<F>(&mut self, callback: F)
    where
        F: Fn(SessionState, SessionState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(callback));
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the active session, if any.
    pub fn session(&self) -> Option<&Arc<Session<T>>> {
        self.current.as_ref()
    }

    /// Returns the profile of the current or reconnecting session.
    pub fn profile(&self) -> Option<&ServerProfile> {
        self.profile.as_ref()
    }

    /// Returns session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Returns a shared handle to the statistics.
    pub fn stats_handle(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Returns the settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Connects using `profile`.
    ///
    /// Only valid from `Disconnected`. On failure the channel is closed and
    /// the state returns to `Disconnected`.
    pub async fn connect(
        &mut self,
        profile: &ServerProfile,
    ) -> UaResult<(Arc<Session<T>>, TransportEventStream)> {
        if self.state != SessionState::Disconnected {
            return Err(ConnectionError::already_connected(self.state).into());
        }
        profile.validate()?;

        let identity = profile.identity();
        tracing::info!(
            profile = %profile.name,
            endpoint = %profile.endpoint_url,
            security_policy = %profile.security_policy,
            security_mode = %profile.security_mode,
            user = identity.user().unwrap_or("anonymous"),
            "Connecting"
        );

        self.set_state(SessionState::Connecting);
        match self.establish(profile).await {
            Ok((session, events)) => {
                self.profile = Some(profile.clone());
                self.current = Some(Arc::clone(&session));
                self.stats.connects.fetch_add(1, Ordering::Relaxed);
                self.set_state(SessionState::SessionActive);
                tracing::info!(
                    profile = %profile.name,
                    session_id = %session.info().session_id,
                    "Session active"
                );
                Ok((session, events))
            }
            Err(e) => {
                self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                self.close_transport().await;
                self.set_state(SessionState::Disconnected);
                e.log("connect");
                Err(e)
            }
        }
    }

    /// Enters `Reconnecting` after a loss. The current session is marked dead.
    ///
    /// Returns `false` when there is no active session to recover.
    pub fn begin_reconnect(&mut self, reason: &str) -> bool {
        if self.state != SessionState::SessionActive {
            return false;
        }
        if let Some(session) = self.current.take() {
            session.mark_dead();
        }
        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(reason = reason, "Connection lost, reconnecting");
        self.set_state(SessionState::Reconnecting);
        true
    }

    /// Makes exactly one attempt to re-establish the session.
    ///
    /// On failure the state moves to `Disconnected` and the profile is
    /// forgotten.
    pub async fn reconnect(&mut self) -> UaResult<(Arc<Session<T>>, TransportEventStream)> {
        if self.state != SessionState::Reconnecting {
            return Err(UaError::not_connected());
        }
        let Some(profile) = self.profile.clone() else {
            self.set_state(SessionState::Disconnected);
            return Err(UaError::not_connected());
        };

        self.close_transport().await;
        match self.establish(&profile).await {
            Ok((session, events)) => {
                self.current = Some(Arc::clone(&session));
                self.set_state(SessionState::SessionActive);
                tracing::info!(
                    profile = %profile.name,
                    session_id = %session.info().session_id,
                    "Reconnected"
                );
                Ok((session, events))
            }
            Err(e) => {
                self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                self.close_transport().await;
                self.profile = None;
                self.set_state(SessionState::Disconnected);
                e.log("reconnect");
                Err(e)
            }
        }
    }

    /// Closes the session. Idempotent.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.set_state(SessionState::Closing);
        if let Some(session) = self.current.take() {
            session.mark_dead();
        }
        self.close_transport().await;
        self.profile = None;
        self.set_state(SessionState::Disconnected);
        tracing::info!("Disconnected");
    }

    async fn establish(
        &mut self,
        profile: &ServerProfile,
    ) -> UaResult<(Arc<Session<T>>, TransportEventStream)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.transport
            .open_secure_channel(profile, &self.settings, events_tx)
            .await?;
        self.set_state(SessionState::SecureChannelOpen);

        let activated = self.transport.activate_session(&profile.identity()).await?;
        let info = SessionInfo {
            profile_name: profile.name.clone(),
            endpoint_url: profile.endpoint_url.clone(),
            session_id: activated.session_id,
            auth_token: activated.auth_token,
            revised_timeout: activated.revised_timeout,
            established_at: Utc::now(),
        };

        let session = Session::new(
            Arc::clone(&self.transport),
            info,
            self.settings.request_timeout,
            Arc::clone(&self.stats),
        );
        Ok((Arc::new(session), events_rx))
    }

    async fn close_transport(&self) {
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "Transport close failed");
        }
    }

    fn set_state(&mut self, new_state: SessionState) {
        let old_state = std::mem::replace(&mut self.state, new_state);
        if old_state != new_state {
            tracing::debug!(
                old_state = %old_state,
                new_state = %new_state,
                "Session state changed"
            );
            if let Some(callback) = &self.on_state_change {
                callback(old_state, new_state);
            }
        }
    }
}

impl<T: UaTransport> fmt::Debug for SessionLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLayer")
            .field("transport", &self.transport.name())
            .field("state", &self.state)
            .field("profile", &self.profile.as_ref().map(|p| &p.name))
            .finish()
    }
}

// =============================================================================
// Keep-alive
// =============================================================================

/// Handle to a running keep-alive task. Dropping it stops the task.
#[derive(Debug)]
pub struct KeepAlive {
    handle: JoinHandle<()>,
}

impl KeepAlive {
    /// Starts probing `session` every `interval`.
    ///
    /// After `threshold` consecutive failures `on_exhausted` is invoked once
    /// and the task ends. The task also ends when the session dies.
    pub fn spawn<T, F>(
        session: Arc<Session<T>>,
        interval: Duration,
        threshold: u32,
        on_exhausted: F,
    ) -> Self
    where
        T: UaTransport,
        F: FnOnce(UaError) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failures = 0u32;

            loop {
                ticker.tick().await;
                if !session.is_alive() {
                    return;
                }

                match session.keep_alive().await {
                    Ok(_) => {
                        if failures > 0 {
                            tracing::debug!(failures, "Keep-alive recovered");
                        }
                        failures = 0;
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(
                            failures,
                            threshold,
                            error = %e,
                            "Keep-alive failed"
                        );
                        if failures >= threshold {
                            on_exhausted(e);
                            return;
                        }
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stops the task.
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Returns `true` once the task has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
    requests: AtomicU64,
    request_failures: AtomicU64,
    keepalives_sent: AtomicU64,
    keepalive_failures: AtomicU64,
}

impl SessionStats {
    /// Successful connects (not counting reconnects).
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Failed connect and reconnect attempts.
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    /// Reconnect cycles started.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Requests issued.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Requests that failed.
    pub fn request_failures(&self) -> u64 {
        self.request_failures.load(Ordering::Relaxed)
    }

    /// Keep-alive probes sent.
    pub fn keepalives_sent(&self) -> u64 {
        self.keepalives_sent.load(Ordering::Relaxed)
    }

    /// Keep-alive probes that failed.
    pub fn keepalive_failures(&self) -> u64 {
        self.keepalive_failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
