// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription and monitored item management.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 SubscriptionManager                  │
//! │   (owned by the engine actor, single writer)         │
//! └──────────────────────────────────────────────────────┘
//!            │                              │
//!            ▼                              ▼
//! ┌─────────────────────┐      ┌──────────────────────────┐
//! │ ActiveSubscription  │      │ MonitoredItems           │
//! │ (0 or 1 per session)│      │ keyed by ItemRef,        │
//! │ last sequence no.   │      │ indexed by (node, attr)  │
//! └─────────────────────┘      └──────────────────────────┘
//!                                           │
//!                                           ▼
//!                              ┌──────────────────────────┐
//!                              │ NotificationHandler      │
//!                              │ (one, replaceable)       │
//!                              └──────────────────────────┘
//! ```
//!
//! An [`ItemRef`] doubles as the client handle sent to the server, so it
//! survives reconnects: [`SubscriptionManager::restore`] recreates every
//! item with the same handle and the presentation layer never notices.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::client::session::Session;
use crate::client::transport::{
    CreatedSubscription, MonitoredItemRequest, MonitoredItemResult, Notification, ReadValueId,
    SubscriptionRequest, UaTransport,
};
use crate::config::{MonitoredItemSettings, SubscriptionSettings};
use crate::error::{ProtocolError, SubscriptionError, UaError, UaResult};
use crate::types::{AttributeId, NodeId, NodeRef, StatusCode};
use crate::value::{display_data_type, display_value, DataValue, UaValue};

// =============================================================================
// SubscriptionService
// =============================================================================

/// Server-side subscription services used by the manager.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Creates a subscription.
    async fn create_subscription(&self, request: &SubscriptionRequest)
        -> UaResult<CreatedSubscription>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()>;

    /// Creates monitored items; one result per item, in order.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>>;

    /// Deletes monitored items; one status per id, in order.
    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>>;

    /// Reads the DataType of a watched node; `None` when it cannot be read.
    async fn read_data_type(&self, _node_id: &NodeId) -> Option<NodeId> {
        None
    }
}

#[async_trait]
impl<T: UaTransport> SubscriptionService for Session<T> {
    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> UaResult<CreatedSubscription> {
        Session::create_subscription(self, request).await
    }

    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
        Session::delete_subscription(self, subscription_id).await
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>> {
        Session::create_monitored_items(self, subscription_id, items).await
    }

    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>> {
        Session::delete_monitored_items(self, subscription_id, monitored_item_ids).await
    }

    async fn read_data_type(&self, node_id: &NodeId) -> Option<NodeId> {
        let request = [ReadValueId::new(node_id.clone(), AttributeId::DataType)];
        match self.read(&request).await {
            Ok(results) => results
                .into_iter()
                .next()
                .filter(|result| result.status.is_good())
                .and_then(|result| result.value)
                .and_then(|value| value.as_node_id().cloned()),
            Err(e) => {
                tracing::debug!(node = %node_id, error = %e, "DataType read failed");
                None
            }
        }
    }
}

// =============================================================================
// ItemRef
// =============================================================================

/// Client-side handle of a monitored item, stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemRef(pub u32);

impl ItemRef {
    /// Returns the client handle sent to the server.
    #[inline]
    pub const fn client_handle(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

/// Reporting state of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Bound on the server, no value received on this binding yet.
    #[default]
    Pending,
    /// Receiving values.
    Reporting,
    /// Server state lost; waiting for a restore.
    Stale,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Reporting => write!(f, "Reporting"),
            Self::Stale => write!(f, "Stale"),
        }
    }
}

/// The most recent value of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemValue {
    /// Value, status and timestamps.
    pub value: DataValue,
    /// Sequence number of the notification that carried it.
    pub sequence_number: u32,
}

/// A monitored (node, attribute) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItem {
    /// Client handle.
    pub item_ref: ItemRef,
    /// Server-assigned id; `None` while unbound.
    pub monitored_item_id: Option<u32>,
    /// Watched node.
    pub node: NodeRef,
    /// Watched attribute.
    pub attribute: AttributeId,
    /// DataType of the watched node, when it could be read.
    pub data_type: Option<NodeId>,
    /// Last value received.
    pub last: Option<ItemValue>,
    /// Reporting state.
    pub status: ItemStatus,
    /// Sampling interval granted by the server.
    pub revised_sampling_interval: Option<Duration>,
}

impl MonitoredItem {
    /// Returns `true` while bound to a server-side item.
    pub fn is_bound(&self) -> bool {
        self.monitored_item_id.is_some()
    }

    /// Returns the DataType as a display name, e.g. `Double`.
    pub fn data_type_name(&self) -> Option<String> {
        self.data_type
            .as_ref()
            .map(|id| display_data_type(&UaValue::NodeId(id.clone())))
    }
}

/// A value update for one item, as handed to the [`NotificationHandler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    /// The item.
    pub item: ItemRef,
    /// The watched node.
    pub node: NodeRef,
    /// The new value.
    pub value: DataValue,
    /// Display rendering of the value.
    pub display: String,
    /// Source timestamp, falling back to the server timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// Sequence number of the notification.
    pub sequence_number: u32,
}

// =============================================================================
// NotificationHandler
// =============================================================================

/// Consumer of value changes. The manager holds at most one.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Called once per changed item, in notification order.
    async fn on_value_change(&self, change: ValueChange);
}

/// A handler that forwards value changes into an mpsc channel.
pub struct ChannelHandler {
    sender: mpsc::Sender<ValueChange>,
}

impl ChannelHandler {
    /// Creates a handler around an existing sender.
    pub fn new(sender: mpsc::Sender<ValueChange>) -> Self {
        Self { sender }
    }

    /// Creates a handler with its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<ValueChange>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl NotificationHandler for ChannelHandler {
    async fn on_value_change(&self, change: ValueChange) {
        if self.sender.send(change).await.is_err() {
            tracing::trace!("Value change receiver dropped");
        }
    }
}

// =============================================================================
// RestoreReport
// =============================================================================

/// An item the server refused during a restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedItem {
    /// The dropped item.
    pub item: ItemRef,
    /// Its node.
    pub node: NodeRef,
    /// Status returned by the server.
    pub status: StatusCode,
}

/// Outcome of [`SubscriptionManager::restore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Items bound again under their previous handles.
    pub restored: Vec<ItemRef>,
    /// Items the server refused; they are no longer tracked.
    pub rejected: Vec<RejectedItem>,
}

impl RestoreReport {
    /// Returns `true` if every item came back.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Returns the error describing rejected items, if any.
    pub fn to_error(&self) -> Option<UaError> {
        if self.is_complete() {
            return None;
        }
        Some(UaError::subscription(SubscriptionError::RestoreIncomplete {
            failed: self.rejected.len(),
            total: self.restored.len() + self.rejected.len(),
        }))
    }
}

// =============================================================================
// SubscriptionManager
// =============================================================================

/// The server-side subscription of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSubscription {
    /// Server-assigned id.
    pub subscription_id: u32,
    /// Requested publishing interval.
    pub requested_interval: Duration,
    /// Publishing interval granted by the server.
    pub revised_interval: Duration,
    /// Last processed notification sequence number.
    pub last_sequence: Option<u32>,
}

/// Owns the subscription, its monitored items and notification dispatch.
///
/// All mutation goes through `&mut self`; the engine actor is the owner.
pub struct SubscriptionManager {
    subscription_settings: SubscriptionSettings,
    item_settings: MonitoredItemSettings,
    subscription: Option<ActiveSubscription>,
    items: BTreeMap<ItemRef, MonitoredItem>,
    index: HashMap<(NodeId, AttributeId), ItemRef>,
    next_handle: u32,
    handler: Option<Arc<dyn NotificationHandler>>,
    stats: Arc<SubscriptionStats>,
}

impl SubscriptionManager {
    /// Creates an empty manager.
    pub fn new(subscription_settings: SubscriptionSettings, item_settings: MonitoredItemSettings) -> Self {
        Self {
            subscription_settings,
            item_settings,
            subscription: None,
            items: BTreeMap::new(),
            index: HashMap::new(),
            next_handle: 1,
            handler: None,
            stats: Arc::new(SubscriptionStats::default()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the active subscription, if any.
    pub fn subscription(&self) -> Option<&ActiveSubscription> {
        self.subscription.as_ref()
    }

    /// Returns the item for `item`.
    pub fn item(&self, item: ItemRef) -> Option<&MonitoredItem> {
        self.items.get(&item)
    }

    /// Returns all items in handle order.
    pub fn items(&self) -> impl Iterator<Item = &MonitoredItem> {
        self.items.values()
    }

    /// Returns the item watching the Value of `node_id`, if any.
    pub fn find(&self, node_id: &NodeId) -> Option<ItemRef> {
        self.index.get(&(node_id.clone(), AttributeId::Value)).copied()
    }

    /// Returns the number of tracked items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no items are tracked.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns statistics.
    pub fn stats(&self) -> &SubscriptionStats {
        &self.stats
    }

    /// Returns a shared handle to the statistics.
    pub fn stats_handle(&self) -> Arc<SubscriptionStats> {
        Arc::clone(&self.stats)
    }

    // =========================================================================
    // Handler
    // =========================================================================

    /// Registers the notification consumer, replacing any previous one.
    pub fn on_notification(&mut self, handler: Arc<dyn NotificationHandler>) {
        if self.handler.replace(handler).is_some() {
            tracing::debug!("Notification handler replaced");
        }
    }

    // =========================================================================
    // Subscribe / Unsubscribe
    // =========================================================================

    /// Monitors the Value of `node`.
    ///
    /// Creates the subscription on first use. Subscribing to an already
    /// watched node returns the existing item without any I/O. An item left
    /// unbound by a failed restore is bound again under its [`ItemRef`].
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::NotMonitorable`] for known non-variable classes
    /// - [`SubscriptionError::CreationFailed`] when the subscription is refused
    /// - [`SubscriptionError::MonitoredItemRejected`] when the item is refused
    pub async fn subscribe<S>(&mut self, service: &S, node: &NodeRef) -> UaResult<MonitoredItem>
    where
        S: SubscriptionService + ?Sized,
    {
        if node.node_class.is_known() && !node.node_class.is_monitorable() {
            return Err(SubscriptionError::not_monitorable(&node.node_id, node.node_class).into());
        }

        let key = (node.node_id.clone(), AttributeId::Value);
        let stale = match self.index.get(&key).and_then(|r| self.items.get(r)) {
            Some(existing) if existing.is_bound() => {
                tracing::debug!(node = %node.node_id, item = %existing.item_ref, "Already subscribed");
                return Ok(existing.clone());
            }
            Some(existing) => Some((existing.item_ref, existing.data_type.clone())),
            None => None,
        };

        let data_type = match stale.as_ref().and_then(|(_, data_type)| data_type.clone()) {
            Some(data_type) => Some(data_type),
            None => service.read_data_type(&node.node_id).await,
        };

        let created_here = self.subscription.is_none();
        let subscription_id = self.ensure_subscription(service).await?;

        let item_ref = stale
            .as_ref()
            .map_or(ItemRef(self.next_handle), |(item_ref, _)| *item_ref);
        let request = self.item_request(item_ref, node);

        let result = match self.create_items(service, subscription_id, &[request]).await {
            Ok(mut results) => results.remove(0),
            Err(e) => {
                self.drop_empty_subscription(service, created_here).await;
                return Err(e);
            }
        };

        if result.status.is_bad() {
            self.stats.items_rejected.fetch_add(1, Ordering::Relaxed);
            self.drop_empty_subscription(service, created_here).await;
            return Err(SubscriptionError::item_rejected(&node.node_id, result.status).into());
        }

        if let Some(item) = self.items.get_mut(&item_ref) {
            item.monitored_item_id = Some(result.monitored_item_id);
            item.revised_sampling_interval = Some(result.revised_sampling_interval);
            item.status = ItemStatus::Pending;
            item.data_type = data_type;
            tracing::info!(
                node = %node.node_id,
                item = %item_ref,
                subscription_id,
                monitored_item_id = result.monitored_item_id,
                "Monitored item bound again"
            );
            return Ok(item.clone());
        }

        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        let item = MonitoredItem {
            item_ref,
            monitored_item_id: Some(result.monitored_item_id),
            node: node.clone(),
            attribute: AttributeId::Value,
            data_type,
            last: None,
            status: ItemStatus::Pending,
            revised_sampling_interval: Some(result.revised_sampling_interval),
        };
        self.items.insert(item_ref, item.clone());
        self.index.insert(key, item_ref);
        self.stats.items_created.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            node = %node.node_id,
            item = %item_ref,
            subscription_id,
            monitored_item_id = result.monitored_item_id,
            "Monitored item created"
        );
        Ok(item)
    }

    /// Stops monitoring `item`.
    ///
    /// The item is removed locally first. When it was the last one the whole
    /// subscription is deleted instead of the single item. Server-side
    /// failures are logged and otherwise ignored; `service` is `None` when
    /// there is no session to clean up on.
    ///
    /// Returns the removed item, or `None` if it was unknown.
    pub async fn unsubscribe<S>(&mut self, service: Option<&S>, item: ItemRef) -> Option<MonitoredItem>
    where
        S: SubscriptionService + ?Sized,
    {
        let removed = self.items.remove(&item)?;
        self.index.remove(&(removed.node.node_id.clone(), removed.attribute));
        self.stats.items_removed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(node = %removed.node.node_id, item = %item, "Monitored item removed");

        let (Some(service), Some(subscription_id)) =
            (service, self.subscription.as_ref().map(|s| s.subscription_id))
        else {
            if self.items.is_empty() {
                self.subscription = None;
            }
            return Some(removed);
        };

        if self.items.is_empty() {
            self.subscription = None;
            self.delete_subscription(service, subscription_id).await;
        } else if let Some(monitored_item_id) = removed.monitored_item_id {
            match service
                .delete_monitored_items(subscription_id, &[monitored_item_id])
                .await
            {
                Ok(statuses) => {
                    if let Some(status) = statuses.first().filter(|s| s.is_bad()) {
                        tracing::warn!(item = %item, status = %status, "Server refused item deletion");
                    }
                }
                Err(e) => {
                    tracing::warn!(item = %item, error = %e, "Monitored item deletion failed");
                }
            }
        }

        Some(removed)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Processes one notification and dispatches its changes.
    ///
    /// The notification is dropped when it belongs to a subscription other
    /// than the current one, or when its sequence number is not newer than
    /// the last processed. Returns the number of changes dispatched.
    pub async fn handle_notification(&mut self, notification: Notification) -> usize {
        self.stats.notifications_received.fetch_add(1, Ordering::Relaxed);

        let rejection = match &self.subscription {
            None => Some("no active subscription"),
            Some(s) if s.subscription_id != notification.subscription_id => {
                Some("stale subscription")
            }
            Some(s) => s
                .last_sequence
                .filter(|last| !is_newer(notification.sequence_number, *last))
                .map(|_| "out of order"),
        };
        if let Some(reason) = rejection {
            self.discard(&notification, reason);
            return 0;
        }
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.last_sequence = Some(notification.sequence_number);
        }

        let mut dispatched = 0;
        for change in notification.items {
            let item_ref = ItemRef(change.client_handle);
            let Some(item) = self.items.get_mut(&item_ref) else {
                tracing::trace!(item = %item_ref, "Change for unknown item");
                continue;
            };

            item.status = ItemStatus::Reporting;
            item.last = Some(ItemValue {
                value: change.value.clone(),
                sequence_number: notification.sequence_number,
            });

            let display = match &change.value.value {
                Some(value) => display_value(value, item.data_type.as_ref()),
                None => change.value.status.to_string(),
            };
            let value_change = ValueChange {
                item: item_ref,
                node: item.node.clone(),
                timestamp: change.value.source_timestamp.or(change.value.server_timestamp),
                value: change.value,
                display,
                sequence_number: notification.sequence_number,
            };

            if let Some(handler) = &self.handler {
                handler.on_value_change(value_change).await;
                dispatched += 1;
            }
        }

        self.stats
            .values_dispatched
            .fetch_add(dispatched as u64, Ordering::Relaxed);
        dispatched
    }

    // =========================================================================
    // Session Loss / Restore
    // =========================================================================

    /// Forgets server state after a session loss. Items are kept as `Stale`.
    pub fn on_session_lost(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::info!(
                subscription_id = subscription.subscription_id,
                items = self.items.len(),
                "Subscription lost with session"
            );
        }
        for item in self.items.values_mut() {
            item.monitored_item_id = None;
            item.revised_sampling_interval = None;
            item.status = ItemStatus::Stale;
        }
    }

    /// Recreates the subscription and every tracked item on a new session.
    ///
    /// Items keep their [`ItemRef`]s. Items the server refuses are dropped
    /// and listed in the report. On error every item stays `Stale`.
    pub async fn restore<S>(&mut self, service: &S) -> UaResult<RestoreReport>
    where
        S: SubscriptionService + ?Sized,
    {
        self.on_session_lost();
        if self.items.is_empty() {
            return Ok(RestoreReport::default());
        }

        let subscription_id = self.ensure_subscription(service).await?;
        let requests: Vec<MonitoredItemRequest> = self
            .items
            .values()
            .map(|item| self.item_request(item.item_ref, &item.node))
            .collect();

        let results = match self.create_items(service, subscription_id, &requests).await {
            Ok(results) => results,
            Err(e) => {
                self.subscription = None;
                self.delete_subscription(service, subscription_id).await;
                return Err(e);
            }
        };

        let mut report = RestoreReport::default();
        for (request, result) in requests.iter().zip(results) {
            let item_ref = ItemRef(request.client_handle);
            if result.status.is_bad() {
                self.stats.items_rejected.fetch_add(1, Ordering::Relaxed);
                if let Some(item) = self.items.remove(&item_ref) {
                    self.index.remove(&(item.node.node_id.clone(), item.attribute));
                    tracing::warn!(
                        node = %item.node.node_id,
                        item = %item_ref,
                        status = %result.status,
                        "Monitored item not restored"
                    );
                    report.rejected.push(RejectedItem {
                        item: item_ref,
                        node: item.node,
                        status: result.status,
                    });
                }
                continue;
            }
            if let Some(item) = self.items.get_mut(&item_ref) {
                item.monitored_item_id = Some(result.monitored_item_id);
                item.revised_sampling_interval = Some(result.revised_sampling_interval);
                item.status = ItemStatus::Pending;
                report.restored.push(item_ref);
            }
        }

        if self.items.is_empty() {
            self.subscription = None;
            self.delete_subscription(service, subscription_id).await;
        }

        self.stats.restores.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            restored = report.restored.len(),
            rejected = report.rejected.len(),
            "Subscription restored"
        );
        Ok(report)
    }

    /// Drops all local state without contacting the server.
    ///
    /// Used on explicit disconnect, where closing the session removes the
    /// server-side subscription.
    pub fn clear(&mut self) {
        self.subscription = None;
        self.items.clear();
        self.index.clear();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn ensure_subscription<S>(&mut self, service: &S) -> UaResult<u32>
    where
        S: SubscriptionService + ?Sized,
    {
        if let Some(subscription) = &self.subscription {
            return Ok(subscription.subscription_id);
        }

        let request = SubscriptionRequest::from(&self.subscription_settings);
        let created = service
            .create_subscription(&request)
            .await
            .map_err(creation_failure)?;

        self.stats.subscriptions_created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            subscription_id = created.subscription_id,
            publishing_interval = ?created.revised_publishing_interval,
            "Subscription created"
        );
        self.subscription = Some(ActiveSubscription {
            subscription_id: created.subscription_id,
            requested_interval: request.publishing_interval,
            revised_interval: created.revised_publishing_interval,
            last_sequence: None,
        });
        Ok(created.subscription_id)
    }

    async fn create_items<S>(
        &self,
        service: &S,
        subscription_id: u32,
        requests: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>>
    where
        S: SubscriptionService + ?Sized,
    {
        let results = service
            .create_monitored_items(subscription_id, requests)
            .await?;
        if results.len() != requests.len() {
            return Err(ProtocolError::result_count(
                "CreateMonitoredItems",
                requests.len(),
                results.len(),
            )
            .into());
        }
        Ok(results)
    }

    async fn drop_empty_subscription<S>(&mut self, service: &S, created_here: bool)
    where
        S: SubscriptionService + ?Sized,
    {
        if !created_here || self.items.values().any(MonitoredItem::is_bound) {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            self.delete_subscription(service, subscription.subscription_id).await;
        }
    }

    async fn delete_subscription<S>(&self, service: &S, subscription_id: u32)
    where
        S: SubscriptionService + ?Sized,
    {
        match service.delete_subscription(subscription_id).await {
            Ok(()) => {
                self.stats.subscriptions_deleted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(subscription_id, "Subscription deleted");
            }
            Err(e) => {
                tracing::warn!(subscription_id, error = %e, "Subscription deletion failed");
            }
        }
    }

    fn item_request(&self, item_ref: ItemRef, node: &NodeRef) -> MonitoredItemRequest {
        MonitoredItemRequest {
            client_handle: item_ref.client_handle(),
            node_id: node.node_id.clone(),
            attribute_id: AttributeId::Value,
            sampling_interval: self.item_settings.sampling_interval,
            queue_size: self.item_settings.queue_size,
            discard_oldest: self.item_settings.discard_oldest,
        }
    }

    fn discard(&self, notification: &Notification, reason: &str) {
        self.stats
            .notifications_discarded
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            subscription_id = notification.subscription_id,
            sequence_number = notification.sequence_number,
            reason,
            "Notification discarded"
        );
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscription", &self.subscription)
            .field("items", &self.items.len())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Serial number comparison; tolerates wrap-around of the 32-bit counter.
fn is_newer(candidate: u32, last: u32) -> bool {
    (candidate.wrapping_sub(last) as i32) > 0
}

fn creation_failure(error: UaError) -> UaError {
    match error {
        UaError::Subscription(_) | UaError::TransportLost { .. } => error,
        other => UaError::subscription(SubscriptionError::creation_failed(
            other.status_code().unwrap_or(StatusCode::BAD_UNEXPECTED_ERROR),
            other.to_string(),
        )),
    }
}

// =============================================================================
// SubscriptionStats
// =============================================================================

/// Subscription counters.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    subscriptions_created: AtomicU64,
    subscriptions_deleted: AtomicU64,
    items_created: AtomicU64,
    items_rejected: AtomicU64,
    items_removed: AtomicU64,
    notifications_received: AtomicU64,
    notifications_discarded: AtomicU64,
    values_dispatched: AtomicU64,
    restores: AtomicU64,
}

impl SubscriptionStats {
    /// Subscriptions created.
    pub fn subscriptions_created(&self) -> u64 {
        self.subscriptions_created.load(Ordering::Relaxed)
    }

    /// Subscriptions deleted on the server.
    pub fn subscriptions_deleted(&self) -> u64 {
        self.subscriptions_deleted.load(Ordering::Relaxed)
    }

    /// Monitored items created.
    pub fn items_created(&self) -> u64 {
        self.items_created.load(Ordering::Relaxed)
    }

    /// Monitored items refused by the server.
    pub fn items_rejected(&self) -> u64 {
        self.items_rejected.load(Ordering::Relaxed)
    }

    /// Monitored items removed.
    pub fn items_removed(&self) -> u64 {
        self.items_removed.load(Ordering::Relaxed)
    }

    /// Notifications received.
    pub fn notifications_received(&self) -> u64 {
        self.notifications_received.load(Ordering::Relaxed)
    }

    /// Notifications dropped as stale or out of order.
    pub fn notifications_discarded(&self) -> u64 {
        self.notifications_discarded.load(Ordering::Relaxed)
    }

    /// Value changes handed to the handler.
    pub fn values_dispatched(&self) -> u64 {
        self.values_dispatched.load(Ordering::Relaxed)
    }

    /// Completed restores.
    pub fn restores(&self) -> u64 {
        self.restores.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::ItemNotification;
    use crate::error::ErrorKind;
    use crate::types::{NodeClass, QualifiedName};
    use crate::value::UaValue;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeService {
        next_subscription: Mutex<u32>,
        next_item: Mutex<u32>,
        reject: Mutex<Vec<NodeId>>,
        refuse_subscription: Mutex<bool>,
        data_types: Mutex<HashMap<NodeId, NodeId>>,
        data_type_reads: Mutex<u32>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeService {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SubscriptionService for FakeService {
        async fn create_subscription(
            &self,
            request: &SubscriptionRequest,
        ) -> UaResult<CreatedSubscription> {
            if *self.refuse_subscription.lock() {
                return Err(SubscriptionError::creation_failed(
                    StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS,
                    "CreateSubscription",
                )
                .into());
            }
            let mut next = self.next_subscription.lock();
            *next += 1;
            self.calls.lock().push(format!("create_subscription:{}", *next));
            Ok(CreatedSubscription {
                subscription_id: *next,
                revised_publishing_interval: request.publishing_interval,
            })
        }

        async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
            self.calls
                .lock()
                .push(format!("delete_subscription:{subscription_id}"));
            Ok(())
        }

        async fn create_monitored_items(
            &self,
            _subscription_id: u32,
            items: &[MonitoredItemRequest],
        ) -> UaResult<Vec<MonitoredItemResult>> {
            let reject = self.reject.lock();
            let mut next = self.next_item.lock();
            Ok(items
                .iter()
                .map(|item| {
                    *next += 1;
                    let status = if reject.contains(&item.node_id) {
                        StatusCode::BAD_NODE_ID_UNKNOWN
                    } else {
                        StatusCode::GOOD
                    };
                    MonitoredItemResult {
                        status,
                        monitored_item_id: *next,
                        revised_sampling_interval: item.sampling_interval,
                    }
                })
                .collect())
        }

        async fn delete_monitored_items(
            &self,
            _subscription_id: u32,
            monitored_item_ids: &[u32],
        ) -> UaResult<Vec<StatusCode>> {
            self.calls
                .lock()
                .push(format!("delete_items:{monitored_item_ids:?}"));
            Ok(vec![StatusCode::GOOD; monitored_item_ids.len()])
        }

        async fn read_data_type(&self, node_id: &NodeId) -> Option<NodeId> {
            *self.data_type_reads.lock() += 1;
            self.data_types.lock().get(node_id).cloned()
        }
    }

    fn variable(id: u32) -> NodeRef {
        NodeRef::new(
            NodeId::numeric(2, id),
            NodeClass::Variable,
            format!("Var{id}"),
            QualifiedName::new(2, format!("Var{id}")),
        )
    }

    fn manager() -> SubscriptionManager {
        SubscriptionManager::new(SubscriptionSettings::default(), MonitoredItemSettings::default())
    }

    fn notification(subscription_id: u32, sequence_number: u32, handle: u32, value: i32) -> Notification {
        Notification {
            subscription_id,
            sequence_number,
            items: vec![ItemNotification {
                client_handle: handle,
                value: DataValue::new(UaValue::Int32(value)),
            }],
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_item_ref_display() {
        assert_eq!(ItemRef(7).to_string(), "item-7");
        assert_eq!(ItemRef(7).client_handle(), 7);
    }

    #[test]
    fn test_sequence_comparison_wraps() {
        assert!(is_newer(2, 1));
        assert!(!is_newer(1, 1));
        assert!(!is_newer(1, 2));
        assert!(is_newer(1, u32::MAX));
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let service = FakeService::default();
        let mut manager = manager();

        let first = manager.subscribe(&service, &variable(1)).await.unwrap();
        let second = manager.subscribe(&service, &variable(1)).await.unwrap();

        assert_eq!(first.item_ref, second.item_ref);
        assert_eq!(manager.len(), 1);
        assert_eq!(first.status, ItemStatus::Pending);
        assert_eq!(manager.stats().subscriptions_created(), 1);
        assert_eq!(manager.stats().items_created(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_rejects_objects() {
        let service = FakeService::default();
        let mut manager = manager();
        let object = NodeRef::new(
            NodeId::OBJECTS_FOLDER,
            NodeClass::Object,
            "Objects",
            QualifiedName::new(0, "Objects"),
        );

        let err = manager.subscribe(&service, &object).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Subscription);
        assert!(manager.subscription().is_none());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_first_item_deletes_subscription() {
        let service = FakeService::default();
        service.reject.lock().push(NodeId::numeric(2, 9));
        let mut manager = manager();

        let err = manager.subscribe(&service, &variable(9)).await.unwrap_err();

        assert!(matches!(
            err,
            UaError::Subscription(SubscriptionError::MonitoredItemRejected { .. })
        ));
        assert!(manager.subscription().is_none());
        assert_eq!(
            service.calls(),
            vec!["create_subscription:1".to_string(), "delete_subscription:1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_last_unsubscribe_deletes_subscription() {
        let service = FakeService::default();
        let mut manager = manager();
        let a = manager.subscribe(&service, &variable(1)).await.unwrap();
        let b = manager.subscribe(&service, &variable(2)).await.unwrap();

        assert!(manager.unsubscribe(Some(&service), a.item_ref).await.is_some());
        assert!(manager.subscription().is_some());
        assert!(manager.unsubscribe(Some(&service), b.item_ref).await.is_some());
        assert!(manager.subscription().is_none());
        assert!(manager
            .unsubscribe(Some(&service), b.item_ref)
            .await
            .is_none());

        let calls = service.calls();
        assert_eq!(calls[1], "delete_items:[1]");
        assert_eq!(calls[2], "delete_subscription:1");
    }

    #[tokio::test]
    async fn test_notifications_are_ordered() {
        let service = FakeService::default();
        let mut manager = manager();
        let (handler, mut rx) = ChannelHandler::with_channel(16);
        manager.on_notification(Arc::new(handler));
        let item = manager.subscribe(&service, &variable(1)).await.unwrap();
        let handle = item.item_ref.client_handle();

        assert_eq!(manager.handle_notification(notification(1, 1, handle, 10)).await, 1);
        assert_eq!(manager.handle_notification(notification(1, 3, handle, 30)).await, 1);
        // Late and duplicate sequence numbers.
        assert_eq!(manager.handle_notification(notification(1, 2, handle, 20)).await, 0);
        assert_eq!(manager.handle_notification(notification(1, 3, handle, 30)).await, 0);
        // Other subscription.
        assert_eq!(manager.handle_notification(notification(7, 4, handle, 40)).await, 0);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.display, "10");
        assert_eq!(second.display, "30");
        assert!(rx.try_recv().is_err());

        let tracked = manager.item(item.item_ref).unwrap();
        assert_eq!(tracked.status, ItemStatus::Reporting);
        assert_eq!(tracked.last.as_ref().unwrap().sequence_number, 3);
        assert_eq!(manager.stats().notifications_discarded(), 3);
    }

    #[tokio::test]
    async fn test_restore_keeps_item_refs() {
        let service = FakeService::default();
        let mut manager = manager();
        let a = manager.subscribe(&service, &variable(1)).await.unwrap();
        let b = manager.subscribe(&service, &variable(2)).await.unwrap();

        manager.on_session_lost();
        assert!(manager.items().all(|i| i.status == ItemStatus::Stale && !i.is_bound()));

        service.reject.lock().push(NodeId::numeric(2, 2));
        let report = manager.restore(&service).await.unwrap();

        assert_eq!(report.restored, vec![a.item_ref]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].item, b.item_ref);
        assert!(report.to_error().is_some());

        let subscription_id = manager.subscription().unwrap().subscription_id;
        assert_eq!(subscription_id, 2);
        let restored = manager.item(a.item_ref).unwrap();
        assert!(restored.is_bound());
        assert_eq!(restored.status, ItemStatus::Pending);
        assert!(manager.item(b.item_ref).is_none());
        assert_eq!(manager.find(&NodeId::numeric(2, 1)), Some(a.item_ref));
    }

    #[tokio::test]
    async fn test_notification_after_loss_is_discarded() {
        let service = FakeService::default();
        let mut manager = manager();
        let item = manager.subscribe(&service, &variable(1)).await.unwrap();

        manager.on_session_lost();

        let handle = item.item_ref.client_handle();
        assert_eq!(manager.handle_notification(notification(1, 1, handle, 1)).await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_rebinds_item_left_stale_by_failed_restore() {
        let service = FakeService::default();
        let mut manager = manager();
        let first = manager.subscribe(&service, &variable(1)).await.unwrap();

        manager.on_session_lost();
        *service.refuse_subscription.lock() = true;
        let err = manager.restore(&service).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Subscription);
        assert!(!manager.item(first.item_ref).unwrap().is_bound());

        *service.refuse_subscription.lock() = false;
        let again = manager.subscribe(&service, &variable(1)).await.unwrap();

        assert_eq!(again.item_ref, first.item_ref);
        assert!(again.is_bound());
        assert_eq!(again.status, ItemStatus::Pending);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.stats().items_created(), 1);
        let subscription_id = manager.subscription().unwrap().subscription_id;

        let (handler, mut rx) = ChannelHandler::with_channel(4);
        manager.on_notification(Arc::new(handler));
        let handle = again.item_ref.client_handle();
        assert_eq!(
            manager
                .handle_notification(notification(subscription_id, 1, handle, 5))
                .await,
            1
        );
        assert_eq!(rx.recv().await.unwrap().item, first.item_ref);
    }

    #[tokio::test]
    async fn test_rejected_rebind_keeps_item_and_drops_fresh_subscription() {
        let service = FakeService::default();
        let mut manager = manager();
        let first = manager.subscribe(&service, &variable(1)).await.unwrap();

        manager.on_session_lost();
        service.reject.lock().push(NodeId::numeric(2, 1));
        let err = manager.subscribe(&service, &variable(1)).await.unwrap_err();

        assert!(matches!(
            err,
            UaError::Subscription(SubscriptionError::MonitoredItemRejected { .. })
        ));
        assert!(manager.subscription().is_none());
        let item = manager.item(first.item_ref).unwrap();
        assert_eq!(item.status, ItemStatus::Stale);
        assert_eq!(
            service.calls().last().map(String::as_str),
            Some("delete_subscription:2")
        );
    }

    #[tokio::test]
    async fn test_subscribe_records_data_type() {
        let service = FakeService::default();
        service
            .data_types
            .lock()
            .insert(NodeId::numeric(2, 1), NodeId::numeric(0, 852));
        let mut manager = manager();
        let (handler, mut rx) = ChannelHandler::with_channel(4);
        manager.on_notification(Arc::new(handler));

        let item = manager.subscribe(&service, &variable(1)).await.unwrap();
        manager.subscribe(&service, &variable(1)).await.unwrap();

        assert_eq!(item.data_type, Some(NodeId::numeric(0, 852)));
        assert_eq!(item.data_type_name().as_deref(), Some("i=852"));
        assert_eq!(*service.data_type_reads.lock(), 1);

        let handle = item.item_ref.client_handle();
        manager.handle_notification(notification(1, 1, handle, 0)).await;
        assert_eq!(rx.recv().await.unwrap().display, "Running (0)");

        let unknown = manager.subscribe(&service, &variable(2)).await.unwrap();
        assert!(unknown.data_type.is_none());
        assert!(unknown.data_type_name().is_none());

        service
            .data_types
            .lock()
            .insert(NodeId::numeric(2, 3), NodeId::numeric(0, 11));
        let double = manager.subscribe(&service, &variable(3)).await.unwrap();
        assert_eq!(double.data_type_name().as_deref(), Some("Double"));
    }
}
