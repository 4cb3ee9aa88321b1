// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Subscription Integration Tests
//!
//! Monitored items through the engine:
//!
//! - Subscribe, value flow and unsubscribe
//! - Server-side rejection and non-monitorable nodes
//! - Stale and out-of-order notifications
//! - Restore after reconnect and profile switches
//!
//! ## Test Categories
//!
//! - `test_subscribe_*`: Item creation
//! - `test_unsubscribe_*`: Item removal
//! - `test_notification_*`: Notification filtering
//! - `test_restore_*`: Reconnect behavior

use chrono::Utc;

use uaview_engine::client::{ItemNotification, Notification};
use uaview_engine::{
    DataValue, DisconnectReason, EngineEvent, ErrorKind, ItemStatus, NodeRef, UaValue,
};

use uaview_tests::common::{
    init_test_logging, EngineHarness, NodeFixtures, ProfileFixtures, ServerFixtures,
};

fn double(value: f64) -> DataValue {
    DataValue::new(UaValue::Double(value)).with_timestamps(Utc::now())
}

/// Round-trips a command so that everything queued before it has run.
async fn settle(harness: &mut EngineHarness) {
    harness.expand(NodeRef::root()).await;
}

// =============================================================================
// Subscribe
// =============================================================================

#[tokio::test]
async fn test_subscribe_then_receive_values() {
    init_test_logging();
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    assert_eq!(item.status, ItemStatus::Pending);
    assert!(item.is_bound());
    assert_eq!(harness.server.subscription_count(), 1);
    assert_eq!(harness.server.monitored_nodes(), vec![NodeFixtures::temperature()]);

    assert_eq!(harness.server.push_value(&NodeFixtures::temperature(), double(22.0)), 1);
    let value = harness.next_value(item.item_ref).await;
    assert_eq!(value.value, Some(UaValue::Double(22.0)));

    harness.server.push_value(&NodeFixtures::temperature(), double(22.5));
    let value = harness.next_value(item.item_ref).await;
    assert_eq!(value.value, Some(UaValue::Double(22.5)));

    let stats = harness.handle.subscription_stats();
    assert_eq!(stats.subscriptions_created(), 1);
    assert_eq!(stats.items_created(), 1);
    assert_eq!(stats.values_dispatched(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_twice_returns_same_item() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    let first = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    let second = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;

    assert_eq!(first.item_ref, second.item_ref);
    assert_eq!(harness.server.item_count(), 1);

    // A second node shares the subscription.
    let other = harness
        .subscribe(harness.node(&NodeFixtures::pressure()))
        .await;
    assert_ne!(other.item_ref, first.item_ref);
    assert_eq!(harness.server.subscription_count(), 1);
    assert_eq!(harness.server.item_count(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_object_is_not_monitorable() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    harness
        .bridge
        .subscribe(harness.node(&NodeFixtures::line1()))
        .unwrap();
    let (kind, message) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Subscription);
    assert!(message.starts_with("subscribe ns=2;s=Plant.Line1"), "{message}");
    assert_eq!(harness.server.subscription_count(), 0);
    assert_eq!(harness.server.item_count(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_rejected_item_removes_fresh_subscription() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    harness.server.reject_monitoring(&NodeFixtures::state());

    harness
        .bridge
        .subscribe(harness.node(&NodeFixtures::state()))
        .unwrap();
    let (kind, _) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Subscription);
    assert_eq!(harness.server.subscription_count(), 0);
    assert_eq!(harness.handle.subscription_stats().items_rejected(), 1);

    // The next subscribe starts over cleanly.
    harness.server.accept_monitoring(&NodeFixtures::state());
    harness.subscribe(harness.node(&NodeFixtures::state())).await;
    assert_eq!(harness.server.subscription_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_rejection_keeps_existing_items() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let temperature = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    harness.server.set_item_limit(1);

    harness
        .bridge
        .subscribe(harness.node(&NodeFixtures::pressure()))
        .unwrap();
    let (kind, message) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Subscription);
    assert!(message.contains("BadTooManyMonitoredItems"), "{message}");
    assert_eq!(harness.server.subscription_count(), 1);

    harness.server.push_value(&NodeFixtures::temperature(), double(30.0));
    let value = harness.next_value(temperature.item_ref).await;
    assert_eq!(value.value, Some(UaValue::Double(30.0)));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_without_session_reports_error() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());

    harness
        .bridge
        .subscribe(NodeRef::from_id(NodeFixtures::temperature()))
        .unwrap();
    let (kind, _) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Connection);
    assert_eq!(harness.server.subscription_count(), 0);

    harness.shutdown().await;
}

// =============================================================================
// Unsubscribe
// =============================================================================

#[tokio::test]
async fn test_unsubscribe_last_item_deletes_subscription() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let temperature = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    let pressure = harness
        .subscribe(harness.node(&NodeFixtures::pressure()))
        .await;

    harness.bridge.unsubscribe(pressure.item_ref).unwrap();
    harness
        .wait_for("unsubscribed", |e| {
            matches!(e, EngineEvent::Unsubscribed { item } if *item == pressure.item_ref)
        })
        .await;
    assert_eq!(harness.server.monitored_nodes(), vec![NodeFixtures::temperature()]);
    assert_eq!(harness.server.subscription_count(), 1);

    harness.bridge.unsubscribe(temperature.item_ref).unwrap();
    harness
        .wait_for("unsubscribed", |e| {
            matches!(e, EngineEvent::Unsubscribed { item } if *item == temperature.item_ref)
        })
        .await;
    assert_eq!(harness.server.subscription_count(), 0);
    assert_eq!(harness.handle.subscription_stats().subscriptions_deleted(), 1);

    // Values for a removed item never reach the UI.
    assert_eq!(harness.server.push_value(&NodeFixtures::temperature(), double(1.0)), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_unknown_item_is_silent() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;

    harness.bridge.unsubscribe(item.item_ref).unwrap();
    harness
        .wait_for("unsubscribed", |e| matches!(e, EngineEvent::Unsubscribed { .. }))
        .await;
    harness.bridge.unsubscribe(item.item_ref).unwrap();

    assert!(harness.is_quiet_for(std::time::Duration::from_millis(200)).await);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_on_disconnect() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    harness.clear_history();

    harness.disconnect().await;

    assert!(harness.history().iter().any(
        |e| matches!(e, EngineEvent::Unsubscribed { item: i } if *i == item.item_ref)
    ));

    // A later connect to the same profile starts without items.
    harness.connect(ProfileFixtures::LOCAL).await;
    settle(&mut harness).await;
    assert_eq!(harness.server.item_count(), 0);

    harness.shutdown().await;
}

// =============================================================================
// Notification filtering
// =============================================================================

#[tokio::test]
async fn test_notification_stale_and_out_of_order_are_dropped() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    let subscription_id = harness.server.subscription_id().unwrap();

    harness.server.push_value(&NodeFixtures::temperature(), double(20.0));
    harness.next_value(item.item_ref).await;

    // Replays the sequence number already processed.
    assert!(harness.server.push_notification(Notification {
        subscription_id,
        sequence_number: 1,
        items: vec![ItemNotification {
            client_handle: item.item_ref.client_handle(),
            value: double(-1.0),
        }],
        received_at: Utc::now(),
    }));
    // Belongs to a subscription that no longer exists.
    assert!(harness.server.push_notification(Notification {
        subscription_id: subscription_id.wrapping_add(1000),
        sequence_number: 50,
        items: vec![ItemNotification {
            client_handle: item.item_ref.client_handle(),
            value: double(-2.0),
        }],
        received_at: Utc::now(),
    }));

    harness.server.push_value(&NodeFixtures::temperature(), double(21.0));
    let value = harness.next_value(item.item_ref).await;
    assert_eq!(value.value, Some(UaValue::Double(21.0)));

    let stats = harness.handle.subscription_stats();
    assert_eq!(stats.notifications_discarded(), 2);
    assert_eq!(stats.values_dispatched(), 2);

    harness.shutdown().await;
}

// =============================================================================
// Restore
// =============================================================================

#[tokio::test]
async fn test_restore_after_reconnect_keeps_item_refs() {
    init_test_logging();
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;

    harness.server.lose_connection("server restart");
    harness
        .wait_for("connected", |e| matches!(e, EngineEvent::Connected { .. }))
        .await;
    settle(&mut harness).await;

    assert_eq!(harness.server.monitored_nodes(), vec![NodeFixtures::temperature()]);
    assert_eq!(harness.handle.subscription_stats().restores(), 1);

    harness.server.push_value(&NodeFixtures::temperature(), double(18.0));
    let value = harness.next_value(item.item_ref).await;
    assert_eq!(value.value, Some(UaValue::Double(18.0)));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_restore_reports_rejected_items() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let temperature = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    let pressure = harness
        .subscribe(harness.node(&NodeFixtures::pressure()))
        .await;

    harness.server.reject_monitoring(&NodeFixtures::pressure());
    harness.server.lose_connection("server restart");

    harness
        .wait_for("unsubscribed", |e| {
            matches!(e, EngineEvent::Unsubscribed { item } if *item == pressure.item_ref)
        })
        .await;
    let (kind, message) = harness.next_error().await;
    assert_eq!(kind, ErrorKind::Subscription);
    assert!(message.starts_with("restore"), "{message}");

    assert_eq!(harness.server.monitored_nodes(), vec![NodeFixtures::temperature()]);
    harness.server.push_value(&NodeFixtures::temperature(), double(19.0));
    harness.next_value(temperature.item_ref).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_restore_failure_then_resubscribe_rebinds_item() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;
    assert_eq!(item.data_type_name().as_deref(), Some("Double"));

    harness.server.set_fail_create_subscription(true);
    harness.server.lose_connection("server restart");
    let (kind, message) = harness.next_error().await;
    assert_eq!(kind, ErrorKind::Subscription);
    assert!(message.starts_with("restore"), "{message}");
    assert_eq!(harness.server.subscription_count(), 0);

    harness.server.set_fail_create_subscription(false);
    let again = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;

    assert_eq!(again.item_ref, item.item_ref);
    assert!(again.is_bound());
    assert_eq!(harness.server.monitored_nodes(), vec![NodeFixtures::temperature()]);

    harness.server.push_value(&NodeFixtures::temperature(), double(16.0));
    let value = harness.next_value(item.item_ref).await;
    assert_eq!(value.value, Some(UaValue::Double(16.0)));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_restore_on_manual_connect_after_failed_reconnect() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;

    harness.server.set_reachable(false);
    harness.server.lose_connection("cable pulled");
    harness
        .wait_for("disconnected", |e| {
            matches!(
                e,
                EngineEvent::Disconnected(DisconnectReason::ReconnectFailed { .. })
            )
        })
        .await;

    harness.server.set_reachable(true);
    harness.connect(ProfileFixtures::LOCAL).await;
    settle(&mut harness).await;

    assert_eq!(harness.server.item_count(), 1);
    harness.server.push_value(&NodeFixtures::temperature(), double(17.0));
    harness.next_value(item.item_ref).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_restore_skipped_for_other_profile() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let item = harness
        .subscribe(harness.node(&NodeFixtures::temperature()))
        .await;

    harness.server.set_reachable(false);
    harness.server.lose_connection("cable pulled");
    harness
        .wait_for("disconnected", |e| matches!(e, EngineEvent::Disconnected(_)))
        .await;

    harness.server.set_reachable(true);
    harness.connect(ProfileFixtures::BACKUP).await;
    harness
        .wait_for("unsubscribed", |e| {
            matches!(e, EngineEvent::Unsubscribed { item: i } if *i == item.item_ref)
        })
        .await;

    assert_eq!(harness.server.item_count(), 0);
    assert_eq!(harness.server.subscription_count(), 0);

    harness.shutdown().await;
}
