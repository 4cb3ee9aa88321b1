// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Session Integration Tests
//!
//! Connection lifecycle through the running engine:
//!
//! - Connect and state transitions
//! - Authentication and profile errors
//! - Explicit disconnect and shutdown
//! - Loss detection, reconnect and reconnect failure
//!
//! ## Test Categories
//!
//! - `test_connect_*`: Connect path
//! - `test_disconnect_*`: Disconnect and shutdown
//! - `test_reconnect_*`: Connection loss handling
//! - `test_keepalive_*`: Keep-alive probing (paused time)

use std::sync::Arc;
use std::time::Duration;

use uaview_engine::client::session::SessionLayer;
use uaview_engine::{
    DisconnectReason, EngineEvent, ErrorKind, IdentityToken, NodeRef, SessionState, UaError,
};

use uaview_tests::common::{
    init_test_logging, EngineHarness, ProfileFixtures, ServerFixtures, SettingsFixtures,
};

fn state_changes(history: &[EngineEvent]) -> Vec<(SessionState, SessionState)> {
    history
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged { old, new } => Some((*old, *new)),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Connect
// =============================================================================

#[tokio::test]
async fn test_connect_reports_each_state_before_connected() {
    init_test_logging();
    let mut harness = EngineHarness::start(ServerFixtures::plant());

    harness.connect(ProfileFixtures::LOCAL).await;

    assert_eq!(
        state_changes(harness.history()),
        vec![
            (SessionState::Disconnected, SessionState::Connecting),
            (SessionState::Connecting, SessionState::SecureChannelOpen),
            (SessionState::SecureChannelOpen, SessionState::SessionActive),
        ]
    );
    assert!(matches!(
        harness.history().last(),
        Some(EngineEvent::Connected { profile }) if profile == ProfileFixtures::LOCAL
    ));
    assert_eq!(harness.handle.session_stats().connects(), 1);
    assert!(harness.server.is_session_active());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_connect_rejected_credentials() {
    init_test_logging();
    let server = ServerFixtures::plant();
    server.require_credentials(ProfileFixtures::USER, ProfileFixtures::PASSWORD);
    let mut harness = EngineHarness::start(server);

    harness.bridge.connect(ProfileFixtures::LOCAL).unwrap();
    let (kind, message) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Authentication);
    assert!(message.starts_with("connect"), "{message}");
    assert_eq!(
        state_changes(harness.history()).last(),
        Some(&(SessionState::SecureChannelOpen, SessionState::Disconnected))
    );
    assert!(!harness.server.is_session_active());

    // The same engine can still log in with the right profile.
    harness.connect(ProfileFixtures::SECURE).await;
    assert_eq!(
        harness.server.identities().last(),
        Some(&IdentityToken::UserName {
            user: ProfileFixtures::USER.to_string(),
            password: ProfileFixtures::PASSWORD.to_string(),
        })
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_connect_unknown_profile() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());

    harness.bridge.connect("nowhere").unwrap();
    let (kind, message) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Configuration);
    assert!(message.contains("nowhere"), "{message}");
    assert_eq!(harness.server.open_count(), 0);
    assert!(state_changes(harness.history()).is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_connect_unreachable_server() {
    let server = ServerFixtures::plant();
    server.set_reachable(false);
    let mut harness = EngineHarness::start(server);

    harness.bridge.connect(ProfileFixtures::LOCAL).unwrap();
    let (kind, _) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Connection);
    assert_eq!(
        state_changes(harness.history()),
        vec![
            (SessionState::Disconnected, SessionState::Connecting),
            (SessionState::Connecting, SessionState::Disconnected),
        ]
    );
    assert_eq!(harness.handle.session_stats().connect_failures(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    harness.bridge.connect(ProfileFixtures::BACKUP).unwrap();
    let (kind, _) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Connection);
    assert_eq!(harness.server.open_count(), 1);
    assert!(harness.server.is_session_active());

    harness.shutdown().await;
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test]
async fn test_disconnect_closes_session() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    harness.clear_history();

    let reason = harness.disconnect().await;

    assert_eq!(reason, DisconnectReason::Requested);
    assert_eq!(
        state_changes(harness.history()),
        vec![
            (SessionState::SessionActive, SessionState::Closing),
            (SessionState::Closing, SessionState::Disconnected),
        ]
    );
    assert!(!harness.server.is_session_active());

    // Requests after disconnect fail fast instead of reaching the server.
    harness.bridge.expand(NodeRef::root()).unwrap();
    let (kind, message) = harness.next_error().await;
    assert_eq!(kind, ErrorKind::Connection);
    assert!(message.starts_with("expand i=84"), "{message}");
    assert_eq!(harness.server.browse_count(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_when_idle_is_silent() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());

    harness.bridge.disconnect().unwrap();

    assert!(harness.is_quiet_for(Duration::from_millis(200)).await);
    assert_eq!(harness.server.close_count(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_on_shutdown() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    let server = Arc::clone(&harness.server);

    harness.shutdown().await;

    assert!(!server.is_session_active());
    assert!(server.close_count() >= 1);
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test]
async fn test_reconnect_after_connection_loss() {
    init_test_logging();
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    harness.clear_history();

    harness.server.lose_connection("connection reset by peer");
    harness
        .wait_for("connected", |e| matches!(e, EngineEvent::Connected { .. }))
        .await;

    assert_eq!(
        state_changes(harness.history()),
        vec![
            (SessionState::SessionActive, SessionState::Reconnecting),
            (SessionState::Reconnecting, SessionState::SecureChannelOpen),
            (SessionState::SecureChannelOpen, SessionState::SessionActive),
        ]
    );
    assert_eq!(harness.server.open_count(), 2);
    assert_eq!(harness.handle.session_stats().reconnects(), 1);
    assert!(harness.server.is_session_active());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_failure_ends_disconnected() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    harness.server.set_reachable(false);
    harness.server.lose_connection("cable pulled");

    let (kind, message) = harness.next_error().await;
    assert_eq!(kind, ErrorKind::Connection);
    assert!(message.starts_with("reconnect"), "{message}");

    let event = harness
        .wait_for("disconnected", |e| matches!(e, EngineEvent::Disconnected(_)))
        .await;
    assert!(matches!(
        event,
        EngineEvent::Disconnected(DisconnectReason::ReconnectFailed { .. })
    ));

    // Exactly one attempt was made.
    assert_eq!(harness.server.open_count(), 1);

    // The engine accepts a fresh connect once the server is back.
    harness.server.set_reachable(true);
    harness.connect(ProfileFixtures::LOCAL).await;

    harness.shutdown().await;
}

// =============================================================================
// Keep-alive
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_keepalive_healthy_session_stays_quiet() {
    let mut harness = EngineHarness::start_with(
        ServerFixtures::plant(),
        ProfileFixtures::profiles(),
        SettingsFixtures::fast_keepalive(),
    );
    harness.connect(ProfileFixtures::LOCAL).await;

    assert!(harness.is_quiet_for(Duration::from_secs(10)).await);
    assert!(harness.server.keepalive_count() >= 5);
    assert_eq!(harness.handle.session_stats().keepalive_failures(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_exhaustion_triggers_reconnect() {
    let mut harness = EngineHarness::start_with(
        ServerFixtures::plant(),
        ProfileFixtures::profiles(),
        SettingsFixtures::fast_keepalive(),
    );
    harness.connect(ProfileFixtures::LOCAL).await;

    harness.server.set_reachable(false);
    harness.server.set_fail_keepalive(true);

    harness
        .wait_for("reconnecting", |e| {
            matches!(
                e,
                EngineEvent::StateChanged {
                    new: SessionState::Reconnecting,
                    ..
                }
            )
        })
        .await;
    assert_eq!(harness.handle.session_stats().keepalive_failures(), 3);

    let event = harness
        .wait_for("disconnected", |e| matches!(e, EngineEvent::Disconnected(_)))
        .await;
    assert!(matches!(
        event,
        EngineEvent::Disconnected(DisconnectReason::ReconnectFailed { .. })
    ));

    harness.shutdown().await;
}

// =============================================================================
// SessionLayer
// =============================================================================

#[tokio::test]
async fn test_session_layer_request_after_loss_fails_as_transport_lost() {
    let server = ServerFixtures::plant();
    let mut layer = SessionLayer::new(Arc::clone(&server), SettingsFixtures::quiet());
    let profiles = ProfileFixtures::profiles();

    let (session, _events) = layer
        .connect(profiles.get(ProfileFixtures::LOCAL).unwrap())
        .await
        .unwrap();
    assert!(session.keep_alive().await.is_ok());

    assert!(layer.begin_reconnect("test"));
    assert_eq!(layer.state(), SessionState::Reconnecting);
    assert!(!session.is_alive());

    let err = session.browse(&uaview_engine::NodeId::ROOT_FOLDER).await.unwrap_err();
    assert!(matches!(err, UaError::TransportLost { .. }));

    let (fresh, _events) = layer.reconnect().await.unwrap();
    assert_ne!(fresh.info().session_id, session.info().session_id);
    assert_eq!(layer.state(), SessionState::SessionActive);

    layer.disconnect().await;
    assert_eq!(layer.state(), SessionState::Disconnected);
}
