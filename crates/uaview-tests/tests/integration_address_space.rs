// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Address Space Integration Tests
//!
//! Lazy browsing through the engine and directly against a session:
//!
//! - One browse per node, then cache hits
//! - Breadcrumb paths and duplicate references
//! - Browse failures leave the node unfetched
//! - Concurrent expansion and reset on reconnect
//!
//! ## Test Categories
//!
//! - `test_expand_*`: Expansion through the bridge
//! - `test_cache_*`: Cache behavior against a session

use std::sync::Arc;
use std::time::Duration;

use uaview_engine::client::session::SessionLayer;
use uaview_engine::{AddressSpaceCache, EngineEvent, ErrorKind, NodeClass, NodeId, NodeRef};

use uaview_tests::common::{
    init_test_logging, EngineHarness, NodeFixtures, ProfileFixtures, ServerFixtures,
    SettingsFixtures,
};

fn names(nodes: &[NodeRef]) -> Vec<&str> {
    nodes.iter().map(|n| n.display_name.as_str()).collect()
}

// =============================================================================
// Expansion through the engine
// =============================================================================

#[tokio::test]
async fn test_expand_root_then_hit_cache() {
    init_test_logging();
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    let children = harness.expand(NodeRef::root()).await;
    assert_eq!(names(&children), vec!["Objects", "Types", "Views"]);
    assert!(children.iter().all(|c| c.node_class == NodeClass::Object));
    assert_eq!(harness.server.browse_count(), 1);

    let again = harness.expand(NodeRef::root()).await;
    assert_eq!(again, children);
    assert_eq!(harness.server.browse_count(), 1);
    assert_eq!(harness.handle.cache().stats().cache_hits(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_expand_builds_breadcrumb_path() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    harness.expand(NodeRef::root()).await;
    let objects = harness.node(&NodeId::OBJECTS_FOLDER);
    harness.expand(objects).await;
    let plant = harness.node(&NodeFixtures::plant());
    harness.expand(plant).await;
    let line1 = harness.node(&NodeFixtures::line1());
    let variables = harness.expand(line1).await;

    assert_eq!(
        names(&variables),
        vec!["Temperature", "Pressure", "State", "Counter", "Reset"]
    );
    let path = harness.handle.cache().path_to(&NodeFixtures::temperature());
    assert_eq!(
        names(&path),
        vec!["Root", "Objects", "Plant", "Line1", "Temperature"]
    );
    assert_eq!(
        harness.handle.cache().parent(&NodeFixtures::line1()),
        Some(NodeFixtures::plant())
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_expand_collapses_duplicate_references() {
    let server = ServerFixtures::plant();
    server.add_reference(&NodeFixtures::plant(), &NodeFixtures::line1());
    let mut harness = EngineHarness::start(server);
    harness.connect(ProfileFixtures::LOCAL).await;

    let plant = harness.node(&NodeFixtures::plant());
    let children = harness.expand(plant).await;

    assert_eq!(names(&children), vec!["Line1"]);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_expand_failure_leaves_node_unfetched() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    harness.server.fail_browse(&NodeFixtures::plant());

    harness
        .bridge
        .expand(harness.node(&NodeFixtures::plant()))
        .unwrap();
    let (kind, message) = harness.next_error().await;

    assert_eq!(kind, ErrorKind::Browse);
    assert!(message.starts_with("expand ns=2;s=Plant"), "{message}");
    assert!(!harness.handle.cache().is_fetched(&NodeFixtures::plant()));

    // The next expansion retries.
    harness.server.heal_browse(&NodeFixtures::plant());
    let children = harness.expand(harness.node(&NodeFixtures::plant())).await;
    assert_eq!(names(&children), vec!["Line1"]);
    assert_eq!(harness.server.browse_count(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_expand_leaf_yields_no_children() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;

    let children = harness
        .expand(harness.node(&NodeFixtures::temperature()))
        .await;

    assert!(children.is_empty());
    assert!(harness.handle.cache().is_fetched(&NodeFixtures::temperature()));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_expand_cache_reset_after_reconnect() {
    let mut harness = EngineHarness::start(ServerFixtures::plant());
    harness.connect(ProfileFixtures::LOCAL).await;
    harness.expand(NodeRef::root()).await;
    let generation = harness.handle.cache().generation();
    assert!(harness.handle.cache().len() > 1);

    harness.server.lose_connection("server restart");
    harness
        .wait_for("connected", |e| matches!(e, EngineEvent::Connected { .. }))
        .await;

    let cache = harness.handle.cache();
    assert!(cache.generation() > generation);
    assert!(cache.is_empty());
    assert!(!cache.is_fetched(&NodeId::ROOT_FOLDER));

    // Browsing works against the new session.
    let children = harness.expand(NodeRef::root()).await;
    assert_eq!(children.len(), 3);
    assert_eq!(harness.server.browse_count(), 2);

    harness.shutdown().await;
}

// =============================================================================
// Cache against a session
// =============================================================================

#[tokio::test]
async fn test_cache_concurrent_expansion_browses_once() {
    let server = ServerFixtures::plant();
    server.set_browse_latency(Duration::from_millis(50));
    let mut layer = SessionLayer::new(Arc::clone(&server), SettingsFixtures::quiet());
    let profiles = ProfileFixtures::profiles();
    let (session, _events) = layer
        .connect(profiles.get(ProfileFixtures::LOCAL).unwrap())
        .await
        .unwrap();

    let cache = AddressSpaceCache::new();
    let root = NodeId::ROOT_FOLDER;
    let (first, second) = tokio::join!(
        cache.get_children(session.as_ref(), &root),
        cache.get_children(session.as_ref(), &root),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(server.browse_count(), 1);
    assert_eq!(cache.stats().browse_requests(), 1);
    assert_eq!(cache.stats().cache_hits(), 1);

    layer.disconnect().await;
}

#[tokio::test]
async fn test_cache_discards_browse_finishing_after_reset() {
    let server = ServerFixtures::plant();
    server.set_browse_latency(Duration::from_millis(100));
    let mut layer = SessionLayer::new(Arc::clone(&server), SettingsFixtures::quiet());
    let profiles = ProfileFixtures::profiles();
    let (session, _events) = layer
        .connect(profiles.get(ProfileFixtures::LOCAL).unwrap())
        .await
        .unwrap();

    let cache = Arc::new(AddressSpaceCache::new());
    let browse = {
        let cache = Arc::clone(&cache);
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            cache
                .get_children(session.as_ref(), &NodeId::ROOT_FOLDER)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.invalidate();

    let err = browse.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(!cache.is_fetched(&NodeId::ROOT_FOLDER));
    assert_eq!(cache.stats().discarded(), 1);

    layer.disconnect().await;
}

#[tokio::test]
async fn test_cache_unknown_node_is_browse_error() {
    let server = ServerFixtures::plant();
    let mut layer = SessionLayer::new(Arc::clone(&server), SettingsFixtures::quiet());
    let profiles = ProfileFixtures::profiles();
    let (session, _events) = layer
        .connect(profiles.get(ProfileFixtures::LOCAL).unwrap())
        .await
        .unwrap();

    let cache = AddressSpaceCache::new();
    let err = cache
        .get_children(session.as_ref(), &NodeId::string(2, "Missing"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Browse);
    assert_eq!(cache.stats().failures(), 1);

    layer.disconnect().await;
}
