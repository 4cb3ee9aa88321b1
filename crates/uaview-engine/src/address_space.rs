// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Lazily populated projection of the server's address space.
//!
//! The cache is a flat map from node id to [`NodeRecord`] with explicit
//! parent links. Nothing is fetched until a node is expanded, and each
//! expansion browses exactly one level. The server graph may contain cycles
//! and nodes reachable through several parents; the projection keeps the
//! first record created for a node and never recurses, so neither case can
//! loop.
//!
//! ```text
//! get_children(n)
//!   ├── Fetched?      → cached ids, no I/O
//!   └── Unfetched     → per-node gate
//!                        ├── re-check (a concurrent caller may have filled it)
//!                        ├── one Browse
//!                        ├── generation changed? → Cancelled, discard
//!                        └── insert children, mark n Fetched
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::client::session::Session;
use crate::client::transport::{ReferenceDescription, UaTransport};
use crate::error::{BrowseError, UaError, UaResult};
use crate::types::{NodeId, NodeRef};

// =============================================================================
// NodeBrowser
// =============================================================================

/// Source of one-level browse results.
#[async_trait]
pub trait NodeBrowser: Send + Sync {
    /// Returns forward hierarchical references of `node_id` in server order.
    async fn browse_children(&self, node_id: &NodeId) -> UaResult<Vec<ReferenceDescription>>;
}

#[async_trait]
impl<T: UaTransport> NodeBrowser for Session<T> {
    async fn browse_children(&self, node_id: &NodeId) -> UaResult<Vec<ReferenceDescription>> {
        match self.browse(node_id).await {
            Ok(refs) => Ok(refs.into_iter().filter(|r| r.is_forward).collect()),
            Err(UaError::Browse(e)) => Err(UaError::Browse(e)),
            Err(e) => Err(UaError::browse(BrowseError::Failed {
                node_id: node_id.to_string(),
                message: e.to_string(),
                status: e.status_code(),
            })),
        }
    }
}

// =============================================================================
// NodeRecord
// =============================================================================

/// Whether a node's children have been browsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildState {
    /// Never browsed.
    Unfetched,
    /// Browsed; child ids in server order (possibly empty).
    Fetched(Vec<NodeId>),
}

/// One cached tree entry.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// The node.
    pub node: NodeRef,
    /// Parent in the projection; `None` for roots.
    pub parent: Option<NodeId>,
    /// Children state.
    pub children: ChildState,
}

impl NodeRecord {
    fn new(node: NodeRef, parent: Option<NodeId>) -> Self {
        Self {
            node,
            parent,
            children: ChildState::Unfetched,
        }
    }

    /// Returns `true` once the children have been browsed.
    pub fn is_fetched(&self) -> bool {
        matches!(self.children, ChildState::Fetched(_))
    }
}

// =============================================================================
// AddressSpaceCache
// =============================================================================

/// Incrementally populated tree cache.
///
/// Shared between the engine and its browse tasks behind an `Arc`.
#[derive(Debug)]
pub struct AddressSpaceCache {
    records: RwLock<HashMap<NodeId, NodeRecord>>,
    gates: Gates,
    generation: AtomicU64,
    stats: BrowseStatistics,
}

impl Default for AddressSpaceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaceCache {
    /// Creates a cache seeded with the RootFolder.
    pub fn new() -> Self {
        let cache = Self {
            records: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            stats: BrowseStatistics::default(),
        };
        cache.seed_root();
        cache
    }

    /// Returns the root node.
    pub fn root(&self) -> NodeRef {
        NodeRef::root()
    }

    /// Returns the children of `node_id`, browsing once if needed.
    ///
    /// Concurrent calls for the same unfetched node issue a single browse;
    /// later callers observe the cached result. On failure the node stays
    /// unfetched. A result that arrives after [`invalidate`](Self::invalidate)
    /// is discarded with [`BrowseError::Cancelled`].
    pub async fn get_children<B>(&self, browser: &B, node_id: &NodeId) -> UaResult<Vec<NodeRef>>
    where
        B: NodeBrowser + ?Sized,
    {
        if let Some(children) = self.cached_children(node_id) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(children);
        }

        let gate = GateEntry::acquire(&self.gates, node_id);
        let _guard = gate.lock().await;

        if let Some(children) = self.cached_children(node_id) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(children);
        }

        let generation = self.generation.load(Ordering::Acquire);
        self.stats.browse_requests.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(node = %node_id, "Browsing");

        let refs = match browser.browse_children(node_id).await {
            Ok(refs) => refs,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let children = self.insert_children(node_id, refs, generation)?;
        self.stats
            .nodes_discovered
            .fetch_add(children.len() as u64, Ordering::Relaxed);

        tracing::debug!(node = %node_id, children = children.len(), "Browse complete");
        Ok(children)
    }

    /// Returns cached children without I/O, or `None` if unfetched.
    pub fn cached_children(&self, node_id: &NodeId) -> Option<Vec<NodeRef>> {
        let records = self.records.read();
        match &records.get(node_id)?.children {
            ChildState::Unfetched => None,
            ChildState::Fetched(ids) => Some(
                ids.iter()
                    .filter_map(|id| records.get(id).map(|r| r.node.clone()))
                    .collect(),
            ),
        }
    }

    /// Clears every record and reseeds the root.
    ///
    /// Browses in flight at the time of the call are discarded on completion.
    pub fn invalidate(&self) {
        {
            let mut records = self.records.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
            records.clear();
            let root = NodeRef::root();
            records.insert(root.node_id.clone(), NodeRecord::new(root, None));
        }
        self.gates.lock().clear();
        tracing::debug!(
            generation = self.generation.load(Ordering::Relaxed),
            "Address space cache reset"
        );
    }

    /// Returns a copy of the record for `node_id`.
    pub fn record(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.records.read().get(node_id).cloned()
    }

    /// Returns the cached node for `node_id`.
    pub fn node(&self, node_id: &NodeId) -> Option<NodeRef> {
        self.records.read().get(node_id).map(|r| r.node.clone())
    }

    /// Returns the parent of `node_id` in the projection.
    pub fn parent(&self, node_id: &NodeId) -> Option<NodeId> {
        self.records.read().get(node_id)?.parent.clone()
    }

    /// Returns `true` if the children of `node_id` are cached.
    pub fn is_fetched(&self, node_id: &NodeId) -> bool {
        self.records
            .read()
            .get(node_id)
            .is_some_and(NodeRecord::is_fetched)
    }

    /// Returns the breadcrumb from a root down to `node_id`.
    ///
    /// Empty if the node is not cached.
    pub fn path_to(&self, node_id: &NodeId) -> Vec<NodeRef> {
        let records = self.records.read();
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(node_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let Some(record) = records.get(id) else {
                break;
            };
            path.push(record.node.clone());
            current = record.parent.as_ref();
        }

        path.reverse();
        path
    }

    /// Returns the number of cached records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if only the root is cached.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Returns the current reset generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns browse statistics.
    pub fn stats(&self) -> &BrowseStatistics {
        &self.stats
    }

    fn seed_root(&self) {
        let root = NodeRef::root();
        self.records
            .write()
            .insert(root.node_id.clone(), NodeRecord::new(root, None));
    }

    /// Inserts one browse level, unless the cache was reset since `generation`.
    ///
    /// The generation is checked under the records lock, so a concurrent
    /// [`invalidate`](Self::invalidate) either clears the inserted level or
    /// makes this call fail with [`BrowseError::Cancelled`].
    fn insert_children(
        &self,
        parent: &NodeId,
        refs: Vec<ReferenceDescription>,
        generation: u64,
    ) -> UaResult<Vec<NodeRef>> {
        let mut records = self.records.write();
        if self.generation.load(Ordering::Acquire) != generation {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(node = %parent, "Discarding browse result from before reset");
            return Err(BrowseError::cancelled(parent).into());
        }
        let mut seen = HashSet::with_capacity(refs.len());
        let mut ids = Vec::with_capacity(refs.len());
        let mut children = Vec::with_capacity(refs.len());

        for reference in refs {
            if !seen.insert(reference.node_id.clone()) {
                continue;
            }

            let display_name = if reference.display_name.text.is_empty() {
                reference.browse_name.name.clone()
            } else {
                reference.display_name.text
            };
            let node = NodeRef::new(
                reference.node_id.clone(),
                reference.node_class,
                display_name,
                reference.browse_name,
            );

            let record = records
                .entry(reference.node_id.clone())
                .or_insert_with(|| NodeRecord::new(node, Some(parent.clone())));
            children.push(record.node.clone());
            ids.push(reference.node_id);
        }

        records
            .entry(parent.clone())
            .or_insert_with(|| NodeRecord::new(NodeRef::from_id(parent.clone()), None))
            .children = ChildState::Fetched(ids);

        Ok(children)
    }
}

type Gates = Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>;

/// Per-node browse gate, removed from the map when its last user leaves.
///
/// Dropping runs on every exit path, including a browse future that is
/// aborted mid-flight.
struct GateEntry<'a> {
    gates: &'a Gates,
    node_id: &'a NodeId,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> GateEntry<'a> {
    fn acquire(gates: &'a Gates, node_id: &'a NodeId) -> Self {
        let gate = Arc::clone(gates.lock().entry(node_id.clone()).or_default());
        Self {
            gates,
            node_id,
            gate,
        }
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Drop for GateEntry<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        // The map and this entry; anything more is a waiter still queued.
        let last_user = gates
            .get(self.node_id)
            .is_some_and(|g| Arc::ptr_eq(g, &self.gate) && Arc::strong_count(g) <= 2);
        if last_user {
            gates.remove(self.node_id);
        }
    }
}

// =============================================================================
// BrowseStatistics
// =============================================================================

/// Browse counters.
#[derive(Debug, Default)]
pub struct BrowseStatistics {
    browse_requests: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
    discarded: AtomicU64,
    nodes_discovered: AtomicU64,
}

impl BrowseStatistics {
    /// Browse requests issued to the server.
    pub fn browse_requests(&self) -> u64 {
        self.browse_requests.load(Ordering::Relaxed)
    }

    /// Calls answered from the cache.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Failed browse requests.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Results discarded after a reset.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Child nodes inserted.
    pub fn nodes_discovered(&self) -> u64 {
        self.nodes_discovered.load(Ordering::Relaxed)
    }

    /// Returns the fraction of calls answered from the cache.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits() as f64;
        let total = hits + self.browse_requests() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocalizedText, NodeClass, QualifiedName, StatusCode};
    use std::sync::atomic::AtomicUsize;

    struct FakeBrowser {
        children: HashMap<NodeId, Vec<NodeId>>,
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        hang: std::sync::atomic::AtomicBool,
    }

    impl FakeBrowser {
        fn new(edges: &[(NodeId, Vec<NodeId>)]) -> Self {
            Self {
                children: edges.iter().cloned().collect(),
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                hang: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    fn reference(id: &NodeId) -> ReferenceDescription {
        ReferenceDescription {
            node_id: id.clone(),
            browse_name: QualifiedName::new(1, id.to_string()),
            display_name: LocalizedText::new(format!("node {id}")),
            node_class: NodeClass::Object,
            reference_type: NodeId::numeric(0, 35),
            type_definition: None,
            is_forward: true,
        }
    }

    #[async_trait]
    impl NodeBrowser for FakeBrowser {
        async fn browse_children(
            &self,
            node_id: &NodeId,
        ) -> UaResult<Vec<ReferenceDescription>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(BrowseError::bad_status(node_id, StatusCode::BAD_TIMEOUT).into());
            }
            Ok(self
                .children
                .get(node_id)
                .map(|ids| ids.iter().map(reference).collect())
                .unwrap_or_default())
        }
    }

    fn n(id: u32) -> NodeId {
        NodeId::numeric(1, id)
    }

    #[tokio::test]
    async fn test_second_call_is_cached() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1), n(2)])]);
        let cache = AddressSpaceCache::new();

        let first = cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap();
        let second = cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().cache_hits(), 1);
        assert_eq!(cache.parent(&n(1)), Some(NodeId::ROOT_FOLDER));
        assert!(!cache.is_fetched(&n(1)));
    }

    #[tokio::test]
    async fn test_empty_fetch_differs_from_unfetched() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1)])]);
        let cache = AddressSpaceCache::new();

        cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap();
        assert_eq!(cache.cached_children(&n(1)), None);

        let leaf = cache.get_children(&browser, &n(1)).await.unwrap();
        assert!(leaf.is_empty());
        assert_eq!(cache.cached_children(&n(1)), Some(vec![]));
    }

    #[tokio::test]
    async fn test_failure_leaves_node_unfetched() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1)])]);
        browser.fail.store(true, Ordering::SeqCst);
        let cache = AddressSpaceCache::new();

        let err = cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap_err();
        assert!(matches!(err, UaError::Browse(BrowseError::Failed { .. })));
        assert!(!cache.is_fetched(&NodeId::ROOT_FOLDER));

        browser.fail.store(false, Ordering::SeqCst);
        let children = cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicates_and_cycles() {
        let browser = FakeBrowser::new(&[
            (NodeId::ROOT_FOLDER, vec![n(1), n(2), n(1)]),
            (n(1), vec![n(2), NodeId::ROOT_FOLDER]),
        ]);
        let cache = AddressSpaceCache::new();

        let root_children = cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap();
        let ids: Vec<_> = root_children.iter().map(|c| c.node_id.clone()).collect();
        assert_eq!(ids, vec![n(1), n(2)]);

        let children = cache.get_children(&browser, &n(1)).await.unwrap();
        assert_eq!(children.len(), 2);
        // Existing records keep their first parent.
        assert_eq!(cache.parent(&n(2)), Some(NodeId::ROOT_FOLDER));
        assert_eq!(cache.parent(&NodeId::ROOT_FOLDER), None);

        let path = cache.path_to(&n(1));
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].node_id, NodeId::ROOT_FOLDER);
    }

    #[tokio::test]
    async fn test_invalidate_reseeds_root() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1)])]);
        let cache = AddressSpaceCache::new();
        cache.get_children(&browser, &NodeId::ROOT_FOLDER).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate();
        assert_eq!(cache.len(), 1);
        assert!(cache.record(&NodeId::ROOT_FOLDER).is_some());
        assert!(!cache.is_fetched(&NodeId::ROOT_FOLDER));
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_browse() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1), n(2)])]);
        let cache = AddressSpaceCache::new();
        let root = NodeId::ROOT_FOLDER;

        let (a, b) = tokio::join!(
            cache.get_children(&browser, &root),
            cache.get_children(&browser, &root),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_after_reset_is_discarded() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1)])]);
        let cache = AddressSpaceCache::new();
        let root = NodeId::ROOT_FOLDER;

        let (result, ()) = tokio::join!(
            cache.get_children(&browser, &root),
            async { cache.invalidate() },
        );

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!cache.is_fetched(&NodeId::ROOT_FOLDER));
        assert_eq!(cache.stats().discarded(), 1);
    }

    #[test]
    fn test_insert_after_reset_is_refused() {
        let cache = AddressSpaceCache::new();
        let generation = cache.generation();
        cache.invalidate();

        let err = cache
            .insert_children(&NodeId::ROOT_FOLDER, vec![reference(&n(1))], generation)
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_fetched(&NodeId::ROOT_FOLDER));
        assert!(cache.record(&n(1)).is_none());
        assert_eq!(cache.stats().discarded(), 1);
    }

    #[tokio::test]
    async fn test_gate_released_on_failure_and_abort() {
        let browser = FakeBrowser::new(&[(NodeId::ROOT_FOLDER, vec![n(1)])]);
        let cache = AddressSpaceCache::new();
        let root = NodeId::ROOT_FOLDER;

        browser.fail.store(true, Ordering::SeqCst);
        assert!(cache.get_children(&browser, &root).await.is_err());
        assert!(cache.gates.lock().is_empty());

        browser.fail.store(false, Ordering::SeqCst);
        browser.hang.store(true, Ordering::SeqCst);
        tokio::select! {
            biased;
            _ = cache.get_children(&browser, &root) => panic!("hung browse completed"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(cache.gates.lock().is_empty());

        browser.hang.store(false, Ordering::SeqCst);
        assert_eq!(cache.get_children(&browser, &root).await.unwrap().len(), 1);
        assert!(cache.gates.lock().is_empty());
    }

    #[test]
    fn test_path_to_unknown_node() {
        let cache = AddressSpaceCache::new();
        assert!(cache.path_to(&n(99)).is_empty());
        assert_eq!(cache.path_to(&NodeId::ROOT_FOLDER).len(), 1);
    }
}
