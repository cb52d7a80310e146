//! In-memory reference implementation of the store collaborator.
//!
//! Each partition is a single rooted [`DataNode`] tree. Transactions take a
//! snapshot of both partitions at creation (reads are isolated from later
//! commits), buffer their mutations, and apply them atomically at submit.
//! Submit revalidates everything the transaction read against the committed
//! trees and rejects the commit if a conflicting commit landed first, so two
//! racing transactions cannot both act on the same stale observation.
//! Committed changes are dispatched to matching listeners on tasks of the
//! surrounding tokio runtime; without a runtime the commit still applies but
//! listeners are not notified.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::node::DataNode;
use crate::path::{ListenScope, Partition, PathAddress};

use super::error::{Result, StoreError};
use super::event::DataChangeEvent;
use super::traits::{
    DataChangeListener, ListenerRegistration, StoreService, StoreTransactionHandle,
};

#[derive(Clone)]
struct PartitionData {
    configuration: DataNode,
    operational: DataNode,
}

impl PartitionData {
    fn new() -> Self {
        Self {
            configuration: DataNode::container(),
            operational: DataNode::container(),
        }
    }

    fn tree(&self, partition: Partition) -> &DataNode {
        match partition {
            Partition::Configuration => &self.configuration,
            Partition::Operational => &self.operational,
        }
    }

    fn tree_mut(&mut self, partition: Partition) -> &mut DataNode {
        match partition {
            Partition::Configuration => &mut self.configuration,
            Partition::Operational => &mut self.operational,
        }
    }
}

struct ListenerEntry {
    registration_id: u64,
    partition: Partition,
    path: PathAddress,
    scope: ListenScope,
    listener: Arc<dyn DataChangeListener>,
    active: AtomicBool,
}

struct MemoryRegistration {
    entry: Arc<ListenerEntry>,
}

impl ListenerRegistration for MemoryRegistration {
    fn close(&self) {
        self.entry.active.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    data: Mutex<PartitionData>,
    listeners: Mutex<Vec<Arc<ListenerEntry>>>,
    next_registration: AtomicU64,
}

/// Snapshot-isolated in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(PartitionData::new()),
                listeners: Mutex::new(Vec::new()),
                next_registration: AtomicU64::new(1),
            }),
        }
    }

    fn transaction(&self) -> Box<dyn StoreTransactionHandle> {
        let snapshot = self.inner.data.lock().unwrap().clone();
        Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            snapshot,
            ops: Vec::new(),
            reads: Mutex::new(Vec::new()),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreService for MemoryStore {
    fn new_read_only_transaction(&self) -> Box<dyn StoreTransactionHandle> {
        self.transaction()
    }

    fn new_write_only_transaction(&self) -> Box<dyn StoreTransactionHandle> {
        self.transaction()
    }

    fn new_read_write_transaction(&self) -> Box<dyn StoreTransactionHandle> {
        self.transaction()
    }

    fn register_change_listener(
        &self,
        partition: Partition,
        path: &PathAddress,
        scope: ListenScope,
        listener: Arc<dyn DataChangeListener>,
    ) -> Result<Box<dyn ListenerRegistration>> {
        let entry = Arc::new(ListenerEntry {
            registration_id: self.inner.next_registration.fetch_add(1, Ordering::SeqCst),
            partition,
            path: path.clone(),
            scope,
            listener,
            active: AtomicBool::new(true),
        });
        debug!(
            registration = entry.registration_id,
            path = %entry.path,
            "memory store listener registered"
        );
        self.inner.listeners.lock().unwrap().push(Arc::clone(&entry));
        Ok(Box::new(MemoryRegistration { entry }))
    }
}

enum BufferedOp {
    Put {
        partition: Partition,
        path: PathAddress,
        node: DataNode,
    },
    Merge {
        partition: Partition,
        path: PathAddress,
        node: DataNode,
    },
    Delete {
        partition: Partition,
        path: PathAddress,
    },
}

/// What a transaction observed in the committed state. Revalidated at submit
/// so a commit that raced past this transaction invalidates it.
enum ReadObservation {
    Presence {
        partition: Partition,
        path: PathAddress,
        seen: bool,
    },
    Node {
        partition: Partition,
        path: PathAddress,
        seen: Option<DataNode>,
    },
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    snapshot: PartitionData,
    ops: Vec<BufferedOp>,
    reads: Mutex<Vec<ReadObservation>>,
}

impl MemoryTransaction {
    fn record_read(&self, observation: ReadObservation) {
        self.reads.lock().unwrap().push(observation);
    }

    /// First recorded read whose committed value no longer matches what this
    /// transaction saw, if any. Called under the data lock.
    fn first_conflict(&self, data: &PartitionData) -> Option<String> {
        for observation in self.reads.lock().unwrap().iter() {
            match observation {
                ReadObservation::Presence {
                    partition,
                    path,
                    seen,
                } => {
                    if get_at(data.tree(*partition), path.segments()).is_some() != *seen {
                        return Some(format!("concurrent commit changed {}", path));
                    }
                }
                ReadObservation::Node {
                    partition,
                    path,
                    seen,
                } => {
                    if get_at(data.tree(*partition), path.segments()) != seen.as_ref() {
                        return Some(format!("concurrent commit changed {}", path));
                    }
                }
            }
        }
        None
    }

    /// The snapshot with this transaction's own buffered ops applied, so a
    /// read-write transaction observes its own writes.
    fn effective(&self, partition: Partition) -> DataNode {
        let mut tree = self.snapshot.tree(partition).clone();
        for op in &self.ops {
            match op {
                BufferedOp::Put {
                    partition: p,
                    path,
                    node,
                } if *p == partition => set_at(&mut tree, path.segments(), node.clone()),
                BufferedOp::Merge {
                    partition: p,
                    path,
                    node,
                } if *p == partition => merge_at(&mut tree, path.segments(), node.clone()),
                BufferedOp::Delete { partition: p, path } if *p == partition => {
                    remove_at(&mut tree, path.segments());
                }
                _ => {}
            }
        }
        tree
    }
}

#[async_trait]
impl StoreTransactionHandle for MemoryTransaction {
    async fn read(&self, partition: Partition, path: &PathAddress) -> Result<Option<DataNode>> {
        self.record_read(ReadObservation::Node {
            partition,
            path: path.clone(),
            seen: get_at(self.snapshot.tree(partition), path.segments()).cloned(),
        });
        Ok(get_at(&self.effective(partition), path.segments()).cloned())
    }

    async fn exists(&self, partition: Partition, path: &PathAddress) -> Result<bool> {
        self.record_read(ReadObservation::Presence {
            partition,
            path: path.clone(),
            seen: get_at(self.snapshot.tree(partition), path.segments()).is_some(),
        });
        Ok(get_at(&self.effective(partition), path.segments()).is_some())
    }

    async fn put(
        &mut self,
        partition: Partition,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<()> {
        self.ops.push(BufferedOp::Put {
            partition,
            path: path.clone(),
            node,
        });
        Ok(())
    }

    async fn merge(
        &mut self,
        partition: Partition,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<()> {
        self.ops.push(BufferedOp::Merge {
            partition,
            path: path.clone(),
            node,
        });
        Ok(())
    }

    async fn delete(&mut self, partition: Partition, path: &PathAddress) -> Result<()> {
        self.ops.push(BufferedOp::Delete {
            partition,
            path: path.clone(),
        });
        Ok(())
    }

    async fn submit(self: Box<Self>) -> Result<()> {
        let mut events = Vec::with_capacity(self.ops.len());
        {
            let mut data = self.inner.data.lock().unwrap();
            // First committer wins: a commit that changed something this
            // transaction read invalidates it.
            if let Some(conflict) = self.first_conflict(&data) {
                debug!(%conflict, "commit rejected");
                return Err(StoreError::CommitFailed(conflict));
            }
            for op in &self.ops {
                match op {
                    BufferedOp::Put {
                        partition,
                        path,
                        node,
                    } => {
                        let tree = data.tree_mut(*partition);
                        let existed = get_at(tree, path.segments()).is_some();
                        set_at(tree, path.segments(), node.clone());
                        events.push(if existed {
                            DataChangeEvent::Updated {
                                partition: *partition,
                                path: path.clone(),
                                data: node.clone(),
                            }
                        } else {
                            DataChangeEvent::Created {
                                partition: *partition,
                                path: path.clone(),
                                data: node.clone(),
                            }
                        });
                    }
                    BufferedOp::Merge {
                        partition,
                        path,
                        node,
                    } => {
                        let tree = data.tree_mut(*partition);
                        let existed = get_at(tree, path.segments()).is_some();
                        merge_at(tree, path.segments(), node.clone());
                        let merged = get_at(tree, path.segments())
                            .cloned()
                            .unwrap_or_else(DataNode::container);
                        events.push(if existed {
                            DataChangeEvent::Updated {
                                partition: *partition,
                                path: path.clone(),
                                data: merged,
                            }
                        } else {
                            DataChangeEvent::Created {
                                partition: *partition,
                                path: path.clone(),
                                data: merged,
                            }
                        });
                    }
                    BufferedOp::Delete { partition, path } => {
                        let tree = data.tree_mut(*partition);
                        if remove_at(tree, path.segments()) {
                            events.push(DataChangeEvent::Deleted {
                                partition: *partition,
                                path: path.clone(),
                            });
                        }
                    }
                }
            }
        }

        if !events.is_empty() {
            dispatch(&self.inner, events);
        }
        Ok(())
    }
}

/// Fan committed events out to matching listeners on the store's own tasks.
/// Listener dispatch needs a tokio runtime; a commit awaited on another
/// executor still applies, but nobody is notified.
fn dispatch(inner: &Arc<Inner>, events: Vec<DataChangeEvent>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime, data change events not dispatched");
        return;
    };
    let listeners: Vec<Arc<ListenerEntry>> = inner
        .listeners
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.active.load(Ordering::SeqCst))
        .cloned()
        .collect();

    for event in events {
        for entry in &listeners {
            if entry.partition != event.partition()
                || !entry.scope.matches(&entry.path, event.path())
            {
                continue;
            }
            trace!(
                registration = entry.registration_id,
                kind = event.kind(),
                path = %event.path(),
                "dispatching data change event"
            );
            let listener = Arc::clone(&entry.listener);
            let event = event.clone();
            runtime.spawn(async move {
                listener.on_data_change(event).await;
            });
        }
    }
}

// Tree navigation helpers. Intermediate containers are created on write
// (parent structure is ensured by the store, not the caller) and a leaf in
// the way of a deeper write is replaced by a container.

fn get_at<'a>(root: &'a DataNode, segments: &[String]) -> Option<&'a DataNode> {
    let mut current = root;
    for segment in segments {
        current = current.child(segment)?;
    }
    Some(current)
}

fn set_at(root: &mut DataNode, segments: &[String], value: DataNode) {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return;
    };
    if !root.is_container() {
        *root = DataNode::container();
    }
    let DataNode::Container(children) = root else {
        unreachable!()
    };
    let child = children
        .entry(first.clone())
        .or_insert_with(DataNode::container);
    set_at(child, rest, value);
}

fn merge_at(root: &mut DataNode, segments: &[String], value: DataNode) {
    match get_at(root, segments) {
        Some(existing) => {
            let merged = existing.clone().merged_with(value);
            set_at(root, segments, merged);
        }
        None => set_at(root, segments, value),
    }
}

fn remove_at(root: &mut DataNode, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        // Deleting the root resets the partition to an empty container.
        *root = DataNode::container();
        return true;
    };
    let DataNode::Container(children) = root else {
        return false;
    };
    if rest.is_empty() {
        return children.remove(first).is_some();
    }
    match children.get_mut(first) {
        Some(child) => remove_at(child, rest),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ScalarValue;
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};

    fn path(s: &str) -> PathAddress {
        s.parse().unwrap()
    }

    async fn commit_put(store: &MemoryStore, p: &str, node: DataNode) {
        let mut txn = store.new_write_only_transaction();
        txn.put(Partition::Configuration, &path(p), node)
            .await
            .unwrap();
        txn.submit().await.unwrap();
    }

    #[tokio::test]
    async fn put_read_round_trip_with_implicit_parents() {
        let store = MemoryStore::new();
        let node = DataNode::leaf(1500i64);
        commit_put(&store, "/interfaces/eth0/mtu", node.clone()).await;

        let txn = store.new_read_only_transaction();
        assert_eq!(
            txn.read(Partition::Configuration, &path("/interfaces/eth0/mtu"))
                .await
                .unwrap(),
            Some(node)
        );
        // Parent containers came into existence with the write.
        assert!(
            txn.exists(Partition::Configuration, &path("/interfaces"))
                .await
                .unwrap()
        );
        // The other partition is untouched.
        assert!(
            !txn.exists(Partition::Operational, &path("/interfaces"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn snapshot_isolation() {
        let store = MemoryStore::new();
        let before = store.new_read_only_transaction();

        commit_put(&store, "/interfaces", DataNode::container()).await;

        assert!(
            !before
                .exists(Partition::Configuration, &path("/interfaces"))
                .await
                .unwrap()
        );
        let after = store.new_read_only_transaction();
        assert!(
            after
                .exists(Partition::Configuration, &path("/interfaces"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn read_your_own_writes() {
        let store = MemoryStore::new();
        let mut txn = store.new_read_write_transaction();
        assert!(
            !txn.exists(Partition::Configuration, &path("/a"))
                .await
                .unwrap()
        );
        txn.put(Partition::Configuration, &path("/a"), DataNode::leaf(true))
            .await
            .unwrap();
        assert!(
            txn.exists(Partition::Configuration, &path("/a"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn put_replaces_subtree() {
        let store = MemoryStore::new();
        commit_put(
            &store,
            "/interfaces/eth0",
            DataNode::container()
                .with_child("mtu", DataNode::leaf(1500i64))
                .with_child("enabled", DataNode::leaf(true)),
        )
        .await;
        commit_put(
            &store,
            "/interfaces/eth0",
            DataNode::container().with_child("mtu", DataNode::leaf(9000i64)),
        )
        .await;

        let txn = store.new_read_only_transaction();
        let node = txn
            .read(Partition::Configuration, &path("/interfaces/eth0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.child("mtu"), Some(&DataNode::leaf(9000i64)));
        assert_eq!(node.child("enabled"), None);
    }

    #[tokio::test]
    async fn merge_overlays_existing_data() {
        let store = MemoryStore::new();
        commit_put(
            &store,
            "/interfaces/eth0",
            DataNode::container()
                .with_child("mtu", DataNode::leaf(1500i64))
                .with_child("enabled", DataNode::leaf(false)),
        )
        .await;

        let mut txn = store.new_write_only_transaction();
        txn.merge(
            Partition::Configuration,
            &path("/interfaces/eth0"),
            DataNode::container().with_child("enabled", DataNode::leaf(true)),
        )
        .await
        .unwrap();
        txn.submit().await.unwrap();

        let txn = store.new_read_only_transaction();
        let node = txn
            .read(Partition::Configuration, &path("/interfaces/eth0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.child("mtu"), Some(&DataNode::leaf(1500i64)));
        assert_eq!(node.child("enabled"), Some(&DataNode::leaf(true)));
    }

    #[tokio::test]
    async fn delete_removes_subtree() {
        let store = MemoryStore::new();
        commit_put(&store, "/interfaces/eth0/mtu", DataNode::leaf(1500i64)).await;

        let mut txn = store.new_write_only_transaction();
        txn.delete(Partition::Configuration, &path("/interfaces/eth0"))
            .await
            .unwrap();
        txn.submit().await.unwrap();

        let txn = store.new_read_only_transaction();
        assert!(
            !txn.exists(Partition::Configuration, &path("/interfaces/eth0/mtu"))
                .await
                .unwrap()
        );
        assert!(
            txn.exists(Partition::Configuration, &path("/interfaces"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn racing_creates_reject_the_second_committer() {
        let store = MemoryStore::new();
        let p = path("/interfaces");

        let mut first = store.new_read_write_transaction();
        let mut second = store.new_read_write_transaction();
        assert!(!first.exists(Partition::Configuration, &p).await.unwrap());
        assert!(!second.exists(Partition::Configuration, &p).await.unwrap());

        first
            .put(Partition::Configuration, &p, DataNode::leaf(1i64))
            .await
            .unwrap();
        second
            .put(Partition::Configuration, &p, DataNode::leaf(2i64))
            .await
            .unwrap();

        first.submit().await.unwrap();
        let err = second
            .submit()
            .await
            .err()
            .expect("second committer must be rejected");
        assert!(matches!(err, StoreError::CommitFailed(_)));

        // The first commit stands.
        let txn = store.new_read_only_transaction();
        assert_eq!(
            txn.read(Partition::Configuration, &p).await.unwrap(),
            Some(DataNode::leaf(1i64))
        );
    }

    #[tokio::test]
    async fn commits_to_unrelated_paths_do_not_conflict() {
        let store = MemoryStore::new();

        let mut a = store.new_read_write_transaction();
        let mut b = store.new_read_write_transaction();
        assert!(
            !a.exists(Partition::Configuration, &path("/a"))
                .await
                .unwrap()
        );
        assert!(
            !b.exists(Partition::Configuration, &path("/b"))
                .await
                .unwrap()
        );

        a.put(Partition::Configuration, &path("/a"), DataNode::leaf(1i64))
            .await
            .unwrap();
        b.put(Partition::Configuration, &path("/b"), DataNode::leaf(2i64))
            .await
            .unwrap();

        a.submit().await.unwrap();
        b.submit().await.unwrap();
    }

    #[tokio::test]
    async fn stale_delete_is_rejected_after_concurrent_removal() {
        let store = MemoryStore::new();
        let p = path("/interfaces/eth0");
        commit_put(&store, "/interfaces/eth0", DataNode::container()).await;

        let mut first = store.new_read_write_transaction();
        let mut second = store.new_read_write_transaction();
        assert!(first.exists(Partition::Configuration, &p).await.unwrap());
        assert!(second.exists(Partition::Configuration, &p).await.unwrap());

        first.delete(Partition::Configuration, &p).await.unwrap();
        second.delete(Partition::Configuration, &p).await.unwrap();

        first.submit().await.unwrap();
        assert!(matches!(
            second.submit().await,
            Err(StoreError::CommitFailed(_))
        ));
    }

    #[tokio::test]
    async fn dropped_transaction_applies_nothing() {
        let store = MemoryStore::new();
        let mut txn = store.new_write_only_transaction();
        txn.put(Partition::Configuration, &path("/a"), DataNode::leaf(1i64))
            .await
            .unwrap();
        drop(txn);

        let txn = store.new_read_only_transaction();
        assert!(
            !txn.exists(Partition::Configuration, &path("/a"))
                .await
                .unwrap()
        );
    }

    struct ChannelListener {
        id: String,
        path: PathAddress,
        tx: mpsc::UnboundedSender<DataChangeEvent>,
    }

    #[async_trait]
    impl DataChangeListener for ChannelListener {
        fn id(&self) -> &str {
            &self.id
        }

        fn path(&self) -> &PathAddress {
            &self.path
        }

        async fn on_data_change(&self, event: DataChangeEvent) {
            let _ = self.tx.send(event);
        }
    }

    #[tokio::test]
    async fn committed_changes_reach_subtree_listeners() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener {
            id: "stream-1".into(),
            path: path("/interfaces"),
            tx,
        });
        let registration = store
            .register_change_listener(
                Partition::Configuration,
                &path("/interfaces"),
                ListenScope::Subtree,
                listener,
            )
            .unwrap();

        commit_put(&store, "/interfaces/eth0", DataNode::container()).await;

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("listener notified")
            .unwrap();
        assert_eq!(event.path(), &path("/interfaces/eth0"));
        assert_eq!(event.kind(), "created");

        // Closed registrations are silent.
        registration.close();
        commit_put(&store, "/interfaces/eth1", DataNode::container()).await;
        assert!(
            timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
            "closed registration must not receive events"
        );
    }

    #[tokio::test]
    async fn base_scope_ignores_descendants() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener {
            id: "stream-base".into(),
            path: path("/interfaces"),
            tx,
        });
        store
            .register_change_listener(
                Partition::Configuration,
                &path("/interfaces"),
                ListenScope::Base,
                listener,
            )
            .unwrap();

        commit_put(&store, "/interfaces/eth0", DataNode::container()).await;
        assert!(
            timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
            "base scope must not see child changes"
        );

        commit_put(
            &store,
            "/interfaces",
            DataNode::container().with_child("count", DataNode::leaf(ScalarValue::Int(2))),
        )
        .await;
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("listener notified")
            .unwrap();
        assert_eq!(event.path(), &path("/interfaces"));
    }

    #[test]
    fn commit_without_tokio_runtime_applies_but_skips_dispatch() {
        let store = MemoryStore::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        store
            .register_change_listener(
                Partition::Configuration,
                &path("/interfaces"),
                ListenScope::Subtree,
                Arc::new(ChannelListener {
                    id: "stream-1".into(),
                    path: path("/interfaces"),
                    tx,
                }),
            )
            .unwrap();

        futures::executor::block_on(async {
            let mut txn = store.new_write_only_transaction();
            txn.put(
                Partition::Configuration,
                &path("/interfaces/eth0"),
                DataNode::container(),
            )
            .await
            .unwrap();
            txn.submit().await.unwrap();

            let txn = store.new_read_only_transaction();
            assert!(
                txn.exists(Partition::Configuration, &path("/interfaces/eth0"))
                    .await
                    .unwrap()
            );
        });
    }
}
