//! Collaborator trait definitions.
//!
//! These traits abstract the underlying store engine, the RPC execution
//! service and the access-control session, allowing the broker to orchestrate
//! transactions without knowing how any of them are implemented.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::StructuredError;
use crate::node::DataNode;
use crate::path::{ListenScope, Partition, PathAddress};
use crate::rpc::{OperationId, RpcResult};

use super::error::Result;
use super::event::DataChangeEvent;

/// A raw transaction handle produced by the store collaborator.
///
/// Mutations are buffered until [`submit`](Self::submit); the store owns
/// isolation (snapshot/MVCC at minimum) and the atomicity of submit. Access
/// mode and lifecycle are not enforced here; that is the job of
/// [`StoreTransaction`](crate::txn::StoreTransaction).
#[async_trait]
pub trait StoreTransactionHandle: Send + Sync {
    /// Read the node at `path`, if present.
    async fn read(&self, partition: Partition, path: &PathAddress) -> Result<Option<DataNode>>;

    /// Whether any data exists at `path`.
    async fn exists(&self, partition: Partition, path: &PathAddress) -> Result<bool>;

    /// Buffer a replace of the subtree at `path`.
    async fn put(&mut self, partition: Partition, path: &PathAddress, node: DataNode) -> Result<()>;

    /// Buffer a merge of `node` onto the subtree at `path`.
    async fn merge(
        &mut self,
        partition: Partition,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<()>;

    /// Buffer a removal of the subtree at `path`.
    async fn delete(&mut self, partition: Partition, path: &PathAddress) -> Result<()>;

    /// Atomically apply all buffered mutations. Consumes the handle.
    async fn submit(self: Box<Self>) -> Result<()>;
}

/// The store collaborator: hands out transactions and accepts change
/// listener registrations.
pub trait StoreService: Send + Sync {
    fn new_read_only_transaction(&self) -> Box<dyn StoreTransactionHandle>;

    fn new_write_only_transaction(&self) -> Box<dyn StoreTransactionHandle>;

    fn new_read_write_transaction(&self) -> Box<dyn StoreTransactionHandle>;

    /// Register a change listener for `path` at `scope`. Returns the handle
    /// that keeps the registration alive until closed.
    fn register_change_listener(
        &self,
        partition: Partition,
        path: &PathAddress,
        scope: ListenScope,
        listener: std::sync::Arc<dyn DataChangeListener>,
    ) -> Result<Box<dyn ListenerRegistration>>;
}

/// Receiver of data-change notifications.
///
/// Identity is an explicit value, not object identity: two listeners with the
/// same `id()` registered at the same (path, scope) are the same subscription.
#[async_trait]
pub trait DataChangeListener: Send + Sync {
    /// Stable identity of this listener.
    fn id(&self) -> &str;

    /// The path this listener is interested in.
    fn path(&self) -> &PathAddress;

    async fn on_data_change(&self, event: DataChangeEvent);
}

/// Live store-side registration; dropping without closing leaks nothing but
/// keeps the registration active, so the registry closes explicitly.
pub trait ListenerRegistration: Send + Sync {
    fn close(&self);
}

/// The RPC execution collaborator.
///
/// Returns its future directly so the broker can pass it through without
/// buffering or reordering. RPC handlers speak [`StructuredError`] natively.
pub trait RpcService: Send + Sync {
    fn invoke_rpc(
        &self,
        operation: &OperationId,
        input: DataNode,
    ) -> BoxFuture<'static, std::result::Result<RpcResult, StructuredError>>;
}

/// Access-control session context. At this layer only presence matters;
/// the id is carried for diagnostics.
pub trait SessionContext: Send + Sync {
    fn session_id(&self) -> &str;
}
