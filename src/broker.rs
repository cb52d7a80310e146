//! The broker facade: the single entry point for protocol front-ends.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StructuredError;
use crate::gate::{self, GateDecision, WriteIntent};
use crate::listeners::{ChangeListenerRegistry, Subscription, SubscriptionKey};
use crate::node::DataNode;
use crate::path::{ListenScope, Partition, PathAddress};
use crate::rpc::{OperationId, RpcDispatcher, RpcResult};
use crate::store::{DataChangeListener, RpcService, SessionContext, StoreError, StoreService};
use crate::txn::{CommitResult, StoreTransaction, TransactionKind};

/// Transactional broker between protocol front-ends and the data store.
///
/// Collaborators are explicit constructor arguments; an absent collaborator
/// is an explicit `None`, and operations that need it fail with a structured
/// error rather than a raw fault. Every operation opens exactly one
/// transaction and terminates it (submitted or aborted) before returning.
pub struct DataBroker {
    store: Option<Arc<dyn StoreService>>,
    dispatcher: RpcDispatcher,
    registry: ChangeListenerRegistry,
}

impl DataBroker {
    pub fn new(
        store: Option<Arc<dyn StoreService>>,
        rpc: Option<Arc<dyn RpcService>>,
        session: Option<Arc<dyn SessionContext>>,
    ) -> Self {
        Self {
            store,
            dispatcher: RpcDispatcher::new(rpc, session),
            registry: ChangeListenerRegistry::new(),
        }
    }

    fn store(&self) -> Result<&Arc<dyn StoreService>, StructuredError> {
        self.store.as_ref().ok_or_else(|| {
            warn!("operation rejected: store service not configured");
            StructuredError::resource_unavailable("store service not configured")
        })
    }

    async fn read(
        &self,
        partition: Partition,
        path: &PathAddress,
    ) -> Result<Option<DataNode>, StructuredError> {
        let store = self.store()?;
        let txn = StoreTransaction::new(
            store.new_read_only_transaction(),
            TransactionKind::ReadOnly,
        );
        debug!(txn = %txn.id(), %partition, %path, "read");
        txn.read(partition, path)
            .await
            .map_err(|err| map_store_error("read failed", err))
    }

    /// Read desired state at `path`.
    pub async fn read_configuration_data(
        &self,
        path: &PathAddress,
    ) -> Result<Option<DataNode>, StructuredError> {
        self.read(Partition::Configuration, path).await
    }

    /// Read observed state at `path`.
    pub async fn read_operational_data(
        &self,
        path: &PathAddress,
    ) -> Result<Option<DataNode>, StructuredError> {
        self.read(Partition::Operational, path).await
    }

    /// Invoke an RPC operation. The dispatcher's preconditions are checked
    /// up front; the collaborator's future is then awaited as-is.
    pub async fn invoke_rpc(
        &self,
        operation: &OperationId,
        input: DataNode,
    ) -> Result<RpcResult, StructuredError> {
        let future = self.dispatcher.dispatch(operation, input)?;
        future.await
    }

    /// Unconditional replace (PUT): put then submit, no existence check.
    pub async fn commit_configuration_data_put(
        &self,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<CommitResult, StructuredError> {
        let store = self.store()?;
        let mut txn = StoreTransaction::new(
            store.new_write_only_transaction(),
            TransactionKind::WriteOnly,
        );
        debug!(txn = %txn.id(), %path, "put");
        txn.put(Partition::Configuration, path, node)
            .await
            .map_err(|err| map_store_error("put failed", err))?;
        txn.submit()
            .await
            .map_err(|err| map_store_error("commit failed", err))?;
        Ok(CommitResult { path: path.clone() })
    }

    /// Merge overlay (PATCH-style): merge then submit, no existence check.
    pub async fn commit_configuration_data_merge(
        &self,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<CommitResult, StructuredError> {
        let store = self.store()?;
        let mut txn = StoreTransaction::new(
            store.new_write_only_transaction(),
            TransactionKind::WriteOnly,
        );
        debug!(txn = %txn.id(), %path, "merge");
        txn.merge(Partition::Configuration, path, node)
            .await
            .map_err(|err| map_store_error("merge failed", err))?;
        txn.submit()
            .await
            .map_err(|err| map_store_error("commit failed", err))?;
        Ok(CommitResult { path: path.clone() })
    }

    /// Create-only write (POST): exists, then put, then submit, in that
    /// order. Fails with `data-exists` and aborts without submitting if the
    /// path is already present.
    pub async fn commit_configuration_data_post(
        &self,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<CommitResult, StructuredError> {
        let store = self.store()?;
        let mut txn = StoreTransaction::new(
            store.new_read_write_transaction(),
            TransactionKind::ReadWrite,
        );
        debug!(txn = %txn.id(), %path, "post");

        let exists = txn
            .exists(Partition::Configuration, path)
            .await
            .map_err(|err| map_store_error("existence check failed", err))?;
        match gate::evaluate(WriteIntent::Create, exists, path) {
            GateDecision::Proceed => {}
            GateDecision::Reject(err) => {
                debug!(%path, "post rejected: data already exists");
                txn.abort();
                return Err(err);
            }
        }

        txn.put(Partition::Configuration, path, node)
            .await
            .map_err(|err| map_store_error("put failed", err))?;
        txn.submit()
            .await
            .map_err(|err| map_store_error("commit failed", err))?;
        Ok(CommitResult { path: path.clone() })
    }

    /// Existence-gated delete: exists, then delete, then submit. Fails with
    /// `data-missing` and aborts without submitting if nothing is there.
    pub async fn commit_configuration_data_delete(
        &self,
        path: &PathAddress,
    ) -> Result<CommitResult, StructuredError> {
        let store = self.store()?;
        let mut txn = StoreTransaction::new(
            store.new_read_write_transaction(),
            TransactionKind::ReadWrite,
        );
        debug!(txn = %txn.id(), %path, "delete");

        let exists = txn
            .exists(Partition::Configuration, path)
            .await
            .map_err(|err| map_store_error("existence check failed", err))?;
        match gate::evaluate(WriteIntent::Delete, exists, path) {
            GateDecision::Proceed => {}
            GateDecision::Reject(err) => {
                debug!(%path, "delete rejected: no data");
                txn.abort();
                return Err(err);
            }
        }

        txn.delete(Partition::Configuration, path)
            .await
            .map_err(|err| map_store_error("delete failed", err))?;
        txn.submit()
            .await
            .map_err(|err| map_store_error("commit failed", err))?;
        Ok(CommitResult { path: path.clone() })
    }

    /// Subscribe `listener` to data changes at its path. Idempotent per
    /// (partition, path, scope, listener id).
    pub fn register_data_change_listener(
        &self,
        partition: Partition,
        scope: ListenScope,
        listener: Arc<dyn DataChangeListener>,
    ) -> Result<Arc<Subscription>, StructuredError> {
        let store = self.store()?;
        self.registry
            .register(store.as_ref(), partition, scope, listener)
            .map_err(|err| map_store_error("listener registration failed", err))
    }

    /// Drop a subscription and close its store-side registration.
    pub fn unregister_data_change_listener(&self, key: &SubscriptionKey) -> bool {
        self.registry.unregister(key)
    }
}

/// Wrap a collaborator fault, preserving its message. Raw store errors never
/// cross the facade boundary.
fn map_store_error(context: &str, err: StoreError) -> StructuredError {
    warn!(error = %err, "{context}");
    StructuredError::operation_failed(context, err)
}
