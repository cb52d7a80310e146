//! Transaction wrapper enforcing access mode and lifecycle.
//!
//! The store collaborator hands out raw handles; this wrapper pins down the
//! contract the broker relies on:
//!
//! - read is illegal on write-only transactions; exists/put/delete are
//!   illegal on read-only transactions. These are programming errors, not
//!   runtime data errors, and fail fast by panicking.
//! - phases move `Open -> Checked -> { Mutated -> Submitted | Rejected }`;
//!   on a read-write transaction a mutation before the existence check is
//!   refused, which is what makes the exists-then-branch ordering of the
//!   gated operations a property of the type rather than of test mocks.
//! - submit consumes the transaction, so it runs at most once.
//! - dropping an unsubmitted transaction cancels it: the phase becomes
//!   `Failed(Cancelled)` and buffered mutations are discarded.

use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use crate::node::DataNode;
use crate::path::{Partition, PathAddress};
use crate::store::{Result, StoreTransactionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl TransactionKind {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::ReadOnly => "read-only",
            TransactionKind::WriteOnly => "write-only",
            TransactionKind::ReadWrite => "read-write",
        }
    }
}

/// Why a transaction ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Dropped before submit completed.
    Cancelled,
    /// The store rejected the commit.
    CommitRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Open,
    /// The existence check ran and its result was observed.
    Checked,
    /// A mutation was buffered.
    Mutated,
    /// Terminal: submit succeeded.
    Submitted,
    /// Terminal: aborted deliberately (existence gate said no).
    Rejected,
    /// Terminal: cancelled or refused by the store.
    Failed(FailureReason),
}

/// A single-use transaction against one partition's store.
pub struct StoreTransaction {
    handle: Option<Box<dyn StoreTransactionHandle>>,
    kind: TransactionKind,
    phase: Arc<Mutex<TransactionPhase>>,
    id: Uuid,
}

impl StoreTransaction {
    pub fn new(handle: Box<dyn StoreTransactionHandle>, kind: TransactionKind) -> Self {
        let id = Uuid::new_v4();
        debug!(txn = %id, kind = kind.as_str(), "transaction opened");
        Self {
            handle: Some(handle),
            kind,
            phase: Arc::new(Mutex::new(TransactionPhase::Open)),
            id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn phase(&self) -> TransactionPhase {
        *self.phase.lock().unwrap()
    }

    /// Shared view of the phase that outlives the transaction. The caller
    /// holding one can observe the terminal state after cancellation.
    pub fn phase_probe(&self) -> Arc<Mutex<TransactionPhase>> {
        Arc::clone(&self.phase)
    }

    fn set_phase(&self, phase: TransactionPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    fn handle(&self) -> &dyn StoreTransactionHandle {
        self.handle
            .as_deref()
            .expect("transaction handle present until terminal")
    }

    fn handle_mut(&mut self) -> &mut dyn StoreTransactionHandle {
        self.handle
            .as_deref_mut()
            .expect("transaction handle present until terminal")
    }

    pub async fn read(&self, partition: Partition, path: &PathAddress) -> Result<Option<DataNode>> {
        if self.kind == TransactionKind::WriteOnly {
            panic!("contract violation: read() on a write-only transaction");
        }
        self.handle().read(partition, path).await
    }

    /// Run the existence check. Only meaningful on a read-write transaction:
    /// the result gates the mutation that follows.
    pub async fn exists(&self, partition: Partition, path: &PathAddress) -> Result<bool> {
        if self.kind != TransactionKind::ReadWrite {
            panic!(
                "contract violation: exists() on a {} transaction",
                self.kind.as_str()
            );
        }
        let exists = self.handle().exists(partition, path).await?;
        self.set_phase(TransactionPhase::Checked);
        Ok(exists)
    }

    pub async fn put(
        &mut self,
        partition: Partition,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<()> {
        self.ensure_mutable("put");
        self.handle_mut().put(partition, path, node).await?;
        self.set_phase(TransactionPhase::Mutated);
        Ok(())
    }

    pub async fn merge(
        &mut self,
        partition: Partition,
        path: &PathAddress,
        node: DataNode,
    ) -> Result<()> {
        self.ensure_mutable("merge");
        self.handle_mut().merge(partition, path, node).await?;
        self.set_phase(TransactionPhase::Mutated);
        Ok(())
    }

    pub async fn delete(&mut self, partition: Partition, path: &PathAddress) -> Result<()> {
        self.ensure_mutable("delete");
        self.handle_mut().delete(partition, path).await?;
        self.set_phase(TransactionPhase::Mutated);
        Ok(())
    }

    /// Apply buffered mutations. Consuming `self` makes a second submit
    /// unrepresentable.
    pub async fn submit(mut self) -> Result<()> {
        let handle = self
            .handle
            .take()
            .expect("transaction handle present until terminal");
        // If this future is dropped while the store commit is in flight, the
        // guard marks the transaction cancelled; the store's submit atomicity
        // keeps partial writes invisible.
        let mut guard = CancelGuard {
            phase: Arc::clone(&self.phase),
            armed: true,
        };
        let outcome = handle.submit().await;
        guard.armed = false;
        match outcome {
            Ok(()) => {
                self.set_phase(TransactionPhase::Submitted);
                debug!(txn = %self.id, "transaction submitted");
                Ok(())
            }
            Err(err) => {
                self.set_phase(TransactionPhase::Failed(FailureReason::CommitRejected));
                debug!(txn = %self.id, error = %err, "transaction commit rejected by store");
                Err(err)
            }
        }
    }

    /// Terminate without submitting; buffered mutations are discarded.
    pub fn abort(mut self) {
        self.handle.take();
        self.set_phase(TransactionPhase::Rejected);
        debug!(txn = %self.id, "transaction aborted");
    }

    fn ensure_mutable(&self, op: &str) {
        match self.kind {
            TransactionKind::ReadOnly => {
                panic!("contract violation: {op}() on a read-only transaction")
            }
            TransactionKind::ReadWrite => {
                if self.phase() == TransactionPhase::Open {
                    panic!(
                        "contract violation: {op}() on a read-write transaction before exists()"
                    );
                }
            }
            TransactionKind::WriteOnly => {}
        }
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            self.set_phase(TransactionPhase::Failed(FailureReason::Cancelled));
            debug!(txn = %self.id, "transaction cancelled before submit");
        }
    }
}

struct CancelGuard {
    phase: Arc<Mutex<TransactionPhase>>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            *self.phase.lock().unwrap() = TransactionPhase::Failed(FailureReason::Cancelled);
        }
    }
}

/// Returned by the facade's commit operations on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub path: PathAddress,
}
