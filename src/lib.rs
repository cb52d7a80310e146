//! Transactional broker between management-protocol front-ends (NETCONF/
//! RESTCONF-style handlers) and a hierarchical, partitioned data store.
//!
//! The [`DataBroker`] facade provides CRUD with conditional-write semantics
//! (create-only POST, unconditional PUT, existence-gated DELETE), RPC
//! dispatch and idempotent data-change subscriptions over collaborator
//! traits defined in [`store`]. Wire encoding and schema validation live in
//! other layers.

pub mod broker;
pub mod error;
pub mod gate;
pub mod listeners;
pub mod node;
pub mod path;
pub mod rpc;
pub mod store;
pub mod txn;

pub use broker::DataBroker;
pub use error::{ErrorSeverity, ErrorTag, ErrorType, StructuredError};
pub use listeners::{ChangeListenerRegistry, Subscription, SubscriptionKey};
pub use node::{DataNode, ScalarValue};
pub use path::{ListenScope, Partition, PathAddress};
pub use rpc::{OperationId, RpcDispatcher, RpcResult};
pub use store::{
    DataChangeEvent, DataChangeListener, ListenerRegistration, MemoryStore, RpcService,
    SessionContext, StoreError, StoreService, StoreTransactionHandle,
};
pub use txn::{CommitResult, FailureReason, StoreTransaction, TransactionKind, TransactionPhase};
