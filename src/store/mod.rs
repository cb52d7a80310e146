//! Store collaborator interfaces and the in-memory reference store.

pub mod error;
pub mod event;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use event::DataChangeEvent;
pub use memory::MemoryStore;
pub use traits::{
    DataChangeListener, ListenerRegistration, RpcService, SessionContext, StoreService,
    StoreTransactionHandle,
};
