//! Events emitted when committed data changes.

use crate::node::DataNode;
use crate::path::{Partition, PathAddress};

/// A single committed change, dispatched to matching subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChangeEvent {
    /// A node was written where none existed.
    Created {
        partition: Partition,
        path: PathAddress,
        data: DataNode,
    },
    /// A node was replaced or merged over.
    Updated {
        partition: Partition,
        path: PathAddress,
        data: DataNode,
    },
    /// A node (and its subtree) was removed.
    Deleted {
        partition: Partition,
        path: PathAddress,
    },
}

impl DataChangeEvent {
    pub fn partition(&self) -> Partition {
        match self {
            DataChangeEvent::Created { partition, .. }
            | DataChangeEvent::Updated { partition, .. }
            | DataChangeEvent::Deleted { partition, .. } => *partition,
        }
    }

    pub fn path(&self) -> &PathAddress {
        match self {
            DataChangeEvent::Created { path, .. }
            | DataChangeEvent::Updated { path, .. }
            | DataChangeEvent::Deleted { path, .. } => path,
        }
    }

    /// Kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DataChangeEvent::Created { .. } => "created",
            DataChangeEvent::Updated { .. } => "updated",
            DataChangeEvent::Deleted { .. } => "deleted",
        }
    }
}
