//! The existence gate: create-vs-replace and delete-vs-missing policy.

use crate::error::StructuredError;
use crate::path::PathAddress;

/// What the caller intends to do once the existence check is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteIntent {
    /// Create-only (POST): must not already exist.
    Create,
    /// Existence-gated delete: must already exist.
    Delete,
}

/// Outcome of the gate.
#[derive(Debug)]
pub enum GateDecision {
    Proceed,
    Reject(StructuredError),
}

impl GateDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, GateDecision::Proceed)
    }
}

/// Decide whether a checked operation may proceed.
///
/// Pure policy, shared by the POST and DELETE paths so the exists-then-branch
/// logic lives in exactly one place and is testable without a store.
pub fn evaluate(intent: WriteIntent, exists: bool, path: &PathAddress) -> GateDecision {
    match (intent, exists) {
        (WriteIntent::Create, false) | (WriteIntent::Delete, true) => GateDecision::Proceed,
        (WriteIntent::Create, true) => GateDecision::Reject(StructuredError::data_exists(path)),
        (WriteIntent::Delete, false) => GateDecision::Reject(StructuredError::data_missing(path)),
    }
}
