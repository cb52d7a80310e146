//! Protocol-agnostic structured errors.
//!
//! Everything a facade operation can fail with is expressed as a
//! [`StructuredError`] so protocol front-ends can translate to a transport
//! status code from the tag alone, without inspecting broker internals.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Layer an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

/// Canonical error tags with their transport status-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl ErrorTag {
    /// HTTP status code the tag maps to at the front-end boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorTag::InvalidValue
            | ErrorTag::MissingAttribute
            | ErrorTag::BadAttribute
            | ErrorTag::UnknownAttribute
            | ErrorTag::MissingElement
            | ErrorTag::BadElement
            | ErrorTag::UnknownElement
            | ErrorTag::UnknownNamespace
            | ErrorTag::MalformedMessage => 400,
            ErrorTag::AccessDenied => 403,
            ErrorTag::DataMissing => 404,
            ErrorTag::InUse
            | ErrorTag::LockDenied
            | ErrorTag::ResourceDenied
            | ErrorTag::DataExists => 409,
            ErrorTag::TooBig => 413,
            ErrorTag::OperationNotSupported => 501,
            ErrorTag::RollbackFailed
            | ErrorTag::OperationFailed
            | ErrorTag::PartialOperation => 500,
        }
    }

    /// Canonical tag string as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

/// The error envelope crossing the facade boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error_type:?}/{tag}: {message}")]
pub struct StructuredError {
    pub error_type: ErrorType,
    pub tag: ErrorTag,
    pub severity: ErrorSeverity,
    pub message: String,
    /// Free-form diagnostics (original collaborator messages, reasons).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

impl StructuredError {
    pub fn new(error_type: ErrorType, tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            error_type,
            tag,
            severity: ErrorSeverity::Error,
            message: message.into(),
            info: BTreeMap::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Create against an existing resource.
    pub fn data_exists(path: impl fmt::Display) -> Self {
        Self::new(
            ErrorType::Protocol,
            ErrorTag::DataExists,
            format!("data already exists at {}", path),
        )
    }

    /// Delete or modify against an absent resource.
    pub fn data_missing(path: impl fmt::Display) -> Self {
        Self::new(
            ErrorType::Protocol,
            ErrorTag::DataMissing,
            format!("no data exists at {}", path),
        )
    }

    /// A required collaborator is not wired up.
    pub fn resource_unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ErrorType::Application,
            ErrorTag::OperationFailed,
            "service unavailable",
        )
        .with_info("reason", reason)
    }

    /// A collaborator rejected the operation; the original message is kept
    /// under `info["cause"]`.
    pub fn operation_failed(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::new(ErrorType::Application, ErrorTag::OperationFailed, message)
            .with_info("cause", cause.to_string())
    }
}
