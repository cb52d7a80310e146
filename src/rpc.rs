//! RPC invocation dispatch.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StructuredError;
use crate::node::DataNode;
use crate::store::{RpcService, SessionContext};

/// Identity of an RPC operation: the model module it belongs to and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId {
    pub module: String,
    pub name: String,
}

impl OperationId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

/// Outcome of an RPC invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResult {
    pub output: Option<DataNode>,
}

impl RpcResult {
    pub fn empty() -> Self {
        Self { output: None }
    }

    pub fn with_output(output: DataNode) -> Self {
        Self {
            output: Some(output),
        }
    }
}

/// Stateless router from an operation identity to the RPC collaborator.
///
/// Validates two independent preconditions: an access-control session must be
/// present and an RPC-capable collaborator must be wired. Missing either is a
/// distinct diagnostic, but both surface the same error tag. On success the
/// collaborator's future is returned unmodified.
pub struct RpcDispatcher {
    rpc: Option<Arc<dyn RpcService>>,
    session: Option<Arc<dyn SessionContext>>,
}

impl RpcDispatcher {
    pub fn new(
        rpc: Option<Arc<dyn RpcService>>,
        session: Option<Arc<dyn SessionContext>>,
    ) -> Self {
        Self { rpc, session }
    }

    /// Route the invocation, or fail fast on a wiring gap.
    pub fn dispatch(
        &self,
        operation: &OperationId,
        input: DataNode,
    ) -> Result<BoxFuture<'static, Result<RpcResult, StructuredError>>, StructuredError> {
        let Some(session) = &self.session else {
            warn!(%operation, "rpc invocation rejected: session context not configured");
            return Err(StructuredError::resource_unavailable(
                "session context not configured",
            ));
        };
        let Some(rpc) = &self.rpc else {
            warn!(
                %operation,
                session = session.session_id(),
                "rpc invocation rejected: rpc service not configured"
            );
            return Err(StructuredError::resource_unavailable(
                "rpc service not configured",
            ));
        };
        Ok(rpc.invoke_rpc(operation, input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorTag;

    struct Session;
    impl SessionContext for Session {
        fn session_id(&self) -> &str {
            "test-session"
        }
    }

    struct EchoRpc;
    impl RpcService for EchoRpc {
        fn invoke_rpc(
            &self,
            _operation: &OperationId,
            input: DataNode,
        ) -> BoxFuture<'static, Result<RpcResult, StructuredError>> {
            Box::pin(async move { Ok(RpcResult::with_output(input)) })
        }
    }

    #[tokio::test]
    async fn dispatch_passes_through() {
        let dispatcher = RpcDispatcher::new(Some(Arc::new(EchoRpc)), Some(Arc::new(Session)));
        let input = DataNode::leaf("ping");
        let future = dispatcher
            .dispatch(&OperationId::new("test-module", "echo"), input.clone())
            .unwrap();
        let result = future.await.unwrap();
        assert_eq!(result.output, Some(input));
    }

    #[tokio::test]
    async fn missing_session_and_missing_service_are_distinct_reasons() {
        let op = OperationId::new("test-module", "echo");

        let no_session = RpcDispatcher::new(Some(Arc::new(EchoRpc)), None);
        let err = no_session
            .dispatch(&op, DataNode::container())
            .err()
            .unwrap();
        assert_eq!(err.tag, ErrorTag::OperationFailed);
        assert_eq!(
            err.info.get("reason").map(String::as_str),
            Some("session context not configured")
        );

        let no_service = RpcDispatcher::new(None, Some(Arc::new(Session)));
        let err = no_service
            .dispatch(&op, DataNode::container())
            .err()
            .unwrap();
        assert_eq!(err.tag, ErrorTag::OperationFailed);
        assert_eq!(
            err.info.get("reason").map(String::as_str),
            Some("rpc service not configured")
        );
    }
}
