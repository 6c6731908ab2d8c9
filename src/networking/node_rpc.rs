use crate::networking::messages::{ChunkId, NodeId, NodeStatus};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

///
/// Failures of the RPC layer itself.
///
/// A node that answers "no" (e.g. `store_chunk` returning `false`) is not an error here;
/// these variants only describe calls that never produced an answer.
///
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Node is unreachable: {0}")]
    Unreachable(String),
    #[error("Request to node {node_id} timed out after {timeout:?}")]
    Timeout { node_id: NodeId, timeout: Duration },
}

///
/// RPC surface of a storage node as seen by the catalog.
///
/// The catalog never touches node-local state directly, it only holds `NodeHandle`s.
///
#[async_trait]
pub trait StorageNodeRpc: Send + Sync {
    async fn store_chunk(&self, chunk_id: &str, data: Vec<u8>) -> Result<bool, NodeError>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Vec<u8>>, NodeError>;

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool, NodeError>;

    async fn list_chunk_ids(&self) -> Result<Vec<ChunkId>, NodeError>;

    async fn get_status(&self) -> Result<NodeStatus, NodeError>;

    async fn is_alive(&self) -> Result<bool, NodeError>;

    async fn assign_id(&self, node_id: &str) -> Result<(), NodeError>;
}

/// Shared, type-erased reference to a node's RPC surface.
pub type NodeHandle = Arc<dyn StorageNodeRpc>;

///
/// Bounds a single node call by `limit`.
///
/// Elapsing is reported as `NodeError::Timeout` and is never retried here; callers
/// treat it exactly like an explicit failure.
///
pub async fn call_with_timeout<T, F>(node_id: &str, limit: Duration, call: F) -> Result<T, NodeError>
where
    F: Future<Output = Result<T, NodeError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(NodeError::Timeout {
            node_id: node_id.to_string(),
            timeout: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_with_timeout_passes_result_through() {
        let result = call_with_timeout("datanode-1", Duration::from_millis(100), async {
            Ok::<_, NodeError>(42)
        })
        .await;
        assert_eq!(result, Ok(42));

        let result: Result<u8, NodeError> =
            call_with_timeout("datanode-1", Duration::from_millis(100), async {
                Err(NodeError::Unreachable("mailbox closed".to_string()))
            })
            .await;
        assert!(matches!(result, Err(NodeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_call_with_timeout_elapses() {
        let limit = Duration::from_millis(20);
        let result: Result<bool, NodeError> =
            call_with_timeout("datanode-7", limit, std::future::pending()).await;
        assert_eq!(
            result,
            Err(NodeError::Timeout {
                node_id: "datanode-7".to_string(),
                timeout: limit,
            })
        );
    }
}
