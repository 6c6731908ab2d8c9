use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tokio::sync::oneshot;

/// Identity handed to a storage node by the catalog at registration.
pub type NodeId = String;

/// Identity of one chunk of an artifact, `"<artifact>_chunk_<index>"`.
pub type ChunkId = String;

/// Health a storage node reports about itself.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Ready,
    Failed,
}

impl Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Ready => write!(f, "READY"),
            NodeState::Failed => write!(f, "FAILED"),
        }
    }
}

///
/// Snapshot returned by a `GetStatus` request.
///
/// A failed node still answers this request, but reports no chunks.
///
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub state: NodeState,
    pub chunk_count: usize,
    pub chunk_ids: Vec<ChunkId>,
}

///
/// Requests accepted by a storage node's mailbox.
///
/// Every variant carries the oneshot sender on which the node answers. Dropping the
/// receiving half (e.g. because the caller timed out) is harmless for the node.
///
#[derive(Debug)]
pub enum NodeRequest {
    /// Store (or overwrite) the bytes of a chunk.
    StoreChunk {
        chunk_id: ChunkId,
        data: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    /// Read a chunk, `None` when unknown or when the node is failed.
    GetChunk {
        chunk_id: ChunkId,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
    /// Best-effort chunk removal.
    DeleteChunk {
        chunk_id: ChunkId,
        reply: oneshot::Sender<bool>,
    },
    ListChunkIds {
        reply: oneshot::Sender<Vec<ChunkId>>,
    },
    GetStatus {
        reply: oneshot::Sender<NodeStatus>,
    },
    /// Health probe used by the catalog's heartbeat.
    IsAlive {
        reply: oneshot::Sender<bool>,
    },
    /// Tells the node the permanent id the catalog registered it under.
    AssignId {
        node_id: NodeId,
        reply: oneshot::Sender<()>,
    },
    SimulateFailure {
        reply: oneshot::Sender<()>,
    },
    Recover {
        reply: oneshot::Sender<()>,
    },
    /// Stops the node's task. The mailbox is closed afterwards.
    Terminate {
        reply: oneshot::Sender<()>,
    },
}

impl Display for NodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRequest::StoreChunk { chunk_id, data, .. } => {
                write!(f, "STORE_CHUNK {} ({} bytes)", chunk_id, data.len())
            }
            NodeRequest::GetChunk { chunk_id, .. } => write!(f, "GET_CHUNK {}", chunk_id),
            NodeRequest::DeleteChunk { chunk_id, .. } => write!(f, "DELETE_CHUNK {}", chunk_id),
            NodeRequest::ListChunkIds { .. } => write!(f, "LIST_CHUNK_IDS"),
            NodeRequest::GetStatus { .. } => write!(f, "GET_STATUS"),
            NodeRequest::IsAlive { .. } => write!(f, "IS_ALIVE"),
            NodeRequest::AssignId { node_id, .. } => write!(f, "ASSIGN_ID {}", node_id),
            NodeRequest::SimulateFailure { .. } => write!(f, "SIMULATE_FAILURE"),
            NodeRequest::Recover { .. } => write!(f, "RECOVER"),
            NodeRequest::Terminate { .. } => write!(f, "TERMINATE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&NodeState::Ready).unwrap(), "\"READY\"");
        assert_eq!(serde_json::to_string(&NodeState::Failed).unwrap(), "\"FAILED\"");
        assert_eq!(NodeState::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_request_display() {
        let (reply, _receiver) = oneshot::channel();
        let request = NodeRequest::StoreChunk {
            chunk_id: "a_chunk_0".to_string(),
            data: vec![1, 2, 3],
            reply,
        };
        assert_eq!(request.to_string(), "STORE_CHUNK a_chunk_0 (3 bytes)");
    }
}
