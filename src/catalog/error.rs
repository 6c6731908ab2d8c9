use crate::networking::messages::{ChunkId, NodeId};
use crate::sharding::common::ShardingError;
use thiserror::Error;

///
/// Reasons a client-facing catalog operation failed.
///
/// `MetadataInconsistency` is a logic error in the catalog's own bookkeeping and is
/// kept apart from the node failures and capacity problems the other variants describe.
///
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Artifact '{0}' already exists")]
    ArtifactExists(String),
    #[error("Artifact '{0}' is being written by another operation")]
    ArtifactBusy(String),
    #[error("Artifact '{0}' not found")]
    ArtifactNotFound(String),
    #[error("No live storage nodes available")]
    NoLiveNodes,
    #[error("No live storage node could be chosen for chunk {0}")]
    NoTargetNodes(ChunkId),
    #[error("Chunk {0} could not be stored on any target node")]
    ChunkNotStored(ChunkId),
    #[error("Metadata inconsistency: chunk {chunk_id} of artifact '{artifact}' has no placement entry")]
    MetadataInconsistency { artifact: String, chunk_id: ChunkId },
    #[error("Chunk {0} has no live replicas")]
    NoLiveReplica(ChunkId),
    #[error("Fetching chunk {chunk_id} from node {node_id} failed: {reason}")]
    ChunkFetchFailed {
        chunk_id: ChunkId,
        node_id: NodeId,
        reason: String,
    },
    #[error(transparent)]
    Sharding(#[from] ShardingError),
}
