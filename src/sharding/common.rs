use crate::networking::messages::ChunkId;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShardingError {
    #[error("Chunk size must be at least one byte")]
    InvalidChunkSize,
    #[error("Artifact content is empty")]
    EmptyContent,
    #[error("Artifact was not split completely")]
    MetadataNotFilled,
    #[error("Unwanted chunk. Metadata for chunk not found")]
    UnwantedChunk,
    #[error("Expected {expected} chunks, received {received}")]
    ChunkCountMismatch { expected: usize, received: usize },
    #[error("Reconstructed artifact has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Digest mismatch between metadata and reconstructed artifact")]
    DigestMismatch,
}

/// One fixed-size slice of an artifact. Only the last chunk may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub index: usize,
    pub data: Vec<u8>,
}

/// Catalog-side description of a stored artifact.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// Chunk ids in content order.
    pub chunk_ids: Vec<ChunkId>,
    pub chunk_count: usize,
    /// Total content length in bytes.
    pub size: usize,
    /// Hex encoded SHA-1 of the whole content.
    pub digest: String,
}

/// Deterministic id of the `index`-th chunk of artifact `name`.
pub fn chunk_id(name: &str, index: usize) -> ChunkId {
    format!("{}_chunk_{}", name, index)
}

pub fn content_digest(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}
