use crate::constants::PENDING_NODE_ID;
use crate::networking::messages::{ChunkId, NodeId, NodeState, NodeStatus};
use log::{info, warn};
use std::collections::HashMap;

///
/// # In-memory chunk store of a single storage node.
///
/// The node owns its chunks exclusively. Its `alive` flag models a transient outage:
/// while failed, the data plane refuses service, but nothing is purged, so a
/// recovered node serves its old chunks again.
///
pub struct StorageNode {
    node_id: NodeId,
    chunks: HashMap<ChunkId, Vec<u8>>,
    alive: bool,
}

impl StorageNode {
    pub fn new() -> Self {
        StorageNode {
            node_id: PENDING_NODE_ID.to_string(),
            chunks: HashMap::new(),
            alive: true,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Adopts the id the catalog registered this node under.
    pub fn assign_id(&mut self, node_id: &str) {
        if self.node_id == node_id {
            warn!("Node id was already set to '{}'", node_id);
            return;
        }
        info!("Setting node id from '{}' to '{}'", self.node_id, node_id);
        self.node_id = node_id.to_string();
    }

    /// Last writer wins; returns `false` only when the node is failed.
    pub fn store_chunk(&mut self, chunk_id: &str, data: Vec<u8>) -> bool {
        if !self.alive {
            warn!(
                "Node {} received store request for {} while failed",
                self.node_id, chunk_id
            );
            return false;
        }
        self.chunks.insert(chunk_id.to_string(), data);
        true
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Option<Vec<u8>> {
        if !self.alive {
            warn!(
                "Node {} received get request for {} while failed",
                self.node_id, chunk_id
            );
            return None;
        }
        self.chunks.get(chunk_id).cloned()
    }

    ///
    /// Removes a chunk.
    ///
    /// On a live node the result tells whether the chunk was present. A failed node
    /// still drops the chunk if it has it and always answers `true`, so that callers
    /// never have to treat deletion as an error.
    ///
    pub fn delete_chunk(&mut self, chunk_id: &str) -> bool {
        if !self.alive {
            warn!(
                "Node {} received delete request for {} while failed",
                self.node_id, chunk_id
            );
            self.chunks.remove(chunk_id);
            return true;
        }
        self.chunks.remove(chunk_id).is_some()
    }

    /// Sorted ids of the stored chunks; empty while failed.
    pub fn list_chunk_ids(&self) -> Vec<ChunkId> {
        if !self.alive {
            return Vec::new();
        }
        let mut chunk_ids: Vec<ChunkId> = self.chunks.keys().cloned().collect();
        chunk_ids.sort();
        chunk_ids
    }

    pub fn get_status(&self) -> NodeStatus {
        let state = if self.alive {
            NodeState::Ready
        } else {
            NodeState::Failed
        };
        let chunk_ids = self.list_chunk_ids();
        NodeStatus {
            node_id: self.node_id.clone(),
            state,
            chunk_count: chunk_ids.len(),
            chunk_ids,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn simulate_failure(&mut self) {
        if self.alive {
            warn!("Node {}: simulating FAILURE", self.node_id);
            self.alive = false;
        }
    }

    pub fn recover(&mut self) {
        if !self.alive {
            warn!("Node {}: simulating RECOVERY", self.node_id);
            self.alive = true;
        }
    }
}

impl Default for StorageNode {
    fn default() -> Self {
        Self::new()
    }
}
