use crate::constants::NODE_ID_PREFIX;
use crate::networking::messages::{ChunkId, NodeId};
use crate::networking::node_rpc::NodeHandle;
use crate::sharding::common::ArtifactMetadata;
use log::{info, warn};
use rand::seq::IndexedRandom;
use std::collections::{BTreeMap, BTreeSet};

/// Replicas of one chunk that a caller is about to contact.
pub type ChunkReplicas = (ChunkId, Vec<(NodeId, NodeHandle)>);

///
/// # Bookkeeping owned by the catalog.
///
/// * `nodes` keeps every handle ever registered; a failed node is moved to `dead_nodes`,
///   never deregistered.
/// * `live_nodes` and `dead_nodes` partition the keys of `nodes`.
/// * `chunk_placement` holds the nodes *believed* to store a replica. It may still name
///   dead nodes and must be filtered against `live_nodes` before being trusted.
/// * `reserved_names` are artifact names with an upload or delete in flight. No other
///   write of such a name may start until the reservation is released.
/// * `replicating` are chunk ids with a re-replication copy in flight. An upload that
///   would reuse one of them has to wait until the copy is committed or dropped.
///
/// This type does no I/O. The catalog wraps it in a single lock and keeps node RPCs
/// outside of that lock.
///
#[derive(Default)]
pub struct CatalogState {
    pub(super) nodes: BTreeMap<NodeId, NodeHandle>,
    pub(super) live_nodes: BTreeSet<NodeId>,
    pub(super) dead_nodes: BTreeSet<NodeId>,
    pub(super) artifacts: BTreeMap<String, ArtifactMetadata>,
    pub(super) chunk_placement: BTreeMap<ChunkId, BTreeSet<NodeId>>,
    pub(super) reserved_names: BTreeSet<String>,
    pub(super) replicating: BTreeSet<ChunkId>,
    node_counter: u64,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under the next free id. Ids are never reused.
    pub fn register(&mut self, handle: NodeHandle) -> NodeId {
        self.node_counter += 1;
        let node_id = format!("{}{}", NODE_ID_PREFIX, self.node_counter);
        self.nodes.insert(node_id.clone(), handle);
        self.live_nodes.insert(node_id.clone());
        node_id
    }

    pub fn handle(&self, node_id: &str) -> Option<NodeHandle> {
        self.nodes.get(node_id).cloned()
    }

    pub fn all_handles(&self) -> Vec<(NodeId, NodeHandle)> {
        self.nodes
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn live_handles(&self) -> Vec<(NodeId, NodeHandle)> {
        self.live_nodes
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|handle| (id.clone(), handle.clone())))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.live_nodes.len()
    }

    pub fn is_live(&self, node_id: &str) -> bool {
        self.live_nodes.contains(node_id) && self.nodes.contains_key(node_id)
    }

    /// Members of `holders` currently believed to be live.
    pub fn live_holders(&self, holders: &BTreeSet<NodeId>) -> Vec<NodeId> {
        holders
            .iter()
            .filter(|id| self.is_live(id))
            .cloned()
            .collect()
    }

    ///
    /// Uniform random sample, without replacement, of `min(count, available)` live nodes
    /// that are not in `exclude`.
    ///
    /// Under-supply is not an error: the result may be shorter than `count`, or empty.
    ///
    pub fn choose_nodes(
        &self,
        count: usize,
        exclude: &BTreeSet<NodeId>,
    ) -> Vec<(NodeId, NodeHandle)> {
        let available: Vec<(NodeId, NodeHandle)> = self
            .live_handles()
            .into_iter()
            .filter(|(id, _)| !exclude.contains(id))
            .collect();

        let required = count.min(available.len());
        if required == 0 {
            if count > 0 {
                warn!(
                    "Not enough live nodes ({}) to satisfy request for {} (excluding {:?})",
                    available.len(),
                    count,
                    exclude
                );
            }
            return Vec::new();
        }

        available
            .choose_multiple(&mut rand::rng(), required)
            .cloned()
            .collect()
    }

    /// Moves a node from the live set to the dead set. Returns `false` if it was not live.
    pub fn mark_dead(&mut self, node_id: &str) -> bool {
        if !self.live_nodes.remove(node_id) {
            if !self.nodes.contains_key(node_id) {
                warn!("Attempted to mark unknown node {} as dead", node_id);
            }
            return false;
        }
        warn!("Node {} failure detected. Marking as dead.", node_id);
        self.dead_nodes.insert(node_id.to_string());
        true
    }

    /// Moves a registered node back into the live set. Returns `false` if nothing changed.
    pub fn mark_live(&mut self, node_id: &str) -> bool {
        if !self.nodes.contains_key(node_id) || self.live_nodes.contains(node_id) {
            return false;
        }
        self.dead_nodes.remove(node_id);
        self.live_nodes.insert(node_id.to_string());
        info!("Node {} is back. Marking as live.", node_id);
        true
    }

    pub fn has_artifact(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    /// Claims `name` for an upload or delete. Returns `false` if it is already claimed.
    pub fn reserve_name(&mut self, name: &str) -> bool {
        self.reserved_names.insert(name.to_string())
    }

    pub fn release_name(&mut self, name: &str) {
        self.reserved_names.remove(name);
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_names.contains(name)
    }

    /// Marks a chunk as being copied. Returns `false` if a copy is already in flight.
    pub fn begin_replication(&mut self, chunk_id: &str) -> bool {
        self.replicating.insert(chunk_id.to_string())
    }

    pub fn end_replication(&mut self, chunk_id: &str) {
        self.replicating.remove(chunk_id);
    }

    pub fn is_replicating(&self, chunk_id: &str) -> bool {
        self.replicating.contains(chunk_id)
    }

    pub fn commit_artifact(
        &mut self,
        name: &str,
        metadata: ArtifactMetadata,
        placement: BTreeMap<ChunkId, BTreeSet<NodeId>>,
    ) {
        self.artifacts.insert(name.to_string(), metadata);
        self.chunk_placement.extend(placement);
    }

    ///
    /// Drops an artifact's metadata together with the placement of its chunks, returning
    /// the replicas that should be asked to delete their bytes.
    ///
    pub fn remove_artifact(&mut self, name: &str) -> Option<(ArtifactMetadata, Vec<ChunkReplicas>)> {
        let metadata = self.artifacts.remove(name)?;
        let mut replicas = Vec::with_capacity(metadata.chunk_ids.len());
        for chunk_id in &metadata.chunk_ids {
            let Some(holders) = self.chunk_placement.remove(chunk_id) else {
                warn!(
                    "Chunk {} of artifact '{}' had no placement entry during delete",
                    chunk_id, name
                );
                continue;
            };
            let targets = holders
                .into_iter()
                .filter_map(|id| self.handle(&id).map(|handle| (id, handle)))
                .collect();
            replicas.push((chunk_id.clone(), targets));
        }
        Some((metadata, replicas))
    }

    /// Adds new replica holders to a chunk that is still tracked.
    pub fn add_replicas(&mut self, chunk_id: &str, node_ids: Vec<NodeId>) -> bool {
        match self.chunk_placement.get_mut(chunk_id) {
            Some(holders) => {
                holders.extend(node_ids);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::UnresponsiveNode;
    use std::sync::Arc;

    fn state_with_nodes(count: usize) -> CatalogState {
        let mut state = CatalogState::new();
        for _ in 0..count {
            state.register(Arc::new(UnresponsiveNode));
        }
        state
    }

    fn ids(nodes: &[(NodeId, NodeHandle)]) -> BTreeSet<NodeId> {
        nodes.iter().map(|(id, _)| id.clone()).collect()
    }

    #[test]
    fn test_register_allocates_increasing_ids() {
        let mut state = CatalogState::new();
        let first = state.register(Arc::new(UnresponsiveNode));
        let second = state.register(Arc::new(UnresponsiveNode));
        assert_eq!(first, "datanode-1");
        assert_eq!(second, "datanode-2");
        assert_eq!(state.live_count(), 2);
        assert!(state.dead_nodes.is_empty());
    }

    #[test]
    fn test_choose_nodes_samples_without_replacement() {
        let state = state_with_nodes(5);
        for _ in 0..50 {
            let chosen = state.choose_nodes(3, &BTreeSet::new());
            assert_eq!(chosen.len(), 3);
            assert_eq!(ids(&chosen).len(), 3);
        }
    }

    #[test]
    fn test_choose_nodes_never_returns_dead_or_excluded() {
        let mut state = state_with_nodes(4);
        state.mark_dead("datanode-1");
        let exclude: BTreeSet<NodeId> = ["datanode-2".to_string()].into();

        for _ in 0..50 {
            let chosen = ids(&state.choose_nodes(4, &exclude));
            let expected: BTreeSet<NodeId> =
                ["datanode-3".to_string(), "datanode-4".to_string()].into();
            assert_eq!(chosen, expected);
        }
    }

    #[test]
    fn test_choose_nodes_under_supply() {
        let mut state = state_with_nodes(2);
        assert_eq!(state.choose_nodes(5, &BTreeSet::new()).len(), 2);
        assert!(state.choose_nodes(0, &BTreeSet::new()).is_empty());

        state.mark_dead("datanode-1");
        state.mark_dead("datanode-2");
        assert!(state.choose_nodes(2, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_live_and_dead_sets_stay_disjoint() {
        let mut state = state_with_nodes(3);

        assert!(state.mark_dead("datanode-2"));
        assert!(!state.mark_dead("datanode-2"));
        assert!(!state.mark_dead("datanode-42"));
        assert!(!state.is_live("datanode-2"));
        assert!(state.dead_nodes.contains("datanode-2"));

        assert!(state.mark_live("datanode-2"));
        assert!(!state.mark_live("datanode-2"));
        assert!(!state.mark_live("datanode-42"));
        assert!(state.is_live("datanode-2"));
        assert!(state.dead_nodes.is_empty());

        // Handles are kept no matter what.
        assert_eq!(state.all_handles().len(), 3);
        for id in state.nodes.keys() {
            assert!(state.live_nodes.contains(id) ^ state.dead_nodes.contains(id));
        }
    }

    #[test]
    fn test_live_holders_filters_dead_nodes() {
        let mut state = state_with_nodes(3);
        state.mark_dead("datanode-1");
        let holders: BTreeSet<NodeId> = ["datanode-1".to_string(), "datanode-3".to_string()].into();
        assert_eq!(state.live_holders(&holders), vec!["datanode-3".to_string()]);
    }

    #[test]
    fn test_remove_artifact_drops_placement() {
        let mut state = state_with_nodes(2);
        let metadata = ArtifactMetadata {
            chunk_ids: vec!["a_chunk_0".to_string(), "a_chunk_1".to_string()],
            chunk_count: 2,
            size: 12,
            digest: String::new(),
        };
        let placement: BTreeMap<ChunkId, BTreeSet<NodeId>> = [
            ("a_chunk_0".to_string(), ["datanode-1".to_string()].into()),
            (
                "a_chunk_1".to_string(),
                ["datanode-1".to_string(), "datanode-2".to_string()].into(),
            ),
        ]
        .into();
        state.commit_artifact("a", metadata.clone(), placement);
        assert!(state.has_artifact("a"));

        let (removed, replicas) = state.remove_artifact("a").unwrap();
        assert_eq!(removed, metadata);
        assert_eq!(replicas.len(), 2);
        assert_eq!(replicas[1].1.len(), 2);
        assert!(!state.has_artifact("a"));
        assert!(state.chunk_placement.is_empty());
        assert!(state.remove_artifact("a").is_none());

        assert!(!state.add_replicas("a_chunk_0", vec!["datanode-2".to_string()]));
    }

    #[test]
    fn test_name_reservation_is_exclusive() {
        let mut state = CatalogState::new();
        assert!(state.reserve_name("a"));
        assert!(!state.reserve_name("a"));
        assert!(state.is_reserved("a"));
        assert!(!state.is_reserved("b"));

        state.release_name("a");
        assert!(!state.is_reserved("a"));
        assert!(state.reserve_name("a"));
    }

    #[test]
    fn test_replication_marker_is_exclusive() {
        let mut state = CatalogState::new();
        assert!(state.begin_replication("a_chunk_0"));
        assert!(!state.begin_replication("a_chunk_0"));
        assert!(state.is_replicating("a_chunk_0"));

        state.end_replication("a_chunk_0");
        assert!(!state.is_replicating("a_chunk_0"));
    }
}
