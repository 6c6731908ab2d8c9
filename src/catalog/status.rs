use super::Catalog;
use crate::networking::messages::{ChunkId, NodeId, NodeState};
use crate::networking::node_rpc::call_with_timeout;
use crate::sharding::common::ArtifactMetadata;
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

/// Node state as seen by the catalog while building a status report.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportedState {
    Ready,
    Failed,
    /// The status request errored or timed out.
    Unresponsive,
}

impl From<NodeState> for ReportedState {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Ready => ReportedState::Ready,
            NodeState::Failed => ReportedState::Failed,
        }
    }
}

impl Display for ReportedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportedState::Ready => write!(f, "READY"),
            ReportedState::Failed => write!(f, "FAILED"),
            ReportedState::Unresponsive => write!(f, "FAILED (unresponsive)"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub state: ReportedState,
    pub chunk_count: usize,
    pub chunk_ids: Vec<ChunkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogSummary {
    pub total_registered_nodes: usize,
    pub live_nodes: usize,
    pub dead_nodes: usize,
    pub total_artifacts: usize,
    pub total_chunks_tracked: usize,
    pub replication_factor: usize,
    pub chunk_size: usize,
}

///
/// Point-in-time view of the whole cluster, as returned by `Catalog::list_status`.
///
/// Liveness sets and counts are taken after the probes have been reconciled.
///
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    pub summary: CatalogSummary,
    pub nodes: BTreeMap<NodeId, NodeReport>,
    pub artifacts: BTreeMap<String, ArtifactMetadata>,
    pub chunk_placement: BTreeMap<ChunkId, BTreeSet<NodeId>>,
    pub live_node_ids: Vec<NodeId>,
    pub dead_node_ids: Vec<NodeId>,
}

impl Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        writeln!(f, "--- Catalog Summary ---")?;
        writeln!(f, "  Total Registered Nodes: {}", s.total_registered_nodes)?;
        writeln!(f, "  Live Nodes: {}", s.live_nodes)?;
        writeln!(f, "  Dead Nodes: {}", s.dead_nodes)?;
        writeln!(f, "  Total Artifacts: {}", s.total_artifacts)?;
        writeln!(f, "  Total Chunks Tracked: {}", s.total_chunks_tracked)?;
        writeln!(f, "  Replication Factor: {}", s.replication_factor)?;
        writeln!(f, "  Chunk Size: {}", s.chunk_size)?;

        writeln!(f, "\n--- Artifacts ---")?;
        if self.artifacts.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (name, metadata) in &self.artifacts {
            writeln!(
                f,
                "  {}: {} bytes, {} chunks, sha1 {}",
                name, metadata.size, metadata.chunk_count, metadata.digest
            )?;
        }

        writeln!(f, "\n--- Chunk Placement ---")?;
        if self.chunk_placement.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (chunk_id, holders) in &self.chunk_placement {
            let holders: Vec<&str> = holders.iter().map(String::as_str).collect();
            writeln!(f, "  {}: [{}]", chunk_id, holders.join(", "))?;
        }

        writeln!(f, "\n--- Storage Nodes ---")?;
        for (node_id, report) in &self.nodes {
            write!(
                f,
                "  {}: {} ({} chunks)",
                node_id, report.state, report.chunk_count
            )?;
            if let Some(error) = &report.error {
                write!(f, " error: {}", error)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n  Live: [{}]", self.live_node_ids.join(", "))?;
        write!(f, "  Dead: [{}]", self.dead_node_ids.join(", "))
    }
}

impl Catalog {
    ///
    /// Probes `get_status` on every registered node, dead ones included, and folds the
    /// answers back into the liveness sets:
    ///
    /// * an error or timeout demotes a live node,
    /// * a node reporting `FAILED` is demoted,
    /// * a node reporting `READY` is (re)admitted to the live set.
    ///
    /// This is the only path by which a dead node comes back.
    ///
    pub async fn list_status(&self) -> ClusterStatus {
        info!("Gathering cluster status...");
        let targets = self.inner.state.read().await.all_handles();

        let timeout = self.inner.config.request_timeout();
        let probes = targets.into_iter().map(|(node_id, handle)| async move {
            let result = call_with_timeout(&node_id, timeout, handle.get_status()).await;
            (node_id, result)
        });
        let results = join_all(probes).await;

        let mut state = self.inner.state.write().await;
        let mut nodes = BTreeMap::new();
        for (node_id, result) in results {
            let report = match result {
                Ok(status) => {
                    match status.state {
                        NodeState::Ready => {
                            state.mark_live(&node_id);
                        }
                        NodeState::Failed => {
                            if state.mark_dead(&node_id) {
                                warn!("Node {} reported FAILED state, marking as dead.", node_id);
                            }
                        }
                    }
                    NodeReport {
                        state: status.state.into(),
                        chunk_count: status.chunk_count,
                        chunk_ids: status.chunk_ids,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Failed to get status from node {}: {}", node_id, e);
                    state.mark_dead(&node_id);
                    NodeReport {
                        state: ReportedState::Unresponsive,
                        chunk_count: 0,
                        chunk_ids: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            nodes.insert(node_id, report);
        }

        ClusterStatus {
            summary: CatalogSummary {
                total_registered_nodes: state.nodes.len(),
                live_nodes: state.live_nodes.len(),
                dead_nodes: state.dead_nodes.len(),
                total_artifacts: state.artifacts.len(),
                total_chunks_tracked: state.chunk_placement.len(),
                replication_factor: self.inner.config.replication_factor,
                chunk_size: self.inner.config.chunk_size,
            },
            nodes,
            artifacts: state.artifacts.clone(),
            chunk_placement: state.chunk_placement.clone(),
            live_node_ids: state.live_nodes.iter().cloned().collect(),
            dead_node_ids: state.dead_nodes.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_state_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ReportedState::Unresponsive).unwrap(),
            "\"UNRESPONSIVE\""
        );
        assert_eq!(ReportedState::from(NodeState::Failed), ReportedState::Failed);
        assert_eq!(ReportedState::Unresponsive.to_string(), "FAILED (unresponsive)");
    }

    #[test]
    fn test_display_lists_every_node() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "datanode-1".to_string(),
            NodeReport {
                state: ReportedState::Ready,
                chunk_count: 1,
                chunk_ids: vec!["a_chunk_0".to_string()],
                error: None,
            },
        );
        nodes.insert(
            "datanode-2".to_string(),
            NodeReport {
                state: ReportedState::Unresponsive,
                chunk_count: 0,
                chunk_ids: Vec::new(),
                error: Some("timed out".to_string()),
            },
        );
        let status = ClusterStatus {
            summary: CatalogSummary {
                total_registered_nodes: 2,
                live_nodes: 1,
                dead_nodes: 1,
                total_artifacts: 0,
                total_chunks_tracked: 0,
                replication_factor: 2,
                chunk_size: 10,
            },
            nodes,
            artifacts: BTreeMap::new(),
            chunk_placement: BTreeMap::new(),
            live_node_ids: vec!["datanode-1".to_string()],
            dead_node_ids: vec!["datanode-2".to_string()],
        };

        let printed = status.to_string();
        assert!(printed.contains("datanode-1: READY (1 chunks)"));
        assert!(printed.contains("datanode-2: FAILED (unresponsive) (0 chunks) error: timed out"));
        assert!(printed.contains("Dead: [datanode-2]"));
    }
}
