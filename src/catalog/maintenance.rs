use super::Catalog;
use crate::networking::messages::{ChunkId, NodeId};
use crate::networking::node_rpc::{call_with_timeout, NodeHandle};
use futures::future::join_all;
use log::{debug, error, info, warn};
use rand::seq::IndexedRandom;
use std::time::Duration;
use tokio::sync::watch;

impl Catalog {
    pub(super) async fn heartbeat_loop(self, mut shutdown: watch::Receiver<bool>) {
        info!("Heartbeat loop started.");
        let period = self.inner.config.heartbeat_interval();
        while wait_for_next_round(period, &mut shutdown).await {
            self.run_heartbeat_round().await;
        }
        info!("Heartbeat loop stopped.");
    }

    pub(super) async fn replication_check_loop(self, mut shutdown: watch::Receiver<bool>) {
        info!("Replication check loop started.");
        let period = self.inner.config.replication_check_interval();
        while wait_for_next_round(period, &mut shutdown).await {
            self.run_replication_check().await;
        }
        info!("Replication check loop stopped.");
    }

    ///
    /// Probes `is_alive` on every live node concurrently. Nodes that error, time out or
    /// answer `false` are moved to the dead set.
    ///
    /// Returns the ids that were demoted in this round.
    ///
    pub async fn run_heartbeat_round(&self) -> Vec<NodeId> {
        let targets = self.inner.state.read().await.live_handles();
        if targets.is_empty() {
            return Vec::new();
        }
        debug!("Sending heartbeats to {} live nodes...", targets.len());

        let timeout = self.inner.config.request_timeout();
        let probes = targets.into_iter().map(|(node_id, handle)| async move {
            let result = call_with_timeout(&node_id, timeout, handle.is_alive()).await;
            (node_id, result)
        });

        let mut failed = Vec::new();
        for (node_id, result) in join_all(probes).await {
            match result {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Node {} reported not alive via heartbeat.", node_id);
                    failed.push(node_id);
                }
                Err(e) => {
                    warn!("Heartbeat failed for node {}: {}", node_id, e);
                    failed.push(node_id);
                }
            }
        }

        if !failed.is_empty() {
            let mut state = self.inner.state.write().await;
            failed.retain(|node_id| state.mark_dead(node_id));
        }
        failed
    }

    ///
    /// Scans every tracked chunk and re-replicates those with some, but not enough, live
    /// replicas. Chunks without any live replica are reported and skipped since there
    /// is nothing to copy from.
    ///
    /// Returns the number of replicas created.
    ///
    pub async fn run_replication_check(&self) -> usize {
        info!("Running replication check...");
        let replication_factor = self.inner.config.replication_factor;

        let under_replicated: Vec<ChunkId> = {
            let state = self.inner.state.read().await;
            let mut queue = Vec::new();
            for (chunk_id, holders) in &state.chunk_placement {
                let live = state.live_holders(holders).len();
                if live >= replication_factor {
                    continue;
                }
                warn!(
                    "Chunk {} is under-replicated (found {}/{} live replicas).",
                    chunk_id, live, replication_factor
                );
                if live == 0 {
                    error!("CRITICAL: Chunk {} has NO live replicas!", chunk_id);
                    continue;
                }
                queue.push(chunk_id.clone());
            }
            queue
        };

        if under_replicated.is_empty() {
            info!("Replication check complete.");
            return 0;
        }

        info!(
            "Executing {} re-replication tasks concurrently...",
            under_replicated.len()
        );
        let created: usize = join_all(
            under_replicated
                .iter()
                .map(|chunk_id| self.re_replicate(chunk_id)),
        )
        .await
        .into_iter()
        .sum();
        info!("Re-replication batch finished, {} new replicas.", created);
        created
    }

    ///
    /// Copies one chunk from a random live replica to new nodes until the replication
    /// factor is met, as far as live nodes allow.
    ///
    /// New targets exclude every node already in the chunk's placement set, dead or
    /// alive. A source that cannot be read from is taken as dead. While the copy is in
    /// flight the chunk is marked as replicating, which keeps uploads from reusing its
    /// id. Returns the number of targets that accepted the copy.
    ///
    pub async fn re_replicate(&self, chunk_id: &str) -> usize {
        let replication_factor = self.inner.config.replication_factor;

        let (source_id, source, targets) = {
            let mut state = self.inner.state.write().await;
            let Some(holders) = state.chunk_placement.get(chunk_id) else {
                debug!("Chunk {} is no longer tracked. Skipping replication.", chunk_id);
                return 0;
            };
            let live = state.live_holders(holders);
            if live.len() >= replication_factor {
                return 0;
            }
            let Some(source_id) = live.choose(&mut rand::rng()).cloned() else {
                error!(
                    "Replication failed for {}: No live source replica found.",
                    chunk_id
                );
                return 0;
            };
            let Some(source) = state.handle(&source_id) else {
                error!(
                    "Source node {} handle not found for chunk {}. Skipping replication.",
                    source_id, chunk_id
                );
                return 0;
            };

            let needed = replication_factor - live.len();
            let targets = state.choose_nodes(needed, holders);
            if targets.is_empty() {
                warn!(
                    "Could not find {} new nodes to replicate chunk {}.",
                    needed, chunk_id
                );
                return 0;
            }
            if !state.begin_replication(chunk_id) {
                debug!("Chunk {} is already being re-replicated.", chunk_id);
                return 0;
            }
            (source_id, source, targets)
        };

        let outcome = self.copy_chunk(chunk_id, &source_id, &source, &targets).await;

        let mut state = self.inner.state.write().await;
        state.end_replication(chunk_id);
        let stored = match outcome {
            CopyOutcome::SourceFailed => {
                state.mark_dead(&source_id);
                return 0;
            }
            CopyOutcome::Stored(stored) => stored,
        };
        if stored.is_empty() {
            return 0;
        }

        let created = stored.len();
        if state.add_replicas(chunk_id, stored) {
            info!(
                "Successfully re-replicated chunk {} to {} new nodes.",
                chunk_id, created
            );
            created
        } else {
            warn!(
                "Chunk {} was deleted while being re-replicated. New copies are left orphaned.",
                chunk_id
            );
            0
        }
    }

    /// Reads the chunk from `source` and writes it to every target concurrently.
    async fn copy_chunk(
        &self,
        chunk_id: &str,
        source_id: &str,
        source: &NodeHandle,
        targets: &[(NodeId, NodeHandle)],
    ) -> CopyOutcome {
        let timeout = self.inner.config.request_timeout();
        let data = match call_with_timeout(source_id, timeout, source.get_chunk(chunk_id)).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                error!(
                    "Source node {} returned nothing for chunk {}. Cannot re-replicate.",
                    source_id, chunk_id
                );
                return CopyOutcome::Stored(Vec::new());
            }
            Err(e) => {
                error!(
                    "Failed to get chunk {} from source node {}: {}. Marking source dead.",
                    chunk_id, source_id, e
                );
                return CopyOutcome::SourceFailed;
            }
        };

        let target_ids: Vec<&NodeId> = targets.iter().map(|(id, _)| id).collect();
        info!(
            "Re-replicating chunk {} from {} to nodes: {:?}",
            chunk_id, source_id, target_ids
        );
        let stores = targets.iter().map(|(node_id, handle)| {
            let data = data.clone();
            async move {
                let result =
                    call_with_timeout(node_id, timeout, handle.store_chunk(chunk_id, data)).await;
                (node_id.clone(), result)
            }
        });

        let mut stored = Vec::new();
        for (node_id, result) in join_all(stores).await {
            match result {
                Ok(true) => stored.push(node_id),
                Ok(false) => warn!(
                    "Target {} refused re-replicated chunk {}",
                    node_id, chunk_id
                ),
                Err(e) => warn!(
                    "Failed storing re-replicated chunk {} on target {}: {}",
                    chunk_id, node_id, e
                ),
            }
        }
        if stored.len() < targets.len() {
            warn!(
                "Chunk {} copied to only {}/{} targets.",
                chunk_id,
                stored.len(),
                targets.len()
            );
        }
        CopyOutcome::Stored(stored)
    }
}

enum CopyOutcome {
    /// The source could not be read; it is treated as dead.
    SourceFailed,
    /// Targets that accepted the copy, possibly none.
    Stored(Vec<NodeId>),
}

///
/// Sleeps one period unless the stop signal arrives first.
/// Returns `false` when the loop should exit.
///
async fn wait_for_next_round(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    let stopped = tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = shutdown.wait_for(|stop| *stop) => true,
    };
    !stopped && !*shutdown.borrow()
}
