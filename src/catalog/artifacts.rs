use super::{Catalog, CatalogError};
use crate::networking::messages::{ChunkId, NodeId};
use crate::networking::node_rpc::{call_with_timeout, NodeHandle};
use crate::sharding::common::{ArtifactMetadata, Chunk};
use crate::sharding::downloader::ArtifactDownloader;
use crate::sharding::uploader::ArtifactUploader;
use futures::future::join_all;
use log::{debug, error, info, warn};
use rand::seq::IndexedRandom;
use std::collections::{BTreeMap, BTreeSet};

/// One chunk of an upload together with the nodes it is sent to.
type PlannedChunk = (Chunk, Vec<(NodeId, NodeHandle)>);

impl Catalog {
    ///
    /// Stores a new artifact. Returns `false` on any failure; see `try_upload`.
    ///
    pub async fn upload(&self, name: &str, content: &[u8]) -> bool {
        match self.try_upload(name, content).await {
            Ok(()) => true,
            Err(e) => {
                error!("Upload of artifact '{}' failed: {}", name, e);
                false
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        match self.try_get(name).await {
            Ok(content) => Some(content),
            Err(e) => {
                error!("Get of artifact '{}' failed: {}", name, e);
                None
            }
        }
    }

    pub async fn update(&self, name: &str, content: &[u8]) -> bool {
        match self.try_update(name, content).await {
            Ok(()) => true,
            Err(e) => {
                error!("Update of artifact '{}' failed: {}", name, e);
                false
            }
        }
    }

    pub async fn delete(&self, name: &str) -> bool {
        match self.try_delete(name).await {
            Ok(()) => true,
            Err(e) => {
                error!("Delete of artifact '{}' failed: {}", name, e);
                false
            }
        }
    }

    ///
    /// # Upload workflow.
    ///
    /// 1. The name must be free and at least one node must be live. The name is then
    ///    reserved, so no other upload or delete of it runs until this one ends.
    /// 2. The content is split into chunks; each chunk gets `min(replication_factor, live)`
    ///    distinct random targets.
    /// 3. All stores run concurrently, each bounded by the request timeout.
    /// 4. A chunk counts as placed once any one target accepted it. If some chunk was
    ///    placed nowhere, nothing is committed.
    ///
    /// Bytes already stored by an aborted upload are not cleaned up.
    ///
    pub async fn try_upload(&self, name: &str, content: &[u8]) -> Result<(), CatalogError> {
        let uploader = ArtifactUploader::new(name, content, self.inner.config.chunk_size)?;
        let (plan, metadata) = self.plan_upload(name, uploader).await?;

        let stored = self.store_planned_chunks(&plan).await;

        let mut state = self.inner.state.write().await;
        state.release_name(name);
        let placement = stored?;
        let chunk_count = metadata.chunk_count;
        state.commit_artifact(name, metadata, placement);
        info!(
            "Successfully uploaded artifact '{}' ({} chunks).",
            name, chunk_count
        );
        Ok(())
    }

    ///
    /// Checks the name, picks targets for every chunk and reserves the name, all in one
    /// critical section. On success the caller owns the reservation.
    ///
    async fn plan_upload(
        &self,
        name: &str,
        mut uploader: ArtifactUploader<'_>,
    ) -> Result<(Vec<PlannedChunk>, ArtifactMetadata), CatalogError> {
        let replication_factor = self.inner.config.replication_factor;
        let mut state = self.inner.state.write().await;
        if state.has_artifact(name) {
            return Err(CatalogError::ArtifactExists(name.to_string()));
        }
        if state.is_reserved(name) {
            return Err(CatalogError::ArtifactBusy(name.to_string()));
        }

        let effective_replication = replication_factor.min(state.live_count());
        if effective_replication == 0 {
            return Err(CatalogError::NoLiveNodes);
        }
        if effective_replication < replication_factor {
            warn!(
                "Only {} live nodes available. Will store artifact '{}' with reduced replication.",
                effective_replication, name
            );
        }
        info!(
            "Uploading artifact '{}' (size: {} bytes) with effective replication {}",
            name,
            uploader.content_len(),
            effective_replication
        );

        let no_exclusions = BTreeSet::new();
        let mut plan = Vec::with_capacity(uploader.chunk_count());
        for chunk in uploader.by_ref() {
            // A copy of an earlier version of this chunk may still land on some node.
            if state.is_replicating(&chunk.id) {
                return Err(CatalogError::ArtifactBusy(name.to_string()));
            }
            let targets = state.choose_nodes(effective_replication, &no_exclusions);
            if targets.is_empty() {
                return Err(CatalogError::NoTargetNodes(chunk.id));
            }
            debug!(
                "Storing chunk {} on nodes: {:?}",
                chunk.id,
                targets.iter().map(|(id, _)| id).collect::<Vec<_>>()
            );
            plan.push((chunk, targets));
        }
        let metadata = uploader.get_metadata()?;

        state.reserve_name(name);
        Ok((plan, metadata))
    }

    /// Runs every planned store and returns where each chunk ended up.
    async fn store_planned_chunks(
        &self,
        plan: &[PlannedChunk],
    ) -> Result<BTreeMap<ChunkId, BTreeSet<NodeId>>, CatalogError> {
        let timeout = self.inner.config.request_timeout();
        let stores = plan.iter().map(|(chunk, targets)| async move {
            let attempts = targets.iter().map(|(node_id, handle)| {
                let data = chunk.data.clone();
                async move {
                    let result =
                        call_with_timeout(node_id, timeout, handle.store_chunk(&chunk.id, data))
                            .await;
                    (node_id.clone(), result)
                }
            });
            (chunk, targets.len(), join_all(attempts).await)
        });

        let mut placement: BTreeMap<ChunkId, BTreeSet<NodeId>> = BTreeMap::new();
        for (chunk, attempted, results) in join_all(stores).await {
            let mut stored = BTreeSet::new();
            for (node_id, result) in results {
                match result {
                    Ok(true) => {
                        stored.insert(node_id);
                    }
                    Ok(false) => warn!(
                        "Node {} failed to store chunk {} (returned false).",
                        node_id, chunk.id
                    ),
                    Err(e) => warn!("Error storing chunk {} on node {}: {}", chunk.id, node_id, e),
                }
            }

            if stored.is_empty() {
                return Err(CatalogError::ChunkNotStored(chunk.id.clone()));
            }
            if stored.len() < attempted {
                warn!(
                    "Chunk {} stored on only {}/{} attempted nodes.",
                    chunk.id,
                    stored.len(),
                    attempted
                );
            } else {
                info!("Chunk {} stored on all {} target nodes.", chunk.id, attempted);
            }
            placement.insert(chunk.id.clone(), stored);
        }
        Ok(placement)
    }

    ///
    /// # Get workflow.
    ///
    /// Every chunk is fetched from one random live replica, all chunks concurrently.
    /// A chunk with no live replica, or a fetch that fails or times out, fails the whole
    /// read. Other replicas of a failed chunk are not tried.
    ///
    pub async fn try_get(&self, name: &str) -> Result<Vec<u8>, CatalogError> {
        info!("Getting artifact '{}'", name);
        let (metadata, fetches) = {
            let state = self.inner.state.read().await;
            let metadata = state
                .artifacts
                .get(name)
                .cloned()
                .ok_or_else(|| CatalogError::ArtifactNotFound(name.to_string()))?;

            let mut fetches: Vec<(ChunkId, NodeId, NodeHandle)> =
                Vec::with_capacity(metadata.chunk_count);
            for (index, chunk_id) in metadata.chunk_ids.iter().enumerate() {
                let Some(holders) = state.chunk_placement.get(chunk_id) else {
                    error!(
                        "Metadata inconsistency: chunk {} (index {}) of artifact '{}' not found in placement.",
                        chunk_id, index, name
                    );
                    return Err(CatalogError::MetadataInconsistency {
                        artifact: name.to_string(),
                        chunk_id: chunk_id.clone(),
                    });
                };

                let live = state.live_holders(holders);
                let Some(node_id) = live.choose(&mut rand::rng()).cloned() else {
                    error!(
                        "Chunk {} (index {}) of artifact '{}' has no live replicas. Placement: {:?}",
                        chunk_id, index, name, holders
                    );
                    return Err(CatalogError::NoLiveReplica(chunk_id.clone()));
                };
                let handle = state.handle(&node_id).ok_or_else(|| {
                    CatalogError::MetadataInconsistency {
                        artifact: name.to_string(),
                        chunk_id: chunk_id.clone(),
                    }
                })?;
                debug!(
                    "Scheduling fetch for chunk {} (index {}) from node {}",
                    chunk_id, index, node_id
                );
                fetches.push((chunk_id.clone(), node_id, handle));
            }
            (metadata, fetches)
        };

        let timeout = self.inner.config.request_timeout();
        let results = join_all(fetches.iter().map(|(chunk_id, node_id, handle)| {
            call_with_timeout(node_id, timeout, handle.get_chunk(chunk_id))
        }))
        .await;

        let mut downloader = ArtifactDownloader::new(metadata);
        for ((chunk_id, node_id, _), result) in fetches.into_iter().zip(results) {
            let reason = match result {
                Ok(Some(data)) => {
                    downloader.store_next_chunk(data)?;
                    continue;
                }
                Ok(None) => "node returned no data".to_string(),
                Err(e) => e.to_string(),
            };
            warn!(
                "Fetching chunk {} from node {} failed: {}. Other replicas are not tried.",
                chunk_id, node_id, reason
            );
            return Err(CatalogError::ChunkFetchFailed {
                chunk_id,
                node_id,
                reason,
            });
        }

        let content = downloader.finish()?;
        info!("Successfully retrieved artifact '{}'.", name);
        Ok(content)
    }

    ///
    /// Replaces an existing artifact by deleting it and uploading the new content.
    ///
    /// This is not atomic: if the upload fails after the delete, the artifact is gone
    /// and the previous content is not restored.
    ///
    pub async fn try_update(&self, name: &str, content: &[u8]) -> Result<(), CatalogError> {
        info!("Updating artifact '{}'", name);
        if !self.inner.state.read().await.has_artifact(name) {
            return Err(CatalogError::ArtifactNotFound(name.to_string()));
        }

        info!("Deleting old version of '{}' before update.", name);
        if let Err(e) = self.try_delete(name).await {
            warn!(
                "Deleting old version of '{}' reported: {}. Continuing with upload.",
                name, e
            );
        }

        info!("Uploading new version of '{}'.", name);
        self.try_upload(name, content).await.map_err(|e| {
            error!(
                "Failed to upload new version of artifact '{}'. The previous version is gone.",
                name
            );
            e
        })?;
        info!("Successfully updated artifact '{}'.", name);
        Ok(())
    }

    ///
    /// # Delete workflow.
    ///
    /// Metadata and chunk placement are dropped first; from then on the artifact is
    /// gone. The nodes are asked to delete their replicas afterwards, concurrently and
    /// best-effort: failures are logged and ignored. The name stays reserved until every
    /// delete call has returned, so an upload of it fails with `ArtifactBusy` meanwhile.
    ///
    pub async fn try_delete(&self, name: &str) -> Result<(), CatalogError> {
        info!("Deleting artifact '{}'", name);
        let (metadata, replicas) = {
            let mut state = self.inner.state.write().await;
            let removed = state
                .remove_artifact(name)
                .ok_or_else(|| CatalogError::ArtifactNotFound(name.to_string()))?;
            state.reserve_name(name);
            removed
        };

        let timeout = self.inner.config.request_timeout();
        let deletes = replicas.iter().flat_map(|(chunk_id, targets)| {
            targets.iter().map(move |(node_id, handle)| async move {
                let result =
                    call_with_timeout(node_id, timeout, handle.delete_chunk(chunk_id)).await;
                (chunk_id, node_id, result)
            })
        });

        let results = join_all(deletes).await;
        self.inner.state.write().await.release_name(name);
        debug!(
            "{} chunk delete calls finished for artifact '{}'",
            results.len(),
            name
        );
        for (chunk_id, node_id, result) in results {
            match result {
                Ok(true) => {}
                Ok(false) => debug!("Node {} did not hold chunk {}", node_id, chunk_id),
                Err(e) => warn!(
                    "Deleting chunk {} on node {} failed: {}. Proceeding.",
                    chunk_id, node_id, e
                ),
            }
        }

        info!(
            "Successfully deleted artifact '{}' ({} chunks).",
            name, metadata.chunk_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::CatalogError;
    use crate::utils::testing::{fast_config, sample_content, spawn_cluster};

    #[tokio::test]
    async fn test_missing_placement_is_reported_as_inconsistency() {
        let (catalog, _nodes) = spawn_cluster(fast_config(), 2).await;
        assert!(catalog.upload("broken", &sample_content(25)).await);

        catalog
            .inner
            .state
            .write()
            .await
            .chunk_placement
            .remove("broken_chunk_1");

        assert_eq!(
            catalog.try_get("broken").await,
            Err(CatalogError::MetadataInconsistency {
                artifact: "broken".to_string(),
                chunk_id: "broken_chunk_1".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected() {
        let (catalog, _nodes) = spawn_cluster(fast_config(), 2).await;
        assert!(matches!(
            catalog.try_upload("empty", b"").await,
            Err(CatalogError::Sharding(_))
        ));
        assert!(!catalog.upload("empty", b"").await);
    }

    #[tokio::test]
    async fn test_upload_without_nodes_fails() {
        let (catalog, _nodes) = spawn_cluster(fast_config(), 0).await;
        assert_eq!(
            catalog.try_upload("lonely", b"data").await,
            Err(CatalogError::NoLiveNodes)
        );
    }
}
