use crate::catalog::Catalog;
use crate::config::ClusterConfig;
use crate::networking::messages::{ChunkId, NodeId, NodeStatus};
use crate::networking::node_rpc::{NodeError, NodeHandle, StorageNodeRpc};
use crate::storage::node_service::StorageNodeHandle;
use async_trait::async_trait;
use rand::Rng;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

/// Configuration with short intervals so background loops run within a test's lifetime.
pub fn fast_config() -> ClusterConfig {
    ClusterConfig {
        node_count: 3,
        chunk_size: 10,
        replication_factor: 2,
        heartbeat_interval_ms: 50,
        replication_check_interval_ms: 100,
        request_timeout_ms: 200,
        shutdown_grace_ms: Some(1000),
        log_level: "debug".to_string(),
    }
}

///
/// Spawns `node_count` storage nodes and registers them with a fresh catalog.
/// The background loops are not started.
///
pub async fn spawn_cluster(
    config: ClusterConfig,
    node_count: usize,
) -> (Catalog, Vec<(NodeId, StorageNodeHandle)>) {
    let catalog = Catalog::new(config);
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let handle = StorageNodeHandle::spawn_new();
        let node_id = catalog.register_node(handle.to_rpc()).await;
        nodes.push((node_id, handle));
    }
    (catalog, nodes)
}

/// Deterministic, non-repeating-per-chunk content of `size` bytes.
pub fn sample_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub fn random_content(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

///
/// Node double whose calls never complete.
/// Every request against it ends in the caller's timeout.
///
pub struct UnresponsiveNode;

impl UnresponsiveNode {
    pub fn handle() -> NodeHandle {
        Arc::new(UnresponsiveNode)
    }
}

#[async_trait]
impl StorageNodeRpc for UnresponsiveNode {
    async fn store_chunk(&self, _chunk_id: &str, _data: Vec<u8>) -> Result<bool, NodeError> {
        pending().await
    }

    async fn get_chunk(&self, _chunk_id: &str) -> Result<Option<Vec<u8>>, NodeError> {
        pending().await
    }

    async fn delete_chunk(&self, _chunk_id: &str) -> Result<bool, NodeError> {
        pending().await
    }

    async fn list_chunk_ids(&self) -> Result<Vec<ChunkId>, NodeError> {
        pending().await
    }

    async fn get_status(&self) -> Result<NodeStatus, NodeError> {
        pending().await
    }

    async fn is_alive(&self) -> Result<bool, NodeError> {
        pending().await
    }

    async fn assign_id(&self, _node_id: &str) -> Result<(), NodeError> {
        pending().await
    }
}

///
/// Real storage node behind a layer of injected faults.
///
/// Calls that are not affected by a configured fault go straight to the wrapped node.
///
pub struct FaultyNode {
    inner: StorageNodeHandle,
    failing_gets: bool,
    refusing_stores: bool,
    slow_stores: Option<(u8, Duration)>,
}

impl FaultyNode {
    pub fn wrap(inner: StorageNodeHandle) -> Self {
        FaultyNode {
            inner,
            failing_gets: false,
            refusing_stores: false,
            slow_stores: None,
        }
    }

    /// Every `get_chunk` fails as if the node could not be reached.
    pub fn failing_gets(mut self) -> Self {
        self.failing_gets = true;
        self
    }

    /// Every `store_chunk` is answered with `false`.
    pub fn refusing_stores(mut self) -> Self {
        self.refusing_stores = true;
        self
    }

    /// Stores whose payload starts with `first_byte` are held back for `delay`.
    pub fn slow_stores_starting_with(mut self, first_byte: u8, delay: Duration) -> Self {
        self.slow_stores = Some((first_byte, delay));
        self
    }

    pub fn handle(self) -> NodeHandle {
        Arc::new(self)
    }
}

#[async_trait]
impl StorageNodeRpc for FaultyNode {
    async fn store_chunk(&self, chunk_id: &str, data: Vec<u8>) -> Result<bool, NodeError> {
        if self.refusing_stores {
            return Ok(false);
        }
        if let Some((first_byte, delay)) = self.slow_stores {
            if data.first() == Some(&first_byte) {
                tokio::time::sleep(delay).await;
            }
        }
        self.inner.store_chunk(chunk_id, data).await
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Vec<u8>>, NodeError> {
        if self.failing_gets {
            return Err(NodeError::Unreachable("injected read failure".to_string()));
        }
        self.inner.get_chunk(chunk_id).await
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool, NodeError> {
        self.inner.delete_chunk(chunk_id).await
    }

    async fn list_chunk_ids(&self) -> Result<Vec<ChunkId>, NodeError> {
        self.inner.list_chunk_ids().await
    }

    async fn get_status(&self) -> Result<NodeStatus, NodeError> {
        self.inner.get_status().await
    }

    async fn is_alive(&self) -> Result<bool, NodeError> {
        self.inner.is_alive().await
    }

    async fn assign_id(&self, node_id: &str) -> Result<(), NodeError> {
        self.inner.assign_id(node_id).await
    }
}
