pub mod artifacts;
pub mod error;
pub mod maintenance;
pub mod state;
pub mod status;

use crate::config::ClusterConfig;
use crate::networking::messages::NodeId;
use crate::networking::node_rpc::{call_with_timeout, NodeHandle};
use log::{info, warn};
use state::CatalogState;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

pub use error::CatalogError;
pub use status::{ClusterStatus, NodeReport, ReportedState};

///
/// # The catalog coordinates a pool of storage nodes.
///
/// It owns the node registry, artifact metadata and chunk placement, serves the
/// client operations (upload, get, update, delete, status) and runs two background
/// loops: a heartbeat that demotes unresponsive nodes and a replication check that
/// restores the replica count of under-replicated chunks.
///
/// All bookkeeping sits behind one lock. RPC fan-out to the nodes always happens
/// with that lock released; only the commit of the results is serialized.
///
/// Clones of this handle share the same state and background tasks.
///
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    config: ClusterConfig,
    state: RwLock<CatalogState>,
    shutdown: watch::Sender<bool>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Catalog {
    pub fn new(config: ClusterConfig) -> Self {
        info!(
            "Catalog created. ChunkSize={}, ReplicationFactor={}",
            config.chunk_size, config.replication_factor
        );
        let (shutdown, _) = watch::channel(false);
        Catalog {
            inner: Arc::new(CatalogInner {
                config,
                state: RwLock::new(CatalogState::new()),
                shutdown,
                background_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    ///
    /// Registers a storage node and returns its permanent id.
    ///
    /// The id is allocated under the state lock, so concurrent registrations never share
    /// an id. The node is then told its id on a best-effort basis.
    ///
    pub async fn register_node(&self, handle: NodeHandle) -> NodeId {
        let node_id = self.inner.state.write().await.register(handle.clone());
        info!("Registered storage node {}", node_id);

        let timeout = self.inner.config.request_timeout();
        if let Err(e) = call_with_timeout(&node_id, timeout, handle.assign_id(&node_id)).await {
            warn!("Could not hand id {} to its node: {}", node_id, e);
        }
        node_id
    }

    ///
    /// Picks up to `count` distinct live nodes outside `exclude`, uniformly at random.
    /// Returns fewer (or none) when not enough live nodes exist.
    ///
    pub async fn choose_nodes(
        &self,
        count: usize,
        exclude: &BTreeSet<NodeId>,
    ) -> Vec<(NodeId, NodeHandle)> {
        self.inner.state.read().await.choose_nodes(count, exclude)
    }

    pub async fn live_node_ids(&self) -> Vec<NodeId> {
        self.inner.state.read().await.live_nodes.iter().cloned().collect()
    }

    pub async fn dead_node_ids(&self) -> Vec<NodeId> {
        self.inner.state.read().await.dead_nodes.iter().cloned().collect()
    }

    ///
    /// Spawns the heartbeat and replication-check loops. Calling it again while the
    /// loops are running does nothing.
    ///
    pub async fn start(&self) {
        let mut tasks = self.inner.background_tasks.lock().await;
        if !tasks.is_empty() {
            warn!("Background tasks are already running");
            return;
        }
        info!("Starting background tasks (heartbeat, replication check)");
        self.inner.shutdown.send_replace(false);

        let heartbeat = self.clone();
        let heartbeat_stop = self.inner.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            heartbeat.heartbeat_loop(heartbeat_stop).await;
        }));

        let replication = self.clone();
        let replication_stop = self.inner.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            replication.replication_check_loop(replication_stop).await;
        }));
    }

    ///
    /// Signals both loops to exit at their next wait boundary and waits for them for at
    /// most `shutdown_grace`. Node calls already in flight finish or time out on their own.
    ///
    pub async fn stop(&self) {
        let tasks: Vec<JoinHandle<()>> = self.inner.background_tasks.lock().await.drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        info!("Stopping background tasks...");
        self.inner.shutdown.send_replace(true);

        let grace = self.inner.config.shutdown_grace();
        let drain = futures::future::join_all(tasks);
        match tokio::time::timeout(grace, drain).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Background task ended abnormally: {}", e);
                    }
                }
                info!("Background tasks stopped.");
            }
            Err(_) => warn!(
                "Timeout waiting {:?} for background tasks to stop. Leaving them behind.",
                grace
            ),
        }
    }
}
