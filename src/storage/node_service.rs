use crate::constants::NODE_MAILBOX_CAPACITY;
use crate::networking::messages::{ChunkId, NodeRequest, NodeStatus};
use crate::networking::node_rpc::{NodeError, NodeHandle, StorageNodeRpc};
use crate::storage::storage_node::StorageNode;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

///
/// Client side of a running storage node.
///
/// The node itself lives in its own task and is only reachable through this handle's
/// mailbox. Cloning the handle is cheap; all clones talk to the same node.
///
#[derive(Clone)]
pub struct StorageNodeHandle {
    sender: mpsc::Sender<NodeRequest>,
}

impl StorageNodeHandle {
    ///
    /// Moves `node` into a new task and returns the handle to it.
    /// Must be called from within a tokio runtime.
    ///
    pub fn spawn(node: StorageNode) -> Self {
        let (sender, receiver) = mpsc::channel(NODE_MAILBOX_CAPACITY);
        tokio::spawn(run_node(node, receiver));
        StorageNodeHandle { sender }
    }

    pub fn spawn_new() -> Self {
        Self::spawn(StorageNode::new())
    }

    /// Type-erased handle for registration with the catalog.
    pub fn to_rpc(&self) -> NodeHandle {
        Arc::new(self.clone())
    }

    ///
    /// Sends a request and waits for the node's reply.
    /// Both a closed mailbox and a dropped reply channel mean the node is gone.
    ///
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> NodeRequest,
    ) -> Result<T, NodeError> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| NodeError::Unreachable("mailbox closed".to_string()))?;
        receiver
            .await
            .map_err(|_| NodeError::Unreachable("node stopped before replying".to_string()))
    }

    /// Puts the node into the FAILED state. Its chunks are kept.
    pub async fn simulate_failure(&self) -> Result<(), NodeError> {
        self.request(|reply| NodeRequest::SimulateFailure { reply })
            .await
    }

    pub async fn recover(&self) -> Result<(), NodeError> {
        self.request(|reply| NodeRequest::Recover { reply }).await
    }

    ///
    /// Stops the node's task, modelling a crashed process.
    /// Every later request on any clone of this handle fails with `NodeError::Unreachable`.
    ///
    pub async fn terminate(&self) -> Result<(), NodeError> {
        self.request(|reply| NodeRequest::Terminate { reply }).await
    }
}

#[async_trait]
impl StorageNodeRpc for StorageNodeHandle {
    async fn store_chunk(&self, chunk_id: &str, data: Vec<u8>) -> Result<bool, NodeError> {
        self.request(|reply| NodeRequest::StoreChunk {
            chunk_id: chunk_id.to_string(),
            data,
            reply,
        })
        .await
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Vec<u8>>, NodeError> {
        self.request(|reply| NodeRequest::GetChunk {
            chunk_id: chunk_id.to_string(),
            reply,
        })
        .await
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool, NodeError> {
        self.request(|reply| NodeRequest::DeleteChunk {
            chunk_id: chunk_id.to_string(),
            reply,
        })
        .await
    }

    async fn list_chunk_ids(&self) -> Result<Vec<ChunkId>, NodeError> {
        self.request(|reply| NodeRequest::ListChunkIds { reply })
            .await
    }

    async fn get_status(&self) -> Result<NodeStatus, NodeError> {
        self.request(|reply| NodeRequest::GetStatus { reply }).await
    }

    async fn is_alive(&self) -> Result<bool, NodeError> {
        self.request(|reply| NodeRequest::IsAlive { reply }).await
    }

    async fn assign_id(&self, node_id: &str) -> Result<(), NodeError> {
        self.request(|reply| NodeRequest::AssignId {
            node_id: node_id.to_string(),
            reply,
        })
        .await
    }
}

///
/// Main receive loop of a storage node. Requests are handled one at a time, so the
/// node's state needs no further synchronization.
///
async fn run_node(mut node: StorageNode, mut receiver: mpsc::Receiver<NodeRequest>) {
    while let Some(request) = receiver.recv().await {
        debug!("Node {} received request: {}", node.node_id(), request);
        if !handle_received_request(&mut node, request) {
            break;
        }
    }
    info!("Storage node {} stopped", node.node_id());
}

///
/// # Router for requests arriving in a node's mailbox.
///
/// Returns `false` once the node has been asked to terminate.
///
fn handle_received_request(node: &mut StorageNode, request: NodeRequest) -> bool {
    match request {
        NodeRequest::StoreChunk {
            chunk_id,
            data,
            reply,
        } => respond(reply, node.store_chunk(&chunk_id, data)),
        NodeRequest::GetChunk { chunk_id, reply } => respond(reply, node.get_chunk(&chunk_id)),
        NodeRequest::DeleteChunk { chunk_id, reply } => {
            respond(reply, node.delete_chunk(&chunk_id))
        }
        NodeRequest::ListChunkIds { reply } => respond(reply, node.list_chunk_ids()),
        NodeRequest::GetStatus { reply } => respond(reply, node.get_status()),
        NodeRequest::IsAlive { reply } => respond(reply, node.is_alive()),
        NodeRequest::AssignId { node_id, reply } => {
            node.assign_id(&node_id);
            respond(reply, ());
        }
        NodeRequest::SimulateFailure { reply } => {
            node.simulate_failure();
            respond(reply, ());
        }
        NodeRequest::Recover { reply } => {
            node.recover();
            respond(reply, ());
        }
        NodeRequest::Terminate { reply } => {
            info!("Storage node {} is terminating", node.node_id());
            respond(reply, ());
            return false;
        }
    }
    true
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    // The requester may have given up after its timeout.
    if reply.send(value).is_err() {
        debug!("Requester went away before the reply was sent");
    }
}
