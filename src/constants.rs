// This module contains all the constants that affect the default behavior of the cluster.

/// Number of storage nodes spawned by the client driver.
pub const DEFAULT_NODE_COUNT: usize = 3;

/// The size of a single artifact chunk in bytes.
/// The last chunk of an artifact may be shorter.
pub const DEFAULT_CHUNK_SIZE_B: usize = 10;

/// # Target replica count for every chunk.
/// * This is a target, not a hard minimum.
/// * Uploads proceed with fewer replicas when fewer nodes are live.
pub const DEFAULT_REPLICATION_FACTOR: usize = 2;

pub const DEFAULT_HEARTBEAT_INTERVAL_MILLISECONDS: u64 = 5000;
pub const DEFAULT_REPLICATION_CHECK_INTERVAL_MILLISECONDS: u64 = 10000;
pub const DEFAULT_REQUEST_TIMEOUT_MILLISECONDS: u64 = 7000;

/// Extra time granted to background loops on top of one heartbeat interval when stopping.
pub const SHUTDOWN_GRACE_EXTRA_MILLISECONDS: u64 = 2000;

/// Capacity of a storage node's command queue.
pub const NODE_MAILBOX_CAPACITY: usize = 256;

/// Id carried by a storage node before the catalog assigns the permanent one.
pub const PENDING_NODE_ID: &str = "pending";

pub const NODE_ID_PREFIX: &str = "datanode-";
