pub mod node_service;
pub mod storage_node;
