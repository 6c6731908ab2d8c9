pub mod messages;
pub mod node_rpc;
