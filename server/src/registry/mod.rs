//! Node registry: durable store of node records

pub mod node;
pub mod store;

pub use node::{Node, NodeResources, NodeSpec, NodeState};
pub use store::NodeRegistry;
