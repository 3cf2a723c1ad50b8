//! File-backed node registry

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::ClusterError;
use crate::filesys::file::File;
use crate::registry::node::{Node, NodeSpec, NodeState};

/// Durable store of node records.
///
/// State transitions go through the named methods below; there is no general
/// setter, so scheduler state, install results, and reconciliation remain the
/// only write paths.
pub struct NodeRegistry {
    file: File,
    nodes: RwLock<HashMap<String, Node>>,
}

impl NodeRegistry {
    /// Open the registry, loading existing records if present
    pub async fn open(file: File) -> Result<Self, ClusterError> {
        let nodes: HashMap<String, Node> = if file.exists().await {
            file.read_json().await?
        } else {
            HashMap::new()
        };
        info!("Node registry opened with {} records", nodes.len());
        Ok(Self {
            file,
            nodes: RwLock::new(nodes),
        })
    }

    /// Get one node by name
    pub async fn get(&self, name: &str) -> Option<Node> {
        self.nodes.read().await.get(name).cloned()
    }

    /// List all nodes, sorted by name
    pub async fn list(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Create records for a scale-up request, each in state `unknown`.
    ///
    /// Fails with `Conflict` if any name already has a live (non-deleted)
    /// record; a deleted record of the same name is replaced.
    pub async fn insert_specs(&self, specs: Vec<NodeSpec>) -> Result<(), ClusterError> {
        let mut nodes = self.nodes.write().await;
        for spec in &specs {
            if let Some(existing) = nodes.get(&spec.node_name) {
                if existing.state != NodeState::Deleted {
                    return Err(ClusterError::Conflict(format!(
                        "node '{}' is already registered",
                        spec.node_name
                    )));
                }
            }
        }
        for spec in specs {
            let node = Node::from_spec(spec);
            debug!("Registering node '{}' ({}:{})", node.name, node.host, node.port);
            nodes.insert(node.name.clone(), node);
        }
        self.persist(&nodes).await
    }

    /// Record the outcome of an install run for a node.
    ///
    /// A successful install leaves the node `idle` pending scheduler pickup;
    /// a failed one marks it `down`.
    pub async fn mark_install_result(
        &self,
        name: &str,
        success: bool,
        minion_id: Option<String>,
    ) -> Result<(), ClusterError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(format!("node '{}'", name)))?;
        node.state = if success { NodeState::Idle } else { NodeState::Down };
        if minion_id.is_some() {
            node.minion_id = minion_id;
        }
        node.updated_at = Utc::now();
        self.persist(&nodes).await
    }

    /// Fold scheduler-reported state into a node record (reconciliation path)
    pub async fn apply_scheduler_state(
        &self,
        name: &str,
        state: NodeState,
    ) -> Result<(), ClusterError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(format!("node '{}'", name)))?;
        if node.state != state {
            debug!("Node '{}' state {} -> {}", name, node.state, state);
            node.state = state;
            node.updated_at = Utc::now();
            self.persist(&nodes).await?;
        }
        Ok(())
    }

    /// Record the minion id once the agent is seen by the control plane
    pub async fn set_minion_id(&self, name: &str, minion_id: &str) -> Result<(), ClusterError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(format!("node '{}'", name)))?;
        if node.minion_id.as_deref() != Some(minion_id) {
            node.minion_id = Some(minion_id.to_string());
            node.updated_at = Utc::now();
            self.persist(&nodes).await?;
        }
        Ok(())
    }

    /// Soft-delete a node after scale-down.
    ///
    /// `warning` is set when the scheduler never confirmed the removal within
    /// the deadline.
    pub async fn soft_delete(
        &self,
        name: &str,
        warning: Option<String>,
    ) -> Result<(), ClusterError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(format!("node '{}'", name)))?;
        node.state = NodeState::Deleted;
        node.removal_warning = warning;
        node.updated_at = Utc::now();
        self.persist(&nodes).await
    }

    async fn persist(&self, nodes: &HashMap<String, Node>) -> Result<(), ClusterError> {
        self.file.write_json(nodes).await?;
        // The registry file carries credentials.
        self.file.set_permissions_600().await?;
        Ok(())
    }
}
