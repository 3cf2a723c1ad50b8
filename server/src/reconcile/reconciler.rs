//! Merged per-node view
//!
//! Three systems report on a node: the registry (what we asked for and what
//! the installer saw), the scheduler (authoritative availability), and the
//! config-management plane (minion presence). The reconciler folds them into
//! one view: scheduler state wins when the node is known to it, then the
//! install-derived registry state, then `unknown`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::ClusterError;
use crate::registry::{Node, NodeRegistry, NodeState};
use crate::salt::{MinionStatus, SaltApi};
use crate::slurm::{NodeStatus, SlurmControl};

/// One reconciled node
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub name: String,
    pub state: NodeState,

    /// Raw scheduler state when the scheduler knows the node
    pub scheduler_state: Option<String>,

    pub minion_id: Option<String>,
    pub minion_online: Option<bool>,

    pub cpus: u32,
    pub memory_mb: u64,

    /// Set when the node has been unknown to the scheduler past the grace
    /// window; operators decide, nothing auto-remediates
    pub needs_attention: bool,
    pub attention_reason: Option<String>,

    pub removal_warning: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Reconciler options
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// How long a node may stay unknown to the scheduler before flagging
    pub grace_window: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(300),
        }
    }
}

/// Map a raw scheduler state string onto the registry state enum.
///
/// The scheduler suffixes flags onto states ("down*", "idle~") and uses
/// several spellings for allocation.
pub fn normalize_scheduler_state(raw: &str) -> NodeState {
    let base = raw
        .trim()
        .trim_end_matches(['*', '~', '#', '!', '%', '$', '@'])
        .to_lowercase();
    match base.as_str() {
        "idle" => NodeState::Idle,
        "alloc" | "allocated" | "mixed" | "mix" | "completing" | "comp" => NodeState::Allocated,
        "drain" | "draining" | "drng" | "drained" => NodeState::Draining,
        "down" | "fail" | "failing" | "error" => NodeState::Down,
        _ => NodeState::Unknown,
    }
}

/// Merge the three views into one row per registry node.
///
/// Deleted nodes are omitted; the dashboard reads scale-down results from the
/// task, not the node list.
pub fn merge(
    nodes: &[Node],
    scheduler: &[NodeStatus],
    minions: &[MinionStatus],
    grace_window: Duration,
    now: DateTime<Utc>,
) -> Vec<NodeView> {
    nodes
        .iter()
        .filter(|node| node.state != NodeState::Deleted)
        .map(|node| {
            let scheduler_entry = scheduler.iter().find(|s| s.name == node.name);
            let state = match scheduler_entry {
                Some(entry) => normalize_scheduler_state(&entry.state),
                None => node.state,
            };

            let minion_key = node.minion_id.as_deref().unwrap_or(&node.name);
            let minion = minions.iter().find(|m| m.id == minion_key);

            let unknown_too_long = scheduler_entry.is_none()
                && now.signed_duration_since(node.updated_at).to_std().map_or(false, |age| {
                    age > grace_window
                });
            let attention_reason = unknown_too_long.then(|| {
                format!(
                    "not reported by the scheduler for over {}s",
                    grace_window.as_secs()
                )
            });

            NodeView {
                name: node.name.clone(),
                state,
                scheduler_state: scheduler_entry.map(|s| s.state.clone()),
                minion_id: node.minion_id.clone(),
                minion_online: minion.map(|m| m.online),
                cpus: node.resources.cpus,
                memory_mb: node.resources.memory_mb,
                needs_attention: unknown_too_long,
                attention_reason,
                removal_warning: node.removal_warning.clone(),
                updated_at: node.updated_at,
            }
        })
        .collect()
}

/// On-demand and periodic reconciliation service
pub struct Reconciler {
    registry: Arc<NodeRegistry>,
    slurm: Arc<dyn SlurmControl>,
    salt: Arc<dyn SaltApi>,
    options: ReconcilerOptions,
}

impl Reconciler {
    pub fn new(
        registry: Arc<NodeRegistry>,
        slurm: Arc<dyn SlurmControl>,
        salt: Arc<dyn SaltApi>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            registry,
            slurm,
            salt,
            options,
        }
    }

    /// Build the merged view and fold what the scheduler and control plane
    /// reported back into the registry. Degrades to registry state when a
    /// backend is unreachable rather than failing the whole view.
    pub async fn reconcile(&self) -> Result<Vec<NodeView>, ClusterError> {
        let nodes = self.registry.list().await;

        let scheduler = match self.slurm.list_nodes().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Scheduler node list unavailable: {}", e);
                Vec::new()
            }
        };

        let minions = match self.salt.list_minions().await {
            Ok(list) => list,
            Err(e) => {
                debug!("Minion list unavailable: {}", e);
                Vec::new()
            }
        };

        let views = merge(
            &nodes,
            &scheduler,
            &minions,
            self.options.grace_window,
            Utc::now(),
        );

        // Write-back: the one reconciliation path allowed to mutate state.
        for node in &nodes {
            if node.state == NodeState::Deleted {
                continue;
            }
            if let Some(entry) = scheduler.iter().find(|s| s.name == node.name) {
                let state = normalize_scheduler_state(&entry.state);
                if state != NodeState::Unknown {
                    if let Err(e) = self.registry.apply_scheduler_state(&node.name, state).await {
                        warn!("Applying scheduler state for '{}' failed: {}", node.name, e);
                    }
                }
            }
            if node.minion_id.is_none() {
                if minions.iter().any(|m| m.id == node.name) {
                    if let Err(e) = self.registry.set_minion_id(&node.name, &node.name).await {
                        warn!("Recording minion id for '{}' failed: {}", node.name, e);
                    }
                }
            }
        }

        Ok(views)
    }
}
