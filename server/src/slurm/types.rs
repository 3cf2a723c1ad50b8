//! SLURM adapter types

use serde::{Deserialize, Serialize};

/// Administrative node state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    Resume,
    Drain,
    Down,
    Idle,
}

impl NodeAction {
    /// Whether the scheduler demands a reason for this transition
    pub fn requires_reason(&self) -> bool {
        matches!(self, NodeAction::Drain | NodeAction::Down)
    }

    /// The state token scontrol expects
    pub fn scontrol_state(&self) -> &'static str {
        match self {
            NodeAction::Resume => "RESUME",
            NodeAction::Drain => "DRAIN",
            NodeAction::Down => "DOWN",
            NodeAction::Idle => "IDLE",
        }
    }
}

impl std::fmt::Display for NodeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeAction::Resume => "resume",
            NodeAction::Drain => "drain",
            NodeAction::Down => "down",
            NodeAction::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// One node as reported by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,

    /// Raw scheduler state, e.g. "idle", "alloc", "down*"
    pub state: String,

    pub cpus: u32,

    pub memory_mb: u64,

    /// Partitions the node belongs to
    pub partitions: Vec<String>,
}

/// One partition as reported by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStatus {
    pub name: String,

    /// "UP" or "DOWN"
    pub state: String,

    pub total_nodes: u32,

    pub total_cpus: u32,

    pub default: bool,
}

/// One job as reported by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub user: String,
    pub state: String,
    pub elapsed: String,
    pub nodes: u32,
    /// Node list for running jobs, wait reason for pending ones
    pub reason: String,
}

/// Read filter for job queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub user: Option<String>,
    pub partition: Option<String>,
    pub state: Option<String>,
}
