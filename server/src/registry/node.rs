//! Node records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::Credentials;

/// Scheduler-visible availability of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unknown,
    Idle,
    Allocated,
    Draining,
    Down,
    Deleted,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Unknown => "unknown",
            NodeState::Idle => "idle",
            NodeState::Allocated => "allocated",
            NodeState::Draining => "draining",
            NodeState::Down => "down",
            NodeState::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared spec for a node joining the cluster, as submitted by the caller
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub node_name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    /// Memory in megabytes
    #[serde(default = "default_memory_mb")]
    pub memory: u64,
    /// Disk in gigabytes
    #[serde(default)]
    pub disk: Option<u64>,
    /// OS image name, e.g. "ubuntu-22.04"
    #[serde(default)]
    pub os: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_cpus() -> u32 {
    1
}

fn default_memory_mb() -> u64 {
    1024
}

/// Declared hardware resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResources {
    pub cpus: u32,
    pub memory_mb: u64,
    #[serde(default)]
    pub disk_gb: Option<u64>,
    #[serde(default)]
    pub os_image: Option<String>,
}

/// A registered compute node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node name, also the SLURM node name
    pub name: String,

    /// SSH host address
    pub host: String,

    /// SSH port
    pub port: u16,

    /// SSH credentials
    pub credentials: Credentials,

    /// Declared resources
    pub resources: NodeResources,

    /// Current state. Mutated only through registry methods driven by the
    /// Step Runner, the scheduler adapter, or reconciliation.
    pub state: NodeState,

    /// Minion id once the config-management agent registers
    #[serde(default)]
    pub minion_id: Option<String>,

    /// Set when a scale-down soft-deleted the node past the confirmation deadline
    #[serde(default)]
    pub removal_warning: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a node record from a submitted spec, in state `unknown`
    pub fn from_spec(spec: NodeSpec) -> Self {
        let now = Utc::now();
        Self {
            name: spec.node_name,
            host: spec.host,
            port: spec.port,
            credentials: Credentials::new(spec.username, spec.password),
            resources: NodeResources {
                cpus: spec.cpus,
                memory_mb: spec.memory,
                disk_gb: spec.disk,
                os_image: spec.os,
            },
            state: NodeState::Unknown,
            minion_id: None,
            removal_warning: None,
            created_at: now,
            updated_at: now,
        }
    }
}
