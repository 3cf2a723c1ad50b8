//! Salt adapter types
//!
//! The control plane is loose about field names across API versions; the
//! serde aliases translating them live here and nowhere else. The rest of
//! the daemon sees only these canonical shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata of one salt job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltJob {
    #[serde(default)]
    pub jid: String,

    #[serde(alias = "Function", alias = "fun")]
    pub function: String,

    #[serde(default, alias = "Target", alias = "tgt")]
    pub target: String,

    #[serde(default, alias = "User")]
    pub user: Option<String>,

    #[serde(default, alias = "StartTime", alias = "start_time")]
    pub started_at: Option<String>,
}

/// Per-minion return values of one job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub jid: String,

    /// Minion id -> raw return value; empty while the job is still running
    pub returns: HashMap<String, serde_json::Value>,
}

impl JobResult {
    /// Whether any minion has returned yet
    pub fn has_returns(&self) -> bool {
        !self.returns.is_empty()
    }
}

/// Presence of one minion on the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinionStatus {
    pub id: String,
    pub online: bool,
}

/// Minion counts for the integration view
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinionSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
}

/// Aggregated control plane health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationStatus {
    pub enabled: bool,

    /// "up" | "down" | "disabled"
    pub master_status: String,

    /// "up" | "down" | "disabled"
    pub api_status: String,

    pub minions: MinionSummary,

    pub recent_jobs: Vec<SaltJob>,
}

impl IntegrationStatus {
    /// Status reported when the integration is switched off in settings
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            master_status: "disabled".to_string(),
            api_status: "disabled".to_string(),
            minions: MinionSummary::default(),
            recent_jobs: Vec::new(),
        }
    }
}

/// Up/down lists as returned by the `manage.status` runner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManageStatus {
    #[serde(default)]
    pub up: Vec<String>,

    #[serde(default)]
    pub down: Vec<String>,
}
