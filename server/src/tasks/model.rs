//! Task aggregate: one orchestration request across one or more nodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ScaleUp,
    ScaleDown,
    Install,
}

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Partial
        )
    }
}

/// Outcome of one step on one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Stable step identifier
    pub name: String,

    /// True only for an executed step that met its success policy.
    /// Skipped steps carry false; check `skipped` to tell them apart.
    pub success: bool,

    /// True when the step never ran (earlier failure, disabled by request,
    /// or no session)
    pub skipped: bool,

    /// Captured command output, or the skip reason
    pub output: String,

    pub duration_ms: u64,
}

impl StepRecord {
    pub fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            skipped: true,
            output: format!("skipped: {}", reason.into()),
            duration_ms: 0,
        }
    }
}

/// Per-node outcome within a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResult {
    pub node_name: String,

    pub success: bool,

    pub duration_ms: u64,

    /// Strictly ordered; same length for every host of a task
    pub steps: Vec<StepRecord>,

    #[serde(default)]
    pub error: Option<String>,
}

impl HostResult {
    /// Result for a host whose per-node unit never produced one (the unit
    /// panicked or was torn down). Every planned step is recorded as skipped
    /// so the step list keeps its shape.
    pub fn aborted(node_name: &str, step_names: &[&str], reason: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            success: false,
            duration_ms: 0,
            steps: step_names
                .iter()
                .map(|name| StepRecord::skipped(name, reason))
                .collect(),
            error: Some(reason.to_string()),
        }
    }
}

/// One orchestration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,

    /// Requested node names, in request order
    pub target_nodes: Vec<String>,

    /// One entry per finished host; grows while the task runs
    pub host_results: Vec<HostResult>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(kind: TaskKind, target_nodes: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TaskStatus::Pending,
            target_nodes,
            host_results: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Overall status from a complete set of host results: completed when every
/// host succeeded, failed when every host failed, partial otherwise.
pub fn fold_status(results: &[HostResult]) -> TaskStatus {
    let succeeded = results.iter().filter(|r| r.success).count();
    if succeeded == results.len() {
        TaskStatus::Completed
    } else if succeeded == 0 {
        TaskStatus::Failed
    } else {
        TaskStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, success: bool) -> HostResult {
        HostResult {
            node_name: name.to_string(),
            success,
            duration_ms: 10,
            steps: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_fold_status_all_succeeded() {
        let results = vec![host("n1", true), host("n2", true)];
        assert_eq!(fold_status(&results), TaskStatus::Completed);
    }

    #[test]
    fn test_fold_status_all_failed() {
        let results = vec![host("n1", false), host("n2", false)];
        assert_eq!(fold_status(&results), TaskStatus::Failed);
    }

    #[test]
    fn test_fold_status_mixed_is_partial() {
        let results = vec![host("n1", true), host("n2", false), host("n3", true)];
        assert_eq!(fold_status(&results), TaskStatus::Partial);
    }
}
