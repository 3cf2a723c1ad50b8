//! Command execution history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ClusterError;
use crate::filesys::file::File;

/// Rows kept on disk; older entries are dropped on persist
const HISTORY_CAP: usize = 500;

/// Lifecycle of one dispatched command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Dispatched,
    Completed,
    Failed,
}

/// One ad-hoc command execution against the config-management plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecution {
    pub id: Uuid,
    /// Target glob, e.g. "*" or "node-0*"
    pub target: String,
    pub function: String,
    pub args: Vec<String>,
    pub dispatched_at: DateTime<Utc>,
    /// Control-plane job id, attached once dispatch succeeds
    #[serde(default)]
    pub jid: Option<String>,
    pub status: CommandStatus,
    /// Failure detail when status is `failed`
    #[serde(default)]
    pub detail: Option<String>,
}

impl CommandExecution {
    pub fn new(target: &str, function: &str, args: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.to_string(),
            function: function.to_string(),
            args,
            dispatched_at: Utc::now(),
            jid: None,
            status: CommandStatus::Dispatched,
            detail: None,
        }
    }
}

/// File-backed command history.
///
/// Rows are written before dispatch so an execution leaves a trace even when
/// the dispatch itself fails.
pub struct HistoryRecorder {
    file: File,
    rows: RwLock<Vec<CommandExecution>>,
}

impl HistoryRecorder {
    /// Open the history store, loading existing rows if present
    pub async fn open(file: File) -> Result<Self, ClusterError> {
        let rows: Vec<CommandExecution> = if file.exists().await {
            file.read_json().await?
        } else {
            Vec::new()
        };
        Ok(Self {
            file,
            rows: RwLock::new(rows),
        })
    }

    /// Persist a new execution row. Called before the command is dispatched.
    pub async fn record(&self, execution: CommandExecution) -> Result<Uuid, ClusterError> {
        let id = execution.id;
        let mut rows = self.rows.write().await;
        rows.push(execution);
        self.persist(&mut rows).await?;
        Ok(id)
    }

    /// Attach the control-plane job id after a successful dispatch
    pub async fn attach_jid(&self, id: Uuid, jid: &str) -> Result<(), ClusterError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ClusterError::NotFound(format!("command execution {}", id)))?;
        row.jid = Some(jid.to_string());
        self.persist(&mut rows).await
    }

    /// Mark a row failed when the dispatch itself errored
    pub async fn mark_failed(&self, id: Uuid, detail: &str) -> Result<(), ClusterError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ClusterError::NotFound(format!("command execution {}", id)))?;
        row.status = CommandStatus::Failed;
        row.detail = Some(detail.to_string());
        self.persist(&mut rows).await
    }

    /// Update a row by job id once a result becomes available.
    ///
    /// Returns false when no row carries the jid.
    pub async fn update(
        &self,
        jid: &str,
        status: CommandStatus,
        detail: Option<String>,
    ) -> Result<bool, ClusterError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|r| r.jid.as_deref() == Some(jid)) else {
            return Ok(false);
        };
        row.status = status;
        row.detail = detail;
        self.persist(&mut rows).await?;
        Ok(true)
    }

    /// Rows still waiting for a result
    pub async fn pending(&self) -> Vec<CommandExecution> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.status == CommandStatus::Dispatched && r.jid.is_some())
            .cloned()
            .collect()
    }

    /// Most-recent-first listing
    pub async fn query(&self, limit: usize) -> Vec<CommandExecution> {
        let rows = self.rows.read().await;
        rows.iter().rev().take(limit).cloned().collect()
    }

    async fn persist(&self, rows: &mut Vec<CommandExecution>) -> Result<(), ClusterError> {
        if rows.len() > HISTORY_CAP {
            let excess = rows.len() - HISTORY_CAP;
            rows.drain(..excess);
        }
        self.file.write_json(&*rows).await
    }
}
