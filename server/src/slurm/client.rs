//! SLURM controller client
//!
//! Drives the cluster controller through its command-line tools
//! (`scontrol`, `sinfo`, `squeue`) with machine-readable output formats.

use std::collections::BTreeMap;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::ClusterError;
use crate::slurm::types::{JobFilter, JobStatus, NodeAction, NodeStatus, PartitionStatus};

const SINFO_NODE_FORMAT: &str = "%N|%T|%c|%m|%P";
const SQUEUE_JOB_FORMAT: &str = "%i|%j|%u|%T|%M|%D|%R";

/// Scheduler control interface
#[async_trait]
pub trait SlurmControl: Send + Sync {
    /// Transition nodes to a new administrative state.
    ///
    /// Drain/down transitions always reach the controller with a non-empty
    /// reason; a missing one is replaced with the configured default.
    async fn manage_nodes(
        &self,
        names: &[String],
        action: NodeAction,
        reason: &str,
    ) -> Result<(), ClusterError>;

    /// Remove a node from the scheduler configuration
    async fn delete_node(&self, name: &str) -> Result<(), ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>, ClusterError>;

    async fn list_partitions(&self) -> Result<Vec<PartitionStatus>, ClusterError>;

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobStatus>, ClusterError>;
}

/// Options for the scontrol-backed controller
#[derive(Debug, Clone)]
pub struct SlurmControllerOptions {
    /// Reason injected for drain/down requests that carry none
    pub default_reason: String,
}

impl Default for SlurmControllerOptions {
    fn default() -> Self {
        Self {
            default_reason: "administrative action via clusterd".to_string(),
        }
    }
}

/// scontrol/sinfo/squeue-backed implementation
pub struct SlurmController {
    options: SlurmControllerOptions,
}

impl SlurmController {
    pub fn new(options: SlurmControllerOptions) -> Self {
        Self { options }
    }

    async fn run_tool(&self, program: &str, args: &[String]) -> Result<String, ClusterError> {
        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ClusterError::Unreachable(format!("{}: {}", program, e)))?;
        map_tool_output(program, output)
    }
}

#[async_trait]
impl SlurmControl for SlurmController {
    async fn manage_nodes(
        &self,
        names: &[String],
        action: NodeAction,
        reason: &str,
    ) -> Result<(), ClusterError> {
        if names.is_empty() {
            return Err(ClusterError::ValidationError(
                "no node names given".to_string(),
            ));
        }
        let reason = effective_reason(action, reason, &self.options.default_reason);
        let args = build_update_args(names, action, reason.as_deref());
        self.run_tool("scontrol", &args).await?;
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<(), ClusterError> {
        let args = vec!["delete".to_string(), format!("NodeName={}", name)];
        self.run_tool("scontrol", &args).await?;
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>, ClusterError> {
        let args = vec![
            "-N".to_string(),
            "-h".to_string(),
            "-o".to_string(),
            SINFO_NODE_FORMAT.to_string(),
        ];
        let output = self.run_tool("sinfo", &args).await?;
        Ok(parse_sinfo_nodes(&output))
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionStatus>, ClusterError> {
        let args = vec!["show".to_string(), "partition".to_string(), "-o".to_string()];
        let output = self.run_tool("scontrol", &args).await?;
        Ok(parse_scontrol_partitions(&output))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobStatus>, ClusterError> {
        let mut args = vec![
            "-h".to_string(),
            "-o".to_string(),
            SQUEUE_JOB_FORMAT.to_string(),
        ];
        if let Some(user) = &filter.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        if let Some(partition) = &filter.partition {
            args.push("-p".to_string());
            args.push(partition.clone());
        }
        if let Some(state) = &filter.state {
            args.push("-t".to_string());
            args.push(state.clone());
        }
        let output = self.run_tool("squeue", &args).await?;
        Ok(parse_squeue_jobs(&output))
    }
}

/// Resolve the reason string the controller will receive.
///
/// Drain/down must carry one; an empty caller-supplied reason is replaced
/// with the default rather than rejected. Resume/idle take none.
pub fn effective_reason(action: NodeAction, reason: &str, default_reason: &str) -> Option<String> {
    if !action.requires_reason() {
        return None;
    }
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        Some(default_reason.to_string())
    } else {
        Some(trimmed.to_string())
    }
}

/// Build the scontrol update argument list
pub fn build_update_args(
    names: &[String],
    action: NodeAction,
    reason: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "update".to_string(),
        format!("NodeName={}", names.join(",")),
        format!("State={}", action.scontrol_state()),
    ];
    if let Some(reason) = reason {
        args.push(format!("Reason={}", reason));
    }
    args
}

fn map_tool_output(program: &str, output: Output) -> Result<String, ClusterError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let lowered = stderr.to_lowercase();
    if lowered.contains("invalid node state") || lowered.contains("invalid user action") {
        return Err(ClusterError::InvalidStateTransition(stderr));
    }
    if lowered.contains("unable to contact slurm controller")
        || lowered.contains("connection refused")
        || lowered.contains("zero bytes")
    {
        return Err(ClusterError::Unreachable(stderr));
    }
    warn!("{} failed: {}", program, stderr);
    Err(ClusterError::ServerError(format!(
        "{} failed: {}",
        program, stderr
    )))
}

/// Parse `sinfo -N -h -o "%N|%T|%c|%m|%P"` output.
///
/// sinfo repeats a node once per partition; rows are merged on name.
fn parse_sinfo_nodes(output: &str) -> Vec<NodeStatus> {
    let mut nodes: BTreeMap<String, NodeStatus> = BTreeMap::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.trim().split('|').collect();
        if fields.len() < 5 || fields[0].is_empty() {
            continue;
        }
        let partition = fields[4].trim_end_matches('*').to_string();
        let entry = nodes.entry(fields[0].to_string()).or_insert_with(|| NodeStatus {
            name: fields[0].to_string(),
            state: fields[1].to_string(),
            cpus: fields[2].parse().unwrap_or(0),
            memory_mb: fields[3].parse().unwrap_or(0),
            partitions: Vec::new(),
        });
        if !partition.is_empty() && !entry.partitions.contains(&partition) {
            entry.partitions.push(partition);
        }
    }
    nodes.into_values().collect()
}

/// Parse `scontrol show partition -o` output (one key=value record per line)
fn parse_scontrol_partitions(output: &str) -> Vec<PartitionStatus> {
    output
        .lines()
        .filter_map(|line| {
            let fields = parse_kv_line(line);
            let name = fields.get("PartitionName")?.clone();
            Some(PartitionStatus {
                name,
                state: fields.get("State").cloned().unwrap_or_default(),
                total_nodes: fields
                    .get("TotalNodes")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                total_cpus: fields
                    .get("TotalCPUs")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                default: fields.get("Default").map(|v| v == "YES").unwrap_or(false),
            })
        })
        .collect()
}

/// Parse one scontrol `Key=Value Key=Value ...` line
fn parse_kv_line(line: &str) -> BTreeMap<String, String> {
    line.split_whitespace()
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse `squeue -h -o "%i|%j|%u|%T|%M|%D|%R"` output
fn parse_squeue_jobs(output: &str) -> Vec<JobStatus> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim().split('|').collect();
            if fields.len() < 7 || fields[0].is_empty() {
                return None;
            }
            Some(JobStatus {
                id: fields[0].to_string(),
                name: fields[1].to_string(),
                user: fields[2].to_string(),
                state: fields[3].to_string(),
                elapsed: fields[4].to_string(),
                nodes: fields[5].parse().unwrap_or(0),
                reason: fields[6].to_string(),
            })
        })
        .collect()
}
