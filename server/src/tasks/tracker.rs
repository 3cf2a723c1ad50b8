//! Task tracker: owns task aggregates and fans out per-node work

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::ClusterError;
use crate::poll::{poll_until, PollOptions};
use crate::registry::{Node, NodeRegistry, NodeSpec};
use crate::salt::SaltApi;
use crate::slurm::{NodeAction, SlurmControl};
use crate::steps::plan::{install_plan, InstallPlanOptions, STEP_ORDER};
use crate::steps::runner::StepRunner;
use crate::tasks::model::{fold_status, HostResult, StepRecord, Task, TaskKind, TaskStatus};

/// Scale-down step identifiers
pub const STEP_REMOVE_FROM_SCHEDULER: &str = "remove_from_scheduler";
pub const STEP_DEREGISTER_MINION: &str = "deregister_minion";

const SCALE_DOWN_REASON: &str = "node decommissioned by scale-down";

/// Per-request install toggles
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest {
    pub install_saltstack: bool,
    pub install_slurm: bool,
}

impl Default for InstallRequest {
    fn default() -> Self {
        Self {
            install_saltstack: true,
            install_slurm: true,
        }
    }
}

/// Tracker options
#[derive(Debug, Clone)]
pub struct TaskTrackerOptions {
    /// Maximum hosts provisioned concurrently within one task
    pub max_concurrent_hosts: usize,

    /// Poll cadence while waiting for the scheduler to confirm a removal
    pub removal_poll: PollOptions,

    /// Address minions use to reach the Salt master
    pub salt_master_address: String,

    /// APT repository serving SaltStack packages
    pub salt_repo_url: String,
}

impl Default for TaskTrackerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_hosts: 4,
            removal_poll: PollOptions::default(),
            salt_master_address: "salt".to_string(),
            salt_repo_url: "https://packages.broadcom.com/artifactory/saltproject-deb".to_string(),
        }
    }
}

/// Owns every task aggregate and drives per-node work with bounded
/// parallelism. Reads are snapshot clones; nothing blocks on a running task.
#[derive(Clone)]
pub struct TaskTracker {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    registry: Arc<NodeRegistry>,
    step_runner: Arc<StepRunner>,
    slurm: Arc<dyn SlurmControl>,
    salt: Arc<dyn SaltApi>,
    options: TaskTrackerOptions,
}

impl TaskTracker {
    pub fn new(
        registry: Arc<NodeRegistry>,
        step_runner: Arc<StepRunner>,
        slurm: Arc<dyn SlurmControl>,
        salt: Arc<dyn SaltApi>,
        options: TaskTrackerOptions,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            registry,
            step_runner,
            slurm,
            salt,
            options,
        }
    }

    /// Register new nodes and provision them. Returns the task id
    /// immediately; callers poll `get_task`.
    pub async fn scale_up(
        &self,
        specs: Vec<NodeSpec>,
        request: InstallRequest,
    ) -> Result<Uuid, ClusterError> {
        if specs.is_empty() {
            return Err(ClusterError::ValidationError(
                "scale-up requires at least one node".to_string(),
            ));
        }
        let mut names = Vec::with_capacity(specs.len());
        for spec in &specs {
            if spec.node_name.trim().is_empty() || spec.host.trim().is_empty() {
                return Err(ClusterError::ValidationError(
                    "node_name and host are required".to_string(),
                ));
            }
            if names.contains(&spec.node_name) {
                return Err(ClusterError::ValidationError(format!(
                    "duplicate node name '{}'",
                    spec.node_name
                )));
            }
            names.push(spec.node_name.clone());
        }

        self.assert_no_conflict(&names).await?;
        self.registry.insert_specs(specs).await?;

        let mut nodes = Vec::with_capacity(names.len());
        for name in &names {
            // Just inserted above; absence would be a registry bug.
            let node = self.registry.get(name).await.ok_or_else(|| {
                ClusterError::StorageError(format!("node '{}' vanished after insert", name))
            })?;
            nodes.push(node);
        }

        let task = Task::new(TaskKind::ScaleUp, names);
        let id = task.id;
        self.tasks.write().await.insert(id, task);
        info!("Scale-up task {} created for {} nodes", id, nodes.len());

        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.run_install_task(id, nodes, request).await;
        });
        Ok(id)
    }

    /// Re-run the install sequence against registered nodes
    pub async fn install(
        &self,
        node_names: Vec<String>,
        request: InstallRequest,
    ) -> Result<Uuid, ClusterError> {
        let nodes = self.resolve_live_nodes(&node_names).await?;
        self.assert_no_conflict(&node_names).await?;

        let task = Task::new(TaskKind::Install, node_names);
        let id = task.id;
        self.tasks.write().await.insert(id, task);
        info!("Install task {} created for {} nodes", id, nodes.len());

        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.run_install_task(id, nodes, request).await;
        });
        Ok(id)
    }

    /// Remove nodes from the cluster. Node rows become `deleted` only after
    /// the scheduler confirms the removal, or after the bounded confirmation
    /// deadline (soft delete with a warning flag).
    pub async fn scale_down(&self, node_names: Vec<String>) -> Result<Uuid, ClusterError> {
        let nodes = self.resolve_live_nodes(&node_names).await?;
        self.assert_no_conflict(&node_names).await?;

        let task = Task::new(TaskKind::ScaleDown, node_names);
        let id = task.id;
        self.tasks.write().await.insert(id, task);
        info!("Scale-down task {} created for {} nodes", id, nodes.len());

        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.run_scale_down_task(id, nodes).await;
        });
        Ok(id)
    }

    /// Snapshot read for polling
    pub async fn get_task(&self, id: Uuid) -> Result<Task, ClusterError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("task {}", id)))
    }

    /// Reject a new task whose targets intersect an active task's targets
    async fn assert_no_conflict(&self, targets: &[String]) -> Result<(), ClusterError> {
        let tasks = self.tasks.read().await;
        for task in tasks.values() {
            if task.is_terminal() {
                continue;
            }
            if let Some(name) = targets.iter().find(|n| task.target_nodes.contains(n)) {
                return Err(ClusterError::Conflict(format!(
                    "node '{}' is targeted by active task {}",
                    name, task.id
                )));
            }
        }
        Ok(())
    }

    /// Look up registry rows for the given names; every name must exist and
    /// not be deleted
    async fn resolve_live_nodes(&self, names: &[String]) -> Result<Vec<Node>, ClusterError> {
        if names.is_empty() {
            return Err(ClusterError::ValidationError(
                "at least one node name is required".to_string(),
            ));
        }
        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            match self.registry.get(name).await {
                Some(node) if node.state != crate::registry::NodeState::Deleted => {
                    nodes.push(node)
                }
                _ => return Err(ClusterError::NotFound(format!("node '{}'", name))),
            }
        }
        Ok(nodes)
    }

    async fn run_install_task(&self, id: Uuid, nodes: Vec<Node>, request: InstallRequest) {
        self.mark_running(id).await;

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_hosts.max(1)));
        let mut handles = Vec::with_capacity(nodes.len());

        for node in nodes {
            let tracker = self.clone();
            let semaphore = semaphore.clone();
            let node_name = node.name.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let plan_options = InstallPlanOptions {
                    install_saltstack: request.install_saltstack,
                    install_slurm: request.install_slurm,
                    salt_master_address: tracker.options.salt_master_address.clone(),
                    salt_repo_url: tracker.options.salt_repo_url.clone(),
                };
                let plan = install_plan(&node.name, &plan_options);
                let result = tracker.step_runner.run_host(&node, &plan).await;

                let minion_id = result.success.then(|| node.name.clone());
                if let Err(e) = tracker
                    .registry
                    .mark_install_result(&node.name, result.success, minion_id)
                    .await
                {
                    error!("Recording install result for '{}' failed: {}", node.name, e);
                }
                tracker.push_host_result(id, result).await;
            });
            handles.push(async move { (node_name, handle.await) });
        }

        for (node_name, joined) in join_all(handles).await {
            if let Err(e) = joined {
                // A panicked unit must still leave a host result behind.
                error!("Install unit for '{}' aborted: {}", node_name, e);
                self.push_host_result(
                    id,
                    HostResult::aborted(&node_name, &STEP_ORDER, "install unit aborted"),
                )
                .await;
            }
        }

        self.finalize(id).await;
    }

    async fn run_scale_down_task(&self, id: Uuid, nodes: Vec<Node>) {
        self.mark_running(id).await;

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_hosts.max(1)));
        let mut handles = Vec::with_capacity(nodes.len());

        for node in nodes {
            let tracker = self.clone();
            let semaphore = semaphore.clone();
            let node_name = node.name.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = tracker.remove_node(&node).await;
                tracker.push_host_result(id, result).await;
            });
            handles.push(async move { (node_name, handle.await) });
        }

        let scale_down_steps = [STEP_REMOVE_FROM_SCHEDULER, STEP_DEREGISTER_MINION];
        for (node_name, joined) in join_all(handles).await {
            if let Err(e) = joined {
                error!("Scale-down unit for '{}' aborted: {}", node_name, e);
                self.push_host_result(
                    id,
                    HostResult::aborted(&node_name, &scale_down_steps, "scale-down unit aborted"),
                )
                .await;
            }
        }

        self.finalize(id).await;
    }

    /// Drop one node from the scheduler and the control plane
    async fn remove_node(&self, node: &Node) -> HostResult {
        let started = Instant::now();
        let mut steps = Vec::with_capacity(2);

        // 1. Scheduler drop, confirmed by polling the node list.
        let step_started = Instant::now();
        let removal = self.drop_from_scheduler(&node.name).await;
        let (removed, warning) = match removal {
            Ok(confirmed) => {
                let warning = (!confirmed).then(|| {
                    format!(
                        "scheduler did not confirm removal within {:?}; node soft-deleted",
                        self.options.removal_poll.deadline
                    )
                });
                let output = match &warning {
                    Some(text) => text.clone(),
                    None => "removed from scheduler configuration".to_string(),
                };
                steps.push(StepRecord {
                    name: STEP_REMOVE_FROM_SCHEDULER.to_string(),
                    success: true,
                    skipped: false,
                    output,
                    duration_ms: step_started.elapsed().as_millis() as u64,
                });
                (true, warning)
            }
            Err(e) => {
                steps.push(StepRecord {
                    name: STEP_REMOVE_FROM_SCHEDULER.to_string(),
                    success: false,
                    skipped: false,
                    output: e.to_string(),
                    duration_ms: step_started.elapsed().as_millis() as u64,
                });
                (false, None)
            }
        };

        // 2. Minion deregistration.
        let step_started = Instant::now();
        if !removed {
            steps.push(StepRecord::skipped(
                STEP_DEREGISTER_MINION,
                format!("earlier step '{}' failed", STEP_REMOVE_FROM_SCHEDULER),
            ));
        } else {
            match &node.minion_id {
                Some(minion_id) => match self.salt.delete_key(minion_id).await {
                    Ok(()) => steps.push(StepRecord {
                        name: STEP_DEREGISTER_MINION.to_string(),
                        success: true,
                        skipped: false,
                        output: format!("minion key '{}' deleted", minion_id),
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    }),
                    Err(e) => {
                        warn!("Deleting minion key for '{}' failed: {}", node.name, e);
                        steps.push(StepRecord {
                            name: STEP_DEREGISTER_MINION.to_string(),
                            success: false,
                            skipped: false,
                            output: e.to_string(),
                            duration_ms: step_started.elapsed().as_millis() as u64,
                        });
                    }
                },
                None => steps.push(StepRecord::skipped(
                    STEP_DEREGISTER_MINION,
                    "no registered minion",
                )),
            }
        }

        if removed {
            if let Err(e) = self.registry.soft_delete(&node.name, warning).await {
                error!("Soft-deleting '{}' failed: {}", node.name, e);
            }
        }

        let success = !steps.iter().any(|s| !s.success && !s.skipped);
        HostResult {
            node_name: node.name.clone(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
            steps,
            error: (!success).then(|| "node removal failed".to_string()),
        }
    }

    /// Issue the scheduler drop and wait for the node to disappear from the
    /// node list. Ok(true) means confirmed, Ok(false) means the deadline
    /// passed without confirmation.
    async fn drop_from_scheduler(&self, name: &str) -> Result<bool, ClusterError> {
        // Push the node down first so the scheduler stops placing jobs on it.
        // Rejection because the node is already down is fine.
        let names = vec![name.to_string()];
        if let Err(e) = self
            .slurm
            .manage_nodes(&names, NodeAction::Down, SCALE_DOWN_REASON)
            .await
        {
            match e {
                ClusterError::InvalidStateTransition(_) => {}
                other => return Err(other),
            }
        }

        self.slurm.delete_node(name).await?;

        let slurm = self.slurm.clone();
        let confirmed = poll_until(&self.options.removal_poll, || {
            let slurm = slurm.clone();
            let name = name.to_string();
            async move {
                match slurm.list_nodes().await {
                    Ok(nodes) => (!nodes.iter().any(|n| n.name == name)).then_some(()),
                    // Transient controller failures keep the poll running.
                    Err(_) => None,
                }
            }
        })
        .await;

        match confirmed {
            Ok(()) => Ok(true),
            Err(ClusterError::TimeoutError(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn mark_running(&self, id: Uuid) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
        }
    }

    async fn push_host_result(&self, id: Uuid, result: HostResult) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.host_results.push(result);
        }
    }

    /// Mark the task terminal once every host result is in
    async fn finalize(&self, id: Uuid) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.status = fold_status(&task.host_results);
            task.completed_at = Some(Utc::now());
            info!("Task {} finished with status {:?}", id, task.status);
        }
    }
}
