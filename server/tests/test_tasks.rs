//! Task tracker tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use clusterd::errors::ClusterError;
use clusterd::poll::PollOptions;
use clusterd::registry::{NodeRegistry, NodeSpec, NodeState};
use clusterd::remote::{CommandOutput, Credentials, RemoteExecutor, RemoteSession};
use clusterd::salt::{IntegrationStatus, JobResult, MinionStatus, SaltApi, SaltJob};
use clusterd::slurm::{
    JobFilter, JobStatus, NodeAction, NodeStatus, PartitionStatus, SlurmControl,
};
use clusterd::steps::plan::{STEP_INSTALL_SALTSTACK_MINION, STEP_ORDER};
use clusterd::steps::{StepRunner, StepRunnerOptions};
use clusterd::tasks::tracker::{
    InstallRequest, STEP_DEREGISTER_MINION, STEP_REMOVE_FROM_SCHEDULER,
};
use clusterd::tasks::{Task, TaskStatus, TaskTracker, TaskTrackerOptions};

// ------------------------------- fakes --------------------------------- //

/// Executor failing a chosen command marker on chosen hosts, optionally
/// gated so sessions only open once permits are released.
struct FakeExecutor {
    /// host -> command marker that fails on that host
    failures: HashMap<String, &'static str>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeExecutor {
    fn passing() -> Self {
        Self {
            failures: HashMap::new(),
            gate: None,
        }
    }
}

struct FakeSession {
    fail_marker: Option<&'static str>,
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn open(
        &self,
        host: &str,
        _port: u16,
        _credentials: &Credentials,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, ClusterError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| {
                ClusterError::ConnectError("gate closed".to_string())
            })?;
        }
        Ok(Box::new(FakeSession {
            fail_marker: self.failures.get(host).copied(),
        }))
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn run(
        &mut self,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ClusterError> {
        if let Some(marker) = self.fail_marker {
            if command.contains(marker) {
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "install failed".to_string(),
                    exit_code: Some(1),
                });
            }
        }
        Ok(CommandOutput {
            stdout: "ready\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    async fn close(&mut self) -> Result<(), ClusterError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeSlurm {
    manage_calls: Mutex<Vec<(Vec<String>, NodeAction, String)>>,
    deleted: Mutex<Vec<String>>,
    /// Nodes the scheduler keeps reporting even after a delete
    sticky_nodes: Mutex<Vec<String>>,
}

#[async_trait]
impl SlurmControl for FakeSlurm {
    async fn manage_nodes(
        &self,
        names: &[String],
        action: NodeAction,
        reason: &str,
    ) -> Result<(), ClusterError> {
        self.manage_calls
            .lock()
            .await
            .push((names.to_vec(), action, reason.to_string()));
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<(), ClusterError> {
        self.deleted.lock().await.push(name.to_string());
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>, ClusterError> {
        Ok(self
            .sticky_nodes
            .lock()
            .await
            .iter()
            .map(|name| NodeStatus {
                name: name.clone(),
                state: "down".to_string(),
                cpus: 4,
                memory_mb: 8192,
                partitions: vec!["batch".to_string()],
            })
            .collect())
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionStatus>, ClusterError> {
        Ok(Vec::new())
    }

    async fn list_jobs(&self, _filter: &JobFilter) -> Result<Vec<JobStatus>, ClusterError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeSalt {
    deleted_keys: Mutex<Vec<String>>,
}

#[async_trait]
impl SaltApi for FakeSalt {
    async fn execute(
        &self,
        _target: &str,
        _function: &str,
        _args: &[String],
    ) -> Result<String, ClusterError> {
        Ok("20260806120000000000".to_string())
    }

    async fn get_job(&self, jid: &str) -> Result<JobResult, ClusterError> {
        Ok(JobResult {
            jid: jid.to_string(),
            returns: HashMap::new(),
        })
    }

    async fn list_jobs(&self) -> Result<Vec<SaltJob>, ClusterError> {
        Ok(Vec::new())
    }

    async fn list_minions(&self) -> Result<Vec<MinionStatus>, ClusterError> {
        Ok(Vec::new())
    }

    async fn delete_key(&self, minion_id: &str) -> Result<(), ClusterError> {
        self.deleted_keys.lock().await.push(minion_id.to_string());
        Ok(())
    }

    async fn status(&self) -> Result<IntegrationStatus, ClusterError> {
        Ok(IntegrationStatus::disabled())
    }
}

// ------------------------------ helpers -------------------------------- //

fn spec(name: &str) -> NodeSpec {
    NodeSpec {
        node_name: name.to_string(),
        host: name.to_string(),
        port: 22,
        username: "root".to_string(),
        password: "secret".to_string(),
        cpus: 4,
        memory: 8192,
        disk: None,
        os: None,
    }
}

struct Harness {
    tracker: TaskTracker,
    registry: Arc<NodeRegistry>,
    slurm: Arc<FakeSlurm>,
    salt: Arc<FakeSalt>,
    _dir: tempfile::TempDir,
}

async fn harness(executor: FakeExecutor) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(
        NodeRegistry::open(clusterd::filesys::file::File::new(dir.path().join("nodes.json")))
            .await
            .unwrap(),
    );
    let slurm = Arc::new(FakeSlurm::default());
    let salt = Arc::new(FakeSalt::default());
    let step_runner = Arc::new(StepRunner::new(
        Arc::new(executor),
        StepRunnerOptions {
            connect_timeout: Duration::from_millis(100),
            command_timeout: Duration::from_millis(500),
        },
    ));
    let tracker = TaskTracker::new(
        registry.clone(),
        step_runner,
        slurm.clone(),
        salt.clone(),
        TaskTrackerOptions {
            max_concurrent_hosts: 2,
            removal_poll: PollOptions {
                interval: Duration::from_millis(10),
                deadline: Duration::from_millis(200),
            },
            ..Default::default()
        },
    );
    Harness {
        tracker,
        registry,
        slurm,
        salt,
        _dir: dir,
    }
}

async fn await_terminal(tracker: &TaskTracker, id: Uuid) -> Task {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let task = tracker.get_task(id).await.unwrap();
            if task.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not reach a terminal status")
}

// ------------------------------- tests --------------------------------- //

#[tokio::test]
async fn test_scale_up_produces_one_result_per_node() {
    let h = harness(FakeExecutor::passing()).await;
    let id = h
        .tracker
        .scale_up(
            vec![spec("n1"), spec("n2"), spec("n3")],
            InstallRequest::default(),
        )
        .await
        .unwrap();

    let task = await_terminal(&h.tracker, id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.host_results.len(), 3);
    let mut names: Vec<&str> = task
        .host_results
        .iter()
        .map(|r| r.node_name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["n1", "n2", "n3"]);

    // Step order is identical on every host.
    for result in &task.host_results {
        let steps: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(steps, STEP_ORDER);
    }

    // Successful installs leave the nodes idle with a minion id.
    for name in ["n1", "n2", "n3"] {
        let node = h.registry.get(name).await.unwrap();
        assert_eq!(node.state, NodeState::Idle);
        assert_eq!(node.minion_id.as_deref(), Some(name));
    }
}

#[tokio::test]
async fn test_scale_up_partial_failure() {
    let mut executor = FakeExecutor::passing();
    executor
        .failures
        .insert("n2".to_string(), "apt-get install -y -qq salt-minion");
    let h = harness(executor).await;

    let id = h
        .tracker
        .scale_up(
            vec![spec("n1"), spec("n2"), spec("n3")],
            InstallRequest::default(),
        )
        .await
        .unwrap();
    let task = await_terminal(&h.tracker, id).await;

    assert_eq!(task.status, TaskStatus::Partial);
    assert_eq!(task.host_results.len(), 3);

    let n2 = task
        .host_results
        .iter()
        .find(|r| r.node_name == "n2")
        .unwrap();
    assert!(!n2.success);
    let failing = n2.steps.iter().find(|s| !s.success && !s.skipped).unwrap();
    assert_eq!(failing.name, STEP_INSTALL_SALTSTACK_MINION);

    for name in ["n1", "n3"] {
        let result = task
            .host_results
            .iter()
            .find(|r| r.node_name == name)
            .unwrap();
        assert!(result.success);
    }

    // The failed node is down, the others idle.
    assert_eq!(h.registry.get("n2").await.unwrap().state, NodeState::Down);
    assert_eq!(h.registry.get("n1").await.unwrap().state, NodeState::Idle);
}

#[tokio::test]
async fn test_scale_up_rejects_duplicate_names() {
    let h = harness(FakeExecutor::passing()).await;
    let result = h
        .tracker
        .scale_up(vec![spec("n1"), spec("n1")], InstallRequest::default())
        .await;
    assert!(matches!(result, Err(ClusterError::ValidationError(_))));
}

#[tokio::test]
async fn test_conflicting_task_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let executor = FakeExecutor {
        failures: HashMap::new(),
        gate: Some(gate.clone()),
    };
    let h = harness(executor).await;

    let id = h
        .tracker
        .scale_up(vec![spec("n1")], InstallRequest::default())
        .await
        .unwrap();

    // n1 is owned by the active task; both task kinds must refuse it.
    let scale_down = h.tracker.scale_down(vec!["n1".to_string()]).await;
    assert!(matches!(scale_down, Err(ClusterError::Conflict(_))));
    let install = h
        .tracker
        .install(vec!["n1".to_string()], InstallRequest::default())
        .await;
    assert!(matches!(install, Err(ClusterError::Conflict(_))));

    // Release the gate and let the task finish; afterwards the name is free.
    gate.add_permits(16);
    let task = await_terminal(&h.tracker, id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    let install = h
        .tracker
        .install(vec!["n1".to_string()], InstallRequest::default())
        .await;
    assert!(install.is_ok());
}

#[tokio::test]
async fn test_get_task_unknown_id() {
    let h = harness(FakeExecutor::passing()).await;
    let result = h.tracker.get_task(Uuid::new_v4()).await;
    assert!(matches!(result, Err(ClusterError::NotFound(_))));
}

#[tokio::test]
async fn test_scale_down_unknown_node() {
    let h = harness(FakeExecutor::passing()).await;
    let result = h.tracker.scale_down(vec!["ghost".to_string()]).await;
    assert!(matches!(result, Err(ClusterError::NotFound(_))));
}

#[tokio::test]
async fn test_scale_down_removes_and_soft_deletes() {
    let h = harness(FakeExecutor::passing()).await;

    // Provision first so the node exists with a minion id.
    let id = h
        .tracker
        .scale_up(vec![spec("n1")], InstallRequest::default())
        .await
        .unwrap();
    await_terminal(&h.tracker, id).await;

    let id = h.tracker.scale_down(vec!["n1".to_string()]).await.unwrap();
    let task = await_terminal(&h.tracker, id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.host_results.len(), 1);
    let result = &task.host_results[0];
    let steps: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(steps, vec![STEP_REMOVE_FROM_SCHEDULER, STEP_DEREGISTER_MINION]);

    // The scheduler drop carried a non-empty reason and a delete.
    let calls = h.slurm.manage_calls.lock().await;
    assert!(calls
        .iter()
        .any(|(names, action, reason)| names == &vec!["n1".to_string()]
            && *action == NodeAction::Down
            && !reason.is_empty()));
    assert_eq!(h.slurm.deleted.lock().await.as_slice(), ["n1".to_string()]);

    // Minion key removed, row soft-deleted without warning.
    assert_eq!(h.salt.deleted_keys.lock().await.as_slice(), ["n1".to_string()]);
    let node = h.registry.get("n1").await.unwrap();
    assert_eq!(node.state, NodeState::Deleted);
    assert!(node.removal_warning.is_none());
}

#[tokio::test]
async fn test_scale_down_unconfirmed_removal_soft_deletes_with_warning() {
    let h = harness(FakeExecutor::passing()).await;

    let id = h
        .tracker
        .scale_up(vec![spec("n1")], InstallRequest::default())
        .await
        .unwrap();
    await_terminal(&h.tracker, id).await;

    // The scheduler never stops reporting the node; removal must not block
    // past the deadline.
    h.slurm.sticky_nodes.lock().await.push("n1".to_string());

    let id = h.tracker.scale_down(vec!["n1".to_string()]).await.unwrap();
    let task = await_terminal(&h.tracker, id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    let removal = &task.host_results[0].steps[0];
    assert!(removal.success);
    assert!(removal.output.contains("did not confirm"));

    let node = h.registry.get("n1").await.unwrap();
    assert_eq!(node.state, NodeState::Deleted);
    assert!(node.removal_warning.is_some());
}
