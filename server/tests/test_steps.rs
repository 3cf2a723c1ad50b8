//! Step runner tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use clusterd::errors::ClusterError;
use clusterd::registry::{Node, NodeSpec};
use clusterd::remote::{CommandOutput, Credentials, RemoteExecutor, RemoteSession};
use clusterd::steps::plan::{
    install_plan, InstallPlanOptions, STEP_CONFIGURE_APT_SOURCE, STEP_FINAL_VERIFICATION,
    STEP_INSTALL_SALTSTACK_MINION, STEP_INSTALL_SLURM_CLIENT, STEP_ORDER,
};
use clusterd::steps::{StepRunner, StepRunnerOptions};

fn test_node(name: &str) -> Node {
    Node::from_spec(NodeSpec {
        node_name: name.to_string(),
        host: format!("{}.test", name),
        port: 22,
        username: "root".to_string(),
        password: "secret".to_string(),
        cpus: 4,
        memory: 8192,
        disk: None,
        os: Some("ubuntu-22.04".to_string()),
    })
}

fn plan_options() -> InstallPlanOptions {
    InstallPlanOptions {
        install_saltstack: true,
        install_slurm: true,
        salt_master_address: "salt.test".to_string(),
        salt_repo_url: "https://repo.test/salt".to_string(),
    }
}

fn runner_options() -> StepRunnerOptions {
    StepRunnerOptions {
        connect_timeout: Duration::from_millis(100),
        command_timeout: Duration::from_millis(500),
    }
}

/// Executor whose sessions fail any command containing the marker
struct ScriptedExecutor {
    fail_marker: Option<&'static str>,
    refuse_connect: bool,
}

struct ScriptedSession {
    fail_marker: Option<&'static str>,
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn open(
        &self,
        host: &str,
        _port: u16,
        _credentials: &Credentials,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, ClusterError> {
        if self.refuse_connect {
            return Err(ClusterError::ConnectError(format!("{}: unreachable", host)));
        }
        Ok(Box::new(ScriptedSession {
            fail_marker: self.fail_marker,
        }))
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(
        &mut self,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ClusterError> {
        if let Some(marker) = self.fail_marker {
            if command.contains(marker) {
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "E: Unable to locate package".to_string(),
                    exit_code: Some(100),
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

#[tokio::test]
async fn test_all_steps_succeed_in_order() {
    let runner = StepRunner::new(
        Arc::new(ScriptedExecutor {
            fail_marker: None,
            refuse_connect: false,
        }),
        runner_options(),
    );
    let node = test_node("n1");
    let plan = install_plan(&node.name, &plan_options());

    let result = runner.run_host(&node, &plan).await;

    assert!(result.success);
    assert!(result.error.is_none());
    let names: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, STEP_ORDER);
    assert!(result.steps.iter().all(|s| s.success && !s.skipped));
}

#[tokio::test]
async fn test_failure_stops_execution_and_records_skips() {
    // Fail the salt-minion install; the apt source step does not contain
    // the marker.
    let runner = StepRunner::new(
        Arc::new(ScriptedExecutor {
            fail_marker: Some("apt-get install -y -qq salt-minion"),
            refuse_connect: false,
        }),
        runner_options(),
    );
    let node = test_node("n2");
    let plan = install_plan(&node.name, &plan_options());

    let result = runner.run_host(&node, &plan).await;

    assert!(!result.success);
    assert_eq!(result.steps.len(), STEP_ORDER.len());

    assert!(result.steps[0].success);
    assert_eq!(result.steps[1].name, STEP_INSTALL_SALTSTACK_MINION);
    assert!(!result.steps[1].success);
    assert!(!result.steps[1].skipped);

    // Later steps are present but skipped, naming the failing step.
    for step in &result.steps[2..] {
        assert!(step.skipped);
        assert!(step.output.contains(STEP_INSTALL_SALTSTACK_MINION));
    }
    assert_eq!(result.steps[2].name, STEP_INSTALL_SLURM_CLIENT);
    assert_eq!(result.steps[3].name, STEP_FINAL_VERIFICATION);
}

#[tokio::test]
async fn test_disabled_steps_do_not_fail_the_host() {
    let runner = StepRunner::new(
        Arc::new(ScriptedExecutor {
            fail_marker: None,
            refuse_connect: false,
        }),
        runner_options(),
    );
    let node = test_node("n3");
    let plan = install_plan(
        &node.name,
        &InstallPlanOptions {
            install_saltstack: false,
            ..plan_options()
        },
    );

    let result = runner.run_host(&node, &plan).await;

    assert!(result.success);
    assert_eq!(result.steps.len(), STEP_ORDER.len());
    let minion_step = &result.steps[1];
    assert!(minion_step.skipped);
    assert!(minion_step.output.contains("disabled by request"));
}

#[tokio::test]
async fn test_connect_failure_keeps_step_list_shape() {
    let runner = StepRunner::new(
        Arc::new(ScriptedExecutor {
            fail_marker: None,
            refuse_connect: true,
        }),
        runner_options(),
    );
    let node = test_node("n4");
    let plan = install_plan(&node.name, &plan_options());

    let result = runner.run_host(&node, &plan).await;

    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(result.steps.len(), STEP_ORDER.len());
    assert_eq!(result.steps[0].name, STEP_CONFIGURE_APT_SOURCE);
    assert!(result.steps.iter().all(|s| s.skipped));
}

/// Session that exits 0 without printing the verification marker
struct SilentSession;

#[async_trait]
impl RemoteSession for SilentSession {
    async fn run(
        &mut self,
        _command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, ClusterError> {
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    async fn close(&mut self) -> Result<(), ClusterError> {
        Ok(())
    }
}

struct SilentExecutor;

#[async_trait]
impl RemoteExecutor for SilentExecutor {
    async fn open(
        &self,
        _host: &str,
        _port: u16,
        _credentials: &Credentials,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, ClusterError> {
        Ok(Box::new(SilentSession))
    }
}

#[tokio::test]
async fn test_verification_requires_ready_marker() {
    let runner = StepRunner::new(Arc::new(SilentExecutor), runner_options());
    let node = test_node("n5");
    let plan = install_plan(&node.name, &plan_options());

    let result = runner.run_host(&node, &plan).await;

    // Every exit-zero step passes, but verification needs "ready" on stdout.
    assert!(!result.success);
    let verification = result
        .steps
        .iter()
        .find(|s| s.name == STEP_FINAL_VERIFICATION)
        .unwrap();
    assert!(!verification.success);
    assert!(!verification.skipped);
}
