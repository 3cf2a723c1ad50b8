//! Step execution over one remote session

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::registry::Node;
use crate::remote::{RemoteExecutor, RemoteSession};
use crate::steps::plan::{StepSpec, SuccessPolicy};
use crate::tasks::model::{HostResult, StepRecord};
use crate::utils::{truncate_output, MAX_STEP_OUTPUT};

/// Step runner options
#[derive(Debug, Clone)]
pub struct StepRunnerOptions {
    /// SSH connect timeout
    pub connect_timeout: Duration,

    /// Per-command timeout
    pub command_timeout: Duration,
}

impl Default for StepRunnerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(600),
        }
    }
}

/// Runs the fixed step sequence on one host and records every step.
///
/// Execution stops at the first failing step; the remaining steps are still
/// recorded as skipped so the step list length is stable across hosts.
pub struct StepRunner {
    executor: Arc<dyn RemoteExecutor>,
    options: StepRunnerOptions,
}

impl StepRunner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, options: StepRunnerOptions) -> Self {
        Self { executor, options }
    }

    /// Execute the plan against one node. Never fails; every outcome is a
    /// `HostResult`.
    pub async fn run_host(&self, node: &Node, plan: &[StepSpec]) -> HostResult {
        let started = Instant::now();
        info!("Provisioning node '{}' ({}:{})", node.name, node.host, node.port);

        let mut session = match self
            .executor
            .open(
                &node.host,
                node.port,
                &node.credentials,
                self.options.connect_timeout,
            )
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Session to '{}' not established: {}", node.name, e);
                let reason = format!("session not established: {}", e);
                return HostResult {
                    node_name: node.name.clone(),
                    success: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                    steps: plan
                        .iter()
                        .map(|spec| StepRecord::skipped(spec.name, reason.as_str()))
                        .collect(),
                    error: Some(e.to_string()),
                };
            }
        };

        let mut steps = Vec::with_capacity(plan.len());
        let mut failed_step: Option<&'static str> = None;

        for spec in plan {
            if let Some(name) = failed_step {
                steps.push(StepRecord::skipped(
                    spec.name,
                    format!("earlier step '{}' failed", name),
                ));
                continue;
            }
            if !spec.enabled {
                steps.push(StepRecord::skipped(spec.name, "disabled by request"));
                continue;
            }

            debug!("Node '{}': running step {}", node.name, spec.name);
            let step_started = Instant::now();
            let record = match session.run(&spec.command, self.options.command_timeout).await {
                Ok(output) => {
                    let success = match spec.policy {
                        SuccessPolicy::ExitZero => output.success(),
                        SuccessPolicy::StdoutContains(marker) => output.stdout.contains(marker),
                    };
                    let mut text = output.stdout;
                    if !output.stderr.is_empty() {
                        text.push_str("\n--- stderr ---\n");
                        text.push_str(&output.stderr);
                    }
                    if !success {
                        if let Some(code) = output.exit_code {
                            text.push_str(&format!("\n(exit code {})", code));
                        }
                    }
                    StepRecord {
                        name: spec.name.to_string(),
                        success,
                        skipped: false,
                        output: truncate_output(&text, MAX_STEP_OUTPUT),
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    }
                }
                Err(e) => StepRecord {
                    name: spec.name.to_string(),
                    success: false,
                    skipped: false,
                    output: e.to_string(),
                    duration_ms: step_started.elapsed().as_millis() as u64,
                },
            };

            if !record.success {
                warn!("Node '{}': step {} failed", node.name, spec.name);
                failed_step = Some(spec.name);
            }
            steps.push(record);
        }

        // One close for every session, whatever happened above.
        if let Err(e) = session.close().await {
            warn!("Closing session to '{}' failed: {}", node.name, e);
        }

        let success = failed_step.is_none();
        if success {
            info!("Node '{}' provisioned", node.name);
        }
        HostResult {
            node_name: node.name.clone(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
            steps,
            error: failed_step.map(|name| format!("step '{}' failed", name)),
        }
    }
}
