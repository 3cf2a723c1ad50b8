//! salt-api client
//!
//! Talks to the salt-api (rest_cherrypy) endpoint. Authentication happens
//! per request with eauth credentials; there is no token/session cache.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::errors::ClusterError;
use crate::salt::types::{
    IntegrationStatus, JobResult, ManageStatus, MinionStatus, MinionSummary, SaltJob,
};

const RECENT_JOBS: usize = 10;

/// Config-management control interface
#[async_trait]
pub trait SaltApi: Send + Sync {
    /// Dispatch an asynchronous command across hosts matching `target`.
    /// Returns the job id immediately; callers poll for completion.
    async fn execute(
        &self,
        target: &str,
        function: &str,
        args: &[String],
    ) -> Result<String, ClusterError>;

    /// Look up the returns of one job
    async fn get_job(&self, jid: &str) -> Result<JobResult, ClusterError>;

    /// List known jobs, most recent first
    async fn list_jobs(&self) -> Result<Vec<SaltJob>, ClusterError>;

    /// List minions with their presence
    async fn list_minions(&self) -> Result<Vec<MinionStatus>, ClusterError>;

    /// Remove a minion key from the master
    async fn delete_key(&self, minion_id: &str) -> Result<(), ClusterError>;

    /// Aggregate control-plane health.
    ///
    /// Fails with `ServiceUnavailable` when the API cannot be reached; a
    /// reachable plane reporting zero minions is a valid healthy state.
    async fn status(&self) -> Result<IntegrationStatus, ClusterError>;
}

/// Options for the salt-api client
#[derive(Debug, Clone)]
pub struct SaltApiOptions {
    pub enabled: bool,
    pub api_url: Url,
    pub username: String,
    pub password: SecretString,
    pub eauth: String,
    pub timeout: Duration,
}

/// HTTP client for the salt-api endpoint
pub struct SaltApiClient {
    client: reqwest::Client,
    options: SaltApiOptions,
}

impl SaltApiClient {
    pub fn new(options: SaltApiOptions) -> Result<Self, ClusterError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ClusterError::ConfigError(e.to_string()))?;
        Ok(Self { client, options })
    }

    fn run_url(&self) -> Result<Url, ClusterError> {
        self.options
            .api_url
            .join("run")
            .map_err(|e| ClusterError::ConfigError(e.to_string()))
    }

    /// POST one call to /run and unwrap the first element of `return`
    async fn run_call(&self, mut call: serde_json::Map<String, Value>) -> Result<Value, ClusterError> {
        if !self.options.enabled {
            return Err(ClusterError::ServiceUnavailable(
                "salt integration is disabled".to_string(),
            ));
        }

        call.insert("username".to_string(), json!(self.options.username));
        call.insert(
            "password".to_string(),
            json!(self.options.password.expose_secret()),
        );
        call.insert("eauth".to_string(), json!(self.options.eauth));

        let url = self.run_url()?;
        debug!("POST {} ({})", url, call.get("fun").cloned().unwrap_or_default());

        let response = self
            .client
            .post(url)
            .json(&json!([Value::Object(call)]))
            .send()
            .await
            .map_err(|e| ClusterError::ServiceUnavailable(format!("salt-api: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClusterError::AuthError(
                "salt-api rejected the configured eauth credentials".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::ServiceUnavailable(format!(
                "salt-api returned {}: {}",
                status, body
            )));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| ClusterError::ServerError(format!("salt-api response: {}", e)))?;
        let first = body
            .get_mut("return")
            .and_then(|r| r.as_array_mut())
            .and_then(|r| (!r.is_empty()).then(|| r.remove(0)))
            .ok_or_else(|| {
                ClusterError::ServerError("salt-api response missing return payload".to_string())
            })?;
        Ok(first)
    }

    async fn run_runner(&self, function: &str, args: Vec<Value>) -> Result<Value, ClusterError> {
        let mut call = serde_json::Map::new();
        call.insert("client".to_string(), json!("runner"));
        call.insert("fun".to_string(), json!(function));
        if !args.is_empty() {
            call.insert("arg".to_string(), json!(args));
        }
        self.run_call(call).await
    }

    async fn manage_status(&self) -> Result<ManageStatus, ClusterError> {
        let value = self.run_runner("manage.status", Vec::new()).await?;
        serde_json::from_value(value)
            .map_err(|e| ClusterError::ServerError(format!("manage.status payload: {}", e)))
    }
}

#[async_trait]
impl SaltApi for SaltApiClient {
    async fn execute(
        &self,
        target: &str,
        function: &str,
        args: &[String],
    ) -> Result<String, ClusterError> {
        let mut call = serde_json::Map::new();
        call.insert("client".to_string(), json!("local_async"));
        call.insert("tgt".to_string(), json!(target));
        call.insert("fun".to_string(), json!(function));
        if !args.is_empty() {
            call.insert("arg".to_string(), json!(args));
        }

        let value = self.run_call(call).await?;
        let jid = value
            .get("jid")
            .and_then(|j| j.as_str())
            .ok_or_else(|| {
                ClusterError::ServerError("salt-api did not return a job id".to_string())
            })?;
        Ok(jid.to_string())
    }

    async fn get_job(&self, jid: &str) -> Result<JobResult, ClusterError> {
        let value = self
            .run_runner("jobs.lookup_jid", vec![json!(jid)])
            .await?;
        let returns: HashMap<String, Value> = serde_json::from_value(value).unwrap_or_default();
        Ok(JobResult {
            jid: jid.to_string(),
            returns,
        })
    }

    async fn list_jobs(&self) -> Result<Vec<SaltJob>, ClusterError> {
        let value = self.run_runner("jobs.list_jobs", Vec::new()).await?;
        let raw: HashMap<String, Value> = serde_json::from_value(value).unwrap_or_default();

        let mut jobs: Vec<SaltJob> = raw
            .into_iter()
            .filter_map(|(jid, meta)| {
                let mut job: SaltJob = serde_json::from_value(meta).ok()?;
                job.jid = jid;
                Some(job)
            })
            .collect();
        // jids are timestamp-ordered strings
        jobs.sort_by(|a, b| b.jid.cmp(&a.jid));
        Ok(jobs)
    }

    async fn list_minions(&self) -> Result<Vec<MinionStatus>, ClusterError> {
        let status = self.manage_status().await?;
        let mut minions: Vec<MinionStatus> = status
            .up
            .into_iter()
            .map(|id| MinionStatus { id, online: true })
            .chain(
                status
                    .down
                    .into_iter()
                    .map(|id| MinionStatus { id, online: false }),
            )
            .collect();
        minions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(minions)
    }

    async fn delete_key(&self, minion_id: &str) -> Result<(), ClusterError> {
        let mut call = serde_json::Map::new();
        call.insert("client".to_string(), json!("wheel"));
        call.insert("fun".to_string(), json!("key.delete"));
        call.insert("match".to_string(), json!(minion_id));
        self.run_call(call).await?;
        Ok(())
    }

    async fn status(&self) -> Result<IntegrationStatus, ClusterError> {
        if !self.options.enabled {
            return Ok(IntegrationStatus::disabled());
        }

        // The API root answers without auth; reaching it proves the API tier.
        let api_probe = self
            .client
            .get(self.options.api_url.clone())
            .send()
            .await
            .map_err(|e| ClusterError::ServiceUnavailable(format!("salt-api: {}", e)))?;
        if api_probe.status().is_server_error() {
            return Err(ClusterError::ServiceUnavailable(format!(
                "salt-api returned {}",
                api_probe.status()
            )));
        }

        // The master is probed through a runner call; a failure here means
        // the API tier is up but the master behind it is not.
        let (master_status, minions) = match self.manage_status().await {
            Ok(status) => {
                let summary = MinionSummary {
                    total: status.up.len() + status.down.len(),
                    online: status.up.len(),
                    offline: status.down.len(),
                };
                ("up".to_string(), summary)
            }
            Err(e) if e.is_retryable() => ("down".to_string(), MinionSummary::default()),
            Err(e) => return Err(e),
        };

        let recent_jobs = match self.list_jobs().await {
            Ok(mut jobs) => {
                jobs.truncate(RECENT_JOBS);
                jobs
            }
            Err(_) => Vec::new(),
        };

        Ok(IntegrationStatus {
            enabled: true,
            master_status,
            api_status: "up".to_string(),
            minions,
            recent_jobs,
        })
    }
}
