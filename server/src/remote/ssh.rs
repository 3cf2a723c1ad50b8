//! SSH implementation of the remote executor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::errors::ClusterError;
use crate::remote::session::{CommandOutput, Credentials, RemoteExecutor, RemoteSession};

/// Accepts any host key. Nodes are provisioned over the management network
/// before they have a recorded key, so there is nothing to pin against yet.
struct AcceptingHandler;

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens password-authenticated SSH sessions
pub struct SshExecutor {
    config: Arc<client::Config>,
}

impl SshExecutor {
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
        }
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn open(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
        connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, ClusterError> {
        debug!("Opening SSH session to {}:{}", host, port);

        let connect = client::connect(self.config.clone(), (host, port), AcceptingHandler);
        let mut handle = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| {
                ClusterError::ConnectError(format!(
                    "connection to {}:{} timed out after {:?}",
                    host, port, connect_timeout
                ))
            })?
            .map_err(|e| ClusterError::ConnectError(format!("{}:{}: {}", host, port, e)))?;

        let authenticated = handle
            .authenticate_password(&credentials.username, credentials.password.expose_secret())
            .await
            .map_err(|e| ClusterError::AuthError(format!("{}@{}: {}", credentials.username, host, e)))?;

        if !authenticated {
            return Err(ClusterError::AuthError(format!(
                "password rejected for {}@{}",
                credentials.username, host
            )));
        }

        Ok(Box::new(SshSession {
            handle,
            host: host.to_string(),
        }))
    }
}

/// One authenticated SSH connection
struct SshSession {
    handle: Handle<AcceptingHandler>,
    host: String,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ClusterError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ClusterError::ConnectError(format!("{}: {}", self.host, e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ClusterError::ConnectError(format!("{}: {}", self.host, e)))?;

        let collect = async {
            let mut output = CommandOutput::default();
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => {
                        output.stdout.push_str(&String::from_utf8_lossy(&data));
                    }
                    ChannelMsg::ExtendedData { data, ext: 1 } => {
                        output.stderr.push_str(&String::from_utf8_lossy(&data));
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        output.exit_code = Some(exit_status);
                    }
                    _ => {}
                }
            }
            output
        };

        let output = tokio::time::timeout(timeout, collect).await.map_err(|_| {
            ClusterError::TimeoutError(format!(
                "command on {} exceeded {:?}",
                self.host, timeout
            ))
        })?;

        Ok(output)
    }

    async fn close(&mut self) -> Result<(), ClusterError> {
        // A failed disconnect leaves nothing to clean up on our side.
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        Ok(())
    }
}
