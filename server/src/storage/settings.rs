//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// SLURM controller configuration
    #[serde(default)]
    pub slurm: SlurmSettings,

    /// SaltStack control plane configuration
    #[serde(default)]
    pub salt: SaltSettings,

    /// Node install configuration
    #[serde(default)]
    pub install: InstallSettings,

    /// Background worker configuration
    #[serde(default)]
    pub workers: WorkerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerSettings::default(),
            slurm: SlurmSettings::default(),
            salt: SaltSettings::default(),
            install: InstallSettings::default(),
            workers: WorkerSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8070
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// SLURM controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurmSettings {
    /// Reason injected when a drain/down request carries none
    #[serde(default = "default_reason")]
    pub default_reason: String,

    /// Seconds to wait for the controller to confirm a node removal
    #[serde(default = "default_removal_timeout")]
    pub removal_timeout_secs: u64,

    /// Poll interval while waiting for removal confirmation
    #[serde(default = "default_removal_poll_interval")]
    pub removal_poll_interval_secs: u64,
}

fn default_reason() -> String {
    "administrative action via clusterd".to_string()
}

fn default_removal_timeout() -> u64 {
    120
}

fn default_removal_poll_interval() -> u64 {
    10
}

impl Default for SlurmSettings {
    fn default() -> Self {
        Self {
            default_reason: default_reason(),
            removal_timeout_secs: default_removal_timeout(),
            removal_poll_interval_secs: default_removal_poll_interval(),
        }
    }
}

/// SaltStack control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltSettings {
    /// Whether the Salt integration is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// salt-api base URL
    #[serde(default = "default_salt_api_url")]
    pub api_url: String,

    /// salt-api eauth username
    #[serde(default = "default_salt_username")]
    pub username: String,

    /// salt-api eauth password
    #[serde(default)]
    pub password: String,

    /// External authentication backend
    #[serde(default = "default_salt_eauth")]
    pub eauth: String,

    /// Address minions use to reach the Salt master
    #[serde(default = "default_salt_master")]
    pub master_address: String,
}

fn default_true() -> bool {
    true
}

fn default_salt_api_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_salt_username() -> String {
    "saltapi".to_string()
}

fn default_salt_eauth() -> String {
    "pam".to_string()
}

fn default_salt_master() -> String {
    "salt".to_string()
}

impl Default for SaltSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_salt_api_url(),
            username: default_salt_username(),
            password: String::new(),
            eauth: default_salt_eauth(),
            master_address: default_salt_master(),
        }
    }
}

/// Node install settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSettings {
    /// Maximum hosts provisioned concurrently within one task
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,

    /// SSH connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-command timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// APT repository serving SaltStack packages
    #[serde(default = "default_salt_repo_url")]
    pub salt_repo_url: String,
}

fn default_max_concurrent_hosts() -> usize {
    4
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    600
}

fn default_salt_repo_url() -> String {
    "https://packages.broadcom.com/artifactory/saltproject-deb".to_string()
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            max_concurrent_hosts: default_max_concurrent_hosts(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            salt_repo_url: default_salt_repo_url(),
        }
    }
}

/// Background worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Enable the periodic state reconciler
    #[serde(default = "default_true")]
    pub enable_reconciler: bool,

    /// Enable the command history sync worker
    #[serde(default = "default_true")]
    pub enable_history_sync: bool,

    /// Reconcile interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// History sync interval in seconds
    #[serde(default = "default_history_sync_interval")]
    pub history_sync_interval_secs: u64,

    /// Seconds a node may stay unknown to the scheduler before it is flagged
    #[serde(default = "default_grace_window")]
    pub scheduler_grace_secs: u64,
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_history_sync_interval() -> u64 {
    45
}

fn default_grace_window() -> u64 {
    300
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            enable_reconciler: true,
            enable_history_sync: true,
            reconcile_interval_secs: default_reconcile_interval(),
            history_sync_interval_secs: default_history_sync_interval(),
            scheduler_grace_secs: default_grace_window(),
        }
    }
}
