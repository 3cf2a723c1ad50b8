//! Remote command execution over SSH

pub mod session;
pub mod ssh;

pub use session::{CommandOutput, Credentials, RemoteExecutor, RemoteSession};
pub use ssh::SshExecutor;
