//! SaltStack control plane adapter

pub mod client;
pub mod service;
pub mod types;

pub use client::{SaltApi, SaltApiClient, SaltApiOptions};
pub use service::ExecuteService;
pub use types::{IntegrationStatus, JobResult, MinionStatus, MinionSummary, SaltJob};
