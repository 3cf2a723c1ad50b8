//! SLURM controller adapter

pub mod client;
pub mod types;

pub use client::{SlurmControl, SlurmController, SlurmControllerOptions};
pub use types::{JobFilter, JobStatus, NodeAction, NodeStatus, PartitionStatus};
