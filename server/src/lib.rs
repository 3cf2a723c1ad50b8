//! Clusterd Library
//!
//! Core modules for the cluster control daemon: node registry, remote
//! provisioning, task orchestration, SLURM and SaltStack adapters.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod history;
pub mod logs;
pub mod poll;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod salt;
pub mod server;
pub mod slurm;
pub mod steps;
pub mod storage;
pub mod tasks;
pub mod telemetry;
pub mod utils;
pub mod workers;
