//! Install step sequencing

pub mod plan;
pub mod runner;

pub use plan::{install_plan, InstallPlanOptions, StepSpec, SuccessPolicy};
pub use runner::{StepRunner, StepRunnerOptions};
