//! Command history: durable record of ad-hoc control-plane executions

pub mod recorder;

pub use recorder::{CommandExecution, CommandStatus, HistoryRecorder};
