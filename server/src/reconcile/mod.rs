//! State reconciliation across registry, scheduler, and control plane

pub mod reconciler;

pub use reconciler::{merge, normalize_scheduler_state, NodeView, Reconciler, ReconcilerOptions};
