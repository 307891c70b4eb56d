//! Orchestrator: the Per-App Runner and the Global Scheduler wrapped
//! around it, one driving loop over one per-target operation.
//! Every other component crate (`container`, `inventory`, `deploy`,
//! `purge`, `logsink`) is wired together here; nothing above this crate
//! reaches into those directly.

mod par;
mod scheduler;

pub use par::{AppOutcome, PerAppRunnerRequest, run_app};
pub use scheduler::{FailureSummary, FastFailPolicy, GlobalSchedulerConfig, MatrixRequest, MatrixSummary, run_matrix};
