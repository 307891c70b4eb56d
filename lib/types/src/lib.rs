//! Shared data model for the Deployment Test Orchestrator: application
//! identifiers, enums for deploy type / lifecycle / distro, run-level
//! records, the job log shape, and the error taxonomy. Every other crate in
//! the workspace depends on this one and none of its siblings.

pub mod error;
pub mod ids;
pub mod log;
pub mod run;

pub use error::{DtoError, Result};
pub use ids::{AppId, DeployType, Distro, Lifecycle};
pub use log::{Log, all_logs_success, dto_timestamp};
pub use run::{Cause, DistroResult, Pass, PassOutcome, RunRecord, TerminalState};
