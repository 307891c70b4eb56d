use thiserror::Error;

use crate::run::Pass;

pub type Result<T, E = DtoError> = ::core::result::Result<T, E>;

/// Error taxonomy for the whole orchestrator, matching the source's
/// `InvalidInput` / `Discovery` / `ContainerUp` / `DeployExit` / `Timeout` /
/// `PurgeWarning` / `Internal` kinds. `anyhow::Error` is used at leaf I/O call
/// sites and converted to one of these at the component boundary.
#[derive(Debug, Error)]
pub enum DtoError {
  /// Unknown enum value, empty required list, malformed regex.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// External enumerator failed or returned non-JSON.
  #[error("discovery failed: {message} (raw output: {raw_output_excerpt})")]
  Discovery {
    message: String,
    raw_output_excerpt: String,
  },

  /// Readiness not reached within the configured window.
  #[error("container '{project}' failed to become ready within {waited_secs}s")]
  ContainerUp { project: String, waited_secs: u64 },

  /// Deploy tool exited non-zero.
  #[error("deploy exited non-zero (code {exit_code:?}) for {distro}/{app}, pass {pass}")]
  DeployExit {
    distro: String,
    app: String,
    pass: Pass,
    exit_code: Option<i32>,
    log_path: String,
  },

  /// Any Process Runner timeout.
  #[error("command timed out after {elapsed_secs}s: {command}")]
  Timeout { command: String, elapsed_secs: u64 },

  /// Non-fatal issue inside the Entity Purger.
  #[error("purge warning for entity '{entity}': {message}")]
  PurgeWarning { entity: String, message: String },

  /// Programmer error; should never be reachable in a correct build.
  #[error("internal error: {0} (this is a bug, please file a report)")]
  Internal(String),
}

impl DtoError {
  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput(message.into())
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal(message.into())
  }

  /// Whether the error should map to exit code 2 (invalid input) at the CLI
  /// boundary, vs. 1 (generic failure).
  pub fn is_invalid_input(&self) -> bool {
    matches!(self, Self::InvalidInput(_))
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Timeout { .. })
  }
}
