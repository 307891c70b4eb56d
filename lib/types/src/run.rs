use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{ids::Distro, log::Log};

/// Closed set of failure causes backing `RunRecord.cause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Cause {
  Timeout,
  NonZeroExit,
  PurgeFailed,
  UpFailed,
}

/// Which of the two deploy passes a [`RunRecord`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pass {
  /// `ASYNC_ENABLED=false`
  Sync,
  /// `ASYNC_ENABLED=true`
  Async,
}

/// One (distro, app, pass) execution outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
  pub distro: Distro,
  pub app: String,
  pub pass: Pass,
  pub start_ts: i64,
  pub end_ts: i64,
  pub exit_code: Option<i32>,
  pub log_path: String,
  pub cause: Option<Cause>,
}

impl RunRecord {
  pub fn success(&self) -> bool {
    self.cause.is_none() && self.exit_code == Some(0)
  }

  pub fn duration_ms(&self) -> i64 {
    (self.end_ts - self.start_ts).max(0)
  }
}

/// Terminal state of a single distro's run within a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminalState {
  Ok,
  Failed,
  SkippedBudget,
  SkippedHeuristic,
}

/// Aggregated outcome for one distro across both deploy passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistroResult {
  pub distro: Distro,
  pub runs: Vec<RunRecord>,
  pub duration_ms: i64,
  pub state: TerminalState,
}

impl DistroResult {
  pub fn skipped(distro: Distro, state: TerminalState) -> Self {
    debug_assert!(matches!(
      state,
      TerminalState::SkippedBudget | TerminalState::SkippedHeuristic
    ));
    Self {
      distro,
      runs: Vec::new(),
      duration_ms: 0,
      state,
    }
  }
}

/// Collects the `Log`s produced for one (distro, app, pass) invocation,
/// alongside the `RunRecord` they back. Bundled so the Per-App Runner can
/// hand both to the Log Sink in one call.
#[derive(Debug, Clone)]
pub struct PassOutcome {
  pub record: RunRecord,
  pub logs: Vec<Log>,
}
