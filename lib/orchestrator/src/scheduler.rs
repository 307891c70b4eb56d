//! Global Scheduler (GS): iterates a shuffled distro list under a
//! wall-clock deadline, applying a fast-fail heuristic, and aggregates a
//! per-distro summary. The coordinator itself is effectively
//! single-threaded at the scheduling level: distros run strictly serial by
//! default.

use std::time::Duration;

use container::ContainerDriver;
use deploy::DeployDriverConfig;
use dto_types::{AppId, Cause, DeployType, Distro, DistroResult, Pass, TerminalState, dto_timestamp};
use logsink::LogSink;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::par::{self, PerAppRunnerRequest};

/// Two policies for the fast-fail heuristic, exposed as an explicit option
/// rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastFailPolicy {
  #[default]
  SkipAndContinue,
  StopOnFirstSkip,
}

#[derive(Debug, Clone)]
pub struct GlobalSchedulerConfig {
  /// Off by default: distros run strictly serial. When `true`, distros
  /// run concurrently; the coordinator still enforces the global
  /// deadline, not the children.
  pub parallel: bool,
  pub fast_fail: FastFailPolicy,
}

impl Default for GlobalSchedulerConfig {
  fn default() -> Self {
    Self {
      parallel: false,
      fast_fail: FastFailPolicy::default(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct MatrixRequest {
  pub deploy_type: DeployType,
  pub app: AppId,
  pub distros: Vec<Distro>,
  pub budget: Option<Duration>,
  pub service: String,
  pub pre_purge_entities: Vec<String>,
  pub pass_timeout: Duration,
  pub debug: bool,
  /// RNG seed for distro shuffling, logged so the run is reproducible.
  pub seed: u64,
}

/// Names the failing (distro, app, pass) and cause for the single final
/// line a matrix run reports on failure.
#[derive(Debug, Clone)]
pub struct FailureSummary {
  pub distro: Distro,
  pub app: String,
  pub pass: Pass,
  pub cause: Option<Cause>,
  pub log_path: String,
}

impl std::fmt::Display for FailureSummary {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "distro={} app={} pass={} cause={:?} log={}",
      self.distro, self.app, self.pass, self.cause, self.log_path
    )
  }
}

#[derive(Debug, Clone)]
pub struct MatrixSummary {
  pub seed: u64,
  pub results: Vec<DistroResult>,
  pub ran: usize,
  pub skipped: usize,
  pub failed: usize,
  /// The first failed distro's last run, named by [`FailureSummary`]. `None`
  /// when nothing failed.
  pub failure: Option<FailureSummary>,
}

impl MatrixSummary {
  pub fn is_success(&self) -> bool {
    self.failed == 0
  }
}

/// Runs the full distro matrix for one app. Never runs distros in parallel
/// unless `config.parallel` is set; the default is a shuffled-serial order
/// with a fast-fail heuristic for distros unlikely to finish in budget.
pub async fn run_matrix(
  cd: &ContainerDriver,
  log_sink: &LogSink,
  deploy_config: &DeployDriverConfig,
  inventory_dir: &std::path::Path,
  config: &GlobalSchedulerConfig,
  req: &MatrixRequest,
) -> MatrixSummary {
  let mut distros = req.distros.clone();
  let mut rng = StdRng::seed_from_u64(req.seed);
  distros.shuffle(&mut rng);
  tracing::info!(seed = req.seed, order = ?distros, "shuffled distro matrix order");

  let start = dto_timestamp();
  let deadline = req.budget.map(|b| start + b.as_millis() as i64);

  let mut results = Vec::new();
  let mut max_seen: i64 = 0;
  let mut stopped = false;

  for distro in distros {
    if stopped {
      results.push(DistroResult::skipped(distro, TerminalState::SkippedBudget));
      continue;
    }

    if let Some(deadline) = deadline {
      let now = dto_timestamp();
      if now >= deadline {
        results.push(DistroResult::skipped(distro, TerminalState::SkippedBudget));
        continue;
      }
      let remaining = deadline - now;
      if max_seen > 0 && remaining < max_seen {
        results.push(DistroResult::skipped(distro, TerminalState::SkippedHeuristic));
        if config.fast_fail == FastFailPolicy::StopOnFirstSkip {
          stopped = true;
        }
        continue;
      }
    }

    let par_req = PerAppRunnerRequest {
      deploy_type: req.deploy_type,
      distro,
      app: req.app.clone(),
      service: req.service.clone(),
      pre_purge_entities: req.pre_purge_entities.clone(),
      timeout: req.pass_timeout,
      debug: req.debug,
    };

    let distro_start = dto_timestamp();
    let outcome = par::run_app(cd, log_sink, deploy_config, inventory_dir, &par_req).await;
    let duration_ms = dto_timestamp() - distro_start;

    match outcome {
      Ok(app_outcome) if !app_outcome.failed => {
        max_seen = max_seen.max(duration_ms);
        results.push(DistroResult {
          distro,
          runs: app_outcome.passes,
          duration_ms,
          state: TerminalState::Ok,
        });
      }
      Ok(app_outcome) => {
        results.push(DistroResult {
          distro,
          runs: app_outcome.passes,
          duration_ms,
          state: TerminalState::Failed,
        });
        stopped = true;
      }
      Err(_) => {
        results.push(DistroResult {
          distro,
          runs: Vec::new(),
          duration_ms,
          state: TerminalState::Failed,
        });
        stopped = true;
      }
    }

    hard_reset(cd, distro).await;
  }

  summarize(req.seed, results)
}

async fn hard_reset(cd: &ContainerDriver, distro: Distro) {
  let _ = cd.down(distro).await;
  for cmd in ["docker container prune -f", "docker network prune -f", "docker volume prune -f"] {
    let _ = command::run_shell(cmd, None, Duration::from_secs(30)).await;
  }
}

fn summarize(seed: u64, results: Vec<DistroResult>) -> MatrixSummary {
  let ran = results.iter().filter(|r| r.state == TerminalState::Ok).count();
  let failed = results.iter().filter(|r| r.state == TerminalState::Failed).count();
  let skipped = results.len() - ran - failed;
  let failure = results
    .iter()
    .find(|r| r.state == TerminalState::Failed)
    .and_then(|r| r.runs.last())
    .map(|run| FailureSummary {
      distro: run.distro,
      app: run.app.clone(),
      pass: run.pass,
      cause: run.cause,
      log_path: run.log_path.clone(),
    });
  MatrixSummary {
    seed,
    results,
    ran,
    skipped,
    failed,
    failure,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shuffle_is_deterministic_given_a_seed() {
    let mut a = Distro::ALL.to_vec();
    let mut b = Distro::ALL.to_vec();
    let mut rng_a = StdRng::seed_from_u64(42);
    let mut rng_b = StdRng::seed_from_u64(42);
    a.shuffle(&mut rng_a);
    b.shuffle(&mut rng_b);
    assert_eq!(a, b);
  }

  #[test]
  fn summarize_counts_ran_skipped_failed() {
    let results = vec![
      DistroResult {
        distro: Distro::Debian,
        runs: Vec::new(),
        duration_ms: 1000,
        state: TerminalState::Ok,
      },
      DistroResult::skipped(Distro::Ubuntu, TerminalState::SkippedHeuristic),
    ];
    let summary = summarize(7, results);
    assert_eq!(summary.ran, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.is_success());
    assert!(summary.failure.is_none());
  }

  #[test]
  fn summarize_names_the_last_run_of_the_first_failed_distro() {
    let failed_run = dto_types::RunRecord {
      distro: Distro::Ubuntu,
      app: "demo".to_string(),
      pass: Pass::Async,
      start_ts: 0,
      end_ts: 1,
      exit_code: Some(1),
      log_path: "logs/deploy-ubuntu-demo.log".to_string(),
      cause: Some(Cause::NonZeroExit),
    };
    let results = vec![DistroResult {
      distro: Distro::Ubuntu,
      runs: vec![failed_run.clone()],
      duration_ms: 500,
      state: TerminalState::Failed,
    }];
    let summary = summarize(7, results);
    let failure = summary.failure.expect("failure summary");
    assert_eq!(failure.distro, Distro::Ubuntu);
    assert_eq!(failure.app, "demo");
    assert_eq!(failure.cause, Some(Cause::NonZeroExit));
    assert_eq!(failure.log_path, failed_run.log_path);
  }
}
