//! Per-App Runner (PAR): for one (distro, app), ensures the stack is up,
//! pre-purges shared entities, runs the two deploy passes in strict order,
//! and collects both outcomes. Hard cleanup between distros is the Global
//! Scheduler's responsibility, not this one's.

use std::{collections::BTreeMap, path::Path, time::Duration};

use container::ContainerDriver;
use deploy::{DeployDriverConfig, DeployRequest};
use dto_types::{AppId, DeployType, Distro, Pass, RunRecord};
use inventory::{BuildRequest, VarValue};
use logsink::{JobIdentity, LogSink};
use purge::{PurgeMode, PurgeRequest};

#[derive(Debug, Clone)]
pub struct PerAppRunnerRequest {
  pub deploy_type: DeployType,
  pub distro: Distro,
  pub app: AppId,
  /// Compose service the deploy tool and the app itself run against.
  pub service: String,
  /// Shared entities that must be re-created before this app deploys.
  pub pre_purge_entities: Vec<String>,
  pub timeout: Duration,
  pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct AppOutcome {
  pub app: AppId,
  pub passes: Vec<RunRecord>,
  pub failed: bool,
}

/// Runs one (distro, app): `up` → pre-purge → pass 1 (sync) → pass 2
/// (async) → collect. A pass-1 failure terminates the app and skips
/// pass 2; a pass-2 failure is reported but not retried.
#[allow(clippy::too_many_arguments)]
pub async fn run_app(
  cd: &ContainerDriver,
  log_sink: &LogSink,
  deploy_config: &DeployDriverConfig,
  inventory_dir: &Path,
  req: &PerAppRunnerRequest,
) -> dto_types::Result<AppOutcome> {
  cd.up(req.distro, true).await?;

  for entity in &req.pre_purge_entities {
    let purge_req = PurgeRequest {
      entity: entity.clone(),
      mode: PurgeMode::Drop,
      env_file: None,
      compose_file: None,
      persistent_dir: inventory_dir.join("entities").join(entity),
    };
    // Pre-purge is best-effort preparation, not a deploy step: a failure
    // here is logged by `purge::purge` internally and never stops PAR.
    let _ = purge::purge(&purge_req, req.timeout).await;
  }

  let pass1 = run_pass(cd, log_sink, deploy_config, inventory_dir, req, Pass::Sync, false).await?;
  if !pass1.success() {
    attach_failure_diagnostics(cd, log_sink, req).await;
    return Ok(AppOutcome {
      app: req.app.clone(),
      passes: vec![pass1],
      failed: true,
    });
  }

  let pass2 = run_pass(cd, log_sink, deploy_config, inventory_dir, req, Pass::Async, true).await?;
  let failed = !pass2.success();
  if failed {
    attach_failure_diagnostics(cd, log_sink, req).await;
  }

  Ok(AppOutcome {
    app: req.app.clone(),
    passes: vec![pass1, pass2],
    failed,
  })
}

#[allow(clippy::too_many_arguments)]
async fn run_pass(
  cd: &ContainerDriver,
  log_sink: &LogSink,
  deploy_config: &DeployDriverConfig,
  inventory_dir: &Path,
  req: &PerAppRunnerRequest,
  pass: Pass,
  async_enabled: bool,
) -> dto_types::Result<RunRecord> {
  let mut vars = BTreeMap::new();
  vars.insert("ASYNC_ENABLED".to_string(), VarValue::from(async_enabled));
  vars.insert("RUNTIME".to_string(), VarValue::from("docker"));

  let extra_vars: BTreeMap<String, String> = vars.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();

  let build_req = BuildRequest {
    deploy_type: req.deploy_type,
    distro: req.distro,
    apps: vec![req.app.clone()],
    vars,
    inventory_dir: inventory_dir.to_path_buf(),
  };
  let paths = inventory::build(&build_req).await?;

  let deploy_req = DeployRequest {
    deploy_type: req.deploy_type,
    distro: req.distro,
    app: req.app.clone(),
    pass,
    service: req.service.clone(),
    inventory_path: paths.yaml_path,
    password_path: paths.password_path,
    extra_vars,
    debug: req.debug,
    timeout: req.timeout,
  };
  let outcome = deploy::deploy(cd, log_sink, deploy_config, &deploy_req).await?;
  Ok(outcome.record)
}

async fn attach_failure_diagnostics(cd: &ContainerDriver, log_sink: &LogSink, req: &PerAppRunnerRequest) {
  let job = JobIdentity {
    deploy_type: req.deploy_type,
    distro: req.distro,
    app: req.app.clone(),
  };
  let ps = cd.ps(req.distro).await.unwrap_or_default().join(", ");
  let tail = cd.logs_tail(req.distro, &req.service, 200).await.unwrap_or_default();
  let disk_usage = command::run_shell("df -h", None, Duration::from_secs(10))
    .await
    .map(|out| out.stdout)
    .unwrap_or_default();
  let snapshot = format!("containers up: [{ps}]\n{disk_usage}");
  let _ = log_sink.append_failure_diagnostics(&job, &snapshot, &tail).await;
}
