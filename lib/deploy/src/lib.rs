//! Deploy Driver (DD): runs a single deploy pass for one (distro, app)
//! against a prepared inventory. Invokes the underlying deploy tool through
//! the Container Driver's `exec`, maps its process outcome to a `Cause`,
//! writes the full log to the Log Sink, and attaches the resulting path to
//! the returned `RunRecord`. Performs no cleanup; that is PAR/GS's job.

use std::{collections::BTreeMap, collections::HashMap, path::PathBuf, time::Duration};

use container::ContainerDriver;
use dto_types::{AppId, Cause, DeployType, Distro, DtoError, Log, Pass, PassOutcome, RunRecord, dto_timestamp};
use logsink::{JobIdentity, LogSink, SessionHeader};

#[derive(Debug, Clone)]
pub struct DeployDriverConfig {
  /// The underlying deploy tool binary, invoked inside the distro's
  /// service container. Opaque here; only its invocation contract
  /// (inventory, vault password, `--diff`/`--debug`, extra vars) is
  /// load-bearing.
  pub binary: String,
  pub playbook: String,
}

impl Default for DeployDriverConfig {
  fn default() -> Self {
    Self {
      binary: "ansible-playbook".to_string(),
      playbook: "site.yml".to_string(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
  pub deploy_type: DeployType,
  pub distro: Distro,
  pub app: AppId,
  pub pass: Pass,
  /// Compose service the deploy tool runs against, e.g. `"control"`.
  pub service: String,
  pub inventory_path: PathBuf,
  pub password_path: PathBuf,
  pub extra_vars: BTreeMap<String, String>,
  pub debug: bool,
  pub timeout: Duration,
}

/// Runs one deploy pass. Always returns `Ok` for a clean process outcome
/// (success, non-zero exit, or PR timeout); those are reported via the
/// returned `RunRecord.cause`, not as an `Err`. `Err` is reserved for
/// internal failures (spawn error, log-sink I/O failure).
pub async fn deploy(
  cd: &ContainerDriver,
  log_sink: &LogSink,
  config: &DeployDriverConfig,
  req: &DeployRequest,
) -> dto_types::Result<PassOutcome> {
  let job = JobIdentity {
    deploy_type: req.deploy_type,
    distro: req.distro,
    app: req.app.clone(),
  };
  let log_path = log_sink.log_path(&job);

  let up_services = cd.ps(req.distro).await?;
  if up_services.is_empty() {
    let log = Log::error("deploy", format!("service '{}' is not up at entry", req.service));
    let header = session_header(req);
    log_sink
      .append_session(&job, &header, std::slice::from_ref(&log))
      .await
      .map_err(|e| DtoError::internal(e.to_string()))?;
    let now = dto_timestamp();
    return Ok(PassOutcome {
      record: RunRecord {
        distro: req.distro,
        app: req.app.to_string(),
        pass: req.pass,
        start_ts: now,
        end_ts: now,
        exit_code: None,
        log_path: log_path.display().to_string(),
        cause: Some(Cause::UpFailed),
      },
      logs: vec![log],
    });
  }

  let args = build_args(config, req);
  let start_ts = dto_timestamp();
  let output = cd
    .exec(req.distro, &req.service, &args, &HashMap::new(), req.timeout)
    .await?;
  let end_ts = dto_timestamp();

  let cause = if output.cause == Some(Cause::Timeout) {
    Some(Cause::Timeout)
  } else if output.exit_code == Some(0) {
    None
  } else {
    Some(Cause::NonZeroExit)
  };

  let log = Log {
    stage: format!("deploy-pass-{}", req.pass),
    command: format!("{} {}", config.binary, args.join(" ")),
    stdout: output.stdout.clone(),
    stderr: output.stderr.clone(),
    success: cause.is_none(),
    start_ts,
    end_ts,
  };

  let header = session_header(req);
  log_sink
    .append_session(&job, &header, std::slice::from_ref(&log))
    .await
    .map_err(|e| DtoError::internal(e.to_string()))?;

  Ok(PassOutcome {
    record: RunRecord {
      distro: req.distro,
      app: req.app.to_string(),
      pass: req.pass,
      start_ts,
      end_ts,
      exit_code: output.exit_code,
      log_path: log_path.display().to_string(),
      cause,
    },
    logs: vec![log],
  })
}

fn build_args(config: &DeployDriverConfig, req: &DeployRequest) -> Vec<String> {
  let mut args = vec![
    config.playbook.clone(),
    "-i".to_string(),
    req.inventory_path.display().to_string(),
    "--vault-password-file".to_string(),
    req.password_path.display().to_string(),
    "--diff".to_string(),
  ];
  if req.debug {
    args.push("--debug".to_string());
  }
  for (key, value) in &req.extra_vars {
    args.push("-e".to_string());
    args.push(format!("{key}={value}"));
  }
  args
}

fn session_header(req: &DeployRequest) -> SessionHeader {
  let mut params = BTreeMap::new();
  params.insert("pass".to_string(), req.pass.to_string());
  params.insert("debug".to_string(), req.debug.to_string());
  for (key, value) in &req.extra_vars {
    params.insert(key.clone(), value.clone());
  }
  SessionHeader {
    params,
    budget_secs: None,
    pre_run_snapshot: String::new(),
  }
}
