use std::time::Duration;

use colored::Colorize;
use config::DtoConfig;
use container::{ContainerDriver, ContainerDriverConfig};
use deploy::DeployDriverConfig;
use logsink::LogSink;
use orchestrator::{MatrixRequest, PerAppRunnerRequest};

use crate::args::{DeployCommand, DeployMatrix, DeployOne};

pub async fn handle(command: &DeployCommand, config: &DtoConfig) -> anyhow::Result<i32> {
  match command {
    DeployCommand::One(args) => one(args, config).await,
    DeployCommand::Matrix(args) => matrix(args, config).await,
  }
}

async fn one(args: &DeployOne, config: &DtoConfig) -> anyhow::Result<i32> {
  let inventory_dir = args.inventory_dir.clone().unwrap_or_else(|| config.inventory_dir.clone());
  let app = dto_types::AppId::new(&args.app)?;

  let cd = ContainerDriver::new(ContainerDriverConfig::default());
  let log_sink = LogSink::new(inventory_dir.join("..").join("logs"));
  let deploy_config = DeployDriverConfig::default();

  let req = PerAppRunnerRequest {
    deploy_type: args.r#type.into(),
    distro: args.distro.into(),
    app,
    service: args.service.clone(),
    pre_purge_entities: args.pre_purge.clone(),
    timeout: Duration::from_secs(args.pass_timeout_secs),
    debug: args.debug,
  };

  let outcome = orchestrator::run_app(&cd, &log_sink, &deploy_config, &inventory_dir, &req).await?;
  if outcome.failed {
    let mut timed_out = false;
    if let Some(last) = outcome.passes.last() {
      timed_out = last.cause == Some(dto_types::Cause::Timeout);
      eprintln!(
        "{}: distro={} app={} pass={} cause={:?} log={}",
        "failed".red().bold(),
        req.distro,
        req.app,
        last.pass,
        last.cause,
        last.log_path
      );
    }
    return Ok(if timed_out { 124 } else { 1 });
  }
  println!("{}: distro={} app={}", "ok".green().bold(), req.distro, req.app);
  Ok(0)
}

async fn matrix(args: &DeployMatrix, config: &DtoConfig) -> anyhow::Result<i32> {
  let inventory_dir = args.inventory_dir.clone().unwrap_or_else(|| config.inventory_dir.clone());
  let app = dto_types::AppId::new(&args.app)?;

  let distros = match &args.distros {
    Some(raw) => raw
      .split_whitespace()
      .map(|s| s.parse::<dto_types::Distro>().map_err(|e| anyhow::anyhow!("invalid distro '{s}': {e}")))
      .collect::<anyhow::Result<Vec<_>>>()?,
    None => config.resolved_distros(),
  };

  let budget = args.budget_seconds.map(Duration::from_secs).or(config.budget);
  let seed = args.seed.unwrap_or_else(rand::random);

  let cd = ContainerDriver::new(ContainerDriverConfig::default());
  let log_sink = LogSink::new(inventory_dir.join("..").join("logs"));
  let deploy_config = DeployDriverConfig::default();
  let scheduler_config = orchestrator::GlobalSchedulerConfig::default();

  let req = MatrixRequest {
    deploy_type: args.r#type.into(),
    app,
    distros,
    budget,
    service: args.service.clone(),
    pre_purge_entities: args.pre_purge.clone(),
    pass_timeout: Duration::from_secs(args.pass_timeout_secs),
    debug: args.debug,
    seed,
  };

  let summary = orchestrator::run_matrix(&cd, &log_sink, &deploy_config, &inventory_dir, &scheduler_config, &req).await;

  println!(
    "seed={} ran={} skipped={} failed={}",
    summary.seed, summary.ran, summary.skipped, summary.failed
  );
  for result in &summary.results {
    let state = result.state.to_string();
    let state = match result.state {
      dto_types::TerminalState::Ok => state.green(),
      dto_types::TerminalState::Failed => state.red(),
      _ => state.yellow(),
    };
    println!("distro={} state={state} duration_ms={}", result.distro, result.duration_ms);
  }

  if let Some(failure) = &summary.failure {
    eprintln!("{}: {failure}", "failed".red().bold());
    if failure.cause == Some(dto_types::Cause::Timeout) {
      return Ok(124);
    }
  }

  Ok(if summary.is_success() { 0 } else { 1 })
}
