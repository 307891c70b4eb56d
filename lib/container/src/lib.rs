//! Container Driver (CD): wraps a compose-style stack keyed by distro.
//! `up`/`down`/`exec`/`ps`/`run` are all `docker compose` (or the legacy
//! `docker-compose` binary) invocations through the Process Runner,
//! generalized from a single project to one project per distro.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex as StdMutex},
  time::Duration,
};

use command::{CommandOutput, RunRequest, run};
use dto_types::{Distro, DtoError};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

/// Window `up` polls readiness for before failing with `ContainerUp`.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);
/// Interval between readiness polls.
pub const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ContainerDriverConfig {
  /// Toggle between `docker compose` and the standalone `docker-compose`
  /// binary.
  pub legacy_compose_cli: bool,
  pub ready_timeout: Duration,
  pub ready_poll_interval: Duration,
}

impl Default for ContainerDriverConfig {
  fn default() -> Self {
    Self {
      legacy_compose_cli: false,
      ready_timeout: DEFAULT_READY_TIMEOUT,
      ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
    }
  }
}

/// Per-project serialization: every operation against a project acquires
/// that project's guard first, so cross-project operations still run
/// concurrently while same-project operations never overlap.
pub struct ContainerDriver {
  config: ContainerDriverConfig,
  guards: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceStatus {
  service: String,
  state: String,
  #[serde(default)]
  health: String,
}

impl ServiceStatus {
  fn is_ready(&self) -> bool {
    self.state == "running" && (self.health.is_empty() || self.health == "healthy")
  }
}

impl ContainerDriver {
  pub fn new(config: ContainerDriverConfig) -> Self {
    Self {
      config,
      guards: StdMutex::new(HashMap::new()),
    }
  }

  fn guard(&self, project: &str) -> Arc<AsyncMutex<()>> {
    let mut table = self.guards.lock().expect("guard table poisoned");
    table.entry(project.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
  }

  fn compose_invocation(&self) -> (&'static str, Vec<String>) {
    if self.config.legacy_compose_cli {
      ("docker-compose", Vec::new())
    } else {
      ("docker", vec!["compose".to_string()])
    }
  }

  fn request(&self, project: &str, extra: &[String], timeout: Duration) -> RunRequest {
    let (program, mut args) = self.compose_invocation();
    args.push("-p".to_string());
    args.push(project.to_string());
    args.extend(extra.iter().cloned());
    RunRequest::new(program, timeout).args(args)
  }

  async fn run_boundary(&self, req: RunRequest) -> dto_types::Result<CommandOutput> {
    run(req, CancellationToken::new())
      .await
      .map_err(|e| DtoError::internal(e.to_string()))
  }

  /// Idempotent: if `when_down` is set and the project's services are
  /// already up, this is a no-op. Waits for readiness either way before
  /// returning, failing with `ContainerUp` if the window elapses first.
  pub async fn up(&self, distro: Distro, when_down: bool) -> dto_types::Result<()> {
    let project = distro.compose_project();
    let guard = self.guard(&project);
    let _permit = guard.lock().await;

    let already_up = !self.ps_locked(&project).await?.is_empty();
    if !(when_down && already_up) {
      let out = self
        .run_boundary(self.request(&project, &["up".into(), "-d".into()], self.config.ready_timeout))
        .await?;
      if !out.success() {
        return Err(DtoError::ContainerUp {
          project: project.clone(),
          waited_secs: 0,
        });
      }
    }

    self.wait_ready(&project).await
  }

  async fn wait_ready(&self, project: &str) -> dto_types::Result<()> {
    let deadline = tokio::time::Instant::now() + self.config.ready_timeout;
    loop {
      let statuses = self.service_statuses(project).await?;
      if !statuses.is_empty() && statuses.iter().all(ServiceStatus::is_ready) {
        return Ok(());
      }
      if tokio::time::Instant::now() >= deadline {
        return Err(DtoError::ContainerUp {
          project: project.to_string(),
          waited_secs: self.config.ready_timeout.as_secs(),
        });
      }
      tokio::time::sleep(self.config.ready_poll_interval).await;
    }
  }

  /// Stops and removes containers, networks, and anonymous volumes of the
  /// project. Best-effort: a non-zero exit is surfaced but never panics.
  pub async fn down(&self, distro: Distro) -> dto_types::Result<()> {
    let project = distro.compose_project();
    let guard = self.guard(&project);
    let _permit = guard.lock().await;
    let out = self
      .run_boundary(self.request(&project, &["down".into(), "--remove-orphans".into()], Duration::from_secs(60)))
      .await?;
    if !out.success() {
      return Err(DtoError::internal(format!(
        "docker compose down failed for project '{project}': {}",
        out.stderr
      )));
    }
    Ok(())
  }

  /// Runs a command inside an already-running service container.
  pub async fn exec(
    &self,
    distro: Distro,
    service: &str,
    args: &[String],
    env: &HashMap<String, String>,
    timeout: Duration,
  ) -> dto_types::Result<CommandOutput> {
    let project = distro.compose_project();
    let guard = self.guard(&project);
    let _permit = guard.lock().await;

    let mut extra = vec!["exec".to_string(), "-T".to_string()];
    for (key, value) in env {
      extra.push("-e".to_string());
      extra.push(format!("{key}={value}"));
    }
    extra.push(service.to_string());
    extra.extend(args.iter().cloned());

    self.run_boundary(self.request(&project, &extra, timeout)).await
  }

  /// One-off command against a (possibly not-yet-running) service, via
  /// `docker compose run --rm`.
  pub async fn run_one_off(
    &self,
    distro: Distro,
    service: &str,
    args: &[String],
    timeout: Duration,
  ) -> dto_types::Result<CommandOutput> {
    let project = distro.compose_project();
    let guard = self.guard(&project);
    let _permit = guard.lock().await;

    let mut extra = vec!["run".to_string(), "--rm".to_string(), service.to_string()];
    extra.extend(args.iter().cloned());
    self.run_boundary(self.request(&project, &extra, timeout)).await
  }

  /// Last `lines` lines of a service's container log, for failure
  /// diagnostics.
  pub async fn logs_tail(&self, distro: Distro, service: &str, lines: u32) -> dto_types::Result<String> {
    let project = distro.compose_project();
    let guard = self.guard(&project);
    let _permit = guard.lock().await;
    let extra = vec!["logs".to_string(), "--no-color".to_string(), "--tail".to_string(), lines.to_string(), service.to_string()];
    let out = self.run_boundary(self.request(&project, &extra, Duration::from_secs(30))).await?;
    Ok(out.stdout)
  }

  /// Names of the project's currently-up services.
  pub async fn ps(&self, distro: Distro) -> dto_types::Result<Vec<String>> {
    let project = distro.compose_project();
    let guard = self.guard(&project);
    let _permit = guard.lock().await;
    self.ps_locked(&project).await
  }

  async fn ps_locked(&self, project: &str) -> dto_types::Result<Vec<String>> {
    Ok(
      self
        .service_statuses(project)
        .await?
        .into_iter()
        .map(|s| s.service)
        .collect(),
    )
  }

  async fn service_statuses(&self, project: &str) -> dto_types::Result<Vec<ServiceStatus>> {
    let out = self
      .run_boundary(self.request(project, &["ps".into(), "--format".into(), "json".into()], Duration::from_secs(30)))
      .await?;
    if !out.success() {
      return Ok(Vec::new());
    }
    out
      .stdout
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(|line| {
        serde_json::from_str(line)
          .map_err(|e| DtoError::internal(format!("failed to parse compose ps output: {e}")))
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn distinct_distros_never_share_a_project() {
    let driver = ContainerDriver::new(ContainerDriverConfig::default());
    let debian_guard = driver.guard(&Distro::Debian.compose_project());
    let ubuntu_guard = driver.guard(&Distro::Ubuntu.compose_project());
    assert!(!Arc::ptr_eq(&debian_guard, &ubuntu_guard));
  }

  #[test]
  fn same_project_reuses_the_same_guard() {
    let driver = ContainerDriver::new(ContainerDriverConfig::default());
    let a = driver.guard("infinito_nexus_debian");
    let b = driver.guard("infinito_nexus_debian");
    assert!(Arc::ptr_eq(&a, &b));
  }

  #[test]
  fn service_status_readiness() {
    let ready = ServiceStatus {
      service: "app".into(),
      state: "running".into(),
      health: "healthy".into(),
    };
    let starting = ServiceStatus {
      service: "app".into(),
      state: "running".into(),
      health: "starting".into(),
    };
    assert!(ready.is_ready());
    assert!(!starting.is_ready());
  }
}
