//! Log Sink (LS): one append-only artifact log file per Per-App Runner
//! invocation (`logs/deploy-<type>-<distro>-<app>.log`), distinct from the
//! process's own `tracing` output. Every append is preceded by a banner of
//! 60 `=` characters and a UTC header so multiple sessions in one file stay
//! visually separated.

use std::{collections::BTreeMap, path::PathBuf};

use dto_types::{AppId, DeployType, Distro, Log};
use tokio::io::AsyncWriteExt;

const BANNER_WIDTH: usize = 60;

/// Identifies one PAR invocation's log file; stable across both deploy
/// passes, so pass 1 and pass 2 append to the same file.
#[derive(Debug, Clone)]
pub struct JobIdentity {
  pub deploy_type: DeployType,
  pub distro: Distro,
  pub app: AppId,
}

impl JobIdentity {
  pub fn log_file_name(&self) -> String {
    format!("deploy-{}-{}-{}.log", self.deploy_type, self.distro, self.app)
  }
}

#[derive(Debug, Clone, Default)]
pub struct SessionHeader {
  pub params: BTreeMap<String, String>,
  pub budget_secs: Option<u64>,
  pub pre_run_snapshot: String,
}

#[derive(Debug, Clone)]
pub struct LogSink {
  pub logs_dir: PathBuf,
}

impl LogSink {
  pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
    Self {
      logs_dir: logs_dir.into(),
    }
  }

  pub fn log_path(&self, job: &JobIdentity) -> PathBuf {
    self.logs_dir.join(job.log_file_name())
  }

  /// Appends one session (header + the commands run during it) to the job's
  /// log file, creating the file and its directory if missing. Tees the
  /// rendered session to stdout as it writes. Returns the file path.
  pub async fn append_session(
    &self,
    job: &JobIdentity,
    header: &SessionHeader,
    logs: &[Log],
  ) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(&self.logs_dir).await?;
    let path = self.log_path(job);
    let rendered = render_session(job, header, logs);
    print!("{rendered}");

    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    file.write_all(rendered.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
  }

  /// Appends a post-run diagnostics block to an existing job log: a
  /// snapshot of disk usage/container state plus the tail of the distro
  /// service's own container log. Called only on failure.
  pub async fn append_failure_diagnostics(
    &self,
    job: &JobIdentity,
    post_run_snapshot: &str,
    container_log_tail: &str,
  ) -> anyhow::Result<()> {
    let path = self.log_path(job);
    let mut block = String::new();
    block.push_str("--- failure diagnostics ---\n");
    block.push_str("post-run snapshot:\n");
    block.push_str(post_run_snapshot);
    if !post_run_snapshot.ends_with('\n') {
      block.push('\n');
    }
    block.push_str("container log tail:\n");
    block.push_str(container_log_tail);
    if !container_log_tail.ends_with('\n') {
      block.push('\n');
    }

    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    file.write_all(block.as_bytes()).await?;
    file.flush().await?;
    Ok(())
  }
}

fn render_session(job: &JobIdentity, header: &SessionHeader, logs: &[Log]) -> String {
  let mut out = String::new();
  out.push_str(&"=".repeat(BANNER_WIDTH));
  out.push('\n');
  out.push_str(&format!(
    "{} deploy-{}-{}-{}\n",
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
    job.deploy_type,
    job.distro,
    job.app
  ));
  for (key, value) in &header.params {
    out.push_str(&format!("param {key}={value}\n"));
  }
  out.push_str(&format!(
    "environment: distro={} container={} budget={}\n",
    job.distro,
    job.distro.compose_project(),
    header
      .budget_secs
      .map(|s| s.to_string())
      .unwrap_or_else(|| "unbounded".to_string())
  ));
  out.push_str("pre-run snapshot:\n");
  out.push_str(&header.pre_run_snapshot);
  if !header.pre_run_snapshot.ends_with('\n') {
    out.push('\n');
  }
  for log in logs {
    out.push_str(&format!("[{}] $ {}\n", log.stage, log.command));
    out.push_str(&log.stdout);
    if !log.stdout.ends_with('\n') && !log.stdout.is_empty() {
      out.push('\n');
    }
    if !log.stderr.is_empty() {
      out.push_str("--- stderr ---\n");
      out.push_str(&log.stderr);
      if !log.stderr.ends_with('\n') {
        out.push('\n');
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn job() -> JobIdentity {
    JobIdentity {
      deploy_type: DeployType::Server,
      distro: Distro::Debian,
      app: AppId::new("web-app-keycloak").unwrap(),
    }
  }

  #[tokio::test]
  async fn log_file_exists_and_starts_with_header_banner() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = LogSink::new(tmp.path());
    let job = job();
    let header = SessionHeader {
      pre_run_snapshot: "disk: 10G free\n".into(),
      ..Default::default()
    };
    let logs = vec![Log::simple("pass-1", "ok")];
    let path = sink.append_session(&job, &header, &logs).await.unwrap();
    assert!(path.exists());
    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(contents.starts_with(&"=".repeat(BANNER_WIDTH)));
    assert!(contents.contains("[pass-1] $"));
  }

  #[tokio::test]
  async fn second_session_appends_rather_than_truncates() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = LogSink::new(tmp.path());
    let job = job();
    let header = SessionHeader::default();
    sink
      .append_session(&job, &header, &[Log::simple("pass-1", "first")])
      .await
      .unwrap();
    sink
      .append_session(&job, &header, &[Log::simple("pass-2", "second")])
      .await
      .unwrap();
    let contents = tokio::fs::read_to_string(sink.log_path(&job)).await.unwrap();
    assert!(contents.contains("first"));
    assert!(contents.contains("second"));
    assert_eq!(contents.matches(&"=".repeat(BANNER_WIDTH)).count(), 2);
  }
}
