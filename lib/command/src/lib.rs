//! Process Runner (PR): the foundation every other DTO component spawns
//! external work through. A single [`run`] call starts a child in its own
//! process group, captures stdout/stderr, enforces a timeout with a
//! graceful-then-forceful kill sequence, and honors external cancellation.
//! It never raises for a non-zero exit, only for spawn failure.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use dto_types::Cause;
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  process::Command,
  time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Grace window between `SIGTERM` and `SIGKILL` on timeout/cancellation.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RunRequest {
  pub program: String,
  pub args: Vec<String>,
  /// Exact child environment. The child never inherits the parent's full
  /// environment; only `PATH` is forwarded implicitly unless overridden.
  pub env: HashMap<String, String>,
  pub cwd: Option<PathBuf>,
  pub stdin: Option<String>,
  pub timeout: Duration,
  pub grace: Duration,
}

impl RunRequest {
  pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      env: HashMap::new(),
      cwd: None,
      stdin: None,
      timeout,
      grace: DEFAULT_GRACE,
    }
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn stdin(mut self, stdin: impl Into<String>) -> Self {
    self.stdin = Some(stdin.into());
    self
  }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
  /// `None` on clean exit (zero or non-zero); `Some(Timeout)` when the
  /// timeout/cancellation kill sequence fired.
  pub cause: Option<Cause>,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.cause.is_none() && self.exit_code == Some(0)
  }
}

/// Runs `req` to completion (or until timeout/cancellation), never
/// returning `Err` for a non-zero exit. `Err` is reserved for spawn
/// failure (program not found, permission denied, etc).
pub async fn run(req: RunRequest, cancel: CancellationToken) -> anyhow::Result<CommandOutput> {
  let start = Instant::now();

  let mut cmd = Command::new(&req.program);
  cmd.args(&req.args).env_clear().kill_on_drop(true);
  if let Ok(path) = std::env::var("PATH") {
    cmd.env("PATH", path);
  }
  for (key, value) in &req.env {
    cmd.env(key, value);
  }
  if let Some(cwd) = &req.cwd {
    cmd.current_dir(cwd);
  }
  cmd.stdin(std::process::Stdio::piped());
  cmd.stdout(std::process::Stdio::piped());
  cmd.stderr(std::process::Stdio::piped());

  #[cfg(unix)]
  unsafe {
    // New session/process group so a timeout can signal the whole tree,
    // not just the direct child.
    cmd.pre_exec(|| {
      nix::unistd::setsid().map_err(std::io::Error::from)?;
      Ok(())
    });
  }

  let mut child = cmd.spawn()?;

  if let Some(stdin_data) = &req.stdin {
    if let Some(mut stdin) = child.stdin.take() {
      let _ = stdin.write_all(stdin_data.as_bytes()).await;
      let _ = stdin.shutdown().await;
    }
  } else {
    // Drop stdin so a child reading from it sees EOF immediately.
    drop(child.stdin.take());
  }

  let mut stdout_pipe = child.stdout.take();
  let mut stderr_pipe = child.stderr.take();
  let stdout_task = tokio::spawn(async move {
    let mut buf = String::new();
    if let Some(pipe) = stdout_pipe.as_mut() {
      let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
  });
  let stderr_task = tokio::spawn(async move {
    let mut buf = String::new();
    if let Some(pipe) = stderr_pipe.as_mut() {
      let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
  });

  let wait_result = tokio::select! {
    res = timeout(req.timeout, child.wait()) => res,
    _ = cancel.cancelled() => Err(tokio::time::error::Elapsed::new()),
  };

  match wait_result {
    Ok(Ok(status)) => {
      let stdout = stdout_task.await.unwrap_or_default();
      let stderr = stderr_task.await.unwrap_or_default();
      Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        duration: start.elapsed(),
        cause: None,
      })
    }
    Ok(Err(spawn_err)) => Err(spawn_err.into()),
    Err(_elapsed) => {
      terminate_process_group(&child, req.grace).await;
      let _ = child.wait().await;
      stdout_task.abort();
      stderr_task.abort();
      Ok(CommandOutput {
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        duration: start.elapsed(),
        cause: Some(Cause::Timeout),
      })
    }
  }
}

#[cfg(unix)]
async fn terminate_process_group(child: &tokio::process::Child, grace: Duration) {
  use nix::{
    sys::signal::{Signal, killpg},
    unistd::Pid,
  };
  if let Some(pid) = child.id() {
    let pgid = Pid::from_raw(pid as i32);
    let _ = killpg(pgid, Signal::SIGTERM);
    tokio::time::sleep(grace).await;
    let _ = killpg(pgid, Signal::SIGKILL);
  }
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &tokio::process::Child, _grace: Duration) {
  let _ = child.id();
}

/// Convenience for the common case of running a shell-like command string
/// with no cancellation hook, just an explicit timeout.
pub async fn run_shell(
  command: impl AsRef<str>,
  cwd: Option<&Path>,
  timeout: Duration,
) -> anyhow::Result<CommandOutput> {
  let mut req = RunRequest::new("sh", timeout).args(["-c", command.as_ref()]);
  if let Some(cwd) = cwd {
    req = req.cwd(cwd);
  }
  run(req, CancellationToken::new()).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn captures_stdout_and_exit_code() {
    let out = run_shell("echo -n hello", None, Duration::from_secs(5))
      .await
      .unwrap();
    assert!(out.success());
    assert_eq!(out.stdout, "hello");
  }

  #[tokio::test]
  async fn clean_non_zero_is_not_an_error() {
    let out = run_shell("exit 3", None, Duration::from_secs(5))
      .await
      .unwrap();
    assert!(!out.success());
    assert_eq!(out.exit_code, Some(3));
    assert!(out.cause.is_none());
  }

  #[tokio::test]
  async fn timeout_reports_timeout_cause() {
    let start = Instant::now();
    let out = run_shell("sleep 30", None, Duration::from_millis(200))
      .await
      .unwrap();
    assert_eq!(out.cause, Some(Cause::Timeout));
    // Grace defaults to 10s, but we never hit it here because sleep doesn't
    // trap SIGTERM; still assert we didn't wait anywhere near the full sleep.
    assert!(start.elapsed() < Duration::from_secs(15));
  }

  #[tokio::test]
  async fn cancellation_token_stops_the_child() {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      token.cancel();
    });
    let req = RunRequest::new("sh", Duration::from_secs(30)).args(["-c", "sleep 30"]);
    let out = run(req, cancel).await.unwrap();
    assert_eq!(out.cause, Some(Cause::Timeout));
  }

  #[tokio::test]
  async fn env_is_not_inherited() {
    // SAFETY: test-only, single-threaded at this point in the test body.
    unsafe {
      std::env::set_var("DTO_TEST_SECRET", "leaked");
    }
    let out = run_shell("echo -n ${DTO_TEST_SECRET:-absent}", None, Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(out.stdout, "absent");
    unsafe {
      std::env::remove_var("DTO_TEST_SECRET");
    }
  }
}
