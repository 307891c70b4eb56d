use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub fn dto_timestamp() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// A single Process-Runner-mediated command, as written to the Log Sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
  pub stage: String,
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  pub start_ts: i64,
  pub end_ts: i64,
}

impl Log {
  pub fn simple(stage: impl Into<String>, stdout: impl Into<String>) -> Self {
    let ts = dto_timestamp();
    Self {
      stage: stage.into(),
      command: String::new(),
      stdout: stdout.into(),
      stderr: String::new(),
      success: true,
      start_ts: ts,
      end_ts: ts,
    }
  }

  pub fn error(stage: impl Into<String>, stderr: impl Into<String>) -> Self {
    let ts = dto_timestamp();
    Self {
      stage: stage.into(),
      command: String::new(),
      stdout: String::new(),
      stderr: stderr.into(),
      success: false,
      start_ts: ts,
      end_ts: ts,
    }
  }

  pub fn duration_ms(&self) -> i64 {
    (self.end_ts - self.start_ts).max(0)
  }
}

pub fn all_logs_success(logs: &[Log]) -> bool {
  logs.iter().all(|log| log.success)
}
