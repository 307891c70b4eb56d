//! Invokes the opaque application enumerator (the `PYTHON` interpreter
//! configured for the host) through the Process Runner and parses its
//! JSON output into [`AppMetadata`]. The enumerator itself, what language
//! it's written in, how it reads the application sources, is a black box;
//! only its stdout contract is load-bearing.

use std::time::Duration;

use command::{RunRequest, run};
use dto_types::{AppId, DtoError, Lifecycle};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::AppMetadata;

#[derive(Debug, Deserialize)]
struct RawEntry {
  id: String,
  lifecycle: Lifecycle,
  #[serde(default)]
  storage_mb: u64,
}

const EXCERPT_LEN: usize = 400;

/// Runs `<python> -m app_discovery --format json` and parses the result.
/// Surfaces a [`DtoError::Discovery`] on non-JSON output or spawn/timeout
/// failure; never panics on malformed enumerator output.
pub async fn discover_apps(python: &str, timeout: Duration) -> dto_types::Result<Vec<AppMetadata>> {
  let req = RunRequest::new(python, timeout).args(["-m", "app_discovery", "--format", "json"]);
  let output = run(req, CancellationToken::new())
    .await
    .map_err(|e| DtoError::Discovery {
      message: e.to_string(),
      raw_output_excerpt: String::new(),
    })?;

  if !output.success() {
    return Err(DtoError::Discovery {
      message: format!("enumerator exited with {:?}", output.exit_code),
      raw_output_excerpt: excerpt(&output.stderr),
    });
  }

  let raw: Vec<RawEntry> = serde_json::from_str(&output.stdout).map_err(|e| DtoError::Discovery {
    message: e.to_string(),
    raw_output_excerpt: excerpt(&output.stdout),
  })?;

  raw
    .into_iter()
    .map(|entry| {
      Ok(AppMetadata {
        id: AppId::new(entry.id)?,
        lifecycle: entry.lifecycle,
        storage_mb: entry.storage_mb,
      })
    })
    .collect()
}

fn excerpt(s: &str) -> String {
  if s.len() <= EXCERPT_LEN {
    s.to_string()
  } else {
    format!("{}…", &s[..EXCERPT_LEN])
  }
}
