//! Process-wide `tracing` subscriber setup for the DTO binaries. No
//! OpenTelemetry exporter: the orchestrator runs as a local batch job with
//! no collector to ship spans to, so only stdout/stderr formatting layers
//! are wired up here.

use std::str::FromStr;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Registry, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
  #[default]
  Standard,
  Pretty,
  Json,
  None,
}

impl FromStr for LogFormat {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "standard" | "" => Ok(Self::Standard),
      "pretty" => Ok(Self::Pretty),
      "json" => Ok(Self::Json),
      "none" => Ok(Self::None),
      other => anyhow::bail!("unknown log format '{other}'"),
    }
  }
}

/// Initializes the global subscriber. Safe to call at most once per
/// process; a second call returns an error rather than panicking.
pub fn init(format: LogFormat, level: tracing::Level) -> anyhow::Result<()> {
  let registry = Registry::default().with(LevelFilter::from(level));

  match format {
    LogFormat::Standard => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    LogFormat::Pretty => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    LogFormat::None => Ok(()),
  }
  .context("failed to init logger")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_formats() {
    assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
    assert_eq!(LogFormat::from_str("PRETTY").unwrap(), LogFormat::Pretty);
    assert_eq!(LogFormat::from_str("").unwrap(), LogFormat::Standard);
    assert!(LogFormat::from_str("xml").is_err());
  }
}
