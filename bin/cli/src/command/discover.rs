use std::{collections::HashSet, time::Duration};

use anyhow::Context;
use catalog::{AppMetadata, CatalogQuery};
use config::DtoConfig;
use dto_types::{AppId, Lifecycle};
use regex::Regex;
use tokio::io::AsyncWriteExt;

use crate::args::Discover;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn handle(args: &Discover, config: &DtoConfig) -> anyhow::Result<i32> {
  let lifecycles = match &args.lifecycles {
    Some(raw) => parse_lifecycles(raw)?,
    None => config.lifecycles.iter().copied().collect(),
  };

  let query = CatalogQuery {
    lifecycles,
    include_regex: args.include.as_deref().map(Regex::new).transpose().context("invalid --include regex")?,
    exclude_regex: args.exclude.as_deref().map(Regex::new).transpose().context("invalid --exclude regex")?,
    final_exclude_regex: args
      .final_exclude
      .as_deref()
      .map(Regex::new)
      .transpose()
      .context("invalid --final-exclude regex")?,
    whitelist: args.whitelist.as_deref().map(parse_whitelist).transpose()?,
    storage_required_mb: args.storage,
  };

  let raw: Vec<AppMetadata> = catalog::discover_apps(&config.python, DISCOVERY_TIMEOUT).await?;
  let deploy_type = args.r#type.into();
  let result = catalog::resolve(&raw, deploy_type, &query)?;

  for warning in &result.storage_warnings {
    tracing::warn!(app = %warning, "dropped by storage-sufficiency gate");
  }

  let ids: Vec<&str> = result.apps.iter().map(AppId::as_str).collect();
  let json = serde_json::to_string(&ids)?;
  println!("{json}");

  emit_github_outputs(config, &json).await?;
  Ok(0)
}

fn parse_lifecycles(raw: &str) -> anyhow::Result<HashSet<Lifecycle>> {
  raw
    .split_whitespace()
    .map(|s| s.parse::<Lifecycle>().map_err(|e| anyhow::anyhow!("invalid lifecycle '{s}': {e}")))
    .collect()
}

fn parse_whitelist(raw: &str) -> anyhow::Result<HashSet<AppId>> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| AppId::new(s).map_err(|e| anyhow::anyhow!("invalid whitelist entry '{s}': {e}")))
    .collect()
}

async fn emit_github_outputs(config: &DtoConfig, json: &str) -> anyhow::Result<()> {
  if !config.github.enabled {
    return Ok(());
  }
  if let Some(path) = &config.github.output_path {
    let line = format!("apps={json}\n");
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(path)
      .await
      .context("failed to open GITHUB_OUTPUT")?;
    file.write_all(line.as_bytes()).await.context("failed to write GITHUB_OUTPUT")?;
  }
  Ok(())
}
