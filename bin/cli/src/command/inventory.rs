use std::collections::BTreeMap;

use anyhow::Context;
use config::DtoConfig;
use dto_types::AppId;
use inventory::{BuildRequest, VarValue};

use crate::args::{InventoryCommand, InventoryInit};

pub async fn handle(command: &InventoryCommand, config: &DtoConfig) -> anyhow::Result<i32> {
  match command {
    InventoryCommand::Init(args) => init(args, config).await,
  }
}

async fn init(args: &InventoryInit, config: &DtoConfig) -> anyhow::Result<i32> {
  let apps = parse_apps(&args.apps)?;
  let vars = match &args.vars_json {
    Some(raw) => serde_json::from_str::<BTreeMap<String, VarValue>>(raw).context("invalid --vars-json")?,
    None => BTreeMap::new(),
  };
  let inventory_dir = args.inventory_dir.clone().unwrap_or_else(|| config.inventory_dir.clone());

  let req = BuildRequest {
    deploy_type: args.r#type.into(),
    distro: args.distro.into(),
    apps,
    vars,
    inventory_dir,
  };

  match inventory::build(&req).await {
    Ok(paths) => {
      println!("{}", paths.yaml_path.display());
      Ok(0)
    }
    Err(e) if e.is_invalid_input() => {
      eprintln!("{e}");
      Ok(2)
    }
    Err(e) => Err(e.into()),
  }
}

fn parse_apps(raw: &str) -> anyhow::Result<Vec<AppId>> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| AppId::new(s).map_err(|e| anyhow::anyhow!("invalid app id '{s}': {e}")))
    .collect()
}
