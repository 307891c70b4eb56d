use std::time::Duration;

use purge::PurgeRequest;

use crate::args::Purge;

const PURGE_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn handle(args: &Purge) -> anyhow::Result<i32> {
  let req = PurgeRequest {
    entity: args.entity.clone(),
    mode: args.mode.into(),
    env_file: args.env_file.clone(),
    compose_file: args.compose_file.clone(),
    persistent_dir: args.persistent_dir.clone(),
  };

  match purge::purge(&req, PURGE_TIMEOUT).await {
    Ok(outcome) => {
      for warning in &outcome.warnings {
        tracing::warn!(entity = %args.entity, "{warning}");
      }
      Ok(outcome.exit_code)
    }
    Err(e) if e.is_invalid_input() => {
      eprintln!("{e}");
      Ok(2)
    }
    Err(e) => Err(e.into()),
  }
}
