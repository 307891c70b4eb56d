#[macro_use]
extern crate tracing;

use clap::Parser;
use config::DtoConfig;

use crate::args::{CliArgs, Command};

mod args;
mod command;

async fn app(args: &CliArgs, config: &DtoConfig) -> anyhow::Result<i32> {
  match &args.command {
    Command::Discover(discover) => command::discover::handle(discover, config).await,
    Command::Inventory { command } => command::inventory::handle(command, config).await,
    Command::Deploy { command } => command::deploy::handle(command, config).await,
    Command::Purge(purge) => command::purge::handle(purge).await,
  }
}

fn exit_code_for_error(e: &anyhow::Error) -> i32 {
  match e.downcast_ref::<dto_types::DtoError>() {
    Some(err) if err.is_invalid_input() => 2,
    Some(err) if err.is_timeout() => 124,
    _ => 1,
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  let cli_args = CliArgs::parse();
  let log_format: logger::LogFormat = cli_args.log_format.parse()?;
  let log_level: tracing::Level = cli_args.log_level.parse()?;
  logger::init(log_format, log_level)?;

  let config = DtoConfig::from_env()?;

  let mut term_signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  let exit_code = tokio::select! {
    res = app(&cli_args, &config) => {
      match res {
        Ok(code) => code,
        Err(e) => {
          error!("{e:#}");
          exit_code_for_error(&e)
        }
      }
    }
    _ = term_signal.recv() => 130,
  };

  std::process::exit(exit_code);
}
