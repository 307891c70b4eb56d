use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dtoctl", about = "Deployment Test Orchestrator")]
pub struct CliArgs {
  #[command(subcommand)]
  pub command: Command,

  /// Log output format: standard, pretty, json, or none.
  #[arg(long, global = true, default_value = "standard")]
  pub log_format: String,

  #[arg(long, global = true, default_value = "info")]
  pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Resolves the application catalog for a deploy type and prints it as JSON.
  Discover(Discover),
  /// Inventory directory operations.
  Inventory {
    #[command(subcommand)]
    command: InventoryCommand,
  },
  /// Deploy operations: a single (distro, app) or the full distro matrix.
  Deploy {
    #[command(subcommand)]
    command: DeployCommand,
  },
  /// Tears down an entity's database, compose stack, and persistent files.
  Purge(Purge),
}

#[derive(Debug, clap::Args)]
pub struct Discover {
  #[arg(long, value_enum)]
  pub r#type: CliDeployType,
  /// Space-separated lifecycle names; defaults to the environment/config value.
  #[arg(long)]
  pub lifecycles: Option<String>,
  #[arg(long)]
  pub include: Option<String>,
  #[arg(long)]
  pub exclude: Option<String>,
  #[arg(long)]
  pub final_exclude: Option<String>,
  /// Comma-separated app id whitelist.
  #[arg(long)]
  pub whitelist: Option<String>,
  /// Available storage in MB; apps requiring more are dropped with a warning.
  #[arg(long)]
  pub storage: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum InventoryCommand {
  Init(InventoryInit),
}

#[derive(Debug, clap::Args)]
pub struct InventoryInit {
  #[arg(long, value_enum)]
  pub r#type: CliDeployType,
  #[arg(long, value_enum)]
  pub distro: CliDistro,
  /// Comma-separated application ids.
  #[arg(long)]
  pub apps: String,
  /// JSON object of scalar/boolean override vars.
  #[arg(long)]
  pub vars_json: Option<String>,
  #[arg(long)]
  pub inventory_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum DeployCommand {
  One(DeployOne),
  Matrix(DeployMatrix),
}

#[derive(Debug, clap::Args)]
pub struct DeployOne {
  #[arg(long, value_enum)]
  pub distro: CliDistro,
  #[arg(long)]
  pub app: String,
  #[arg(long, value_enum)]
  pub r#type: CliDeployType,
  #[arg(long)]
  pub inventory_dir: Option<PathBuf>,
  #[arg(long, default_value = "control")]
  pub service: String,
  #[arg(long)]
  pub pre_purge: Vec<String>,
  #[arg(long)]
  pub debug: bool,
  /// Per-pass timeout in seconds.
  #[arg(long, default_value_t = 1800)]
  pub pass_timeout_secs: u64,
}

#[derive(Debug, clap::Args)]
pub struct DeployMatrix {
  #[arg(long)]
  pub app: String,
  #[arg(long, value_enum)]
  pub r#type: CliDeployType,
  /// Space-separated distro names; defaults to the environment/config value.
  #[arg(long)]
  pub distros: Option<String>,
  #[arg(long)]
  pub budget_seconds: Option<u64>,
  #[arg(long)]
  pub inventory_dir: Option<PathBuf>,
  #[arg(long, default_value = "control")]
  pub service: String,
  #[arg(long)]
  pub pre_purge: Vec<String>,
  #[arg(long)]
  pub debug: bool,
  #[arg(long, default_value_t = 1800)]
  pub pass_timeout_secs: u64,
  #[arg(long)]
  pub seed: Option<u64>,
}

#[derive(Debug, clap::Args)]
pub struct Purge {
  pub entity: String,
  #[arg(long, value_enum, default_value = "drop")]
  pub mode: CliPurgeMode,
  #[arg(long)]
  pub env_file: Option<PathBuf>,
  #[arg(long)]
  pub compose_file: Option<PathBuf>,
  #[arg(long)]
  pub persistent_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliDeployType {
  Server,
  Workstation,
  Universal,
}

impl From<CliDeployType> for dto_types::DeployType {
  fn from(v: CliDeployType) -> Self {
    match v {
      CliDeployType::Server => Self::Server,
      CliDeployType::Workstation => Self::Workstation,
      CliDeployType::Universal => Self::Universal,
    }
  }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliDistro {
  Arch,
  Debian,
  Ubuntu,
  Fedora,
  Centos,
}

impl From<CliDistro> for dto_types::Distro {
  fn from(v: CliDistro) -> Self {
    match v {
      CliDistro::Arch => Self::Arch,
      CliDistro::Debian => Self::Debian,
      CliDistro::Ubuntu => Self::Ubuntu,
      CliDistro::Fedora => Self::Fedora,
      CliDistro::Centos => Self::Centos,
    }
  }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliPurgeMode {
  Drop,
  Truncate,
  StackOnly,
  All,
}

impl From<CliPurgeMode> for purge::PurgeMode {
  fn from(v: CliPurgeMode) -> Self {
    match v {
      CliPurgeMode::Drop => Self::Drop,
      CliPurgeMode::Truncate => Self::Truncate,
      CliPurgeMode::StackOnly => Self::StackOnly,
      CliPurgeMode::All => Self::All,
    }
  }
}
