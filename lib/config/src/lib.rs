//! DTO configuration. Environment variables are parsed exactly once, here,
//! into an immutable [`DtoConfig`] value that every component receives by
//! reference. No component should call `std::env::var` itself after
//! start-up; new options are added as fields on this struct instead.

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use dto_types::{DeployType, Distro, Lifecycle};
use serde::Deserialize;

/// Raw shape of the recognized environment variables (`envy` lower-cases
/// and matches field names against them).
#[derive(Debug, Deserialize, Default)]
struct Env {
  test_deploy_type: Option<String>,
  infinito_distro: Option<String>,
  distros: Option<String>,
  tested_lifecycles: Option<String>,
  max_total_seconds: Option<String>,
  inventory_dir: Option<PathBuf>,
  python: Option<String>,
  github_actions: Option<String>,
  act: Option<String>,
  github_output: Option<PathBuf>,
  github_env: Option<PathBuf>,
}

/// Only consumed by the discovery path, to emit workflow outputs when
/// running inside GitHub Actions (or `act`'s local emulation of it).
#[derive(Debug, Clone, Default)]
pub struct GithubActionsContext {
  pub enabled: bool,
  pub output_path: Option<PathBuf>,
  pub env_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DtoConfig {
  pub deploy_type: Option<DeployType>,
  pub distro: Option<Distro>,
  pub distros: Vec<Distro>,
  pub lifecycles: Vec<Lifecycle>,
  pub budget: Option<Duration>,
  pub inventory_dir: PathBuf,
  /// Path to the opaque tool used to enumerate applications.
  pub python: String,
  pub github: GithubActionsContext,
}

impl Default for DtoConfig {
  fn default() -> Self {
    Self {
      deploy_type: None,
      distro: None,
      distros: Vec::new(),
      lifecycles: Lifecycle::ALL.to_vec(),
      budget: None,
      inventory_dir: PathBuf::from("./inventory"),
      python: "python3".to_string(),
      github: GithubActionsContext::default(),
    }
  }
}

impl DtoConfig {
  /// Parses the process environment into an immutable configuration value.
  /// Call this once, at process entry.
  pub fn from_env() -> anyhow::Result<Self> {
    let env: Env = envy::from_env().context("failed to parse DTO environment")?;
    Self::from_parsed_env(env)
  }

  fn from_parsed_env(env: Env) -> anyhow::Result<Self> {
    let defaults = Self::default();

    let deploy_type = env
      .test_deploy_type
      .map(|s| parse_enum::<DeployType>(&s, "TEST_DEPLOY_TYPE"))
      .transpose()?;

    let distro = env
      .infinito_distro
      .map(|s| parse_enum::<Distro>(&s, "INFINITO_DISTRO"))
      .transpose()?;

    let distros = match env.distros {
      Some(list) => list
        .split_whitespace()
        .map(|s| parse_enum::<Distro>(s, "DISTROS"))
        .collect::<anyhow::Result<Vec<_>>>()?,
      None => Vec::new(),
    };

    let lifecycles = match env.tested_lifecycles {
      Some(list) if !list.trim().is_empty() => list
        .split_whitespace()
        .map(|s| parse_enum::<Lifecycle>(s, "TESTED_LIFECYCLES"))
        .collect::<anyhow::Result<Vec<_>>>()?,
      _ => defaults.lifecycles.clone(),
    };

    let budget = match env.max_total_seconds {
      Some(s) if !s.trim().is_empty() => {
        let secs: u64 = s
          .trim()
          .parse()
          .with_context(|| format!("MAX_TOTAL_SECONDS is not an integer: '{s}'"))?;
        Some(Duration::from_secs(secs))
      }
      _ => None,
    };

    let inventory_dir = env.inventory_dir.unwrap_or(defaults.inventory_dir);
    let python = env.python.unwrap_or(defaults.python);

    let github_enabled = is_truthy(env.github_actions.as_deref()) || is_truthy(env.act.as_deref());

    Ok(Self {
      deploy_type,
      distro,
      distros,
      lifecycles,
      budget,
      inventory_dir,
      python,
      github: GithubActionsContext {
        enabled: github_enabled,
        output_path: env.github_output,
        env_path: env.github_env,
      },
    })
  }

  /// Distros to operate over: explicit `DISTROS` list if given, else the
  /// single `INFINITO_DISTRO`, else every known distro.
  pub fn resolved_distros(&self) -> Vec<Distro> {
    if !self.distros.is_empty() {
      return self.distros.clone();
    }
    if let Some(distro) = self.distro {
      return vec![distro];
    }
    Distro::ALL.to_vec()
  }
}

fn is_truthy(value: Option<&str>) -> bool {
  matches!(value, Some(v) if v.eq_ignore_ascii_case("true") || v == "1")
}

fn parse_enum<T>(raw: &str, var_name: &str) -> anyhow::Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .parse::<T>()
    .map_err(|e| anyhow::anyhow!("invalid value '{raw}' for {var_name}: {e}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_cover_all_lifecycles() {
    let cfg = DtoConfig::from_parsed_env(Env::default()).unwrap();
    assert_eq!(cfg.lifecycles.len(), 4);
    assert!(cfg.budget.is_none());
  }

  #[test]
  fn parses_distro_list_and_budget() {
    let env = Env {
      distros: Some("debian ubuntu".to_string()),
      max_total_seconds: Some("3600".to_string()),
      ..Default::default()
    };
    let cfg = DtoConfig::from_parsed_env(env).unwrap();
    assert_eq!(cfg.distros, vec![Distro::Debian, Distro::Ubuntu]);
    assert_eq!(cfg.budget, Some(Duration::from_secs(3600)));
  }

  #[test]
  fn rejects_unknown_distro() {
    let env = Env {
      distros: Some("solaris".to_string()),
      ..Default::default()
    };
    assert!(DtoConfig::from_parsed_env(env).is_err());
  }

  #[test]
  fn resolved_distros_falls_back_through_single_then_all() {
    let mut cfg = DtoConfig::default();
    assert_eq!(cfg.resolved_distros(), Distro::ALL.to_vec());
    cfg.distro = Some(Distro::Fedora);
    assert_eq!(cfg.resolved_distros(), vec![Distro::Fedora]);
    cfg.distros = vec![Distro::Arch, Distro::Centos];
    assert_eq!(cfg.resolved_distros(), vec![Distro::Arch, Distro::Centos]);
  }

  #[test]
  fn github_context_detects_act_and_actions() {
    let env = Env {
      act: Some("true".to_string()),
      ..Default::default()
    };
    let cfg = DtoConfig::from_parsed_env(env).unwrap();
    assert!(cfg.github.enabled);
  }
}
