//! Inventory Builder (IB): writes the deploy inventory directory for one
//! (type, distro) bundle (a host/group vars YAML document plus a vault
//! password file) from a selected application subset and per-run
//! overrides. Idempotent: identical inputs produce a byte-identical YAML
//! document (no embedded timestamps, canonical key ordering for the
//! override map).

use std::{collections::BTreeMap, path::PathBuf};

use dto_types::{AppId, DeployType, Distro, DtoError};
use rand::distr::SampleString;
use serde::{Deserialize, Serialize};

/// A scalar override value, keyed by name in [`BuildRequest::vars`].
/// Notable keys: `ASYNC_ENABLED`, `RUNTIME`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
  Bool(bool),
  Int(i64),
  Str(String),
}

impl From<bool> for VarValue {
  fn from(v: bool) -> Self {
    Self::Bool(v)
  }
}

impl From<&str> for VarValue {
  fn from(v: &str) -> Self {
    Self::Str(v.to_string())
  }
}

impl std::fmt::Display for VarValue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Bool(v) => write!(f, "{v}"),
      Self::Int(v) => write!(f, "{v}"),
      Self::Str(v) => write!(f, "{v}"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
  pub deploy_type: DeployType,
  pub distro: Distro,
  pub apps: Vec<AppId>,
  /// Canonically ordered so identical inputs always serialize identically
  /// regardless of caller insertion order.
  pub vars: BTreeMap<String, VarValue>,
  pub inventory_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InventoryPaths {
  pub dir: PathBuf,
  pub yaml_path: PathBuf,
  pub password_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct InventoryDocument {
  all: AllGroup,
}

#[derive(Debug, Serialize)]
struct AllGroup {
  vars: GroupVars,
}

#[derive(Debug, Serialize)]
struct GroupVars {
  test_deploy_type: DeployType,
  infinito_distro: Distro,
  applications: Vec<AppId>,
  #[serde(flatten)]
  overrides: BTreeMap<String, VarValue>,
}

/// Builds `<inventory_dir>/local-full-<type>/<type>.yml` and its sibling
/// `.password` file (created with mode 0600 if missing). Rejects an empty
/// `apps` list with `InvalidInput`.
pub async fn build(req: &BuildRequest) -> dto_types::Result<InventoryPaths> {
  if req.apps.is_empty() {
    return Err(DtoError::invalid_input(
      "inventory build requires a non-empty application list",
    ));
  }

  let dir = req.inventory_dir.join(format!("local-full-{}", req.deploy_type));
  tokio::fs::create_dir_all(&dir)
    .await
    .map_err(|e| DtoError::internal(format!("failed to create inventory dir: {e}")))?;

  let yaml_path = dir.join(format!("{}.yml", req.deploy_type));
  let password_path = dir.join(".password");

  let doc = InventoryDocument {
    all: AllGroup {
      vars: GroupVars {
        test_deploy_type: req.deploy_type,
        infinito_distro: req.distro,
        applications: req.apps.clone(),
        overrides: req.vars.clone(),
      },
    },
  };
  let yaml = serde_yaml_ng::to_string(&doc)
    .map_err(|e| DtoError::internal(format!("failed to render inventory yaml: {e}")))?;
  tokio::fs::write(&yaml_path, yaml)
    .await
    .map_err(|e| DtoError::internal(format!("failed to write inventory yaml: {e}")))?;

  ensure_password_file(&password_path).await?;

  Ok(InventoryPaths {
    dir,
    yaml_path,
    password_path,
  })
}

async fn ensure_password_file(path: &std::path::Path) -> dto_types::Result<()> {
  if tokio::fs::metadata(path).await.is_ok() {
    return Ok(());
  }
  let password = rand::distr::Alphanumeric.sample_string(&mut rand::rng(), 32);
  tokio::fs::write(path, format!("{password}\n"))
    .await
    .map_err(|e| DtoError::internal(format!("failed to write vault password file: {e}")))?;
  set_owner_only_permissions(path).await?;
  Ok(())
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &std::path::Path) -> dto_types::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
    .await
    .map_err(|e| DtoError::internal(format!("failed to chmod vault password file: {e}")))
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &std::path::Path) -> dto_types::Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(dir: PathBuf, async_enabled: bool) -> BuildRequest {
    let mut vars = BTreeMap::new();
    vars.insert("ASYNC_ENABLED".to_string(), VarValue::from(async_enabled));
    vars.insert("RUNTIME".to_string(), VarValue::from("docker"));
    BuildRequest {
      deploy_type: DeployType::Server,
      distro: Distro::Debian,
      apps: vec![AppId::new("web-app-keycloak").unwrap()],
      vars,
      inventory_dir: dir,
    }
  }

  #[tokio::test]
  async fn rejects_empty_apps() {
    let tmp = tempfile::tempdir().unwrap();
    let mut req = request(tmp.path().to_path_buf(), false);
    req.apps.clear();
    let err = build(&req).await.unwrap_err();
    assert!(err.is_invalid_input());
  }

  #[tokio::test]
  async fn build_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let req = request(tmp.path().to_path_buf(), false);
    let first = build(&req).await.unwrap();
    let first_contents = tokio::fs::read_to_string(&first.yaml_path).await.unwrap();
    let second = build(&req).await.unwrap();
    let second_contents = tokio::fs::read_to_string(&second.yaml_path).await.unwrap();
    assert_eq!(first_contents, second_contents);
  }

  #[tokio::test]
  async fn password_file_is_created_once_with_owner_only_permissions() {
    let tmp = tempfile::tempdir().unwrap();
    let req = request(tmp.path().to_path_buf(), false);
    let paths = build(&req).await.unwrap();
    let first_password = tokio::fs::read_to_string(&paths.password_path).await.unwrap();

    build(&req).await.unwrap();
    let second_password = tokio::fs::read_to_string(&paths.password_path).await.unwrap();
    assert_eq!(first_password, second_password, "password must not be regenerated");

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let mode = std::fs::metadata(&paths.password_path).unwrap().permissions().mode();
      assert_eq!(mode & 0o777, 0o600);
    }
  }

  #[tokio::test]
  async fn async_toggle_changes_rendered_vars() {
    let tmp = tempfile::tempdir().unwrap();
    let sync_req = request(tmp.path().to_path_buf(), false);
    let paths = build(&sync_req).await.unwrap();
    let sync_yaml = tokio::fs::read_to_string(&paths.yaml_path).await.unwrap();
    assert!(sync_yaml.contains("ASYNC_ENABLED: false"));

    let async_req = request(tmp.path().to_path_buf(), true);
    build(&async_req).await.unwrap();
    let async_yaml = tokio::fs::read_to_string(&paths.yaml_path).await.unwrap();
    assert!(async_yaml.contains("ASYNC_ENABLED: true"));
  }
}
