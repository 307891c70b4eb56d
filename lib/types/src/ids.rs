use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{DtoError, Result};

/// Category prefixes stripped from an [`AppId`] to produce its entity name.
///
/// Order matters: the first matching prefix wins, so the more specific
/// `util-desk-` must be checked before the bare `desk-` would otherwise
/// (harmlessly) match nothing, since `util-desk-` doesn't start with `desk-`.
const CATEGORY_PREFIXES: &[&str] =
  &["web-app-", "web-svc-", "desk-", "util-desk-"];

/// Opaque lowercase application identifier, e.g. `web-app-nextcloud`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
  /// Builds an `AppId`, rejecting anything that isn't lowercase ascii,
  /// digits, or `-`/`_`. Empty ids are rejected as `InvalidInput`.
  pub fn new(id: impl Into<String>) -> Result<Self> {
    let id = id.into();
    if id.is_empty() {
      return Err(DtoError::invalid_input("app id must not be empty"));
    }
    if !id
      .chars()
      .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
      return Err(DtoError::invalid_input(format!(
        "app id '{id}' contains characters outside [a-z0-9_-]"
      )));
    }
    Ok(Self(id))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The filesystem/database key derived by stripping the app's category
  /// prefix. Falls back to the full id if no known prefix matches.
  pub fn entity_name(&self) -> &str {
    for prefix in CATEGORY_PREFIXES {
      if let Some(stripped) = self.0.strip_prefix(prefix) {
        return stripped;
      }
    }
    &self.0
  }
}

impl fmt::Display for AppId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for AppId {
  type Err = DtoError;
  fn from_str(s: &str) -> Result<Self> {
    Self::new(s)
  }
}

impl AsRef<str> for AppId {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// The audience bucket that controls the default catalog include filter.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeployType {
  Server,
  Workstation,
  Universal,
}

/// Maturity tier declared per application; governs test eligibility.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
  Alpha,
  Beta,
  Rc,
  Stable,
}

impl Lifecycle {
  pub const ALL: [Lifecycle; 4] =
    [Lifecycle::Alpha, Lifecycle::Beta, Lifecycle::Rc, Lifecycle::Stable];
}

/// Target container flavor; selects the compose project and image.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Distro {
  Arch,
  Debian,
  Ubuntu,
  Fedora,
  Centos,
}

impl Distro {
  pub const ALL: [Distro; 5] =
    [Distro::Arch, Distro::Debian, Distro::Ubuntu, Distro::Fedora, Distro::Centos];

  /// Deterministic compose project name; two distros never share one.
  pub fn compose_project(&self) -> String {
    format!("infinito_nexus_{self}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entity_name_strips_known_prefix() {
    let id = AppId::new("web-app-nextcloud").unwrap();
    assert_eq!(id.entity_name(), "nextcloud");

    let id = AppId::new("util-desk-screenshot").unwrap();
    assert_eq!(id.entity_name(), "screenshot");
  }

  #[test]
  fn entity_name_falls_back_to_full_id() {
    let id = AppId::new("misc-thing").unwrap();
    assert_eq!(id.entity_name(), "misc-thing");
  }

  #[test]
  fn rejects_empty_and_uppercase() {
    assert!(AppId::new("").is_err());
    assert!(AppId::new("Web-App-Foo").is_err());
  }

  #[test]
  fn distro_projects_are_distinct() {
    let mut seen = std::collections::HashSet::new();
    for distro in Distro::ALL {
      assert!(seen.insert(distro.compose_project()));
    }
  }
}
