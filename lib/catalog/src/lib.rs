//! Catalog Resolver (CR): produces the ordered, de-duplicated list of
//! applications for a deploy type, lifecycle set, optional regex filters, an
//! optional whitelist, and a storage-sufficiency gate. Pure and
//! deterministic: [`resolve`] takes no environment input and performs no
//! I/O; application discovery itself lives in [`discover`].

pub mod discover;

use std::{collections::HashSet, sync::LazyLock};

use dto_types::{AppId, DeployType, Lifecycle};
use regex::Regex;

pub use discover::discover_apps;

/// The record the Catalog Resolver consumes per application: its lifecycle
/// stage and declared storage requirement.
#[derive(Debug, Clone)]
pub struct AppMetadata {
  pub id: AppId,
  pub lifecycle: Lifecycle,
  pub storage_mb: u64,
}

static SERVER_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(web-app-|web-svc-)").expect("static server regex"));
static WORKSTATION_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(desk-|util-desk-)").expect("static workstation regex"));
static SERVER_HARD_EXCLUDE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^web-app-oauth2-proxy$").expect("static hard-exclude regex"));

#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
  pub lifecycles: HashSet<Lifecycle>,
  pub include_regex: Option<Regex>,
  pub exclude_regex: Option<Regex>,
  pub final_exclude_regex: Option<Regex>,
  pub whitelist: Option<HashSet<AppId>>,
  /// `None` disables the storage gate entirely.
  pub storage_required_mb: Option<u64>,
}

/// Result of [`resolve`]: the kept, ordered catalog plus the ids dropped by
/// the storage-sufficiency gate specifically, reported separately from the
/// kept list so callers can warn without treating it as a failure.
#[derive(Debug, Clone, Default)]
pub struct CatalogResult {
  pub apps: Vec<AppId>,
  pub storage_warnings: Vec<AppId>,
}

/// Runs the eight-step filtering pipeline: lifecycle gate, deploy-type
/// default include, user include/exclude, storage gate, final exclude,
/// whitelist, dedupe. An empty result is a valid, non-error outcome;
/// callers decide whether to treat it as a skip or a failure.
pub fn resolve(
  raw: &[AppMetadata],
  deploy_type: DeployType,
  query: &CatalogQuery,
) -> dto_types::Result<CatalogResult> {
  // Step 2: lifecycle gate.
  let mut survivors: Vec<&AppMetadata> = raw
    .iter()
    .filter(|app| query.lifecycles.contains(&app.lifecycle))
    .collect();

  // Step 3: deploy-type default include mapping.
  survivors.retain(|app| match deploy_type {
    DeployType::Server => {
      SERVER_RE.is_match(app.id.as_str()) && !SERVER_HARD_EXCLUDE.is_match(app.id.as_str())
    }
    DeployType::Workstation => WORKSTATION_RE.is_match(app.id.as_str()),
    DeployType::Universal => {
      !SERVER_RE.is_match(app.id.as_str()) && !WORKSTATION_RE.is_match(app.id.as_str())
    }
  });

  // Step 4: user-provided include then exclude.
  if let Some(include) = &query.include_regex {
    survivors.retain(|app| include.is_match(app.id.as_str()));
  }
  if let Some(exclude) = &query.exclude_regex {
    survivors.retain(|app| !exclude.is_match(app.id.as_str()));
  }

  // Step 5: storage-sufficiency gate, tracked separately from the kept set.
  let mut storage_warnings = Vec::new();
  if let Some(required) = query.storage_required_mb {
    let (kept, dropped): (Vec<_>, Vec<_>) =
      survivors.into_iter().partition(|app| app.storage_mb <= required);
    storage_warnings = dropped.into_iter().map(|app| app.id.clone()).collect();
    survivors = kept;
  }

  // Step 6: final exclude.
  if let Some(final_exclude) = &query.final_exclude_regex {
    survivors.retain(|app| !final_exclude.is_match(app.id.as_str()));
  }

  // Step 7: whitelist.
  if let Some(whitelist) = &query.whitelist {
    if !whitelist.is_empty() {
      survivors.retain(|app| whitelist.contains(&app.id));
    }
  }

  // Step 8: survivors already preserve raw's original order since every
  // `retain`/`partition` above is order-preserving; de-duplicate defensively.
  let mut seen = HashSet::new();
  let apps = survivors
    .into_iter()
    .map(|app| app.id.clone())
    .filter(|id| seen.insert(id.clone()))
    .collect();

  Ok(CatalogResult { apps, storage_warnings })
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use dto_types::Lifecycle;
  use proptest::prelude::*;

  use super::*;

  fn app(id: &str, lifecycle: Lifecycle, storage_mb: u64) -> AppMetadata {
    AppMetadata {
      id: AppId::new(id).unwrap(),
      lifecycle,
      storage_mb,
    }
  }

  fn all_lifecycles() -> HashSet<Lifecycle> {
    Lifecycle::ALL.into_iter().collect()
  }

  #[test]
  fn catalog_filtering_example() {
    let raw = vec![
      app("web-app-foo", Lifecycle::Stable, 0),
      app("web-app-oauth2-proxy", Lifecycle::Stable, 0),
      app("web-svc-bar", Lifecycle::Stable, 0),
      app("desk-baz", Lifecycle::Stable, 0),
    ];
    let query = CatalogQuery {
      lifecycles: all_lifecycles(),
      include_regex: Some(Regex::new("^web-app-").unwrap()),
      exclude_regex: Some(Regex::new("^web-app-oauth2-proxy$").unwrap()),
      ..Default::default()
    };
    let result = resolve(&raw, DeployType::Server, &query).unwrap();
    assert_eq!(result.apps, vec![AppId::new("web-app-foo").unwrap()]);
  }

  #[test]
  fn universal_is_the_set_difference() {
    let raw = vec![
      app("web-app-a", Lifecycle::Stable, 0),
      app("desk-b", Lifecycle::Stable, 0),
      app("util-desk-c", Lifecycle::Stable, 0),
      app("misc-d", Lifecycle::Stable, 0),
    ];
    let query = CatalogQuery {
      lifecycles: all_lifecycles(),
      ..Default::default()
    };
    let result = resolve(&raw, DeployType::Universal, &query).unwrap();
    assert_eq!(result.apps, vec![AppId::new("misc-d").unwrap()]);
  }

  #[test]
  fn storage_gate_reports_warnings_separately() {
    let raw = vec![
      app("web-app-small", Lifecycle::Stable, 100),
      app("web-app-huge", Lifecycle::Stable, 999_999),
    ];
    let query = CatalogQuery {
      lifecycles: all_lifecycles(),
      storage_required_mb: Some(1000),
      ..Default::default()
    };
    let result = resolve(&raw, DeployType::Server, &query).unwrap();
    assert_eq!(result.apps, vec![AppId::new("web-app-small").unwrap()]);
    assert_eq!(result.storage_warnings, vec![AppId::new("web-app-huge").unwrap()]);
  }

  #[test]
  fn empty_result_is_not_an_error() {
    let query = CatalogQuery {
      lifecycles: all_lifecycles(),
      ..Default::default()
    };
    let result = resolve(&[], DeployType::Server, &query).unwrap();
    assert!(result.apps.is_empty());
  }

  proptest! {
    #[test]
    fn determinism_given_same_inputs(seed in 0u64..1000) {
      let raw = vec![
        app("web-app-a", Lifecycle::Stable, seed % 50),
        app("web-app-b", Lifecycle::Alpha, seed % 50),
        app("desk-c", Lifecycle::Beta, seed % 50),
      ];
      let query = CatalogQuery { lifecycles: all_lifecycles(), ..Default::default() };
      let first = resolve(&raw, DeployType::Server, &query).unwrap();
      let second = resolve(&raw, DeployType::Server, &query).unwrap();
      prop_assert_eq!(first.apps, second.apps);
    }

    #[test]
    fn resolved_catalog_is_a_subset_of_raw(n in 0usize..8) {
      let raw: Vec<AppMetadata> = (0..n)
        .map(|i| app(&format!("web-app-{i}"), Lifecycle::Stable, 0))
        .collect();
      let query = CatalogQuery { lifecycles: all_lifecycles(), ..Default::default() };
      let result = resolve(&raw, DeployType::Server, &query).unwrap();
      let raw_ids: HashSet<_> = raw.iter().map(|a| a.id.clone()).collect();
      prop_assert!(result.apps.iter().all(|id| raw_ids.contains(id)));
    }

    #[test]
    fn adding_an_exclude_never_adds_apps(n in 1usize..8) {
      let raw: Vec<AppMetadata> = (0..n)
        .map(|i| app(&format!("web-app-item{i}"), Lifecycle::Stable, 0))
        .collect();
      let base = CatalogQuery { lifecycles: all_lifecycles(), ..Default::default() };
      let with_exclude = CatalogQuery {
        lifecycles: all_lifecycles(),
        exclude_regex: Some(Regex::new("^web-app-item0$").unwrap()),
        ..Default::default()
      };
      let base_result = resolve(&raw, DeployType::Server, &base).unwrap();
      let excluded_result = resolve(&raw, DeployType::Server, &with_exclude).unwrap();
      let base_set: HashSet<_> = base_result.apps.into_iter().collect();
      prop_assert!(excluded_result.apps.iter().all(|id| base_set.contains(id)));
    }
  }
}
