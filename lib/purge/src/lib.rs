//! Entity Purger (EP): tears down a named application (its relational
//! databases, its own compose stack, and its persistent directory) in
//! three best-effort phases. No single phase failure aborts the others;
//! failures accumulate into warnings and a non-zero (but non-fatal to the
//! caller) exit code. Idempotent: purging an already-purged entity is a
//! no-op that still exits 0.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use command::{RunRequest, run};
use dto_types::DtoError;
use tokio_util::sync::CancellationToken;

const RESERVED_ENTITY_NAMES: &[&str] = &["postgres", "mysql", "mariadb", "root", "admin", "system"];
const RESERVED_SYSTEM_DATABASES: &[&str] = &[
  "postgres",
  "template0",
  "template1",
  "mysql",
  "information_schema",
  "performance_schema",
  "sys",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeMode {
  Drop,
  Truncate,
  StackOnly,
  All,
}

impl PurgeMode {
  fn runs_database_phase(self) -> bool {
    matches!(self, Self::Drop | Self::Truncate | Self::All)
  }

  fn runs_filesystem_phase(self) -> bool {
    !matches!(self, Self::StackOnly)
  }
}

#[derive(Debug, Clone)]
pub struct PurgeRequest {
  pub entity: String,
  pub mode: PurgeMode,
  /// The entity's environment file, holding whatever database credentials
  /// it was deployed with. Absence is not an error; the database phase is
  /// simply skipped with a warning.
  pub env_file: Option<PathBuf>,
  pub compose_file: Option<PathBuf>,
  pub persistent_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PurgeOutcome {
  pub warnings: Vec<String>,
  /// Best-effort aggregate exit code: 0 if every attempted phase succeeded
  /// (or was cleanly skipped), 1 if any sub-phase reported a failure.
  pub exit_code: i32,
}

/// Runs the three purge phases for `req.entity`. Refuses empty or reserved
/// system entity names up front with `InvalidInput`; everything past that
/// point is best-effort.
pub async fn purge(req: &PurgeRequest, timeout: Duration) -> dto_types::Result<PurgeOutcome> {
  validate_entity_name(&req.entity)?;

  let mut outcome = PurgeOutcome::default();

  if req.mode.runs_database_phase() {
    database_phase(req, &mut outcome).await;
  }

  compose_phase(req, timeout, &mut outcome).await;

  if req.mode.runs_filesystem_phase() {
    filesystem_phase(req, &mut outcome).await;
  }

  Ok(outcome)
}

/// The same charset `AppId` enforces. Database/entity identifiers are
/// interpolated into quoted SQL identifiers, so anything outside this set
/// is a potential identifier-quoting break-out, not just a cosmetic
/// restriction.
fn has_safe_identifier_charset(s: &str) -> bool {
  !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn validate_entity_name(entity: &str) -> dto_types::Result<()> {
  if entity.trim().is_empty() {
    return Err(DtoError::invalid_input("entity name must not be empty"));
  }
  if RESERVED_ENTITY_NAMES.contains(&entity) {
    return Err(DtoError::invalid_input(format!(
      "refusing to purge reserved system entity '{entity}'"
    )));
  }
  if !has_safe_identifier_charset(entity) {
    return Err(DtoError::invalid_input(format!(
      "entity name '{entity}' contains characters outside [a-z0-9_-]"
    )));
  }
  Ok(())
}

async fn database_phase(req: &PurgeRequest, outcome: &mut PurgeOutcome) {
  let Some(env_file) = &req.env_file else {
    outcome
      .warnings
      .push("no environment file provided; database phase skipped".to_string());
    return;
  };
  let contents = match tokio::fs::read_to_string(env_file).await {
    Ok(c) => c,
    Err(e) => {
      outcome
        .warnings
        .push(format!("could not read environment file {}: {e}", env_file.display()));
      return;
    }
  };
  let vars = parse_env_file(&contents);

  for backend in [DbBackend::Postgres, DbBackend::MariaDb] {
    if let Err(message) = run_database_phase(backend, &vars, &req.entity, req.mode).await {
      outcome.warnings.push(message);
      outcome.exit_code = outcome.exit_code.max(1);
    }
  }
}

async fn compose_phase(req: &PurgeRequest, timeout: Duration, outcome: &mut PurgeOutcome) {
  let Some(compose_file) = &req.compose_file else {
    return;
  };
  if tokio::fs::metadata(compose_file).await.is_err() {
    // Already torn down (or never existed). Not a warning: purging an
    // already-purged entity must stay idempotent.
    return;
  }
  let req_args = RunRequest::new("docker", timeout).args([
    "compose".to_string(),
    "-f".to_string(),
    compose_file.display().to_string(),
    "-p".to_string(),
    req.entity.clone(),
    "down".to_string(),
    "--remove-orphans".to_string(),
    "-v".to_string(),
  ]);
  match run(req_args, CancellationToken::new()).await {
    Ok(out) if !out.success() => {
      outcome.warnings.push(format!("compose down failed for '{}': {}", req.entity, out.stderr));
      outcome.exit_code = outcome.exit_code.max(1);
    }
    Err(e) => {
      outcome.warnings.push(format!("compose down failed for '{}': {e}", req.entity));
      outcome.exit_code = outcome.exit_code.max(1);
    }
    Ok(_) => {}
  }
}

async fn filesystem_phase(req: &PurgeRequest, outcome: &mut PurgeOutcome) {
  let volumes_dir = req.persistent_dir.join("volumes");
  if let Err(e) = remove_dir_if_present(&volumes_dir).await {
    outcome.warnings.push(format!("failed to remove {}: {e}", volumes_dir.display()));
    outcome.exit_code = outcome.exit_code.max(1);
  }
  if let Err(e) = remove_dir_if_present(&req.persistent_dir).await {
    outcome
      .warnings
      .push(format!("failed to remove {}: {e}", req.persistent_dir.display()));
    outcome.exit_code = outcome.exit_code.max(1);
  }
}

async fn remove_dir_if_present(path: &std::path::Path) -> std::io::Result<()> {
  match tokio::fs::remove_dir_all(path).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

fn parse_env_file(contents: &str) -> HashMap<String, String> {
  contents
    .lines()
    .filter_map(|line| {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        return None;
      }
      let (key, value) = line.split_once('=')?;
      let value = value.trim().trim_matches('"').trim_matches('\'');
      Some((key.trim().to_string(), value.to_string()))
    })
    .collect()
}

#[derive(Debug, Clone, Copy)]
enum DbBackend {
  Postgres,
  MariaDb,
}

struct DbCredentials {
  host: String,
  port: u16,
  user: String,
  password: String,
  database: String,
}

fn discover_credentials(vars: &HashMap<String, String>, backend: DbBackend, entity: &str) -> Option<DbCredentials> {
  let prefix = match backend {
    DbBackend::Postgres => "POSTGRES",
    DbBackend::MariaDb => "MARIADB",
  };
  let host = vars.get(&format!("{prefix}_HOST"))?.clone();
  let default_port = match backend {
    DbBackend::Postgres => 5432,
    DbBackend::MariaDb => 3306,
  };
  let port = vars
    .get(&format!("{prefix}_PORT"))
    .and_then(|p| p.parse().ok())
    .unwrap_or(default_port);
  let user = vars.get(&format!("{prefix}_USER")).cloned().unwrap_or_else(|| "root".to_string());
  let password = vars.get(&format!("{prefix}_PASSWORD")).cloned().unwrap_or_default();
  let database = vars.get(&format!("{prefix}_DB")).cloned().unwrap_or_else(|| entity.to_string());
  Some(DbCredentials {
    host,
    port,
    user,
    password,
    database,
  })
}

/// Returns `Ok(true)` if the backend was present and acted on, `Ok(false)`
/// if no credentials were discovered for it. Absence is not an error; this
/// phase only acts on backends that are actually present.
async fn run_database_phase(
  backend: DbBackend,
  vars: &HashMap<String, String>,
  entity: &str,
  mode: PurgeMode,
) -> Result<(), String> {
  let Some(creds) = discover_credentials(vars, backend, entity) else {
    return Ok(());
  };
  if RESERVED_SYSTEM_DATABASES.contains(&creds.database.as_str()) {
    return Err(format!("refusing to operate on system database '{}'", creds.database));
  }
  if !has_safe_identifier_charset(&creds.database) {
    return Err(format!(
      "refusing to operate on database '{}': contains characters outside [a-z0-9_-]",
      creds.database
    ));
  }
  let result = match backend {
    DbBackend::Postgres => run_postgres_phase(&creds, mode).await,
    DbBackend::MariaDb => run_mariadb_phase(&creds, mode).await,
  };
  result.map_err(|e| format!("database phase failed for '{}' ({:?} backend): {e}", entity, backend))
}

async fn run_postgres_phase(creds: &DbCredentials, mode: PurgeMode) -> anyhow::Result<()> {
  use sqlx::postgres::PgPoolOptions;
  let admin_url = format!(
    "postgres://{}:{}@{}:{}/postgres",
    creds.user, creds.password, creds.host, creds.port
  );
  let pool = PgPoolOptions::new().max_connections(1).connect(&admin_url).await?;

  match mode {
    PurgeMode::Truncate => {
      let tables: Vec<(String,)> =
        sqlx::query_as("select tablename from pg_tables where schemaname = 'public'")
          .fetch_all(&pool)
          .await?;
      for (table,) in tables {
        sqlx::query(&format!("truncate table \"{table}\" cascade")).execute(&pool).await?;
      }
    }
    _ => {
      sqlx::query("select pg_terminate_backend(pid) from pg_stat_activity where datname = $1")
        .bind(&creds.database)
        .execute(&pool)
        .await?;
      sqlx::query(&format!("drop database if exists \"{}\"", creds.database))
        .execute(&pool)
        .await?;
    }
  }
  Ok(())
}

async fn run_mariadb_phase(creds: &DbCredentials, mode: PurgeMode) -> anyhow::Result<()> {
  use sqlx::mysql::MySqlPoolOptions;
  let admin_url = format!("mysql://{}:{}@{}:{}/", creds.user, creds.password, creds.host, creds.port);
  let pool = MySqlPoolOptions::new().max_connections(1).connect(&admin_url).await?;

  match mode {
    PurgeMode::Truncate => {
      sqlx::query("set foreign_key_checks = 0").execute(&pool).await?;
      let tables: Vec<(String,)> =
        sqlx::query_as("select table_name from information_schema.tables where table_schema = ?")
          .bind(&creds.database)
          .fetch_all(&pool)
          .await?;
      for (table,) in tables {
        sqlx::query(&format!("truncate table `{}`.`{table}`", creds.database))
          .execute(&pool)
          .await?;
      }
      sqlx::query("set foreign_key_checks = 1").execute(&pool).await?;
    }
    _ => {
      sqlx::query(&format!("drop database if exists `{}`", creds.database))
        .execute(&pool)
        .await?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(persistent_dir: PathBuf) -> PurgeRequest {
    PurgeRequest {
      entity: "nextcloud".to_string(),
      mode: PurgeMode::All,
      env_file: None,
      compose_file: None,
      persistent_dir,
    }
  }

  #[tokio::test]
  async fn refuses_empty_and_reserved_entity_names() {
    let req = request(PathBuf::from("/tmp/does-not-matter"));
    let mut empty = req.clone();
    empty.entity = String::new();
    assert!(purge(&empty, Duration::from_secs(5)).await.unwrap_err().is_invalid_input());

    let mut reserved = req.clone();
    reserved.entity = "postgres".to_string();
    assert!(purge(&reserved, Duration::from_secs(5)).await.unwrap_err().is_invalid_input());
  }

  #[tokio::test]
  async fn refuses_entity_names_outside_the_safe_charset() {
    let req = request(PathBuf::from("/tmp/does-not-matter"));
    let mut unsafe_entity = req.clone();
    unsafe_entity.entity = "nextcloud\"; drop database postgres; --".to_string();
    assert!(purge(&unsafe_entity, Duration::from_secs(5)).await.unwrap_err().is_invalid_input());
  }

  #[tokio::test]
  async fn purge_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let entity_dir = tmp.path().join("nextcloud");
    tokio::fs::create_dir_all(entity_dir.join("volumes")).await.unwrap();
    tokio::fs::write(entity_dir.join("marker"), b"data").await.unwrap();

    let mut req = request(entity_dir.clone());
    req.compose_file = Some(entity_dir.join("docker-compose.yml"));

    let first = purge(&req, Duration::from_secs(5)).await.unwrap();
    assert_eq!(first.exit_code, 0);
    assert!(!entity_dir.exists());

    let second = purge(&req, Duration::from_secs(5)).await.unwrap();
    assert_eq!(second.exit_code, 0);
  }

  #[tokio::test]
  async fn missing_env_file_is_a_warning_not_a_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let req = request(tmp.path().join("ghost"));
    let outcome = purge(&req, Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.warnings.iter().any(|w| w.contains("database phase skipped")));
  }

  #[test]
  fn parses_simple_env_file() {
    let vars = parse_env_file("POSTGRES_HOST=db\n# comment\nPOSTGRES_PORT=5433\n\nPOSTGRES_DB=\"nextcloud\"\n");
    assert_eq!(vars.get("POSTGRES_HOST"), Some(&"db".to_string()));
    assert_eq!(vars.get("POSTGRES_PORT"), Some(&"5433".to_string()));
    assert_eq!(vars.get("POSTGRES_DB"), Some(&"nextcloud".to_string()));
  }

  #[test]
  fn stack_only_skips_filesystem_phase() {
    assert!(!PurgeMode::StackOnly.runs_filesystem_phase());
    assert!(PurgeMode::Drop.runs_filesystem_phase());
  }
}
