//! Loading, overriding and printing the application configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use submon_core::{config::AppConfig, format::mask_key};

pub const ENV_PREFIX: &str = "SUBMON";

/// Values given on the command line. Each one beats the file and the
/// environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
  pub url:     Option<String>,
  pub api_key: Option<String>,
  pub db:      Option<PathBuf>,
}

/// File, then `SUBMON_*` environment (`SUBMON_API__BASE_URL`), then flags.
pub fn load(path: &Path, overrides: &Overrides) -> Result<AppConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .with_context(|| format!("failed to read config file {}", path.display()))?;

  let mut config: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise config")?;
  apply(&mut config, overrides);
  expand_paths(&mut config);
  Ok(config)
}

fn apply(config: &mut AppConfig, overrides: &Overrides) {
  if let Some(url) = &overrides.url {
    config.api.base_url = url.clone();
  }
  if let Some(key) = &overrides.api_key {
    config.api.api_key = key.clone();
  }
  if let Some(db) = &overrides.db {
    config.database.path = db.clone();
  }
}

fn expand_paths(config: &mut AppConfig) {
  for path in [
    &mut config.database.path,
    &mut config.database.backup_dir,
    &mut config.database.pre_ingest_backup_dir,
    &mut config.logging.file,
  ] {
    *path = expand_tilde(path);
  }
}

pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── config init / show ──────────────────────────────────────────────────────

/// Write the default configuration to `path`.
pub fn init(path: &Path, force: bool) -> Result<()> {
  if path.exists() && !force {
    bail!("{} already exists (use --force to overwrite)", path.display());
  }
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("creating {}", parent.display()))?;
  }
  let text = toml::to_string_pretty(&AppConfig::default()).context("serialising config")?;
  std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
  tracing::info!(path = %path.display(), "wrote default config");
  Ok(())
}

/// The effective configuration as TOML, with the API key masked.
pub fn show(config: &AppConfig) -> Result<String> {
  let mut shown = config.clone();
  shown.api.api_key = mask_key(&shown.api.api_key);
  toml::to_string_pretty(&shown).context("serialising config")
}
