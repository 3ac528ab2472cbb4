//! Configuration file management for charter.
//!
//! Provides a TOML-based config file at `~/.config/charter/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use charter_core::scaffold::{self, ScaffoldConfig};
use charter_db::config::DbConfig;

/// Env var naming the operator recorded in `created_by` / `updated_by`.
pub const ACTOR_ENV: &str = "CHARTER_ACTOR";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub scaffold: Option<ScaffoldSection>,
    #[serde(default)]
    pub operator: Option<OperatorSection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScaffoldSection {
    /// Template whose sections seed new templates.
    pub template_id: Option<i32>,
    /// Leading sections of the scaffold template that are not copied.
    pub skip_leading: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OperatorSection {
    pub actor: Uuid,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the charter config directory: `$XDG_CONFIG_HOME/charter` or
/// `~/.config/charter`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("charter");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("charter")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Load the config file. A missing file yields an empty config; a file that
/// exists but does not parse is an error.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    load_config_from(&path)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Owner read/write only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct CharterConfig {
    pub db_config: DbConfig,
    pub scaffold: ScaffoldConfig,
    pub actor: Uuid,
}

impl CharterConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `CHARTER_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Scaffold: `CHARTER_SCAFFOLD_TEMPLATE_ID` / `CHARTER_SCAFFOLD_SKIP` > `[scaffold]`
    ///   > defaults
    /// - Actor: `cli_actor` > `CHARTER_ACTOR` > `operator.actor` > nil UUID
    pub fn resolve(cli_db_url: Option<&str>, cli_actor: Option<Uuid>) -> Result<Self> {
        let file_config = load_config()?;
        Self::resolve_with(file_config, cli_db_url, cli_actor)
    }

    fn resolve_with(
        file_config: ConfigFile,
        cli_db_url: Option<&str>,
        cli_actor: Option<Uuid>,
    ) -> Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var(DbConfig::URL_ENV) {
            url
        } else if let Some(section) = &file_config.database {
            section.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        // Start from the file, then let the environment override it.
        let mut scaffold_config = ScaffoldConfig::default();
        if let Some(section) = &file_config.scaffold {
            if section.template_id.is_some() {
                scaffold_config.template_id = section.template_id;
            }
            if let Some(skip) = section.skip_leading {
                scaffold_config.skip_leading = skip;
            }
        }
        let from_env = ScaffoldConfig::from_env().context("invalid scaffold settings")?;
        if std::env::var(scaffold::TEMPLATE_ID_ENV).is_ok() {
            scaffold_config.template_id = from_env.template_id;
        }
        if std::env::var(scaffold::SKIP_ENV).is_ok() {
            scaffold_config.skip_leading = from_env.skip_leading;
        }

        let actor = if let Some(actor) = cli_actor {
            actor
        } else if let Ok(raw) = std::env::var(ACTOR_ENV) {
            Uuid::parse_str(raw.trim()).with_context(|| format!("{ACTOR_ENV} is not a UUID"))?
        } else if let Some(section) = &file_config.operator {
            section.actor
        } else {
            Uuid::nil()
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            scaffold: scaffold_config,
            actor,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
