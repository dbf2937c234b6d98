use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_APP_NAME: &str = "Academic Organizer";
pub const DEFAULT_DATA_DIR: &str = "~/.academic_organizer";
pub const DEFAULT_DATABASE_NAME: &str = "academic_organizer.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub application: ApplicationConfig,
    pub database: DatabaseConfig,
    pub modules: ModulesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub data_dir: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self { name: DEFAULT_APP_NAME.to_string(), data_dir: DEFAULT_DATA_DIR.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { name: DEFAULT_DATABASE_NAME.to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModulesConfig {
    pub course_manager: ModuleToggle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModuleToggle {
    pub enabled: bool,
}

impl Default for ModuleToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string() }
    }
}

impl AppConfig {
    /// Parse a YAML document; keys that are absent keep their defaults.
    ///
    /// # Errors
    /// Returns an error when the YAML is malformed or has mistyped values.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("failed to parse YAML configuration")
    }

    /// Load configuration from `explicit`, or from the first existing default location.
    ///
    /// Returns the config together with the file it came from, if any.
    ///
    /// # Errors
    /// Returns an error when an explicit path does not exist, or a found file
    /// cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(anyhow!("config file does not exist: {}", path.display()));
            }
            return Ok((Self::load_file(path)?, Some(path.to_path_buf())));
        }

        let home = dirs::home_dir();
        for candidate in candidate_paths(home.as_deref()) {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "loading configuration");
                return Ok((Self::load_file(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }

    fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.application.data_dir, dirs::home_dir().as_deref())
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.database.name)
    }

    #[must_use]
    pub fn course_manager_enabled(&self) -> bool {
        self.modules.course_manager.enabled
    }
}

/// Config lookup order when no explicit path is given.
#[must_use]
pub fn candidate_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config.yaml"), PathBuf::from("config.yml")];
    if let Some(home) = home {
        paths.push(home.join(".academic_organizer").join("config.yaml"));
        paths.push(home.join(".config").join("academic_organizer").join("config.yaml"));
    }
    paths
}

/// Replace a leading `~` with the home directory. Other paths pass through.
#[must_use]
pub fn expand_tilde(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
            home.join(&rest[1..])
        }
        _ => PathBuf::from(raw),
    }
}
