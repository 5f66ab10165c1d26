use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use trigwarden_core::{Error, Result};

/// Top-level configuration, passed explicitly into the components that need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the environment this process runs in.
    ///
    /// _Default:_ `development`.
    pub environment: String,
    pub kill_switch: KillSwitchConfig,
    pub migrations: MigrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    /// Global switch. When `false` nothing is ever blocked.
    ///
    /// _Default:_ `true`.
    pub enabled: bool,
    /// Environments in which destructive operations need confirmation.
    ///
    /// _Default:_ `["production", "staging"]`.
    pub protected_environments: Vec<String>,
    /// Whether the external override signal must still be accompanied by the
    /// expected confirmation text.
    ///
    /// _Default:_ `true`.
    pub confirmation_required: bool,
    /// Environment variable read as the external override signal.
    ///
    /// _Default:_ `KILL_SWITCH_OVERRIDE`.
    pub override_env_var: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory scanned for `<version>_<name>.sql` migrations.
    ///
    /// _Default:_ `db/triggers`.
    pub directory: PathBuf,
    /// Apply migrations even when the safety validator finds violations.
    ///
    /// _Default:_ `false`.
    pub allow_unsafe: bool,
    /// _Default:_ `trigger_migrations`.
    pub ledger_table: String,
    /// _Default:_ `trigger_registry`.
    pub registry_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            kill_switch: KillSwitchConfig::default(),
            migrations: MigrationConfig::default(),
        }
    }
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protected_environments: vec!["production".to_string(), "staging".to_string()],
            confirmation_required: true,
            override_env_var: "KILL_SWITCH_OVERRIDE".to_string(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("db/triggers"),
            allow_unsafe: false,
            ledger_table: "trigger_migrations".to_string(),
            registry_table: "trigger_registry".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&source)
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
