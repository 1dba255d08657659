//! Application configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::loadout::{ApplyMode, LoadoutStore};

/// Directory under the user's config directory holding `config.toml`.
pub const CONFIG_DIR: &str = "nexus";
/// Name of the configuration file.
pub const CONFIG_FILE: &str = "config.toml";
/// Prefix of environment overrides, e.g. `NEXUS_API_KEY`.
pub const ENV_PREFIX: &str = "NEXUS";

const DEFAULT_CONFIG: &str = r#"# Guardian Nexus configuration.
# Every key can be overridden with an environment variable, e.g. NEXUS_API_KEY.

# Platform root; point this at a proxy to keep credentials server-side.
api_base_url = "https://www.bungie.net"

# Application key from the platform's developer portal.
api_key = ""

# OAuth access token of the signed-in account.
# access_token = ""

# 1 Xbox, 2 PlayStation, 3 Steam, 6 Epic.
membership_type = 3

# Destiny membership id of the account.
# membership_id = ""

# "sequential" or "concurrent".
apply_mode = "sequential"

request_timeout_secs = 30
"#;

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Platform root URL.
    pub api_base_url: String,
    /// Application API key sent as `X-API-Key`.
    pub api_key: String,
    /// Bearer token of the signed-in account.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Platform membership type.
    pub membership_type: i32,
    /// Destiny membership id.
    #[serde(default)]
    pub membership_id: Option<String>,
    /// Directory for loadout files.
    pub loadout_dir: PathBuf,
    /// Scheduling of loadout items.
    pub apply_mode: ApplyMode,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl AppConfig {
    /// Load from the default file location merged with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional on disk) merged with environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .set_default("api_base_url", "https://www.bungie.net")?
            .set_default("api_key", "")?
            .set_default("membership_type", 3_i64)?
            .set_default(
                "loadout_dir",
                LoadoutStore::default_root().to_string_lossy().to_string(),
            )?
            .set_default("apply_mode", "sequential")?
            .set_default("request_timeout_secs", 30_i64)?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }
}

/// Default configuration file path.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Write the commented default configuration if no file exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))
}
