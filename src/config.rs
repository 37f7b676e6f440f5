use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const DEFAULT_API_BASE_URL: &str = "https://gmail.googleapis.com";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address to search for when none is given on the command line.
    pub address: Option<String>,
    pub scope: String,
    pub client_secret_path: PathBuf,
    pub token_path: PathBuf,
    pub output_path: PathBuf,
    pub api_base_url: String,
    /// Passed through as `maxResults` on the search request.
    pub max_results: Option<u32>,
    /// Delay between console output steps; 0 disables pacing.
    pub pace_ms: u64,
    pub consent_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            scope: GMAIL_READONLY_SCOPE.to_string(),
            client_secret_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            output_path: PathBuf::from("extracted-email.csv"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_results: None,
            pace_ms: 0,
            consent_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("gmail_export"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load the config file. An explicitly named file must exist; a missing
/// default file falls back to built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(anyhow!("config file {} does not exist", p.display()));
            }
            p.to_path_buf()
        }
        None => {
            let p = default_config_path()?;
            if !p.exists() {
                log::debug!("no config at {}, using defaults", p.display());
                return Ok(Config::default());
            }
            p
        }
    };

    let s = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&s).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(s)?;
    Ok(cfg)
}
