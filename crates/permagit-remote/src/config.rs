//! Helper configuration.
//!
//! Layers, later wins: built-in defaults, the TOML file, git config, then
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "PERMAGIT_CONFIG";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A git config or environment value has the wrong shape.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Setting name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// One upload backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in messages.
    pub name: String,
    /// Base URL accepting `POST /tx`.
    pub endpoint: String,
    /// Archives up to this size are stored for free.
    #[serde(default)]
    pub free_tier_bytes: u64,
}

/// Remote helper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger API base URL.
    pub ledger_url: String,
    /// Blob gateway base URL, used for downloads and pricing.
    pub gateway_url: String,
    /// Fiat quote endpoint; `None` disables fiat estimates.
    pub fiat_price_url: Option<String>,
    /// Telemetry collector; `None` disables telemetry.
    pub telemetry_url: Option<String>,
    /// Upload providers, most subsidized first.
    pub providers: Vec<ProviderConfig>,
    /// Wallet keyfile (JWK).
    pub keyfile: Option<PathBuf>,
    /// Fiat cost at or below which uploads proceed without asking.
    pub threshold_cost: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_url: "https://ledger.permagit.dev/api".to_string(),
            gateway_url: "https://arweave.net".to_string(),
            fiat_price_url: Some(
                "https://api.coingecko.com/api/v3/simple/price?ids=arweave&vs_currencies=usd"
                    .to_string(),
            ),
            telemetry_url: None,
            providers: vec![
                ProviderConfig {
                    name: "bundler".to_string(),
                    endpoint: "https://node2.bundlr.network".to_string(),
                    free_tier_bytes: 100 * 1024,
                },
                ProviderConfig {
                    name: "arweave".to_string(),
                    endpoint: "https://arweave.net".to_string(),
                    free_tier_bytes: 0,
                },
            ],
            keyfile: None,
            threshold_cost: None,
        }
    }
}

impl Config {
    /// Default config file location: `$PERMAGIT_CONFIG`, else
    /// `<config_dir>/permagit/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("permagit").join("config.toml"))
    }

    /// Loads defaults overlaid with `path`, if it exists.
    pub fn from_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `permagit.keyfile` and `permagit.thresholdCost` from git config.
    pub fn apply_git(
        &mut self,
        keyfile: Option<String>,
        threshold_cost: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(keyfile) = keyfile {
            self.keyfile = Some(PathBuf::from(keyfile));
        }
        if let Some(value) = threshold_cost {
            self.threshold_cost = Some(parse_cost("permagit.thresholdCost", &value)?);
        }
        Ok(())
    }

    /// Applies `PERMAGIT_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(keyfile) = var("PERMAGIT_KEYFILE") {
            self.keyfile = Some(PathBuf::from(keyfile));
        }
        if let Some(url) = var("PERMAGIT_LEDGER_URL") {
            self.ledger_url = url;
        }
        if let Some(url) = var("PERMAGIT_GATEWAY_URL") {
            self.gateway_url = url;
        }
    }
}

fn parse_cost(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|cost| cost.is_finite() && *cost >= 0.0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
