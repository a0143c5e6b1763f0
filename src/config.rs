use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::contract::{DEFAULT_GRANT_GAS, DEFAULT_REGISTER_GAS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub pinning: PinningConfig,
    #[serde(default)]
    pub links: LinksConfig,
}

/// Ethereum JSON-RPC node holding the sending account
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    /// Sending account; left out when the node picks its default account
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Receipt depth (inclusion block counts as 1) required for finality
    #[serde(default)]
    pub required_confirmations: u32,
    #[serde(default)]
    pub confirmation_timeout_ms: Option<u64>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LifecycleConfig {
    /// Report Confirmed after this long without a receipt (off when unset)
    #[serde(default)]
    pub optimistic_confirm_after_ms: Option<u64>,
}

impl LifecycleConfig {
    pub fn optimistic_confirm_after(&self) -> Option<Duration> {
        self.optimistic_confirm_after_ms.map(Duration::from_millis)
    }
}

/// Gas hints; `null` leaves estimation to the node
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GasConfig {
    pub grant_manufacturer: Option<u64>,
    pub register_product: Option<u64>,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            grant_manufacturer: Some(DEFAULT_GRANT_GAS),
            register_product: Some(DEFAULT_REGISTER_GAS),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PinningConfig {
    pub endpoint: String,
    /// Environment variable holding the bearer JWT
    pub jwt_env: String,
    pub timeout_secs: u64,
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pinata.cloud/pinning/pinFileToIPFS".to_string(),
            jwt_env: "PINATA_JWT".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LinksConfig {
    pub explorer_base_url: String,
    pub gateway_base_url: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            explorer_base_url: "https://sepolia.etherscan.io".to_string(),
            gateway_base_url: "https://gateway.pinata.cloud".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger.rpc_url is empty".into()));
        }
        if self.ledger.contract_address.parse::<crate::ledger::Address>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "ledger.contract_address is not an address: {}",
                self.ledger.contract_address
            )));
        }
        if let Some(from) = &self.ledger.from_address
            && from.parse::<crate::ledger::Address>().is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "ledger.from_address is not an address: {}",
                from
            )));
        }
        Ok(())
    }
}
