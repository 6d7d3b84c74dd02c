//! Configuration management for Coinfold.
//!
//! Engine settings are stored in TOML format with three sections:
//!
//! ```toml
//! [wallet]
//! network = "bitcoin"
//! fee_sat_per_kb = 1000
//! min_conf = 1
//!
//! [chain]
//! coinbase_maturity = 100
//! burn_window = 129600
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every field has a default, so a partial (or empty) file is valid.

use anyhow::{anyhow, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::logging::LogConfig;
use crate::types::{
    ChainParams, DEFAULT_BURN_LOOKAHEAD, DEFAULT_BURN_WINDOW, DEFAULT_COINBASE_MATURITY,
    DEFAULT_FEE_SAT_PER_KB, MAX_INPUTS_PER_TX,
};

/// Main configuration structure for Coinfold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Spend defaults applied to new requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_network")]
    pub network: String,

    /// Relay fee in base units per 1000 bytes
    #[serde(default = "default_fee_sat_per_kb")]
    pub fee_sat_per_kb: u64,

    #[serde(default = "default_min_conf")]
    pub min_conf: u32,

    /// Ignore outputs mined below this height
    #[serde(default)]
    pub input_min_height: u32,

    /// Override of the per-transaction input cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_inputs: Option<usize>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            fee_sat_per_kb: default_fee_sat_per_kb(),
            min_conf: default_min_conf(),
            input_min_height: 0,
            max_inputs: None,
        }
    }
}

impl WalletConfig {
    /// Parse the configured network name
    pub fn network(&self) -> Result<Network> {
        Network::from_str(&self.network.to_ascii_lowercase())
            .map_err(|e| anyhow!("Invalid network type {}: {}", self.network, e))
    }
}

/// Coinbase maturity and burn rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_coinbase_maturity")]
    pub coinbase_maturity: u32,

    /// Blocks past maturity after which an unspent coinbase output is burned
    #[serde(default = "default_burn_window")]
    pub burn_window: u32,

    #[serde(default = "default_burn_lookahead")]
    pub burn_lookahead: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            coinbase_maturity: default_coinbase_maturity(),
            burn_window: default_burn_window(),
            burn_lookahead: default_burn_lookahead(),
        }
    }
}

impl ChainConfig {
    /// Chain rules for the given network
    pub fn params(&self, network: Network) -> ChainParams {
        ChainParams {
            network,
            coinbase_maturity: self.coinbase_maturity,
            burn_window: self.burn_window,
            burn_lookahead: self.burn_lookahead,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.wallet.network()?;

        if let Some(max) = self.wallet.max_inputs {
            if max == 0 || max > MAX_INPUTS_PER_TX {
                anyhow::bail!(
                    "Invalid max_inputs {}: must be between 1 and {}",
                    max,
                    MAX_INPUTS_PER_TX
                );
            }
        }

        if self.chain.coinbase_maturity == 0 {
            return Err(anyhow!("Invalid coinbase maturity: must be greater than 0"));
        }

        Ok(())
    }

    /// Chain rules for the configured network
    pub fn chain_params(&self) -> Result<ChainParams> {
        Ok(self.chain.params(self.wallet.network()?))
    }
}

/// Ensure a configuration file exists at the specified path
/// If it doesn't exist, create it with default values
pub fn ensure_config_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;
            }
        }

        Config::default()
            .save(path)
            .map_err(|e| anyhow!("Failed to write default config file: {}", e))?;
    }

    Ok(())
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_fee_sat_per_kb() -> u64 {
    DEFAULT_FEE_SAT_PER_KB
}

fn default_min_conf() -> u32 {
    1
}

fn default_coinbase_maturity() -> u32 {
    DEFAULT_COINBASE_MATURITY
}

fn default_burn_window() -> u32 {
    DEFAULT_BURN_WINDOW
}

fn default_burn_lookahead() -> u32 {
    DEFAULT_BURN_LOOKAHEAD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.wallet.fee_sat_per_kb, 1000);
        assert_eq!(config.chain.burn_window, 129_600);
    }

    #[test]
    fn network_names_are_case_insensitive() {
        let mut wallet = WalletConfig::default();
        wallet.network = "Regtest".to_string();
        assert_eq!(wallet.network().unwrap(), Network::Regtest);
    }

    #[test]
    fn validate_rejects_oversized_input_cap() {
        let mut config = Config::default();
        config.wallet.max_inputs = Some(MAX_INPUTS_PER_TX + 1);
        assert!(config.validate().is_err());

        config.wallet.max_inputs = Some(200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_network_fails_validation() {
        let mut config = Config::default();
        config.wallet.network = "mainnet-ish".to_string();
        assert!(config.validate().is_err());
        assert!(config.chain_params().is_err());
    }
}
