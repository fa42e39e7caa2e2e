//! # Node Configuration
//!
//! Loaded from a TOML file. Every section is optional; missing values fall
//! back to devnet defaults.
//!
//! ```toml
//! [node]
//! api_port = 9741
//! metrics_port = 9742
//! data_dir = "./vault-data"
//! log_format = "pretty"
//! max_price_age_secs = 60
//! faucet = true
//!
//! [[assets]]
//! type_id = "0x1::coin::WETH"
//! symbol = "WETH"
//! name = "Wrapped Ether"
//! decimals = 8
//! price_feed_id = "eth-usd"
//!
//! [[vaults]]
//! creator = "0xa11ce"
//! name = "Blue Chip Index"
//! symbol = "BCI"
//!
//! [[prices]]
//! feed_id = "eth-usd"
//! mantissa = 300000000000
//! exponent = -8
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use index_vault::config::DEFAULT_MAX_PRICE_AGE;
use index_vault::registry::AssetDescriptor;

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Port for the REST API.
    pub api_port: u16,
    /// Port for the Prometheus endpoint.
    pub metrics_port: u16,
    /// Directory holding the sled database.
    pub data_dir: PathBuf,
    /// `pretty` or `json`.
    pub log_format: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Quotes older than this are rejected. `0` disables the check.
    pub max_price_age_secs: u64,
    /// Enables `POST /wallets/:owner/fund`.
    pub faucet: bool,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            api_port: 9741,
            metrics_port: 9742,
            data_dir: PathBuf::from("./vault-data"),
            log_format: "pretty".into(),
            log_level: "index_vault_node=info,index_vault=info,tower_http=debug".into(),
            max_price_age_secs: DEFAULT_MAX_PRICE_AGE.as_secs(),
            faucet: true,
        }
    }
}

/// A vault created at startup if its symbol is not taken yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSeed {
    pub creator: String,
    pub name: String,
    pub symbol: String,
}

/// A price published at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSeed {
    pub feed_id: String,
    pub mantissa: i64,
    pub exponent: i32,
}

/// Top-level config file structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
    #[serde(default)]
    pub vaults: Vec<VaultSeed>,
    #[serde(default)]
    pub prices: Vec<PriceSeed>,
}

impl NodeConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Renders the config as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// A small three-asset devnet with one vault and seed prices.
    pub fn devnet() -> Self {
        Self {
            node: NodeSection::default(),
            assets: vec![
                AssetDescriptor::new("0x1::coin::USDC", "USDC", "USD Coin", 6, "usdc-usd"),
                AssetDescriptor::new("0x1::coin::WETH", "WETH", "Wrapped Ether", 8, "eth-usd"),
                AssetDescriptor::new("0x1::coin::WBTC", "WBTC", "Wrapped Bitcoin", 8, "btc-usd"),
            ],
            vaults: vec![VaultSeed {
                creator: "0xa11ce".into(),
                name: "Blue Chip Index".into(),
                symbol: "BCI".into(),
            }],
            prices: vec![
                PriceSeed {
                    feed_id: "usdc-usd".into(),
                    mantissa: 100_000_000,
                    exponent: -8,
                },
                PriceSeed {
                    feed_id: "eth-usd".into(),
                    mantissa: 300_000_000_000,
                    exponent: -8,
                },
                PriceSeed {
                    feed_id: "btc-usd".into(),
                    mantissa: 6_000_000_000_000,
                    exponent: -8,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devnet_roundtrips_through_toml() {
        let config = NodeConfig::devnet();
        let text = config.to_toml().unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let parsed: NodeConfig = toml::from_str("[node]\napi_port = 8000\n").unwrap();
        assert_eq!(parsed.node.api_port, 8000);
        assert_eq!(parsed.node.metrics_port, 9742);
        assert!(parsed.assets.is_empty());
    }

    #[test]
    fn asset_table_parses_into_descriptor() {
        let text = r#"
            [[assets]]
            type_id = "0x1::coin::WETH"
            symbol = "WETH"
            name = "Wrapped Ether"
            decimals = 8
            price_feed_id = "eth-usd"
        "#;
        let parsed: NodeConfig = toml::from_str(text).unwrap();
        assert_eq!(parsed.assets[0].type_id.as_str(), "0x1::coin::WETH");
        assert_eq!(parsed.assets[0].price_feed_id.as_str(), "eth-usd");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, NodeConfig::devnet().to_toml().unwrap()).unwrap();
        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.vaults[0].symbol, "BCI");
        assert!(NodeConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
