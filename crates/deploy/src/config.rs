//! Layered deployment configuration.
//!
//! Values are read from built-in defaults, then `Dxguild.toml`, then `DXGUILD_*`
//! environment variables. Nested keys use `__` in environment variables, e.g.
//! `DXGUILD_NAMED_ACCOUNTS__DEPLOYER=1`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    address::DETERMINISTIC_DEPLOYMENT_PROXY,
    context::{AccountRef, CAPTURED_ENV_KEYS, ETHERSCAN_API_KEY, EnvConfig},
    guilds::GuildSuiteConfig,
    step::DeployRequest,
};

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "Dxguild.toml";

/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "DXGUILD_";

/// Etherscan-compatible explorer used for source verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtherscanConfig {
    pub api_url: String,
    /// Falls back to the `ETHERSCAN_API_KEY` environment value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Everything needed to run the deployment of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Network name, also used as the deployment records subdirectory.
    pub network: String,
    pub rpc_url: String,
    /// Root of the compiled artifacts.
    pub artifacts_dir: PathBuf,
    /// Root of the deployment records.
    pub deployments_dir: PathBuf,
    pub deterministic_proxy: Address,
    /// Role name to node account index or literal address.
    pub named_accounts: BTreeMap<String, AccountRef>,
    /// Key/value pairs exposed to the steps, e.g. `DEPLOY_SALT`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etherscan: Option<EtherscanConfig>,
    #[serde(default)]
    pub guilds: GuildSuiteConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: "localhost".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            deployments_dir: PathBuf::from("deployments"),
            deterministic_proxy: DETERMINISTIC_DEPLOYMENT_PROXY,
            named_accounts: BTreeMap::from([
                (DeployRequest::DEFAULT_SENDER.to_string(), AccountRef::Index(0)),
                ("tokenHolder".to_string(), AccountRef::Index(1)),
            ]),
            env: BTreeMap::new(),
            etherscan: None,
            guilds: GuildSuiteConfig::default(),
        }
    }
}

impl DeployConfig {
    /// The layered configuration, reading `path` or `Dxguild.toml` when absent.
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or(Path::new(CONFIG_FILENAME));

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the layered configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
        }

        let config: Self = Self::figment(path)
            .extract()
            .context("Failed to load deployment configuration")?;

        tracing::debug!(network = %config.network, rpc_url = %config.rpc_url, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployment config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load a single TOML file, without defaults or environment overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file as TOML")
    }

    pub fn rpc_url(&self) -> Result<Url> {
        Url::parse(&self.rpc_url).with_context(|| format!("Invalid RPC URL '{}'", self.rpc_url))
    }

    /// Environment values of an invocation: configured pairs overridden by the process
    /// environment.
    pub fn env_config(&self) -> EnvConfig {
        EnvConfig::capture(&self.env, CAPTURED_ENV_KEYS)
    }

    /// Explorer endpoint and key, when verification is configured and a key is known.
    pub fn etherscan_settings(&self, env: &EnvConfig) -> Result<Option<(Url, String, Option<u64>)>> {
        let Some(etherscan) = &self.etherscan else {
            return Ok(None);
        };

        let Some(api_key) = etherscan
            .api_key
            .clone()
            .or_else(|| env.get(ETHERSCAN_API_KEY).map(str::to_string))
        else {
            tracing::warn!("Etherscan is configured without an API key, verification disabled");
            return Ok(None);
        };

        let api_url = Url::parse(&etherscan.api_url)
            .with_context(|| format!("Invalid Etherscan API URL '{}'", etherscan.api_url))?;

        Ok(Some((api_url, api_key, etherscan.chain_id)))
    }
}
