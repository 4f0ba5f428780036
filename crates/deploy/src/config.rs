//! Deployment configuration.
//!
//! Read from a `Deploy.toml` file, overlaid with `TAIYAKI_`-prefixed environment
//! variables (`TAIYAKI_NETWORKS__MATIC__URL` sets `networks.matic.url`).

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    sequencer::SettleStrategy,
    step::{ArgSpec, ContractId, SeedAddresses, StepDefinition},
};

/// The default name of the deployment configuration file.
pub const DEFAULT_CONFIG_FILENAME: &str = "Deploy.toml";

/// Prefix of the environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "TAIYAKI_";

/// Complete deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployConfig {
    /// Hardhat artifacts directory. Relative paths are resolved against the
    /// directory of the configuration file.
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    /// Target networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Addresses known before any step runs, shared by every network.
    #[serde(default)]
    pub seeds: BTreeMap<String, Address>,

    /// Deployment steps in execution order.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Compiler settings the artifacts are expected to have been built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Pinned solc version (`0.6.2`). Verification fails for artifacts compiled
    /// with any other version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Source verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// How long to wait after a deployment before submitting it.
    #[serde(default)]
    pub settle: SettleStrategy,
    /// Seconds between two verification status checks.
    #[serde(default = "default_status_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Status checks before a submission is reported as still pending.
    #[serde(default = "default_max_status_checks")]
    pub max_status_checks: usize,
}

fn default_status_poll_interval_secs() -> u64 {
    5
}

fn default_max_status_checks() -> usize {
    24
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            settle: SettleStrategy::default(),
            poll_interval_secs: default_status_poll_interval_secs(),
            max_status_checks: default_max_status_checks(),
        }
    }
}

/// A network to deploy to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: Url,
    /// Expected chain id. The run refuses to start if the endpoint reports another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Fixed gas price in wei. Sends legacy transactions when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    /// Fixed gas limit for contract creations instead of an estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Blocks a creation transaction must have before the deployment counts as done.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Seconds to wait for a creation transaction to be mined.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Block explorer used for source verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerConfig>,
    /// Seed addresses for this network only, overriding the shared ones.
    #[serde(default)]
    pub seeds: BTreeMap<String, Address>,
}

fn default_confirmations() -> u64 {
    1
}

fn default_receipt_timeout_secs() -> u64 {
    300
}

/// An Etherscan-compatible block explorer API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub api_url: Url,
    /// Usually supplied on the command line or through the environment instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// A deployment step as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub contract: ContractId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub verify: bool,
    /// Constructor arguments. `"@Name"` references the address of an earlier step
    /// or a seed.
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

fn default_true() -> bool {
    true
}

/// Step flags toggled on the command line, taking precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagOverrides {
    pub enable: Vec<String>,
    pub disable: Vec<String>,
}

impl DeployConfig {
    /// Load the configuration from `path`, overlaid with the environment.
    ///
    /// If `path` is a directory, [`DEFAULT_CONFIG_FILENAME`] inside it is loaded.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let config_path = if path.is_dir() {
            path.join(DEFAULT_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut config: Self = Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

        if config.artifacts.is_relative() {
            if let Some(dir) = config_path.parent() {
                config.artifacts = dir.join(&config.artifacts);
            }
        }

        tracing::debug!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// The configuration of network `name`.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).with_context(|| {
            let known: Vec<_> = self.networks.keys().map(String::as_str).collect();
            format!("Unknown network '{}' (configured: {})", name, known.join(", "))
        })
    }

    /// Seed addresses for `network`: the shared seeds overlaid with the network's own.
    pub fn seeds_for(&self, network: &str) -> Result<SeedAddresses> {
        let mut seeds: SeedAddresses = self.seeds.clone().into();
        for (name, address) in &self.network(network)?.seeds {
            seeds.insert(name.clone(), *address);
        }
        Ok(seeds)
    }

    /// Validate the configured steps into step definitions, applying `overrides`.
    pub fn step_definitions(&self, overrides: &FlagOverrides) -> Result<Vec<StepDefinition>> {
        let mut names = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if step.name.trim().is_empty() {
                anyhow::bail!("Step for {} has an empty name", step.contract);
            }
            if !names.insert(step.name.as_str()) {
                anyhow::bail!("Step name '{}' is used more than once", step.name);
            }
        }

        for name in overrides.enable.iter().chain(&overrides.disable) {
            if !names.contains(name.as_str()) {
                anyhow::bail!("Unknown step '{}'", name);
            }
        }
        if let Some(name) = overrides.enable.iter().find(|n| overrides.disable.contains(*n)) {
            anyhow::bail!("Step '{}' is both enabled and disabled", name);
        }

        Ok(self
            .steps
            .iter()
            .map(|step| {
                let enabled = if overrides.enable.contains(&step.name) {
                    true
                } else if overrides.disable.contains(&step.name) {
                    false
                } else {
                    step.enabled
                };

                StepDefinition {
                    name: step.name.clone(),
                    contract: step.contract.clone(),
                    enabled,
                    verify: step.verify,
                    args: step.args.clone(),
                }
            })
            .collect())
    }
}
