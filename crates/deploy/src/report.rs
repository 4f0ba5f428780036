//! Run reports written after every deployment run.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::DeploymentLedger;

/// Summary of one deployment run on one network.
///
/// Written whether the run completed or not, so that contracts deployed before a
/// failure can be found again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    /// Account the deployment transactions were sent from.
    pub deployer: Address,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether every enabled step was deployed.
    pub complete: bool,
    /// Why the run stopped early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deployments: DeploymentLedger,
}

impl DeploymentReport {
    /// Start a report for a run beginning now.
    pub fn begin(network: impl Into<String>, chain_id: u64, deployer: Address) -> Self {
        let now = Utc::now();
        Self {
            network: network.into(),
            chain_id,
            deployer,
            started_at: now,
            finished_at: now,
            complete: false,
            error: None,
            deployments: DeploymentLedger::default(),
        }
    }

    /// Close the report with the outcome of the run.
    pub fn finish(mut self, deployments: DeploymentLedger, error: Option<String>) -> Self {
        self.finished_at = Utc::now();
        self.complete = error.is_none();
        self.error = error;
        self.deployments = deployments;
        self
    }

    /// Default location of the report for `network` under `dir`.
    pub fn default_path(dir: &Path, network: &str) -> PathBuf {
        dir.join(format!("{}.json", network))
    }

    /// Save the report as formatted JSON, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create report directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;
        std::fs::write(path, json)
            .context(format!("Failed to write deployment report to {}", path.display()))?;

        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    /// Load a report from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment report does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read deployment report from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse deployment report JSON")
    }
}
