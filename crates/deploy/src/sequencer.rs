//! The deployment sequencer.
//!
//! Runs an ordered list of [`StepDefinition`]s against a [`ContractDeployer`],
//! threading the address each step produces into the constructor arguments of the
//! steps after it, and submitting each deployed contract for source verification.

use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    errors::{RunError, RunErrorKind},
    ledger::{DeploymentLedger, DeploymentResult},
    step::{SeedAddresses, StepDefinition},
    traits::{ContractDeployer, DeployReceipt, SourceVerifier, Unverified},
};

/// Default time to wait between a deployment and its verification.
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 60;

/// How long to wait after a deployment before submitting it for verification.
///
/// Block explorers index new contracts with some lag, so submitting right after the
/// receipt usually fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SettleStrategy {
    /// Sleep for a fixed number of seconds.
    Delay {
        #[serde(default = "default_settle_delay_secs")]
        secs: u64,
    },
    /// Wait until `count` blocks have been built on top of the deployment block.
    Confirmations {
        count: u64,
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        #[serde(default = "default_confirmations_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_settle_delay_secs() -> u64 {
    DEFAULT_SETTLE_DELAY_SECS
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_confirmations_timeout_secs() -> u64 {
    600
}

impl Default for SettleStrategy {
    fn default() -> Self {
        Self::Delay {
            secs: DEFAULT_SETTLE_DELAY_SECS,
        }
    }
}

/// Executes deployment steps in order.
#[derive(Debug, Clone)]
pub struct Sequencer<D, V = Unverified> {
    deployer: D,
    verifier: V,
    settle: SettleStrategy,
}

impl<D: ContractDeployer> Sequencer<D> {
    /// Create a sequencer that deploys without verifying.
    pub fn new(deployer: D) -> Self {
        Self {
            deployer,
            verifier: Unverified,
            settle: SettleStrategy::default(),
        }
    }
}

impl<D: ContractDeployer, V: SourceVerifier> Sequencer<D, V> {
    /// Verify deployed contracts with `verifier`.
    pub fn with_verifier<W: SourceVerifier>(self, verifier: W) -> Sequencer<D, W> {
        Sequencer {
            deployer: self.deployer,
            verifier,
            settle: self.settle,
        }
    }

    /// Set how long to wait after each deployment before verifying it.
    pub fn settle(mut self, settle: SettleStrategy) -> Self {
        self.settle = settle;
        self
    }

    /// Run `steps` in declared order.
    ///
    /// Disabled steps are skipped. A step's address references are resolved against
    /// the steps already deployed in this run, then against `seeds`. The first
    /// unresolved reference or failed deployment aborts the run; the returned
    /// [`RunError`] carries everything deployed up to that point. Verification
    /// failures are logged and recorded as `verified = false`.
    pub async fn run(
        &self,
        steps: &[StepDefinition],
        seeds: &SeedAddresses,
    ) -> Result<DeploymentLedger, RunError> {
        validate_steps(steps).map_err(|kind| RunError::new(DeploymentLedger::default(), kind))?;

        let mut ledger = DeploymentLedger::default();

        for step in steps {
            if !step.enabled {
                tracing::debug!(step = %step.name, "Step disabled, skipping");
                continue;
            }

            let args = match step.resolve_args(seeds, &ledger) {
                Ok(args) => args,
                Err(unresolved) => {
                    let kind = RunErrorKind::UnresolvedReference {
                        step: step.name.clone(),
                        reference: unresolved.0,
                    };
                    return Err(RunError::new(ledger, kind));
                }
            };

            tracing::info!(step = %step.name, contract = %step.contract, "Deploying");

            let receipt = match self.deployer.deploy(&step.contract, &args).await {
                Ok(receipt) => receipt,
                Err(source) => {
                    let kind = RunErrorKind::Deployment {
                        step: step.name.clone(),
                        source,
                    };
                    return Err(RunError::new(ledger, kind));
                }
            };

            tracing::info!(
                step = %step.name,
                address = %receipt.address,
                tx_hash = %receipt.tx_hash,
                "Deployed"
            );

            let verified = if step.verify && self.verifier.is_enabled() {
                self.settle_after(&receipt).await;
                match self
                    .verifier
                    .verify_source(&step.contract, receipt.address, &args)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(step = %step.name, address = %receipt.address, "Verified");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            step = %step.name,
                            address = %receipt.address,
                            error = %e,
                            "Verification failed, continuing"
                        );
                        false
                    }
                }
            } else {
                false
            };

            ledger.record(DeploymentResult {
                step_name: step.name.clone(),
                contract: step.contract.clone(),
                address: receipt.address,
                tx_hash: Some(receipt.tx_hash),
                constructor_args: args,
                verified,
            });
        }

        Ok(ledger)
    }

    async fn settle_after(&self, receipt: &DeployReceipt) {
        match self.settle {
            SettleStrategy::Delay { secs } => {
                tracing::debug!(secs, "Waiting before verification");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            SettleStrategy::Confirmations {
                count,
                poll_interval_secs,
                timeout_secs,
            } => {
                let target = receipt.block_number.saturating_add(count);
                let deadline = Instant::now() + Duration::from_secs(timeout_secs);
                let interval = Duration::from_secs(poll_interval_secs);

                loop {
                    match self.deployer.block_number().await {
                        Ok(head) if head >= target => return,
                        Ok(head) => {
                            tracing::trace!(head, target, "Waiting for confirmations");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Could not read chain head, verifying anyway");
                            return;
                        }
                    }

                    if Instant::now() + interval > deadline {
                        tracing::warn!(target, "Timed out waiting for confirmations, verifying anyway");
                        return;
                    }

                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

/// Reject empty sequences and duplicate step names before touching the network.
fn validate_steps(steps: &[StepDefinition]) -> Result<(), RunErrorKind> {
    if steps.is_empty() {
        return Err(RunErrorKind::EmptySequence);
    }

    let mut seen = HashSet::with_capacity(steps.len());
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(RunErrorKind::DuplicateStep(step.name.clone()));
        }
    }

    Ok(())
}
