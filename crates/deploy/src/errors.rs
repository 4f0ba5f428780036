//! Error types for deployment runs.

use alloy_core::primitives::{Address, TxHash};
use thiserror::Error;

use crate::{ledger::DeploymentLedger, step::ContractId};

/// A contract deployment failed. Always fatal to the run.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("failed to load artifact for {contract}")]
    Artifact {
        contract: ContractId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to encode constructor arguments for {contract}")]
    Encoding {
        contract: ContractId,
        #[source]
        source: anyhow::Error,
    },

    #[error("{method} request failed")]
    Rpc {
        method: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to sign deployment transaction")]
    Signing(#[source] alloy_signer::Error),

    #[error("deployment transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },

    #[error("receipt of {tx_hash} has no contract address")]
    MissingContractAddress { tx_hash: TxHash },

    #[error("no code at deployed address {address}")]
    NoCode { address: Address },

    #[error("timed out waiting for receipt of {tx_hash}")]
    ReceiptTimeout { tx_hash: TxHash },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeploymentError {
    pub(crate) fn rpc(method: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Rpc { method, source }
    }
}

/// Source verification of a deployed contract failed.
///
/// Never fatal: the sequencer logs it and marks the deployment unverified.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("verification rejected: {0}")]
    Rejected(String),

    #[error("explorer rate limit reached: {0}")]
    RateLimited(String),

    #[error("verification still pending (guid {guid})")]
    Pending { guid: String },

    #[error("artifact compiled with solc {artifact}, but {pinned} is pinned")]
    CompilerMismatch { artifact: String, pinned: String },

    #[error("explorer unavailable")]
    Unavailable(#[source] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a deployment run stopped.
#[derive(Debug, Error)]
pub enum RunErrorKind {
    #[error("no deployment steps given")]
    EmptySequence,

    #[error("step name {0:?} is used more than once")]
    DuplicateStep(String),

    #[error("step {step:?} references {reference}, which is neither an earlier step nor a seed")]
    UnresolvedReference { step: String, reference: String },

    #[error("step {step:?} failed to deploy")]
    Deployment {
        step: String,
        #[source]
        source: DeploymentError,
    },
}

/// A fatal run failure, carrying every deployment completed before it.
#[derive(Debug, Error)]
#[error("deployment run aborted after {} step(s)", .ledger.len())]
pub struct RunError {
    /// Steps deployed before the failure. These are live on chain.
    pub ledger: DeploymentLedger,
    #[source]
    pub kind: RunErrorKind,
}

impl RunError {
    pub(crate) fn new(ledger: DeploymentLedger, kind: RunErrorKind) -> Self {
        Self { ledger, kind }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_run_error_keeps_ledger_and_source() {
        let err = RunError::new(
            DeploymentLedger::default(),
            RunErrorKind::Deployment {
                step: "TAIYAKI".to_string(),
                source: DeploymentError::Reverted {
                    tx_hash: TxHash::ZERO,
                },
            },
        );

        assert_eq!(err.to_string(), "deployment run aborted after 0 step(s)");
        let kind = err.source().unwrap();
        assert_eq!(kind.to_string(), "step \"TAIYAKI\" failed to deploy");
        assert!(kind.source().unwrap().to_string().contains("reverted"));
    }
}
