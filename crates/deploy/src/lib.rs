//! taiyaki-deploy - Sequenced smart contract deployment.
//!
//! This crate deploys an ordered list of contracts to an Ethereum-compatible chain,
//! feeding the address of each deployed contract into the constructor arguments of
//! the contracts deployed after it, and publishing their sources to a block explorer.

mod artifact;
pub use artifact::{Artifact, ArtifactStore, BuildInfo};

mod chain;
pub use chain::{Account, RpcDeployer};

mod config;
pub use config::{
    CompilerConfig, DEFAULT_CONFIG_FILENAME, DeployConfig, ENV_PREFIX, ExplorerConfig,
    FlagOverrides, NetworkConfig, StepConfig, VerifyConfig,
};

mod errors;
pub use errors::{DeploymentError, RunError, RunErrorKind, VerificationError};

mod etherscan;
pub use etherscan::EtherscanVerifier;

mod ledger;
pub use ledger::{DeploymentLedger, DeploymentResult};

mod plan;
pub use plan::{Plan, PlannedReference, PlannedStep, ReferenceSource};

mod report;
pub use report::DeploymentReport;

mod rpc;

mod sequencer;
pub use sequencer::{DEFAULT_SETTLE_DELAY_SECS, Sequencer, SettleStrategy};

mod step;
pub use step::{
    AddressRef, ArgSpec, ArgValue, ContractId, REFERENCE_PREFIX, SeedAddresses, StepDefinition,
    UnresolvedReference,
};

#[cfg(test)]
mod test_utils;

pub mod traits;
pub use traits::{ContractDeployer, DeployReceipt, SourceVerifier, Unverified};
