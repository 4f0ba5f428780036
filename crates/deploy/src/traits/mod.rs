//! Seams between the deployment sequencer and the outside world.
//!
//! The sequencer only ever talks to a chain through a [`ContractDeployer`] and to a
//! block explorer through a [`SourceVerifier`]. The JSON-RPC and Etherscan
//! implementations live in [`crate::chain`] and [`crate::etherscan`].

mod deployer;
mod verifier;

pub use deployer::{ContractDeployer, DeployReceipt};
pub use verifier::{SourceVerifier, Unverified};
