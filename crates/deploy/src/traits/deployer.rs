//! Contract deployment trait.

use std::future::Future;

use alloy_core::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};

use crate::{
    errors::DeploymentError,
    step::{ArgValue, ContractId},
};

/// Confirmed deployment of a single contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    /// Address of the new contract.
    pub address: Address,
    /// Hash of the creation transaction.
    pub tx_hash: TxHash,
    /// Block the creation transaction was included in.
    pub block_number: u64,
}

/// Deploys compiled contracts to a chain.
pub trait ContractDeployer: Send + Sync {
    /// Deploy `contract` with the given constructor arguments.
    ///
    /// Resolves once the creation transaction is confirmed and code is present at
    /// the new address.
    fn deploy(
        &self,
        contract: &ContractId,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<DeployReceipt, DeploymentError>> + Send;

    /// Current chain head.
    fn block_number(&self) -> impl Future<Output = Result<u64, DeploymentError>> + Send;
}

impl<T: ContractDeployer> ContractDeployer for &T {
    fn deploy(
        &self,
        contract: &ContractId,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<DeployReceipt, DeploymentError>> + Send {
        (**self).deploy(contract, args)
    }

    fn block_number(&self) -> impl Future<Output = Result<u64, DeploymentError>> + Send {
        (**self).block_number()
    }
}
