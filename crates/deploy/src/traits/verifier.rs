//! Source verification trait.

use std::future::Future;

use alloy_core::primitives::Address;

use crate::{
    errors::VerificationError,
    step::{ArgValue, ContractId},
};

/// Publishes the source of deployed contracts to a block explorer.
pub trait SourceVerifier: Send + Sync {
    /// Whether this verifier submits anything at all.
    ///
    /// When `false` the sequencer neither waits for the deployment to settle nor
    /// calls [`SourceVerifier::verify_source`].
    fn is_enabled(&self) -> bool {
        true
    }

    /// Verify the contract deployed at `address`, which was created with `args`.
    fn verify_source(
        &self,
        contract: &ContractId,
        address: Address,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<(), VerificationError>> + Send;
}

/// Verifier used when no block explorer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unverified;

impl SourceVerifier for Unverified {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn verify_source(
        &self,
        _contract: &ContractId,
        _address: Address,
        _args: &[ArgValue],
    ) -> Result<(), VerificationError> {
        Ok(())
    }
}

impl<V: SourceVerifier> SourceVerifier for Option<V> {
    fn is_enabled(&self) -> bool {
        self.as_ref().is_some_and(V::is_enabled)
    }

    async fn verify_source(
        &self,
        contract: &ContractId,
        address: Address,
        args: &[ArgValue],
    ) -> Result<(), VerificationError> {
        match self {
            Some(verifier) => verifier.verify_source(contract, address, args).await,
            None => Ok(()),
        }
    }
}

impl<V: SourceVerifier> SourceVerifier for &V {
    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn verify_source(
        &self,
        contract: &ContractId,
        address: Address,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<(), VerificationError>> + Send {
        (**self).verify_source(contract, address, args)
    }
}
