//! Contract deployment over Ethereum JSON-RPC.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, Bytes, TxHash, TxKind, U64, U128};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use crate::{
    artifact::ArtifactStore,
    config::NetworkConfig,
    errors::DeploymentError,
    rpc,
    step::{ArgValue, ContractId},
    traits::{ContractDeployer, DeployReceipt},
};

/// Interval between two receipt or block polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Margin added on top of `eth_estimateGas`, in percent.
const GAS_ESTIMATE_MARGIN_PERCENT: u64 = 120;

/// The account sending the deployment transactions.
#[derive(Debug, Clone)]
pub enum Account {
    /// Transactions are signed locally with this key.
    Local(PrivateKeySigner),
    /// Transactions are signed by the node (`eth_sendTransaction`).
    Unlocked(Address),
}

impl Account {
    /// Parse a hex private key, with or without `0x` prefix.
    pub fn from_private_key(key: &str) -> anyhow::Result<Self> {
        let key = key.trim();
        let signer: PrivateKeySigner = key
            .strip_prefix("0x")
            .unwrap_or(key)
            .parse()
            .context("Invalid private key")?;
        Ok(Self::Local(signer))
    }

    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::Unlocked(address) => *address,
        }
    }
}

/// Fee fields of a creation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeeParams {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    block_number: Option<U64>,
}

/// Deploys contracts through a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcDeployer {
    client: reqwest::Client,
    url: Url,
    chain_id: u64,
    account: Account,
    artifacts: ArtifactStore,
    gas_price: Option<u64>,
    gas_limit: Option<u64>,
    confirmations: u64,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RpcDeployer {
    /// Connect to the network and check it is the one configured.
    pub async fn connect(
        name: &str,
        network: &NetworkConfig,
        account: Account,
        artifacts: ArtifactStore,
    ) -> anyhow::Result<Self> {
        let client = rpc::create_client()?;

        let chain_id: U64 = rpc::json_rpc_call(&client, network.url.as_str(), "eth_chainId", vec![])
            .await
            .with_context(|| format!("Failed to reach network '{}' at {}", name, network.url))?;
        let chain_id = chain_id.to::<u64>();

        if let Some(expected) = network.chain_id {
            if expected != chain_id {
                anyhow::bail!(
                    "Network '{}' reports chain id {}, expected {}",
                    name,
                    chain_id,
                    expected
                );
            }
        }

        tracing::info!(
            network = %name,
            chain_id,
            signer = %account.address(),
            "Connected"
        );

        Ok(Self {
            client,
            url: network.url.clone(),
            chain_id,
            account,
            artifacts,
            gas_price: network.gas_price,
            gas_limit: network.gas_limit,
            confirmations: network.confirmations.max(1),
            receipt_timeout: Duration::from_secs(network.receipt_timeout_secs),
            poll_interval: POLL_INTERVAL,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, DeploymentError> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params)
            .await
            .map_err(DeploymentError::rpc(method))
    }

    async fn fee_params(&self) -> Result<FeeParams, DeploymentError> {
        if let Some(gas_price) = self.gas_price {
            return Ok(FeeParams::Legacy {
                gas_price: gas_price.into(),
            });
        }

        let gas_price: U128 = self.call("eth_gasPrice", vec![]).await?;
        let priority_fee = match self.call::<U128>("eth_maxPriorityFeePerGas", vec![]).await {
            Ok(fee) => fee.to::<u128>(),
            Err(e) => {
                tracing::debug!(error = %e, "No priority fee suggestion, using 0");
                0
            }
        };

        Ok(FeeParams::Eip1559 {
            max_fee_per_gas: gas_price.to::<u128>().saturating_mul(2).max(priority_fee),
            max_priority_fee_per_gas: priority_fee,
        })
    }

    async fn gas_limit(&self, init_code: &Bytes) -> Result<u64, DeploymentError> {
        if let Some(gas_limit) = self.gas_limit {
            return Ok(gas_limit);
        }

        let estimate: U64 = self
            .call(
                "eth_estimateGas",
                vec![json!({ "from": self.account.address(), "data": init_code })],
            )
            .await?;

        Ok(estimate.to::<u64>().saturating_mul(GAS_ESTIMATE_MARGIN_PERCENT) / 100)
    }

    /// Send the creation transaction, returning its hash.
    async fn send_creation(&self, init_code: Bytes) -> Result<TxHash, DeploymentError> {
        let gas_limit = self.gas_limit(&init_code).await?;
        let fees = self.fee_params().await?;

        match &self.account {
            Account::Local(signer) => {
                let nonce: U64 = self
                    .call(
                        "eth_getTransactionCount",
                        vec![json!(signer.address()), json!("pending")],
                    )
                    .await?;

                let raw = sign_creation(
                    signer,
                    self.chain_id,
                    nonce.to::<u64>(),
                    gas_limit,
                    fees,
                    init_code,
                )?;

                self.call("eth_sendRawTransaction", vec![json!(raw)]).await
            }
            Account::Unlocked(from) => {
                let mut tx = json!({
                    "from": from,
                    "data": init_code,
                    "gas": U64::from(gas_limit),
                });
                match fees {
                    FeeParams::Legacy { gas_price } => {
                        tx["gasPrice"] = json!(U128::from(gas_price));
                    }
                    FeeParams::Eip1559 {
                        max_fee_per_gas,
                        max_priority_fee_per_gas,
                    } => {
                        tx["maxFeePerGas"] = json!(U128::from(max_fee_per_gas));
                        tx["maxPriorityFeePerGas"] = json!(U128::from(max_priority_fee_per_gas));
                    }
                }

                self.call("eth_sendTransaction", vec![tx]).await
            }
        }
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, DeploymentError> {
        rpc::wait_until_ready("transaction receipt", self.receipt_timeout, self.poll_interval, || async move {
            rpc::json_rpc_call::<Option<TransactionReceipt>>(
                &self.client,
                self.url.as_str(),
                "eth_getTransactionReceipt",
                vec![json!(tx_hash)],
            )
            .await
        })
        .await
        .map_err(|_| DeploymentError::ReceiptTimeout { tx_hash })
    }

    async fn wait_for_confirmations(&self, block_number: u64) -> Result<(), DeploymentError> {
        if self.confirmations <= 1 {
            return Ok(());
        }

        let target = block_number.saturating_add(self.confirmations - 1);
        tracing::debug!(block_number, target, "Waiting for confirmations");

        rpc::wait_until_ready("confirmations", self.receipt_timeout, self.poll_interval, || async move {
            let head: U64 =
                rpc::json_rpc_call(&self.client, self.url.as_str(), "eth_blockNumber", vec![])
                    .await?;
            Ok((head.to::<u64>() >= target).then_some(()))
        })
        .await
        .context("Deployment was mined but did not reach the configured confirmations")?;

        Ok(())
    }
}

impl ContractDeployer for RpcDeployer {
    async fn deploy(
        &self,
        contract: &ContractId,
        args: &[ArgValue],
    ) -> Result<DeployReceipt, DeploymentError> {
        let artifact = self
            .artifacts
            .load(contract)
            .map_err(|source| DeploymentError::Artifact {
                contract: contract.clone(),
                source,
            })?;
        let init_code = artifact
            .init_code(args)
            .map_err(|source| DeploymentError::Encoding {
                contract: contract.clone(),
                source,
            })?;

        let tx_hash = self.send_creation(init_code).await?;
        tracing::info!(contract = %contract, tx_hash = %tx_hash, "Creation transaction sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if receipt.status.is_some_and(|status| status.is_zero()) {
            return Err(DeploymentError::Reverted { tx_hash });
        }
        let address = receipt
            .contract_address
            .ok_or(DeploymentError::MissingContractAddress { tx_hash })?;
        let block_number = receipt.block_number.unwrap_or_default().to::<u64>();

        self.wait_for_confirmations(block_number).await?;

        let code: Bytes = self
            .call("eth_getCode", vec![json!(address), json!("latest")])
            .await?;
        if code.is_empty() {
            return Err(DeploymentError::NoCode { address });
        }

        Ok(DeployReceipt {
            address,
            tx_hash,
            block_number,
        })
    }

    async fn block_number(&self) -> Result<u64, DeploymentError> {
        let head: U64 = self.call("eth_blockNumber", vec![]).await?;
        Ok(head.to::<u64>())
    }
}

/// Sign a contract creation transaction, returning its EIP-2718 encoding.
fn sign_creation(
    signer: &PrivateKeySigner,
    chain_id: u64,
    nonce: u64,
    gas_limit: u64,
    fees: FeeParams,
    input: Bytes,
) -> Result<Bytes, DeploymentError> {
    let envelope: TxEnvelope = match fees {
        FeeParams::Legacy { gas_price } => {
            let tx = TxLegacy {
                chain_id: Some(chain_id),
                nonce,
                gas_price,
                gas_limit,
                to: TxKind::Create,
                input,
                ..Default::default()
            };
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(DeploymentError::Signing)?;
            tx.into_signed(signature).into()
        }
        FeeParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let tx = TxEip1559 {
                chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to: TxKind::Create,
                input,
                ..Default::default()
            };
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(DeploymentError::Signing)?;
            tx.into_signed(signature).into()
        }
    };

    Ok(envelope.encoded_2718().into())
}
