//! Source verification through an Etherscan-compatible explorer API.

use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use url::Url;

use crate::{
    artifact::{Artifact, ArtifactStore, BuildInfo},
    errors::VerificationError,
    step::{ArgValue, ContractId},
    traits::SourceVerifier,
};

const CODE_FORMAT: &str = "solidity-standard-json-input";

/// Reply envelope shared by every explorer API action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ExplorerResponse {
    status: String,
    message: String,
    result: String,
}

impl ExplorerResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }
}

/// What the explorer did with a verification submission.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Submission {
    /// Queued under this guid.
    Accepted(String),
    AlreadyVerified,
}

fn classify_submission(response: ExplorerResponse) -> Result<Submission, VerificationError> {
    let result = response.result.to_lowercase();
    if result.contains("already verified") {
        return Ok(Submission::AlreadyVerified);
    }
    if response.is_ok() {
        return Ok(Submission::Accepted(response.result));
    }
    if result.contains("rate limit") {
        return Err(VerificationError::RateLimited(response.result));
    }
    Err(VerificationError::Rejected(format!(
        "{}: {}",
        response.message, response.result
    )))
}

fn classify_status(guid: &str, response: ExplorerResponse) -> Result<(), VerificationError> {
    let result = response.result.to_lowercase();
    if result.contains("pending") || result.contains("queue") {
        return Err(VerificationError::Pending {
            guid: guid.to_string(),
        });
    }
    if response.is_ok() || result.contains("already verified") {
        return Ok(());
    }
    if result.contains("rate limit") {
        return Err(VerificationError::RateLimited(response.result));
    }
    Err(VerificationError::Rejected(response.result))
}

/// Reject artifacts compiled with a compiler other than the pinned one.
fn check_compiler(pinned: Option<&str>, build_info: &BuildInfo) -> Result<(), VerificationError> {
    match pinned {
        Some(pinned) if pinned.trim_start_matches('v') != build_info.solc_version => {
            Err(VerificationError::CompilerMismatch {
                artifact: build_info.solc_version.clone(),
                pinned: pinned.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Verifies contract sources on an Etherscan-compatible explorer.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    chain_id: Option<u64>,
    artifacts: ArtifactStore,
    compiler_version: Option<String>,
    poll_interval: Duration,
    max_status_checks: usize,
}

impl EtherscanVerifier {
    pub fn new(
        api_url: Url,
        api_key: impl Into<String>,
        artifacts: ArtifactStore,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url,
            api_key: api_key.into(),
            chain_id: None,
            artifacts,
            compiler_version: None,
            poll_interval: Duration::from_secs(5),
            max_status_checks: 24,
        })
    }

    /// Send the chain id along with each request, as multichain APIs require.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Only verify artifacts compiled with this solc version.
    pub fn with_compiler_version(mut self, version: Option<String>) -> Self {
        self.compiler_version = version;
        self
    }

    /// How often, and how many times, to check a queued submission.
    pub fn with_status_polling(mut self, interval: Duration, max_checks: usize) -> Self {
        self.poll_interval = interval;
        self.max_status_checks = max_checks;
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.chain_id {
            Some(chain_id) => builder.query(&[("chainid", chain_id)]),
            None => builder,
        }
    }

    async fn read(&self, builder: reqwest::RequestBuilder) -> Result<ExplorerResponse, VerificationError> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(VerificationError::Unavailable)?;

        let response = response
            .error_for_status()
            .map_err(VerificationError::Unavailable)?;

        response
            .json::<ExplorerResponse>()
            .await
            .context("Unexpected explorer response")
            .map_err(VerificationError::Other)
    }

    async fn submit(
        &self,
        artifact: &Artifact,
        build_info: &BuildInfo,
        address: Address,
        encoded_args: &[u8],
    ) -> Result<Submission, VerificationError> {
        let source_code =
            serde_json::to_string(&build_info.input).context("Failed to serialize compiler input")?;

        let form = [
            ("apikey", self.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", address.to_string()),
            ("sourceCode", source_code),
            ("codeformat", CODE_FORMAT.to_string()),
            ("contractname", artifact.qualified_name()),
            ("compilerversion", format!("v{}", build_info.solc_long_version)),
            ("constructorArguements", hex::encode(encoded_args)),
        ];

        let response = self
            .read(self.client.post(self.api_url.clone()).form(&form))
            .await?;
        classify_submission(response)
    }

    async fn check_status(&self, guid: &str) -> Result<(), VerificationError> {
        let query = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "checkverifystatus"),
            ("guid", guid),
        ];

        let response = self
            .read(self.client.get(self.api_url.clone()).query(&query))
            .await?;
        classify_status(guid, response)
    }
}

impl SourceVerifier for EtherscanVerifier {
    async fn verify_source(
        &self,
        contract: &ContractId,
        address: Address,
        args: &[ArgValue],
    ) -> Result<(), VerificationError> {
        let artifact = self.artifacts.load(contract)?;
        let build_info = self.artifacts.build_info(contract)?;
        check_compiler(self.compiler_version.as_deref(), &build_info)?;

        let encoded_args = artifact
            .encode_constructor_args(args)
            .context("Failed to encode constructor arguments")?;

        let guid = match self.submit(&artifact, &build_info, address, &encoded_args).await? {
            Submission::AlreadyVerified => {
                tracing::info!(contract = %contract, address = %address, "Already verified");
                return Ok(());
            }
            Submission::Accepted(guid) => guid,
        };

        tracing::debug!(contract = %contract, guid = %guid, "Verification submitted");

        (|| self.check_status(&guid))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_status_checks),
            )
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, VerificationError::Pending { .. }))
            .notify(|_, delay| {
                tracing::trace!(guid = %guid, ?delay, "Verification pending");
            })
            .await
    }
}
