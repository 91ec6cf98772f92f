//! Source verification on Etherscan-compatible block explorers.

use std::time::Duration;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use futures::future::BoxFuture;
use serde::Deserialize;
use url::Url;

use crate::artifacts::Artifact;

/// Default interval between verification status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of verification status polls.
const DEFAULT_MAX_POLLS: usize = 24;

/// What a verifier needs to know about a deployed contract.
#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub address: Address,
    pub artifact: &'a Artifact,
    pub constructor_args: &'a Bytes,
}

/// Best-effort source verification of deployed contracts.
pub trait Verifier: Send + Sync {
    fn verify<'a>(&'a self, request: VerificationRequest<'a>) -> BoxFuture<'a, anyhow::Result<()>>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

impl ApiResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    fn is_already_verified(&self) -> bool {
        self.result.to_lowercase().contains("already verified")
    }
}

/// Etherscan API client.
///
/// Submits the standard JSON compiler input recorded in the artifact's build info, then
/// polls the verification status until the explorer reports a result.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    chain_id: Option<u64>,
    poll_interval: Duration,
    max_polls: usize,
}

impl EtherscanVerifier {
    pub fn new(api_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key: api_key.into(),
            chain_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Chain id passed to multichain explorer APIs.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_status_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn endpoint(&self) -> Url {
        let mut url = self.api_url.clone();
        if let Some(chain_id) = self.chain_id {
            url.query_pairs_mut()
                .append_pair("chainid", &chain_id.to_string());
        }
        url
    }

    async fn submit(&self, request: &VerificationRequest<'_>) -> anyhow::Result<Option<String>> {
        let build_info = request.artifact.load_build_info()?;
        let source_code = serde_json::to_string(&build_info.input)
            .context("Failed to serialize compiler input")?;
        let contract_name = request.artifact.fully_qualified_name();
        let compiler_version = format!("v{}", build_info.solc_long_version);
        let address = request.address.to_string();
        let constructor_args = hex::encode(request.constructor_args);

        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source_code.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            // Misspelled on the explorer side.
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: ApiResponse = self
            .client
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .context("Failed to send verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        if response.is_already_verified() {
            return Ok(None);
        }
        if !response.is_ok() {
            anyhow::bail!(
                "Verification of {contract_name} at {address} rejected: {} ({})",
                response.result,
                response.message
            );
        }

        Ok(Some(response.result))
    }

    async fn check_status(&self, guid: &str) -> anyhow::Result<ApiResponse> {
        self.client
            .get(self.endpoint())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to query verification status")?
            .json()
            .await
            .context("Failed to parse verification status")
    }

    async fn wait_for_result(&self, guid: &str) -> anyhow::Result<()> {
        let poll = || async move {
            let status = self.check_status(guid).await?;
            if status.result.to_lowercase().contains("pending") {
                anyhow::bail!("Verification {guid} is still pending");
            }
            Ok(status)
        };

        let status = poll
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_polls),
            )
            .notify(|err: &anyhow::Error, _| {
                tracing::trace!(error = %err, "Waiting for verification result...");
            })
            .await?;

        if status.is_ok() || status.is_already_verified() {
            Ok(())
        } else {
            anyhow::bail!("Verification failed: {}", status.result)
        }
    }
}

impl Verifier for EtherscanVerifier {
    fn verify<'a>(&'a self, request: VerificationRequest<'a>) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let Some(guid) = self.submit(&request).await? else {
                tracing::info!(address = %request.address, "Contract already verified");
                return Ok(());
            };

            tracing::debug!(guid = %guid, address = %request.address, "Verification submitted");
            self.wait_for_result(&guid).await?;

            tracing::info!(
                address = %request.address,
                contract = %request.artifact.contract_name,
                "Contract verified"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_states() {
        let pending: ApiResponse = serde_json::from_str(
            r#"{ "status": "0", "message": "NOTOK", "result": "Pending in queue" }"#,
        )
        .unwrap();
        assert!(!pending.is_ok());
        assert!(!pending.is_already_verified());

        let verified: ApiResponse = serde_json::from_str(
            r#"{ "status": "0", "message": "NOTOK", "result": "Contract source code already verified" }"#,
        )
        .unwrap();
        assert!(verified.is_already_verified());

        let passed: ApiResponse =
            serde_json::from_str(r#"{ "status": "1", "message": "OK", "result": "Pass - Verified" }"#)
                .unwrap();
        assert!(passed.is_ok());
    }

    #[test]
    fn test_endpoint_carries_chain_id() {
        let verifier = EtherscanVerifier::new(
            Url::parse("https://api.etherscan.io/v2/api").unwrap(),
            "key",
        )
        .with_chain_id(100);

        assert_eq!(
            verifier.endpoint().as_str(),
            "https://api.etherscan.io/v2/api?chainid=100"
        );
    }

    #[tokio::test]
    async fn test_verify_without_build_info_fails() {
        let verifier = EtherscanVerifier::new(Url::parse("http://127.0.0.1:1/api").unwrap(), "key");
        let artifact = Artifact::new("PermissionRegistry", Bytes::from_static(&[0x60]));
        let args = Bytes::new();

        let result = verifier
            .verify(VerificationRequest {
                address: Address::ZERO,
                artifact: &artifact,
                constructor_args: &args,
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("No build info"));
    }
}
