//! JSON-RPC chain client for nodes with unlocked accounts (anvil, hardhat, ganache).

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64, keccak256};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use super::{ChainClient, DeploySubmission, TransactionReceipt, TransactionRequest};
use crate::{
    address::{DETERMINISTIC_DEPLOYMENT_PROXY, derive_address, deterministic_calldata},
    step::DeployResult,
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of receipt polls before giving up.
const DEFAULT_MAX_POLLS: usize = 240;

/// Chain client talking JSON-RPC to a development node.
///
/// Transactions are sent with `eth_sendTransaction`, so every sender must be unlocked
/// on the node. Signing is left to the node.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    deterministic_proxy: Address,
    poll_interval: Duration,
    max_polls: usize,
}

impl RpcChainClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            deterministic_proxy: DETERMINISTIC_DEPLOYMENT_PROXY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    pub fn with_deterministic_proxy(mut self, proxy: Address) -> Self {
        self.deterministic_proxy = proxy;
        self
    }

    /// Receipt polling policy: wait `interval` between polls, at most `max_polls` times.
    pub fn with_receipt_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Single JSON-RPC request. Node errors surface with their message.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> anyhow::Result<T> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let mut response: Value = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("{method} request to {} failed", self.url))?
            .json()
            .await
            .with_context(|| format!("Invalid {method} response"))?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("{method} returned an error: {message}");
        }

        let result = response
            .get_mut("result")
            .map(Value::take)
            .with_context(|| format!("{method} response carries no result"))?;
        serde_json::from_value(result).with_context(|| format!("Unexpected {method} result"))
    }

    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        let id: U64 = self.call("eth_chainId", vec![]).await?;
        Ok(id.to::<u64>())
    }

    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        self.call("eth_getCode", vec![json!(address), json!("latest")])
            .await
            .with_context(|| format!("Failed to fetch code at {address}"))
    }

    async fn submit(&self, tx: TransactionRequest) -> anyhow::Result<TransactionReceipt> {
        let from = tx.from;
        let hash: B256 = self
            .call("eth_sendTransaction", vec![json!(tx)])
            .await
            .context("Failed to send transaction")?;

        tracing::debug!(tx_hash = %hash, from = %from, "Transaction sent");

        self.wait_for_receipt(hash).await
    }

    async fn wait_for_receipt(&self, hash: B256) -> anyhow::Result<TransactionReceipt> {
        let fetch = || async move {
            let receipt: Option<TransactionReceipt> = self
                .call("eth_getTransactionReceipt", vec![json!(hash)])
                .await?;
            receipt.with_context(|| format!("Transaction {hash} is not mined yet"))
        };

        fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_polls),
            )
            .notify(|err: &anyhow::Error, _| {
                tracing::trace!(error = %err, "Waiting for transaction receipt...");
            })
            .await
            .with_context(|| format!("Timeout waiting for receipt of {hash}"))
    }

    async fn deploy_deterministic(
        &self,
        submission: DeploySubmission<'_>,
        salt: B256,
    ) -> anyhow::Result<DeployResult> {
        let init_code = submission.init_code();
        let expected = derive_address(self.deterministic_proxy, keccak256(&init_code), salt);

        if self.get_code(self.deterministic_proxy).await?.is_empty() {
            anyhow::bail!(
                "Deterministic deployment proxy {} is not deployed on this network",
                self.deterministic_proxy
            );
        }

        let receipt = self
            .submit(TransactionRequest {
                from: submission.from,
                to: Some(self.deterministic_proxy),
                data: deterministic_calldata(salt, &init_code),
                value: None,
            })
            .await?
            .ensure_success()?;

        if self.get_code(expected).await?.is_empty() {
            anyhow::bail!("Deterministic deployment left no code at {expected}");
        }

        Ok(DeployResult {
            address: expected,
            newly_deployed: true,
            transaction_hash: Some(receipt.transaction_hash),
        })
    }

    async fn deploy_with_nonce(&self, submission: DeploySubmission<'_>) -> anyhow::Result<DeployResult> {
        let receipt = self
            .submit(TransactionRequest {
                from: submission.from,
                to: None,
                data: submission.init_code(),
                value: None,
            })
            .await?
            .ensure_success()?;

        let address = receipt
            .contract_address
            .context("Receipt of a contract creation carries no contract address")?;

        Ok(DeployResult {
            address,
            newly_deployed: true,
            transaction_hash: Some(receipt.transaction_hash),
        })
    }
}

impl ChainClient for RpcChainClient {
    fn accounts(&self) -> BoxFuture<'_, anyhow::Result<Vec<Address>>> {
        Box::pin(async move {
            self.call("eth_accounts", vec![])
                .await
                .context("Failed to list node accounts")
        })
    }

    fn code_at(&self, address: Address) -> BoxFuture<'_, anyhow::Result<Bytes>> {
        Box::pin(self.get_code(address))
    }

    fn deploy<'a>(
        &'a self,
        submission: DeploySubmission<'a>,
    ) -> BoxFuture<'a, anyhow::Result<DeployResult>> {
        Box::pin(async move {
            match submission.salt {
                Some(salt) => self.deploy_deterministic(submission, salt).await,
                None => self.deploy_with_nonce(submission).await,
            }
        })
    }

    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> BoxFuture<'_, anyhow::Result<TransactionReceipt>> {
        Box::pin(self.submit(tx))
    }

    fn deterministic_deployer(&self) -> Address {
        self.deterministic_proxy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_node() {
        let client = RpcChainClient::new(Url::parse("http://127.0.0.1:1").unwrap()).unwrap();

        let err = client.accounts().await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to list node accounts"));
        assert_eq!(client.deterministic_deployer(), DETERMINISTIC_DEPLOYMENT_PROXY);
    }

    #[test]
    fn test_custom_proxy() {
        let proxy = Address::repeat_byte(0x42);
        let client = RpcChainClient::new(Url::parse("http://127.0.0.1:8545").unwrap())
            .unwrap()
            .with_deterministic_proxy(proxy);
        assert_eq!(client.deterministic_deployer(), proxy);
        assert_eq!(client.url().port(), Some(8545));
    }
}
