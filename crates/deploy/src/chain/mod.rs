//! Chain submission collaborator and transaction receipts.

mod rpc;

pub use rpc::RpcChainClient;

use alloy_core::primitives::{Address, B256, Bytes, U64, U256};
use alloy_sol_types::{SolCall, SolEvent};
use anyhow::Context;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{address::DETERMINISTIC_DEPLOYMENT_PROXY, step::DeployResult};

/// A contract creation handed to the chain.
#[derive(Debug, Clone, Copy)]
pub struct DeploySubmission<'a> {
    pub bytecode: &'a Bytes,
    pub constructor_args: &'a Bytes,
    pub from: Address,
    /// Routes the deployment through the deterministic deployment proxy.
    pub salt: Option<B256>,
}

impl DeploySubmission<'_> {
    pub fn init_code(&self) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(self.constructor_args);
        code.into()
    }
}

/// Transaction sent from an account unlocked on the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl TransactionRequest {
    /// Transaction calling `call` on `to`.
    pub fn call<C: SolCall>(from: Address, to: Address, call: &C) -> Self {
        Self {
            from,
            to: Some(to),
            data: call.abi_encode().into(),
            value: None,
        }
    }
}

/// Log entry of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// Pre-byzantium receipts carry no status and are treated as successful.
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|status| status == U64::from(1))
    }

    pub fn ensure_success(self) -> anyhow::Result<Self> {
        if !self.is_success() {
            anyhow::bail!("Transaction {} reverted", self.transaction_hash);
        }
        Ok(self)
    }

    /// Decode every log matching the event `E`.
    pub fn decode_logs<E: SolEvent>(&self) -> Vec<E> {
        self.logs
            .iter()
            .filter(|log| log.topics.first() == Some(&E::SIGNATURE_HASH))
            .filter_map(|log| E::decode_raw_log(log.topics.iter().copied(), &log.data, true).ok())
            .collect()
    }

    /// First `E` event emitted by `emitter`.
    pub fn find_event<E: SolEvent>(&self, emitter: Address) -> Option<E> {
        self.logs
            .iter()
            .filter(|log| log.address == emitter && log.topics.first() == Some(&E::SIGNATURE_HASH))
            .find_map(|log| E::decode_raw_log(log.topics.iter().copied(), &log.data, true).ok())
    }
}

/// Everything the executor and the steps need from a chain.
pub trait ChainClient: Send + Sync {
    /// Accounts exposed by the node, used to resolve named accounts.
    fn accounts(&self) -> BoxFuture<'_, anyhow::Result<Vec<Address>>>;

    /// Runtime code at `address`, empty when no contract lives there.
    fn code_at(&self, address: Address) -> BoxFuture<'_, anyhow::Result<Bytes>>;

    /// Deploy a contract and wait for its confirmation.
    fn deploy<'a>(
        &'a self,
        submission: DeploySubmission<'a>,
    ) -> BoxFuture<'a, anyhow::Result<DeployResult>>;

    /// Send a transaction and wait for its receipt.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> BoxFuture<'_, anyhow::Result<TransactionReceipt>>;

    /// Factory used for salted deployments.
    fn deterministic_deployer(&self) -> Address {
        DETERMINISTIC_DEPLOYMENT_PROXY
    }
}

/// Send `call` to `to` and fail if the transaction reverts.
pub async fn send_call<C: SolCall>(
    chain: &dyn ChainClient,
    from: Address,
    to: Address,
    call: &C,
) -> anyhow::Result<TransactionReceipt> {
    chain
        .send_transaction(TransactionRequest::call(from, to, call))
        .await
        .with_context(|| format!("Failed to call {} on {to}", C::SIGNATURE))?
        .ensure_success()
        .with_context(|| format!("Call {} on {to} reverted", C::SIGNATURE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;
    use alloy_sol_types::sol;

    sol! {
        event AddGuild(address guildAddress);
    }

    fn receipt_with_logs(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: B256::repeat_byte(0xab),
            block_number: Some(U64::from(7)),
            status: Some(U64::from(1)),
            contract_address: None,
            logs,
        }
    }

    #[test]
    fn test_receipt_parsing() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0xabababababababababababababababababababababababababababababababab",
            "blockNumber": "0x7",
            "status": "0x0",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "logs": [],
            "gasUsed": "0x5208"
        }))
        .unwrap();

        assert!(!receipt.is_success());
        assert_eq!(
            receipt.contract_address,
            Some(address!("5fbdb2315678afecb367f032d93f642f64180aa3"))
        );
        assert!(receipt.ensure_success().is_err());
    }

    #[test]
    fn test_decode_logs() {
        let registry = address!("5fbdb2315678afecb367f032d93f642f64180aa3");
        let guild = address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512");
        let event = AddGuild {
            guildAddress: guild,
        };
        let encoded = event.encode_log_data();

        let receipt = receipt_with_logs(vec![
            Log {
                address: registry,
                topics: vec![B256::repeat_byte(0x01)],
                data: Bytes::new(),
            },
            Log {
                address: registry,
                topics: encoded.topics().to_vec(),
                data: encoded.data.clone(),
            },
        ]);

        let decoded = receipt.decode_logs::<AddGuild>();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].guildAddress, guild);

        assert_eq!(
            receipt.find_event::<AddGuild>(registry).map(|e| e.guildAddress),
            Some(guild)
        );
        assert!(receipt.find_event::<AddGuild>(guild).is_none());
    }

    #[test]
    fn test_transaction_request_serialization() {
        let tx = TransactionRequest {
            from: address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
            to: None,
            data: Bytes::from_static(&[0x60, 0x80]),
            value: None,
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["data"], "0x6080");
        assert!(json.get("to").is_none());
        assert!(json.get("value").is_none());
    }
}
