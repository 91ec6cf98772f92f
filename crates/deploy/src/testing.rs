//! In-memory chain and generic steps for tests and dry runs.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_core::primitives::{Address, B256, Bytes, U64, keccak256};
use futures::future::BoxFuture;

use crate::{
    address::{DETERMINISTIC_DEPLOYMENT_PROXY, create_address, derive_address},
    chain::{ChainClient, DeploySubmission, Log, TransactionReceipt, TransactionRequest},
    step::{DeployRequest, DeployResult, DeployStep, StepContext},
};

/// A deployment received by [`MockChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDeployment {
    pub from: Address,
    pub init_code: Bytes,
    pub salt: Option<B256>,
    pub address: Address,
}

#[derive(Debug, Default)]
struct MockState {
    code: HashMap<Address, Bytes>,
    nonces: HashMap<Address, u64>,
    deployments: Vec<RecordedDeployment>,
    transactions: Vec<TransactionRequest>,
    failing_bytecode: HashSet<Bytes>,
    receipt_logs: Vec<Log>,
    tx_counter: u64,
}

impl MockState {
    fn next_tx_hash(&mut self) -> B256 {
        self.tx_counter += 1;
        keccak256(self.tx_counter.to_be_bytes())
    }

    fn bump_nonce(&mut self, sender: Address) -> u64 {
        let nonce = self.nonces.entry(sender).or_default();
        let current = *nonce;
        *nonce += 1;
        current
    }
}

/// Chain keeping contract code in memory.
///
/// Unsalted deployments land on the CREATE address of the sender's nonce, salted ones
/// on the CREATE2 address of the deterministic deployment proxy, like on a node.
#[derive(Debug)]
pub struct MockChain {
    accounts: Vec<Address>,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            accounts,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every deployment whose bytecode starts with `bytecode` revert.
    pub fn fail_deployments_of(&self, bytecode: impl Into<Bytes>) {
        self.state().failing_bytecode.insert(bytecode.into());
    }

    /// Logs attached to every subsequent transaction receipt.
    pub fn set_receipt_logs(&self, logs: Vec<Log>) {
        self.state().receipt_logs = logs;
    }

    /// Pretend a contract already lives at `address`.
    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.state().code.insert(address, code.into());
    }

    pub fn deployments(&self) -> Vec<RecordedDeployment> {
        self.state().deployments.clone()
    }

    pub fn transactions(&self) -> Vec<TransactionRequest> {
        self.state().transactions.clone()
    }

    fn deploy_now(&self, submission: DeploySubmission<'_>) -> anyhow::Result<DeployResult> {
        let init_code = submission.init_code();
        let mut state = self.state();

        if state
            .failing_bytecode
            .iter()
            .any(|failing| init_code.starts_with(failing))
        {
            anyhow::bail!("execution reverted");
        }

        let address = match submission.salt {
            Some(salt) => {
                let address =
                    derive_address(DETERMINISTIC_DEPLOYMENT_PROXY, keccak256(&init_code), salt);
                if state.code.contains_key(&address) {
                    anyhow::bail!("execution reverted: create2 collision at {address}");
                }
                state.bump_nonce(submission.from);
                address
            }
            None => create_address(submission.from, state.bump_nonce(submission.from)),
        };

        state.code.insert(address, init_code.clone());
        state.deployments.push(RecordedDeployment {
            from: submission.from,
            init_code,
            salt: submission.salt,
            address,
        });

        Ok(DeployResult {
            address,
            newly_deployed: true,
            transaction_hash: Some(state.next_tx_hash()),
        })
    }

    fn send_now(&self, tx: TransactionRequest) -> anyhow::Result<TransactionReceipt> {
        let mut state = self.state();

        if let Some(to) = tx.to {
            if !state.code.contains_key(&to) {
                anyhow::bail!("no contract at {to}");
            }
        }

        state.bump_nonce(tx.from);
        state.transactions.push(tx);

        Ok(TransactionReceipt {
            transaction_hash: state.next_tx_hash(),
            block_number: Some(U64::from(state.tx_counter)),
            status: Some(U64::from(1)),
            contract_address: None,
            logs: state.receipt_logs.clone(),
        })
    }
}

impl ChainClient for MockChain {
    fn accounts(&self) -> BoxFuture<'_, anyhow::Result<Vec<Address>>> {
        Box::pin(async move { Ok(self.accounts.clone()) })
    }

    fn code_at(&self, address: Address) -> BoxFuture<'_, anyhow::Result<Bytes>> {
        Box::pin(async move { Ok(self.state().code.get(&address).cloned().unwrap_or_default()) })
    }

    fn deploy<'a>(
        &'a self,
        submission: DeploySubmission<'a>,
    ) -> BoxFuture<'a, anyhow::Result<DeployResult>> {
        Box::pin(async move { self.deploy_now(submission) })
    }

    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> BoxFuture<'_, anyhow::Result<TransactionReceipt>> {
        Box::pin(async move { self.send_now(tx) })
    }
}

/// Step deploying an artifact with fixed constructor arguments and the context salt.
#[derive(Debug, Clone)]
pub struct ArtifactStep {
    artifact: String,
    constructor_args: Bytes,
    from: Option<String>,
}

impl ArtifactStep {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            constructor_args: Bytes::new(),
            from: None,
        }
    }

    pub fn constructor_args(mut self, args: impl Into<Bytes>) -> Self {
        self.constructor_args = args.into();
        self
    }

    pub fn from_account(mut self, role: impl Into<String>) -> Self {
        self.from = Some(role.into());
        self
    }
}

impl DeployStep for ArtifactStep {
    fn prepare(&self, ctx: &StepContext<'_>) -> anyhow::Result<DeployRequest> {
        let mut request = DeployRequest::new(ctx.artifact(&self.artifact)?)
            .constructor_args(self.constructor_args.clone())
            .salt(ctx.salt()?);
        if let Some(from) = &self.from {
            request = request.from_account(from.clone());
        }
        Ok(request)
    }
}
