//! Deployment steps and the values they produce.

use std::{collections::BTreeMap, collections::BTreeSet, fmt, sync::Arc};

use alloy_core::primitives::{Address, B256, Bytes, keccak256};
use anyhow::Context;
use derive_more::{Deref, Display, From};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    address::parse_salt,
    artifacts::Artifact,
    chain::ChainClient,
    context::{ExecutionContext, DEPLOY_SALT_KEY},
};

/// Unique name of a registered step.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Label used to select steps in bulk.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// Outcome of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub address: Address,
    /// False when the executor reused a recorded or already present deployment.
    pub newly_deployed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
}

/// Results of the steps executed so far in one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct Deployments(BTreeMap<StepName, DeployResult>);

impl Deployments {
    pub(crate) fn insert(&mut self, name: StepName, result: DeployResult) {
        self.0.insert(name, result);
    }

    /// Address of an already executed step.
    pub fn address_of(&self, step: impl Into<StepName>) -> anyhow::Result<Address> {
        let step = step.into();
        self.0
            .get(&step)
            .map(|result| result.address)
            .with_context(|| format!("Step '{step}' has not been deployed in this invocation"))
    }

    pub fn into_inner(self) -> BTreeMap<StepName, DeployResult> {
        self.0
    }
}

/// What a step wants deployed.
///
/// The executor hashes `bytecode ‖ constructor_args` to decide whether an existing
/// record can be reused, so a request must be built without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Artifact name, used for verification and recorded alongside the address.
    pub contract: String,
    pub bytecode: Bytes,
    pub constructor_args: Bytes,
    /// Named account sending the deployment.
    pub from: String,
    /// Deterministic deployment salt. `None` falls back to nonce based addressing.
    pub salt: Option<B256>,
}

impl DeployRequest {
    /// Named account used when a request does not pick one.
    pub const DEFAULT_SENDER: &'static str = "deployer";

    pub fn new(artifact: &Artifact) -> Self {
        Self {
            contract: artifact.contract_name.clone(),
            bytecode: artifact.bytecode.clone(),
            constructor_args: Bytes::new(),
            from: Self::DEFAULT_SENDER.to_string(),
            salt: None,
        }
    }

    /// ABI-encoded constructor arguments, appended to the bytecode.
    pub fn constructor_args(mut self, args: impl Into<Bytes>) -> Self {
        self.constructor_args = args.into();
        self
    }

    pub fn from_account(mut self, role: impl Into<String>) -> Self {
        self.from = role.into();
        self
    }

    pub fn salt(mut self, salt: Option<B256>) -> Self {
        self.salt = salt;
        self
    }

    pub fn init_code(&self) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&self.constructor_args);
        code.into()
    }

    pub fn init_code_hash(&self) -> B256 {
        keccak256(self.init_code())
    }
}

/// Read-only view handed to a step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub exec: &'a ExecutionContext,
    pub deployed: &'a Deployments,
}

impl<'a> StepContext<'a> {
    pub fn new(exec: &'a ExecutionContext, deployed: &'a Deployments) -> Self {
        Self { exec, deployed }
    }

    pub fn artifact(&self, name: &str) -> anyhow::Result<&'a Artifact> {
        self.exec.artifacts.get(name)
    }

    /// Address of a named account.
    pub fn account(&self, role: &str) -> anyhow::Result<Address> {
        self.exec.named_accounts.get(role)
    }

    /// Resolves either a literal address or a named account.
    pub fn resolve_account(&self, account: &str) -> anyhow::Result<Address> {
        match account.parse::<Address>() {
            Ok(address) => Ok(address),
            Err(_) => self.account(account),
        }
    }

    /// Deployment salt configured for this invocation.
    pub fn salt(&self) -> anyhow::Result<Option<B256>> {
        match self.exec.env.get(DEPLOY_SALT_KEY) {
            Some(raw) => parse_salt(raw),
            None => Ok(None),
        }
    }

    pub fn address_of(&self, step: impl Into<StepName>) -> anyhow::Result<Address> {
        self.deployed.address_of(step)
    }
}

/// The work behind a registered step.
pub trait DeployStep: Send + Sync {
    /// Describes the contract to deploy.
    fn prepare(&self, ctx: &StepContext<'_>) -> anyhow::Result<DeployRequest>;

    /// Runs once a contract has been newly deployed, e.g. to initialize it or to wire it
    /// into contracts deployed by earlier steps. Skipped when a deployment is reused.
    fn after_deploy<'a>(
        &'a self,
        _ctx: &'a StepContext<'a>,
        _deployed: &'a DeployResult,
        _chain: &'a dyn ChainClient,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// A named deployment step with its tags and dependencies.
#[derive(Clone)]
pub struct Step {
    name: StepName,
    tags: BTreeSet<Tag>,
    dependencies: Vec<StepName>,
    run: Arc<dyn DeployStep>,
}

impl Step {
    pub fn new(name: impl Into<StepName>, run: impl DeployStep + 'static) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            run: Arc::new(run),
        }
    }

    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn depends_on(mut self, step: impl Into<StepName>) -> Self {
        let step = step.into();
        if !self.dependencies.contains(&step) {
            self.dependencies.push(step);
        }
        self
    }

    pub fn name(&self) -> &StepName {
        &self.name
    }

    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    pub fn dependencies(&self) -> &[StepName] {
        &self.dependencies
    }

    pub fn run(&self) -> &dyn DeployStep {
        self.run.as_ref()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
