//! Tags in, deployments out.

use std::collections::BTreeMap;

use crate::{
    artifacts::Artifacts,
    chain::ChainClient,
    context::{AccountRef, DEPLOY_SALT_KEY, EnvConfig, ExecutionContext, NamedAccounts},
    error::DeployError,
    executor::Executor,
    record::RecordStore,
    registry::StepRegistry,
    resolver::resolve,
    step::{DeployRequest, Deployments, Tag},
    verify::Verifier,
};

/// Options of a single fixture run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureOptions {
    /// Select every registered step when no step carries one of the requested tags.
    pub fallback_to_global: bool,
    /// Deployment salt for this run, overriding the configured one.
    pub salt: Option<String>,
}

impl FixtureOptions {
    pub fn fallback_to_global(mut self, fallback: bool) -> Self {
        self.fallback_to_global = fallback;
        self
    }

    pub fn salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }
}

/// Resolves tags against a registry and executes the result.
///
/// Every run builds a fresh [`ExecutionContext`]: node accounts are queried once and
/// mapped to the configured named accounts.
pub struct FixtureRunner<'a, S> {
    registry: &'a StepRegistry,
    chain: &'a dyn ChainClient,
    store: S,
    verifier: Option<&'a dyn Verifier>,
    network_name: String,
    named_accounts: BTreeMap<String, AccountRef>,
    env: EnvConfig,
    artifacts: Artifacts,
}

impl<'a, S: RecordStore> FixtureRunner<'a, S> {
    pub fn new(registry: &'a StepRegistry, chain: &'a dyn ChainClient, store: S) -> Self {
        Self {
            registry,
            chain,
            store,
            verifier: None,
            network_name: "localhost".to_string(),
            named_accounts: BTreeMap::from([(
                DeployRequest::DEFAULT_SENDER.to_string(),
                AccountRef::Index(0),
            )]),
            env: EnvConfig::default(),
            artifacts: Artifacts::default(),
        }
    }

    pub fn network_name(mut self, name: impl Into<String>) -> Self {
        self.network_name = name.into();
        self
    }

    /// Replace the named account configuration.
    pub fn named_accounts(mut self, accounts: BTreeMap<String, AccountRef>) -> Self {
        self.named_accounts = accounts;
        self
    }

    pub fn env(mut self, env: EnvConfig) -> Self {
        self.env = env;
        self
    }

    pub fn artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn verifier(mut self, verifier: &'a dyn Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn context(&self, options: &FixtureOptions) -> Result<ExecutionContext, DeployError> {
        let available = self
            .chain
            .accounts()
            .await
            .map_err(DeployError::ContextUnavailable)?;
        let named_accounts = NamedAccounts::resolve(&self.named_accounts, &available)
            .map_err(DeployError::ContextUnavailable)?;

        let mut env = self.env.clone();
        if let Some(salt) = &options.salt {
            env = env.with(DEPLOY_SALT_KEY, salt.clone());
        }

        Ok(ExecutionContext {
            network_name: self.network_name.clone(),
            named_accounts,
            env,
            artifacts: self.artifacts.clone(),
        })
    }

    /// Resolve `tags` and execute the resulting steps.
    pub async fn run_fixture(
        &mut self,
        tags: &[&str],
        options: &FixtureOptions,
    ) -> Result<Deployments, DeployError> {
        let tags: Vec<Tag> = tags.iter().copied().map(Tag::from).collect();
        let steps = resolve(self.registry, &tags, options.fallback_to_global)?;
        if steps.is_empty() {
            tracing::info!(tags = ?tags, "No step matches the requested tags");
            return Ok(Deployments::default());
        }

        let exec = self.context(options).await?;

        tracing::info!(
            network = %exec.network_name,
            steps = steps.len(),
            "Running deployment fixture"
        );

        let mut executor = Executor::new(&mut self.store, self.chain);
        if let Some(verifier) = self.verifier {
            executor = executor.with_verifier(verifier);
        }

        executor.run(&steps, &exec).await
    }
}
