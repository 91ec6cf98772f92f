//! Sequential execution of resolved steps.

use alloy_core::primitives::B256;
use anyhow::Context;
use tracing::Instrument;

use crate::{
    address::derive_address,
    chain::{ChainClient, DeploySubmission},
    context::ExecutionContext,
    error::DeployError,
    record::{DeploymentRecord, RecordStore},
    step::{DeployRequest, DeployResult, Deployments, Step, StepContext},
    verify::{VerificationRequest, Verifier},
};

/// Runs steps against a chain, reusing what the record store already knows.
pub struct Executor<'a, S> {
    store: S,
    chain: &'a dyn ChainClient,
    verifier: Option<&'a dyn Verifier>,
}

impl<'a, S: RecordStore> Executor<'a, S> {
    pub fn new(store: S, chain: &'a dyn ChainClient) -> Self {
        Self {
            store,
            chain,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: &'a dyn Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Execute `steps` in order.
    ///
    /// The first failing step aborts the run: later steps are not attempted and nothing
    /// already confirmed is rolled back.
    pub async fn run(
        &mut self,
        steps: &[&Step],
        exec: &ExecutionContext,
    ) -> Result<Deployments, DeployError> {
        let mut deployed = Deployments::default();

        for step in steps {
            let name = step.name();
            let span = tracing::info_span!("step", step = %name);

            let (request, result) = self
                .execute(step, exec, &deployed)
                .instrument(span.clone())
                .await
                .map_err(|cause| DeployError::step_failed(name, cause))?;

            if result.newly_deployed {
                self.verify(step, exec, &request, &result)
                    .instrument(span)
                    .await;
            }

            deployed.insert(name.clone(), result);
        }

        Ok(deployed)
    }

    async fn execute(
        &mut self,
        step: &Step,
        exec: &ExecutionContext,
        deployed: &Deployments,
    ) -> anyhow::Result<(DeployRequest, DeployResult)> {
        let name = step.name();
        let ctx = StepContext::new(exec, deployed);

        let request = step
            .run()
            .prepare(&ctx)
            .context("Failed to prepare deployment")?;
        let bytecode_hash = request.init_code_hash();

        if let Some(record) = self.store.get(&exec.network_name, name)? {
            if record.matches(&bytecode_hash, request.salt.as_ref()) {
                if !record.hook_pending {
                    tracing::info!(address = %record.address, "Reusing recorded deployment");
                    return Ok((request, record.reused()));
                }

                tracing::info!(
                    address = %record.address,
                    "Resuming post-deploy hook of an earlier deployment"
                );
                let result = record.resumed();
                self.complete(step, &ctx, exec, &request, bytecode_hash, &result)
                    .await?;
                return Ok((request, result));
            }
            tracing::info!(
                previous = %record.address,
                "Bytecode, constructor arguments or salt changed, redeploying"
            );
        }

        let from = ctx
            .resolve_account(&request.from)
            .with_context(|| format!("Failed to resolve deployer account '{}'", request.from))?;

        // Without any record the previous deployer is unknown: code at the salted address
        // is taken as fully set up.
        if let Some(salt) = request.salt {
            let address = derive_address(self.chain.deterministic_deployer(), bytecode_hash, salt);
            if !self.chain.code_at(address).await?.is_empty() {
                tracing::info!(address = %address, "Contract already present at the deterministic address");
                let result = DeployResult {
                    address,
                    newly_deployed: false,
                    transaction_hash: None,
                };
                self.store
                    .put(record_for(step, exec, &request, bytecode_hash, &result))?;
                return Ok((request, result));
            }
        }

        let result = self
            .chain
            .deploy(DeploySubmission {
                bytecode: &request.bytecode,
                constructor_args: &request.constructor_args,
                from,
                salt: request.salt,
            })
            .await
            .with_context(|| format!("Failed to deploy {}", request.contract))?;

        tracing::info!(
            contract = %request.contract,
            address = %result.address,
            deterministic = request.salt.is_some(),
            "Contract deployed"
        );

        let mut pending = record_for(step, exec, &request, bytecode_hash, &result);
        pending.hook_pending = true;
        self.store.put(pending)?;

        self.complete(step, &ctx, exec, &request, bytecode_hash, &result)
            .await?;

        Ok((request, result))
    }

    /// Run the post-deploy hook of a confirmed deployment, then mark its record complete.
    async fn complete(
        &mut self,
        step: &Step,
        ctx: &StepContext<'_>,
        exec: &ExecutionContext,
        request: &DeployRequest,
        bytecode_hash: B256,
        result: &DeployResult,
    ) -> anyhow::Result<()> {
        step.run()
            .after_deploy(ctx, result, self.chain)
            .await
            .context("Post-deploy hook failed")?;

        self.store
            .put(record_for(step, exec, request, bytecode_hash, result))
    }

    async fn verify(
        &self,
        step: &Step,
        exec: &ExecutionContext,
        request: &DeployRequest,
        result: &DeployResult,
    ) {
        let Some(verifier) = self.verifier else {
            return;
        };

        let outcome = match exec.artifacts.get(&request.contract) {
            Ok(artifact) => {
                verifier
                    .verify(VerificationRequest {
                        address: result.address,
                        artifact,
                        constructor_args: &request.constructor_args,
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(cause) = outcome {
            let err = DeployError::VerificationFailed {
                step: step.name().clone(),
                cause,
            };
            tracing::warn!(error = %err, "Verification skipped");
        }
    }
}

fn record_for(
    step: &Step,
    exec: &ExecutionContext,
    request: &DeployRequest,
    bytecode_hash: B256,
    result: &DeployResult,
) -> DeploymentRecord {
    DeploymentRecord {
        step_name: step.name().clone(),
        network_id: exec.network_name.clone(),
        contract_name: request.contract.clone(),
        address: result.address,
        bytecode_hash,
        salt: request.salt,
        transaction_hash: result.transaction_hash,
        deployed_at: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
        hook_pending: false,
    }
}
