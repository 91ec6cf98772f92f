use alloy_core::primitives::{Address, B256, U256, keccak256};
use futures::future::BoxFuture;

use super::{
    GUILD_ARTIFACT, GuildConfig, GuildStep, REP_TOKEN_ARTIFACT,
    abi::{IERC20SnapshotRep, IGuildRegistry, IInitializable, IPermissionRegistry, ISnapshotRepERC20Guild},
};
use crate::{
    chain::{ChainClient, send_call},
    step::{DeployRequest, DeployResult, DeployStep, StepContext},
};

/// Salt of one step: the invocation salt mixed with the step name.
///
/// Several steps deploy the same artifact without constructor arguments, so sharing the
/// raw salt would make them collide on a single address.
pub fn scoped_salt(salt: Option<B256>, scope: &str) -> Option<B256> {
    salt.map(|salt| {
        let mut preimage = salt.to_vec();
        preimage.extend_from_slice(scope.as_bytes());
        keccak256(preimage)
    })
}

fn request(ctx: &StepContext<'_>, step: GuildStep, artifact: &str) -> anyhow::Result<DeployRequest> {
    Ok(DeployRequest::new(ctx.artifact(artifact)?).salt(scoped_salt(ctx.salt()?, step.as_ref())))
}

fn deployer(ctx: &StepContext<'_>) -> anyhow::Result<Address> {
    ctx.account(DeployRequest::DEFAULT_SENDER)
}

/// Permission and guild registries: deployed, then initialized.
#[derive(Debug, Clone)]
pub struct RegistryStep {
    step: GuildStep,
    artifact: &'static str,
}

impl RegistryStep {
    pub fn new(step: GuildStep, artifact: &'static str) -> Self {
        Self { step, artifact }
    }
}

impl DeployStep for RegistryStep {
    fn prepare(&self, ctx: &StepContext<'_>) -> anyhow::Result<DeployRequest> {
        request(ctx, self.step, self.artifact)
    }

    fn after_deploy<'a>(
        &'a self,
        ctx: &'a StepContext<'a>,
        deployed: &'a DeployResult,
        chain: &'a dyn ChainClient,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            send_call(
                chain,
                deployer(ctx)?,
                deployed.address,
                &IInitializable::initializeCall {},
            )
            .await?;

            tracing::info!(contract = %self.artifact, address = %deployed.address, "Registry initialized");
            Ok(())
        })
    }
}

/// Reputation token of a guild, minted to the configured holders.
#[derive(Debug, Clone)]
pub struct RepTokenStep {
    step: GuildStep,
    config: GuildConfig,
}

impl RepTokenStep {
    pub fn new(step: GuildStep, config: GuildConfig) -> Self {
        Self { step, config }
    }
}

impl DeployStep for RepTokenStep {
    fn prepare(&self, ctx: &StepContext<'_>) -> anyhow::Result<DeployRequest> {
        request(ctx, self.step, REP_TOKEN_ARTIFACT)
    }

    fn after_deploy<'a>(
        &'a self,
        ctx: &'a StepContext<'a>,
        deployed: &'a DeployResult,
        chain: &'a dyn ChainClient,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let from = deployer(ctx)?;
            let token = deployed.address;

            send_call(
                chain,
                from,
                token,
                &IERC20SnapshotRep::initializeCall {
                    name: self.config.token_name.clone(),
                    symbol: self.config.token_symbol.clone(),
                },
            )
            .await?;

            for holder in &self.config.holders {
                let account = ctx.resolve_account(&holder.account)?;
                send_call(
                    chain,
                    from,
                    token,
                    &IERC20SnapshotRep::mintCall {
                        account,
                        amount: U256::from(holder.amount),
                    },
                )
                .await?;
                tracing::debug!(holder = %account, amount = holder.amount, "Reputation minted");
            }

            tracing::info!(
                symbol = %self.config.token_symbol,
                holders = self.config.holders.len(),
                "Reputation token initialized"
            );
            Ok(())
        })
    }
}

/// A reputation guild, wired into the registries and handed its token.
#[derive(Debug, Clone)]
pub struct GuildDeployStep {
    step: GuildStep,
    token: GuildStep,
    config: GuildConfig,
    eth_permission_delay: u64,
}

impl GuildDeployStep {
    pub fn new(
        step: GuildStep,
        token: GuildStep,
        config: GuildConfig,
        eth_permission_delay: u64,
    ) -> Self {
        Self {
            step,
            token,
            config,
            eth_permission_delay,
        }
    }
}

impl DeployStep for GuildDeployStep {
    fn prepare(&self, ctx: &StepContext<'_>) -> anyhow::Result<DeployRequest> {
        request(ctx, self.step, GUILD_ARTIFACT)
    }

    fn after_deploy<'a>(
        &'a self,
        ctx: &'a StepContext<'a>,
        deployed: &'a DeployResult,
        chain: &'a dyn ChainClient,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let from = deployer(ctx)?;
            let guild = deployed.address;
            let token = ctx.address_of(self.token)?;
            let permission_registry = ctx.address_of(GuildStep::PermissionRegistry)?;
            let guild_registry = ctx.address_of(GuildStep::GuildRegistry)?;
            let config = &self.config;

            send_call(
                chain,
                from,
                guild,
                &ISnapshotRepERC20Guild::initializeCall {
                    token,
                    proposalTime: U256::from(config.proposal_time),
                    timeForExecution: U256::from(config.time_for_execution),
                    votingPowerPercentageForProposalExecution: U256::from(
                        config.voting_power_for_proposal_execution,
                    ),
                    votingPowerPercentageForProposalCreation: U256::from(
                        config.voting_power_for_proposal_creation,
                    ),
                    name: config.name.clone(),
                    voteGas: U256::from(config.vote_gas),
                    maxGasPrice: U256::from(config.max_gas_price),
                    maxActiveProposals: U256::from(config.max_active_proposals),
                    lockTime: U256::from(config.lock_time),
                    permissionRegistry: permission_registry,
                },
            )
            .await?;

            send_call(
                chain,
                from,
                permission_registry,
                &IPermissionRegistry::setETHPermissionDelayCall {
                    from: guild,
                    delayTime: U256::from(self.eth_permission_delay),
                },
            )
            .await?;

            let receipt = send_call(
                chain,
                from,
                guild_registry,
                &IGuildRegistry::addGuildCall {
                    guildAddress: guild,
                },
            )
            .await?;

            if let Some(event) = receipt.find_event::<IGuildRegistry::AddGuild>(guild_registry) {
                if event.guildAddress != guild {
                    anyhow::bail!(
                        "GuildRegistry registered {} instead of {guild}",
                        event.guildAddress
                    );
                }
            }

            send_call(
                chain,
                from,
                token,
                &IERC20SnapshotRep::transferOwnershipCall { newOwner: guild },
            )
            .await?;

            tracing::info!(guild = %config.name, address = %guild, "Guild initialized and registered");
            Ok(())
        })
    }
}
