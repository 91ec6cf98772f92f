//! The DXdao guild suite.
//!
//! Deploys the permission registry, the guild registry and two reputation guilds, each
//! backed by its own snapshot reputation token. Guild contracts are upgradeable, so they
//! are deployed without constructor arguments and initialized right after deployment.

pub mod abi;
mod steps;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use steps::{GuildDeployStep, RegistryStep, RepTokenStep, scoped_salt};

use crate::{
    error::DeployError,
    fixture::{FixtureOptions, FixtureRunner},
    record::RecordStore,
    registry::StepRegistry,
    step::{DeployRequest, Deployments, Step, StepName, Tag},
};

/// Tags requested by both guild entry points.
pub const GUILD_TAGS: [&str; 4] = [
    "PermissionRegistry",
    "GuildRegistry",
    "DXdaoDevOpsGuild",
    "DXdaoTreasuryGuild",
];

/// Salt used by development deployments.
pub const DEV_DEPLOY_SALT: &str = "dxdao-guilds-dev";

pub const PERMISSION_REGISTRY_ARTIFACT: &str = "PermissionRegistry";
pub const GUILD_REGISTRY_ARTIFACT: &str = "GuildRegistry";
pub const REP_TOKEN_ARTIFACT: &str = "ERC20SnapshotRep";
pub const GUILD_ARTIFACT: &str = "SnapshotRepERC20Guild";

/// Steps of the guild suite, in registration order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum GuildStep {
    PermissionRegistry,
    GuildRegistry,
    DXdaoDevOpsRepToken,
    DXdaoDevOpsGuild,
    DXdaoTreasuryRepToken,
    DXdaoTreasuryGuild,
}

impl From<GuildStep> for StepName {
    fn from(step: GuildStep) -> Self {
        StepName::from(step.as_ref())
    }
}

impl From<GuildStep> for Tag {
    fn from(step: GuildStep) -> Self {
        Tag::from(step.as_ref())
    }
}

/// Reputation minted to an account when a guild token is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepHolder {
    /// Named account or literal address.
    pub account: String,
    pub amount: u64,
}

/// Parameters of one reputation guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub name: String,
    pub token_name: String,
    pub token_symbol: String,
    /// Seconds a proposal stays open for votes.
    pub proposal_time: u64,
    /// Seconds a passed proposal can be executed for.
    pub time_for_execution: u64,
    /// Basis points of the voting power needed to execute a proposal.
    pub voting_power_for_proposal_execution: u64,
    /// Basis points of the voting power needed to create a proposal.
    pub voting_power_for_proposal_creation: u64,
    pub vote_gas: u64,
    pub max_gas_price: u64,
    pub max_active_proposals: u64,
    /// Seconds voting power stays locked.
    pub lock_time: u64,
    #[serde(default)]
    pub holders: Vec<RepHolder>,
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl GuildConfig {
    fn standard(name: &str, token_name: &str, token_symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            token_name: token_name.to_string(),
            token_symbol: token_symbol.to_string(),
            proposal_time: (3 * DAY).as_secs(),
            time_for_execution: DAY.as_secs(),
            voting_power_for_proposal_execution: 4000,
            voting_power_for_proposal_creation: 200,
            vote_gas: 0,
            max_gas_price: 0,
            max_active_proposals: 5,
            lock_time: (7 * DAY).as_secs(),
            holders: vec![RepHolder {
                account: DeployRequest::DEFAULT_SENDER.to_string(),
                amount: 100,
            }],
        }
    }

    pub fn dev_ops() -> Self {
        Self::standard(
            "DXdao DevOps Guild",
            "DXdao DevOps Reputation Token",
            "DREP",
        )
    }

    pub fn treasury() -> Self {
        Self::standard(
            "DXdao Treasury Guild",
            "DXdao Treasury Reputation Token",
            "TREP",
        )
    }
}

/// Parameters of the whole suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSuiteConfig {
    pub dev_ops: GuildConfig,
    pub treasury: GuildConfig,
    /// Delay, in seconds, before a guild may spend ETH through the permission registry.
    pub eth_permission_delay: u64,
}

impl Default for GuildSuiteConfig {
    fn default() -> Self {
        Self {
            dev_ops: GuildConfig::dev_ops(),
            treasury: GuildConfig::treasury(),
            eth_permission_delay: 1,
        }
    }
}

/// Register every step of the suite.
pub fn register_guild_suite(
    registry: &mut StepRegistry,
    config: &GuildSuiteConfig,
) -> Result<(), DeployError> {
    registry.register(
        Step::new(
            GuildStep::PermissionRegistry,
            RegistryStep::new(GuildStep::PermissionRegistry, PERMISSION_REGISTRY_ARTIFACT),
        )
        .tag(GuildStep::PermissionRegistry),
    )?;

    registry.register(
        Step::new(
            GuildStep::GuildRegistry,
            RegistryStep::new(GuildStep::GuildRegistry, GUILD_REGISTRY_ARTIFACT),
        )
        .tag(GuildStep::GuildRegistry)
        .depends_on(GuildStep::PermissionRegistry),
    )?;

    let guilds = [
        (
            GuildStep::DXdaoDevOpsRepToken,
            GuildStep::DXdaoDevOpsGuild,
            &config.dev_ops,
        ),
        (
            GuildStep::DXdaoTreasuryRepToken,
            GuildStep::DXdaoTreasuryGuild,
            &config.treasury,
        ),
    ];

    for (token, guild, guild_config) in guilds {
        registry.register(
            Step::new(token, RepTokenStep::new(token, guild_config.clone())).tag(token),
        )?;

        registry.register(
            Step::new(
                guild,
                GuildDeployStep::new(
                    guild,
                    token,
                    guild_config.clone(),
                    config.eth_permission_delay,
                ),
            )
            .tag(guild)
            .depends_on(GuildStep::PermissionRegistry)
            .depends_on(GuildStep::GuildRegistry)
            .depends_on(token),
        )?;
    }

    Ok(())
}

/// A registry holding the guild suite only.
pub fn guild_registry(config: &GuildSuiteConfig) -> Result<StepRegistry, DeployError> {
    let mut registry = StepRegistry::new();
    register_guild_suite(&mut registry, config)?;
    Ok(registry)
}

/// Deploy the suite, falling back to every registered step when no tag matches.
pub async fn deploy_guilds<S: RecordStore>(
    runner: &mut FixtureRunner<'_, S>,
) -> Result<Deployments, DeployError> {
    runner
        .run_fixture(
            &GUILD_TAGS,
            &FixtureOptions::default().fallback_to_global(true),
        )
        .await
}

/// Deploy the suite at deterministic addresses derived from [`DEV_DEPLOY_SALT`].
pub async fn deploy_guilds_dev<S: RecordStore>(
    runner: &mut FixtureRunner<'_, S>,
) -> Result<Deployments, DeployError> {
    runner
        .run_fixture(
            &GUILD_TAGS,
            &FixtureOptions::default()
                .fallback_to_global(false)
                .salt(DEV_DEPLOY_SALT),
        )
        .await
}
