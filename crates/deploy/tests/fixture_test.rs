//! Integration tests for dxguild-deploy.
//!
//! These tests drive the guild suite through the fixture runner against the in-memory
//! chain, with artifacts and deployment records living in a temporary directory.
//! Run with: cargo test --test fixture_test

use std::path::Path;

use alloy_core::primitives::{Address, Bytes, address};
use alloy_sol_types::SolCall;
use anyhow::{Context, Result};
use dxguild_deploy::{
    Artifacts, DeployError, Deployments, FileRecordStore, FixtureOptions, FixtureRunner,
    RecordStore, StepName, VerificationRequest, Verifier,
    guilds::{
        self, GuildStep, GuildSuiteConfig,
        abi::{IERC20SnapshotRep, IGuildRegistry},
    },
    testing::MockChain,
};
use futures::future::BoxFuture;
use tempdir::TempDir;

const DEPLOYER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
const TOKEN_HOLDER: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");

const GUILD_BYTECODE: &[u8] = &[0x60, 0x80, 0x60, 0x04];

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

fn write_artifact(root: &Path, source: &str, name: &str, bytecode: &[u8]) -> Result<()> {
    let dir = root.join(source);
    std::fs::create_dir_all(&dir)?;
    let artifact = serde_json::json!({
        "_format": "hh-sol-artifact-1",
        "contractName": name,
        "sourceName": source,
        "abi": [],
        "bytecode": format!("0x{}", hex::encode(bytecode)),
        "deployedBytecode": "0x",
    });
    std::fs::write(dir.join(format!("{name}.json")), artifact.to_string())?;
    Ok(())
}

/// Test setup: compiled artifacts and a record directory.
struct TestContext {
    dir: TempDir,
    artifacts: Artifacts,
    registry: dxguild_deploy::StepRegistry,
}

impl TestContext {
    fn new() -> Result<Self> {
        init_test_tracing();

        let dir = TempDir::new("dxguild-fixture")?;
        let artifacts_dir = dir.path().join("artifacts");
        write_artifact(
            &artifacts_dir,
            "contracts/utils/PermissionRegistry.sol",
            "PermissionRegistry",
            &[0x60, 0x80, 0x60, 0x01],
        )?;
        write_artifact(
            &artifacts_dir,
            "contracts/erc20guild/utils/GuildRegistry.sol",
            "GuildRegistry",
            &[0x60, 0x80, 0x60, 0x02],
        )?;
        write_artifact(
            &artifacts_dir,
            "contracts/utils/ERC20/ERC20SnapshotRep.sol",
            "ERC20SnapshotRep",
            &[0x60, 0x80, 0x60, 0x03],
        )?;
        write_artifact(
            &artifacts_dir,
            "contracts/erc20guild/implementations/SnapshotRepERC20Guild.sol",
            "SnapshotRepERC20Guild",
            GUILD_BYTECODE,
        )?;

        let artifacts = Artifacts::load_dir(&artifacts_dir)?;
        let registry = guilds::guild_registry(&GuildSuiteConfig::default())?;

        Ok(Self {
            dir,
            artifacts,
            registry,
        })
    }

    fn store(&self) -> FileRecordStore {
        FileRecordStore::new(self.dir.path().join("deployments"))
    }

    fn runner<'a>(&'a self, chain: &'a MockChain) -> FixtureRunner<'a, FileRecordStore> {
        FixtureRunner::new(&self.registry, chain, self.store())
            .network_name("localhost")
            .artifacts(self.artifacts.clone())
    }
}

fn chain() -> MockChain {
    MockChain::new(vec![DEPLOYER, TOKEN_HOLDER])
}

fn address_of(deployed: &Deployments, step: GuildStep) -> Result<Address> {
    deployed.address_of(step)
}

#[tokio::test]
async fn test_deploy_guilds_then_reuse_records() -> Result<()> {
    let ctx = TestContext::new()?;
    let chain = chain();

    let first = guilds::deploy_guilds(&mut ctx.runner(&chain)).await?;
    assert_eq!(first.len(), 6);
    assert!(first.values().all(|result| result.newly_deployed));
    assert_eq!(chain.deployments().len(), 6);

    for step in [GuildStep::PermissionRegistry, GuildStep::DXdaoTreasuryGuild] {
        let record = ctx
            .store()
            .get("localhost", &StepName::from(step))?
            .with_context(|| format!("No record for {step}"))?;
        assert_eq!(record.address, address_of(&first, step)?);
    }

    // A second invocation reads the records back from disk.
    let second = guilds::deploy_guilds(&mut ctx.runner(&chain)).await?;
    for (name, result) in second.iter() {
        assert!(!result.newly_deployed, "{name} was redeployed");
        assert_eq!(result.address, first[name].address);
    }
    assert_eq!(chain.deployments().len(), 6);

    Ok(())
}

#[tokio::test]
async fn test_guilds_are_wired_after_deployment() -> Result<()> {
    let ctx = TestContext::new()?;
    let chain = chain();

    let deployed = guilds::deploy_guilds(&mut ctx.runner(&chain)).await?;
    let guild_registry = address_of(&deployed, GuildStep::GuildRegistry)?;
    let dev_ops_guild = address_of(&deployed, GuildStep::DXdaoDevOpsGuild)?;
    let dev_ops_token = address_of(&deployed, GuildStep::DXdaoDevOpsRepToken)?;

    let transactions = chain.transactions();
    assert!(transactions.iter().all(|tx| tx.from == DEPLOYER));

    let registered: Vec<Address> = transactions
        .iter()
        .filter(|tx| tx.to == Some(guild_registry))
        .filter_map(|tx| IGuildRegistry::addGuildCall::abi_decode(&tx.data, true).ok())
        .map(|call| call.guildAddress)
        .collect();
    assert_eq!(
        registered,
        vec![
            dev_ops_guild,
            address_of(&deployed, GuildStep::DXdaoTreasuryGuild)?
        ]
    );

    let new_owner = transactions
        .iter()
        .filter(|tx| tx.to == Some(dev_ops_token))
        .find_map(|tx| IERC20SnapshotRep::transferOwnershipCall::abi_decode(&tx.data, true).ok())
        .context("DevOps reputation token ownership was never transferred")?;
    assert_eq!(new_owner.newOwner, dev_ops_guild);

    Ok(())
}

#[tokio::test]
async fn test_dev_deployment_is_deterministic() -> Result<()> {
    let first_ctx = TestContext::new()?;
    let second_ctx = TestContext::new()?;

    let first = guilds::deploy_guilds_dev(&mut first_ctx.runner(&chain())).await?;
    let second = guilds::deploy_guilds_dev(&mut second_ctx.runner(&chain())).await?;

    for (name, result) in first.iter() {
        assert_eq!(result.address, second[name].address, "{name} moved");
    }

    let devops = address_of(&first, GuildStep::DXdaoDevOpsGuild)?;
    let treasury = address_of(&first, GuildStep::DXdaoTreasuryGuild)?;
    assert_ne!(devops, treasury);

    Ok(())
}

#[tokio::test]
async fn test_dev_deployment_adopts_existing_contracts() -> Result<()> {
    let chain = chain();

    let first = guilds::deploy_guilds_dev(&mut TestContext::new()?.runner(&chain)).await?;

    // Fresh records, same chain: every contract is already at its deterministic address.
    let ctx = TestContext::new()?;
    let second = guilds::deploy_guilds_dev(&mut ctx.runner(&chain)).await?;

    assert_eq!(chain.deployments().len(), 6);
    for (name, result) in second.iter() {
        assert!(!result.newly_deployed);
        assert_eq!(result.address, first[name].address);
    }

    Ok(())
}

#[tokio::test]
async fn test_salt_change_redeploys() -> Result<()> {
    let ctx = TestContext::new()?;
    let chain = chain();

    let first = ctx
        .runner(&chain)
        .run_fixture(&["PermissionRegistry"], &FixtureOptions::default())
        .await?;

    let registry = first
        .get(&StepName::from(GuildStep::PermissionRegistry))
        .context("PermissionRegistry not deployed")?;
    assert!(registry.newly_deployed);

    // Same registry under a salt: the salt is part of the deployment identity.
    let salted = ctx
        .runner(&chain)
        .run_fixture(
            &["PermissionRegistry"],
            &FixtureOptions::default().salt("0x01"),
        )
        .await?;
    let salted_registry = &salted[&StepName::from(GuildStep::PermissionRegistry)];
    assert!(salted_registry.newly_deployed);
    assert_ne!(salted_registry.address, registry.address);

    Ok(())
}

struct FailingVerifier;

impl Verifier for FailingVerifier {
    fn verify<'a>(&'a self, request: VerificationRequest<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { anyhow::bail!("explorer unavailable for {}", request.address) })
    }
}

#[tokio::test]
async fn test_failing_verifier_does_not_fail_deployment() -> Result<()> {
    let ctx = TestContext::new()?;
    let chain = chain();
    let verifier = FailingVerifier;

    let deployed = guilds::deploy_guilds(&mut ctx.runner(&chain).verifier(&verifier)).await?;
    assert_eq!(deployed.len(), 6);

    Ok(())
}

#[tokio::test]
async fn test_failing_step_aborts_remaining_steps() -> Result<()> {
    let ctx = TestContext::new()?;
    let chain = chain();
    chain.fail_deployments_of(Bytes::from_static(GUILD_BYTECODE));

    let err = guilds::deploy_guilds(&mut ctx.runner(&chain))
        .await
        .expect_err("guild deployment should fail");

    match err {
        DeployError::StepExecutionFailed { step, .. } => {
            assert_eq!(step, StepName::from(GuildStep::DXdaoDevOpsGuild));
        }
        other => anyhow::bail!("unexpected error: {other}"),
    }

    // Steps before the failure are recorded, steps after it never ran.
    let store = ctx.store();
    assert!(
        store
            .get("localhost", &StepName::from(GuildStep::DXdaoDevOpsRepToken))?
            .is_some()
    );
    assert!(
        store
            .get("localhost", &StepName::from(GuildStep::DXdaoTreasuryRepToken))?
            .is_none()
    );
    assert_eq!(chain.deployments().len(), 3);

    Ok(())
}
