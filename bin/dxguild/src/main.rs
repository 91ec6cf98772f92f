//! dxguild is a CLI tool to deploy the DXdao guild contracts.

mod cli;

use anyhow::Result;
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command};
use dxguild_deploy::{
    Artifacts, DeployConfig, Deployments, EtherscanVerifier, FileRecordStore, FixtureRunner,
    RpcChainClient, Step, Tag, guilds, resolve,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = DeployConfig::load(cli.config.as_deref())?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(rpc_url) = cli.rpc_url {
        config.rpc_url = rpc_url;
    }

    let registry = guilds::guild_registry(&config.guilds)?;

    let dev = match cli.command {
        Command::Plan { tags, fallback } => {
            let tags: Vec<Tag> = tags.into_iter().map(Tag::from).collect();
            let steps = resolve(&registry, &tags, fallback)?;
            println!("{}", plan_table(&steps));
            return Ok(());
        }
        Command::DeployGuilds => false,
        Command::DeployGuildsDev => true,
    };

    let chain = RpcChainClient::new(config.rpc_url()?)?
        .with_deterministic_proxy(config.deterministic_proxy);
    let artifacts = Artifacts::load_dir(&config.artifacts_dir)?;
    let env = config.env_config();

    let verifier = match config.etherscan_settings(&env)? {
        Some((api_url, api_key, chain_id)) => {
            let chain_id = match chain_id {
                Some(chain_id) => chain_id,
                None => chain.chain_id().await?,
            };
            Some(EtherscanVerifier::new(api_url, api_key).with_chain_id(chain_id))
        }
        None => None,
    };

    tracing::info!(
        network = %config.network,
        rpc_url = %config.rpc_url,
        artifacts = artifacts.len(),
        verification = verifier.is_some(),
        "Deploying guilds..."
    );

    let store = FileRecordStore::new(config.deployments_dir.clone());
    let mut runner = FixtureRunner::new(&registry, &chain, store)
        .network_name(config.network.clone())
        .named_accounts(config.named_accounts.clone())
        .env(env)
        .artifacts(artifacts);
    if let Some(verifier) = &verifier {
        runner = runner.verifier(verifier);
    }

    let deployed = if dev {
        guilds::deploy_guilds_dev(&mut runner).await?
    } else {
        guilds::deploy_guilds(&mut runner).await?
    };

    println!("{}", deployments_table(&deployed));

    Ok(())
}

fn plan_table(steps: &[&Step]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "Step", "Tags", "Depends on"]);

    for (index, step) in steps.iter().enumerate() {
        let tags: Vec<&str> = step.tags().iter().map(Tag::as_str).collect();
        let dependencies: Vec<&str> = step.dependencies().iter().map(|dep| dep.as_str()).collect();
        table.add_row(vec![
            (index + 1).to_string(),
            step.name().to_string(),
            tags.join(", "),
            dependencies.join(", "),
        ]);
    }

    table
}

fn deployments_table(deployed: &Deployments) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Step", "Address", "Status", "Transaction"]);

    for (name, result) in deployed.iter() {
        table.add_row(vec![
            name.to_string(),
            result.address.to_string(),
            if result.newly_deployed { "deployed" } else { "reused" }.to_string(),
            result
                .transaction_hash
                .map(|hash| hash.to_string())
                .unwrap_or_default(),
        ]);
    }

    table
}
