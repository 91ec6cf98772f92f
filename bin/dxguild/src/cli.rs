use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "dxguild")]
#[command(author, version, about = "Deploy the DXdao guild contracts")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "DXGUILD_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Dxguild.toml configuration file.
    ///
    /// Defaults to ./Dxguild.toml when it exists. Values can be overridden with
    /// DXGUILD_* environment variables.
    #[arg(short, long, global = true, alias = "conf", env = "DXGUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// The network name, used to scope the deployment records.
    #[arg(short, long, global = true)]
    pub network: Option<String>,

    /// The URL of the JSON-RPC endpoint. Senders must be unlocked on the node.
    #[arg(long, global = true, alias = "rpc")]
    pub rpc_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Deploy the guild suite, falling back to every registered step when no tag matches.
    DeployGuilds,

    /// Deploy the guild suite at deterministic addresses derived from the development salt.
    DeployGuildsDev,

    /// Print the steps a set of tags resolves to, without deploying anything.
    Plan {
        /// Tags to resolve. Can be repeated.
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,

        /// Select every step when no step carries one of the tags.
        #[arg(long)]
        fallback: bool,
    },
}
