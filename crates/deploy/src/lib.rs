//! dxguild-deploy - Deployment library for the DXdao guild contracts.
//!
//! This crate provides named, idempotent deployment steps selected by tag, ordered by
//! their dependencies and optionally deployed at deterministic addresses.

pub mod address;
pub use address::{DETERMINISTIC_DEPLOYMENT_PROXY, create_address, derive_address, parse_salt};

mod artifacts;
pub use artifacts::{Artifact, Artifacts, BuildInfo};

pub mod chain;
pub use chain::{ChainClient, RpcChainClient, TransactionReceipt, TransactionRequest};

mod config;
pub use config::{CONFIG_FILENAME, DeployConfig, ENV_PREFIX, EtherscanConfig};

mod context;
pub use context::{
    AccountRef, CAPTURED_ENV_KEYS, DEPLOY_SALT_KEY, ETHERSCAN_API_KEY, EnvConfig,
    ExecutionContext, NamedAccounts,
};

mod error;
pub use error::DeployError;

mod executor;
pub use executor::Executor;

mod fixture;
pub use fixture::{FixtureOptions, FixtureRunner};

pub mod guilds;

mod record;
pub use record::{DeploymentRecord, FileRecordStore, MemoryRecordStore, RecordStore};

mod registry;
pub use registry::StepRegistry;

mod resolver;
pub use resolver::resolve;

mod step;
pub use step::{
    DeployRequest, DeployResult, DeployStep, Deployments, Step, StepContext, StepName, Tag,
};

pub mod testing;

mod verify;
pub use verify::{EtherscanVerifier, VerificationRequest, Verifier};
