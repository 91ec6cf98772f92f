//! Deployment records persisted between invocations.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::step::{DeployResult, StepName};

/// Address and metadata of an executed step on one network.
///
/// Saved to `{root}/{network}/{step}.json`. A record is reused as long as the step
/// produces the same init code hash and salt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub step_name: StepName,
    pub network_id: String,
    pub contract_name: String,
    pub address: Address,
    /// keccak256 of the bytecode followed by the constructor arguments.
    pub bytecode_hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// Unix timestamp of the deployment.
    pub deployed_at: u64,
    /// Set once the deployment is confirmed, cleared when its post-deploy hook succeeds.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hook_pending: bool,
}

impl DeploymentRecord {
    /// True when a step producing `bytecode_hash` with `salt` can reuse this record.
    pub fn matches(&self, bytecode_hash: &B256, salt: Option<&B256>) -> bool {
        self.bytecode_hash == *bytecode_hash && self.salt.as_ref() == salt
    }

    /// The result reported when this record is reused.
    pub fn reused(&self) -> DeployResult {
        DeployResult {
            address: self.address,
            newly_deployed: false,
            transaction_hash: self.transaction_hash,
        }
    }

    /// The result reported when an earlier run deployed the contract but its hook never
    /// completed. The hook sees the contract as new.
    pub fn resumed(&self) -> DeployResult {
        DeployResult {
            newly_deployed: true,
            ..self.reused()
        }
    }
}

/// Store for deployment records, keyed by `(network, step)`.
pub trait RecordStore {
    fn get(&self, network_id: &str, step: &StepName) -> Result<Option<DeploymentRecord>>;

    /// Insert or replace the record for `(record.network_id, record.step_name)`.
    fn put(&mut self, record: DeploymentRecord) -> Result<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn get(&self, network_id: &str, step: &StepName) -> Result<Option<DeploymentRecord>> {
        (**self).get(network_id, step)
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<()> {
        (**self).put(record)
    }
}

/// Records stored as one JSON file per step, grouped in a directory per network.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, network_id: &str, step: &StepName) -> PathBuf {
        self.root.join(network_id).join(format!("{step}.json"))
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, network_id: &str, step: &StepName) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(network_id, step);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read deployment record from {}", path.display()))?;

        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))?;

        Ok(Some(record))
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<()> {
        let path = self.record_path(&record.network_id, &record.step_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(&record).context("Failed to serialize deployment record")?;

        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write deployment record to {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Deployment record saved");

        Ok(())
    }
}

/// Records kept in memory for the lifetime of the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: HashMap<(String, StepName), DeploymentRecord>,
}

impl MemoryRecordStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, network_id: &str, step: &StepName) -> Result<Option<DeploymentRecord>> {
        Ok(self
            .records
            .get(&(network_id.to_string(), step.clone()))
            .cloned())
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<()> {
        self.records.insert(
            (record.network_id.clone(), record.step_name.clone()),
            record,
        );
        Ok(())
    }
}
