//! Compiled contract artifacts.
//!
//! Reads the hardhat artifact layout: `<root>/<source>.sol/<Contract>.json` next to a
//! `<Contract>.dbg.json` pointing at the build info used for source verification.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: String,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// Build info file, resolved from the debug file when loading from disk.
    #[serde(skip)]
    pub build_info: Option<PathBuf>,
}

impl Artifact {
    pub fn new(contract_name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        Self {
            contract_name: contract_name.into(),
            source_name: String::new(),
            bytecode: bytecode.into(),
            build_info: None,
        }
    }

    /// `<source>:<contract>` identifier expected by block explorers.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Load the compiler input used to produce this artifact.
    pub fn load_build_info(&self) -> Result<BuildInfo> {
        let path = self
            .build_info
            .as_ref()
            .with_context(|| format!("No build info recorded for {}", self.contract_name))?;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build info from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build info {}", path.display()))
    }
}

/// Compiler version and standard JSON input of a compilation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DebugFile {
    #[serde(rename = "buildInfo")]
    build_info: PathBuf,
}

/// Artifacts addressable by contract name or `<source>:<contract>`.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    by_name: HashMap<String, Arc<Artifact>>,
}

impl Artifacts {
    /// Recursively load every artifact under `root`.
    pub fn load_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Artifacts directory not found: {}", root.display());
        }

        let mut artifacts = Self::default();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory {}", dir.display()))?;

            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to read entry in {}", dir.display()))?
                    .path();

                if path.is_dir() {
                    if path.file_name().is_some_and(|name| name != "build-info") {
                        pending.push(path);
                    }
                    continue;
                }

                let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                    continue;
                }

                match Self::load_file(&path) {
                    Ok(artifact) => artifacts.insert(artifact),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "Skipping file that is not a deployable artifact");
                    }
                }
            }
        }

        tracing::debug!(root = %root.display(), count = artifacts.len(), "Loaded contract artifacts");

        Ok(artifacts)
    }

    fn load_file(path: &Path) -> Result<Artifact> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let mut artifact: Artifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let dbg_path = path.with_extension("dbg.json");
        if dbg_path.exists() {
            let dbg: DebugFile = serde_json::from_str(
                &std::fs::read_to_string(&dbg_path)
                    .with_context(|| format!("Failed to read {}", dbg_path.display()))?,
            )
            .with_context(|| format!("Failed to parse {}", dbg_path.display()))?;

            let base = dbg_path.parent().unwrap_or(Path::new("."));
            artifact.build_info = Some(base.join(dbg.build_info));
        }

        Ok(artifact)
    }

    pub fn insert(&mut self, artifact: Artifact) {
        let artifact = Arc::new(artifact);

        if !artifact.source_name.is_empty() {
            self.by_name
                .insert(artifact.fully_qualified_name(), artifact.clone());
        }

        if let Some(previous) = self
            .by_name
            .insert(artifact.contract_name.clone(), artifact.clone())
        {
            if previous.source_name != artifact.source_name {
                tracing::warn!(
                    contract = %artifact.contract_name,
                    first = %previous.source_name,
                    second = %artifact.source_name,
                    "Contract name defined in several sources, use the fully qualified name"
                );
            }
        }
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Artifact> {
        self.by_name
            .get(name)
            .map(Arc::as_ref)
            .with_context(|| format!("Artifact '{name}' not found"))
    }

    /// Number of distinct lookup keys.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
