//! Execution context shared by every step of an invocation.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::artifacts::Artifacts;

/// Environment key holding the deterministic deployment salt.
pub const DEPLOY_SALT_KEY: &str = "DEPLOY_SALT";
/// Environment key holding the block explorer API key.
pub const ETHERSCAN_API_KEY: &str = "ETHERSCAN_API_KEY";

/// Process environment variables captured at invocation start.
pub const CAPTURED_ENV_KEYS: &[&str] = &[DEPLOY_SALT_KEY, ETHERSCAN_API_KEY];

/// Context available to every step. Built once per invocation and never mutated.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub network_name: String,
    pub named_accounts: NamedAccounts,
    pub env: EnvConfig,
    pub artifacts: Artifacts,
}

/// How a named account is configured: an index into the node's accounts or a literal
/// address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    Index(usize),
    Address(Address),
}

/// Logical role name to address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAccounts(BTreeMap<String, Address>);

impl NamedAccounts {
    /// Resolve configured roles against the accounts exposed by the node.
    pub fn resolve(
        configured: &BTreeMap<String, AccountRef>,
        available: &[Address],
    ) -> anyhow::Result<Self> {
        let mut accounts = BTreeMap::new();

        for (role, account) in configured {
            let address = match account {
                AccountRef::Address(address) => *address,
                AccountRef::Index(index) => *available.get(*index).with_context(|| {
                    format!(
                        "Named account '{role}' points at index {index} but the node exposes {} accounts",
                        available.len()
                    )
                })?,
            };
            accounts.insert(role.clone(), address);
        }

        Ok(Self(accounts))
    }

    pub fn get(&self, role: &str) -> anyhow::Result<Address> {
        self.0
            .get(role)
            .copied()
            .with_context(|| format!("Unknown named account '{role}'"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Address)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Address)> for NamedAccounts {
    fn from_iter<T: IntoIterator<Item = (String, Address)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// String key/value configuration captured for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig(BTreeMap<String, String>);

impl EnvConfig {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    /// Configured values, overridden by the process environment for `keys`.
    pub fn capture(configured: &BTreeMap<String, String>, keys: &[&str]) -> Self {
        let mut values = configured.clone();
        for key in keys {
            if let Ok(value) = std::env::var(key) {
                values.insert((*key).to_string(), value);
            }
        }
        Self(values)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;

    #[test]
    fn test_resolve_named_accounts() {
        let available = [
            address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
            address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
        ];
        let literal = address!("000000000000000000000000000000000000dead");

        let configured = BTreeMap::from([
            ("deployer".to_string(), AccountRef::Index(0)),
            ("tokenHolder".to_string(), AccountRef::Index(1)),
            ("treasury".to_string(), AccountRef::Address(literal)),
        ]);

        let accounts = NamedAccounts::resolve(&configured, &available).unwrap();
        assert_eq!(accounts.get("deployer").unwrap(), available[0]);
        assert_eq!(accounts.get("tokenHolder").unwrap(), available[1]);
        assert_eq!(accounts.get("treasury").unwrap(), literal);
        assert!(accounts.get("guardian").is_err());
    }

    #[test]
    fn test_resolve_rejects_missing_index() {
        let configured = BTreeMap::from([("deployer".to_string(), AccountRef::Index(3))]);
        let err = NamedAccounts::resolve(&configured, &[]).unwrap_err();
        assert!(err.to_string().contains("index 3"));
    }

    #[test]
    fn test_account_ref_deserializes_index_or_address() {
        let parsed: BTreeMap<String, AccountRef> = toml::from_str(
            r#"
            deployer = 0
            treasury = "0x000000000000000000000000000000000000dead"
            "#,
        )
        .unwrap();

        assert_eq!(parsed["deployer"], AccountRef::Index(0));
        assert_eq!(
            parsed["treasury"],
            AccountRef::Address(address!("000000000000000000000000000000000000dead"))
        );
    }

    #[test]
    fn test_env_override() {
        let env = EnvConfig::default().with(DEPLOY_SALT_KEY, "0x01");
        assert_eq!(env.get(DEPLOY_SALT_KEY), Some("0x01"));
        assert_eq!(env.get(ETHERSCAN_API_KEY), None);
    }
}
