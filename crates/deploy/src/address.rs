//! Contract address derivation.
//!
//! Salted deployments are routed through the deterministic deployment proxy, so the
//! resulting address only depends on the proxy address, the salt and the init code.
//! Unsalted deployments use the sender's nonce.

use alloy_core::primitives::{Address, B256, Bytes, address, keccak256};
use anyhow::Context;

/// Address of the keyless deterministic deployment proxy available on most EVM chains.
pub const DETERMINISTIC_DEPLOYMENT_PROXY: Address =
    address!("4e59b44847b379578588920ca78fbf26c0b4956c");

/// CREATE2 address for `(deployer, init_code_hash, salt)`.
pub fn derive_address(deployer: Address, init_code_hash: B256, salt: B256) -> Address {
    deployer.create2(salt.0, init_code_hash.0)
}

/// CREATE address of the contract deployed by `sender` at `nonce`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}

/// Calldata understood by the deterministic deployment proxy.
pub fn deterministic_calldata(salt: B256, init_code: &[u8]) -> Bytes {
    let mut calldata = salt.to_vec();
    calldata.extend_from_slice(init_code);
    calldata.into()
}

/// Normalise a configured salt.
///
/// An empty value means "no salt". A `0x` prefixed value is decoded as hex and
/// left-padded to 32 bytes; anything else is hashed.
pub fn parse_salt(raw: &str) -> anyhow::Result<Option<B256>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let Some(stripped) = raw.strip_prefix("0x") else {
        return Ok(Some(keccak256(raw.as_bytes())));
    };

    if stripped.is_empty() {
        return Ok(None);
    }

    // Odd-length hex is padded with a leading zero nibble.
    let padded = if stripped.len() % 2 == 1 {
        format!("0{stripped}")
    } else {
        stripped.to_string()
    };
    let bytes = hex::decode(&padded).with_context(|| format!("Invalid hex salt '{raw}'"))?;
    if bytes.len() > 32 {
        anyhow::bail!("Salt '{raw}' is longer than 32 bytes");
    }

    let mut salt = [0u8; 32];
    salt[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(Some(B256::from(salt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::b256;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn test_derive_address_matches_eip1014_vector() {
        // Example 0 from EIP-1014.
        let deployer = Address::ZERO;
        let salt = B256::ZERO;
        let init_code_hash = keccak256([0x00]);

        assert_eq!(
            derive_address(deployer, init_code_hash, salt),
            address!("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38")
        );
    }

    #[test]
    fn test_derive_address_is_pure() {
        let init_code_hash = keccak256(b"PermissionRegistry");
        let salt = b256!("0000000000000000000000000000000000000000000000000000000000000042");

        let first = derive_address(DETERMINISTIC_DEPLOYMENT_PROXY, init_code_hash, salt);
        let second = derive_address(DETERMINISTIC_DEPLOYMENT_PROXY, init_code_hash, salt);
        assert_eq!(first, second);
    }

    #[test]
    fn test_derive_address_differs_per_salt() {
        let init_code_hash = keccak256(b"GuildRegistry");
        let mut rng = rand::rng();
        let mut seen = HashSet::new();

        for _ in 0..512 {
            let salt = B256::from(rng.random::<[u8; 32]>());
            let derived = derive_address(DETERMINISTIC_DEPLOYMENT_PROXY, init_code_hash, salt);
            assert!(seen.insert(derived), "collision for salt {salt}");
        }
    }

    #[test]
    fn test_create_address_matches_known_vector() {
        // First contract deployed by the default dev account.
        let sender = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(
            create_address(sender, 0),
            address!("5fbdb2315678afecb367f032d93f642f64180aa3")
        );
    }

    #[test]
    fn test_parse_salt() {
        assert_eq!(parse_salt("").unwrap(), None);
        assert_eq!(parse_salt("   ").unwrap(), None);
        assert_eq!(
            parse_salt("0x01").unwrap(),
            Some(b256!("0000000000000000000000000000000000000000000000000000000000000001"))
        );
        assert_eq!(
            parse_salt("0x123").unwrap(),
            Some(b256!("0000000000000000000000000000000000000000000000000000000000000123"))
        );
        assert_eq!(
            parse_salt("dxdao").unwrap(),
            Some(keccak256(b"dxdao"))
        );
        assert!(parse_salt("0xzz").is_err());
        assert!(parse_salt(&format!("0x{}", "11".repeat(33))).is_err());
    }

    #[test]
    fn test_deterministic_calldata_prefixes_salt() {
        let salt = B256::repeat_byte(0x11);
        let calldata = deterministic_calldata(salt, &[0x60, 0x80]);
        assert_eq!(calldata.len(), 34);
        assert_eq!(&calldata[..32], salt.as_slice());
        assert_eq!(&calldata[32..], &[0x60, 0x80]);
    }
}
