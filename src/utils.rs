//! Utility functions for hashing and identifiers

use bech32::Bech32m;
use uuid7::uuid7;

const UNIQUE_ID_HRP: &str = "id";

// construct a fresh anchor (transaction binding) then encode using bech32
pub fn new_anchor(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Raw sha256 digest of `data`.
pub fn digest(data: &[u8]) -> Vec<u8> {
    let data = data.to_vec();
    let hex_digest = sha256::digest(&data);
    // the digest is always 64 lowercase hex characters
    hex::decode(&hex_digest).unwrap_or_default()
}

/// Short, log-friendly identifier of arbitrary identity bytes: the bech32m
/// encoding of their sha256 digest.
pub fn unique_id(data: &[u8]) -> String {
    let digest = digest(data);
    let hrp = bech32::Hrp::parse_unchecked(UNIQUE_ID_HRP);
    bech32::encode::<Bech32m>(hrp, &digest).unwrap_or_else(|_| hex::encode(&digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_are_unique_and_prefixed() {
        let a = new_anchor("tx").unwrap();
        let b = new_anchor("tx").unwrap();

        assert!(a.starts_with("tx1"));
        assert_ne!(a, b);
        assert!(new_anchor("").is_err());
    }

    #[test]
    fn digest_is_sha256() {
        assert_eq!(
            hex::encode(digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn unique_id_is_stable() {
        assert_eq!(unique_id(b"alice"), unique_id(b"alice"));
        assert_ne!(unique_id(b"alice"), unique_id(b"bob"));
        assert!(unique_id(b"alice").starts_with("id1"));
    }
}
