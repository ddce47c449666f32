#![allow(dead_code)]

use std::collections::BTreeMap;
use token_validator::config::{FixedClock, ValidatorConfig};
use token_validator::driver::{Deserializer, Ledger, Verifier};
use token_validator::plain::{IssueAction, Token, TransferAction};
use token_validator::request::TokenRequest;
use token_validator::types::{TimeStamp, TokenId};
use token_validator::utils;

use chrono::Utc;

pub const NOW: i64 = 1_700_000_000;
pub const ANCHOR: &str = "tx1anchor";

pub fn at(secs: i64) -> TimeStamp<Utc> {
    TimeStamp::from_unix(secs).unwrap()
}

/// Test signature scheme: sha256(identity || message).
pub fn sign(identity: &[u8], message: &[u8]) -> Vec<u8> {
    let mut data = identity.to_vec();
    data.extend_from_slice(message);
    utils::digest(&data)
}

pub struct HashVerifier {
    identity: Vec<u8>,
}

impl Verifier for HashVerifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> anyhow::Result<()> {
        anyhow::ensure!(
            sign(&self.identity, message) == signature,
            "invalid signature for [{}]",
            utils::unique_id(&self.identity)
        );
        Ok(())
    }
}

/// Any non-empty byte string is an identity.
pub struct HashDeserializer;

impl HashDeserializer {
    fn resolve(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        anyhow::ensure!(!identity.is_empty(), "empty identity");
        Ok(Box::new(HashVerifier {
            identity: identity.to_vec(),
        }))
    }
}

impl Deserializer for HashDeserializer {
    fn owner_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        self.resolve(identity)
    }
    fn issuer_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        self.resolve(identity)
    }
    fn auditor_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        self.resolve(identity)
    }
}

/// Script owners are handled by the validator's own wrapper.
pub fn deserializer() -> HashDeserializer {
    HashDeserializer
}

pub fn config(now: i64) -> ValidatorConfig {
    ValidatorConfig::new().set_clock(FixedClock(at(now)))
}

pub fn ledger_with(tokens: &[(TokenId, Token)]) -> impl Ledger + use<> {
    let state: BTreeMap<String, Vec<u8>> = tokens
        .iter()
        .map(|(id, token)| (id.key(), token.to_bytes().unwrap()))
        .collect();
    move |id: &TokenId| -> anyhow::Result<Option<Vec<u8>>> { Ok(state.get(&id.key()).cloned()) }
}

/// Builds an unsigned request, then lets `signer` produce its signatures
/// from the message to sign.
pub fn signed_request(
    issues: &[IssueAction],
    transfers: &[TransferAction],
    signer: impl FnOnce(&[u8]) -> Vec<Vec<u8>>,
) -> TokenRequest {
    let mut request = TokenRequest::new();
    for issue in issues {
        request = request.add_issue(issue.to_bytes().unwrap());
    }
    for transfer in transfers {
        request = request.add_transfer(transfer.to_bytes().unwrap());
    }
    let message = request.message_to_sign(ANCHOR).unwrap();
    for signature in signer(&message) {
        request = request.add_signature(signature);
    }
    request
}
