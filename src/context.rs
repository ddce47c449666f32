//! Per-action validation state handed to every rule of a chain.
use super::driver::{Action, Deserializer, SignatureProvider};
use super::error::ValidationError;
use super::types::TimeStamp;
use chrono::Utc;
use std::collections::BTreeMap;

/// Side-channel values produced during validation, keyed by attribute id.
pub type ValidationAttributes = BTreeMap<String, Vec<u8>>;

/// Attribute holding the message every signature was checked against.
pub const TOKEN_REQUEST_TO_SIGN: &str = "trs";
/// Attribute holding the CBOR list of signatures handed to the cursor.
pub const TOKEN_REQUEST_SIGNATURES: &str = "sigs";

/// Created fresh for one action, dropped once its chain and the metadata
/// check have run. `A` is the action under test and `T` the type of the
/// tokens it spends.
pub struct Context<'a, P, A, T = ()> {
    pub pp: &'a P,
    pub anchor: &'a str,
    pub deserializer: &'a dyn Deserializer,
    pub signature_provider: &'a dyn SignatureProvider,
    pub action: &'a A,
    pub input_tokens: &'a [T],
    /// Signatures consumed by the rules so far, in consumption order.
    pub signatures: Vec<Vec<u8>>,
    pub metadata_counter: BTreeMap<String, usize>,
    pub now: TimeStamp<Utc>,
}

impl<P, A, T> Context<'_, P, A, T> {
    /// Marks `key` as claimed by the calling rule.
    pub fn count_metadata_key(&mut self, key: &str) {
        *self.metadata_counter.entry(key.to_string()).or_default() += 1;
    }
}

impl<P, A: Action, T> Context<'_, P, A, T> {
    pub fn metadata_value(&self, key: &str) -> Option<&[u8]> {
        self.action.metadata().get(key).map(|v| v.as_slice())
    }

    /// Every metadata entry of the action must have been claimed by exactly
    /// one rule, and nothing else may have been claimed.
    pub fn check_metadata_accounting(&self) -> Result<(), ValidationError> {
        let metadata = self.action.metadata();

        if let Some((key, _)) = self.metadata_counter.iter().find(|(_, count)| **count > 1) {
            return Err(ValidationError::DuplicateMetadataKey { key: key.clone() });
        }

        let claimed: usize = self.metadata_counter.values().sum();
        let unknown_claim = self
            .metadata_counter
            .keys()
            .any(|key| !metadata.contains_key(key));
        if claimed != metadata.len() || unknown_claim {
            return Err(ValidationError::MetadataMismatch {
                expected: metadata.len(),
                got: claimed,
            });
        }
        Ok(())
    }
}
