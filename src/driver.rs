//! Capabilities a token driver plugs into the validator.
//!
//! The engine never looks inside a concrete token or action: everything it
//! needs goes through the traits below. Collaborators that talk to the
//! outside world (verifiers, ledgers, deserializers) report failures as
//! `anyhow::Error`; the engine maps them to its own error kinds.
use super::error::ValidationError;
use super::identity::Identity;
use super::request::TokenRequest;
use super::types::TokenId;
use minicbor::bytes::ByteVec;
use std::collections::BTreeMap;

/// Action-level metadata. Keys are unique.
pub type Metadata = BTreeMap<String, ByteVec>;

pub trait PublicParameters: Send + Sync {
    /// Bits available to a quantity.
    fn precision(&self) -> u64;
    fn auditors(&self) -> &[Identity];
    /// Empty means anyone may issue.
    fn issuers(&self) -> &[Identity];
}

pub trait Token {
    fn owner(&self) -> &[u8];
    fn token_type(&self) -> &str;
    fn quantity(&self) -> &str;
}

pub trait Output: Token {
    fn is_redeem(&self) -> bool {
        self.owner().is_empty()
    }
}

pub trait Action {
    type Output: Output;

    fn outputs(&self) -> &[Self::Output];
    fn metadata(&self) -> &Metadata;
}

pub trait IssueAction: Action {
    fn issuer(&self) -> &Identity;
}

pub trait TransferAction: Action {
    fn inputs(&self) -> &[TokenId];
    /// Issuer co-signing a redeem, if any.
    fn issuer(&self) -> Option<&Identity>;
}

pub trait Verifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8]) -> anyhow::Result<()>;
}

/// Resolves identities to verifiers.
pub trait Deserializer: Send + Sync {
    fn owner_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>>;
    fn issuer_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>>;
    fn auditor_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>>;
}

pub trait SignatureProvider {
    /// Consumes the next signature and checks it against `verifier`.
    /// Returns the consumed signature on success.
    fn has_been_signed_by(
        &self,
        identity: &[u8],
        verifier: &dyn Verifier,
    ) -> Result<Vec<u8>, ValidationError>;
}

/// Read access to committed token state.
pub trait Ledger: Send + Sync {
    fn get_state(&self, id: &TokenId) -> anyhow::Result<Option<Vec<u8>>>;
}

impl<F> Ledger for F
where
    F: Fn(&TokenId) -> anyhow::Result<Option<Vec<u8>>> + Send + Sync,
{
    fn get_state(&self, id: &TokenId) -> anyhow::Result<Option<Vec<u8>>> {
        self(id)
    }
}

pub trait ActionDeserializer<IA, TA>: Send + Sync {
    fn deserialize_actions(&self, request: &TokenRequest) -> anyhow::Result<(Vec<IA>, Vec<TA>)>;
}

/// Loads the tokens a transfer action spends.
pub trait TokenLoader<TA, T>: Send + Sync {
    fn load_input_tokens(&self, ledger: &dyn Ledger, action: &TA) -> Result<Vec<T>, ValidationError>;
}
