//! Wire form of a token request and the message its signers sign.
use super::error::ValidationError;
use minicbor::bytes::ByteVec;

/// Bundle of serialized actions plus the signatures that authorise them.
///
/// Order of `issues` and `transfers` is significant: it is the order in
/// which rules consume `signatures`.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TokenRequest {
    #[n(0)]
    pub issues: Vec<ByteVec>,
    #[n(1)]
    pub transfers: Vec<ByteVec>,
    #[n(2)]
    pub signatures: Vec<ByteVec>,
    #[n(3)]
    pub auditor_signatures: Vec<ByteVec>,
}

impl TokenRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.issues.push(ByteVec::from(raw.into()));
        self
    }

    pub fn add_transfer(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.transfers.push(ByteVec::from(raw.into()));
        self
    }

    pub fn add_signature(mut self, signature: impl Into<Vec<u8>>) -> Self {
        self.signatures.push(ByteVec::from(signature.into()));
        self
    }

    pub fn add_auditor_signature(mut self, signature: impl Into<Vec<u8>>) -> Self {
        self.auditor_signatures
            .push(ByteVec::from(signature.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.transfers.is_empty()
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw).map_err(|e| ValidationError::decode("token request", e))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }

    /// CBOR of the request with only its actions kept, followed by the anchor.
    /// Signers and the validator must agree on these bytes exactly.
    pub fn message_to_sign(&self, anchor: &str) -> Result<Vec<u8>, ValidationError> {
        let actions_only = TokenRequest {
            issues: self.issues.clone(),
            transfers: self.transfers.clone(),
            ..Default::default()
        };
        let mut message = actions_only.to_bytes()?;
        message.extend_from_slice(anchor.as_bytes());
        Ok(message)
    }

    /// Signatures handed to the signature cursor. Auditor signatures come
    /// first, and only when the public parameters name auditors.
    pub fn signatures_for_backend(&self, with_auditors: bool) -> Vec<Vec<u8>> {
        let auditors = self
            .auditor_signatures
            .iter()
            .filter(|_| with_auditors)
            .map(|s| s.to_vec());
        auditors
            .chain(self.signatures.iter().map(|s| s.to_vec()))
            .collect()
    }
}
