//! Error kinds raised while validating a token request.
use super::types::Quantity;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("empty token request")]
    EmptyRequest,
    #[error("failed to decode [{what}]")]
    Decode {
        what: &'static str,
        #[source]
        source: minicbor::decode::Error,
    },
    #[error("failed to encode [{0}]")]
    Encode(String),

    // signatures
    #[error("invalid state, insufficient number of signatures [{consumed}] consumed")]
    InsufficientSignatures { consumed: usize },
    #[error("failed signature verification [{identity}]")]
    SignatureInvalid {
        identity: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to verify auditor's signature [{anchor}]")]
    AuditorSignatureInvalid {
        anchor: String,
        #[source]
        source: Box<ValidationError>,
    },
    #[error("failed deserializing verifier for [{identity}]")]
    VerifierResolution {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    // actions
    #[error("failed to unmarshal actions [{anchor}]")]
    ActionDeserialization {
        anchor: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to verify issue action at [{index}] [{anchor}]")]
    Issue {
        anchor: String,
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
    #[error("failed to verify transfer action at [{index}] [{anchor}]")]
    Transfer {
        anchor: String,
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
    #[error("failed to retrieve input to spend [{token_id}]")]
    InputResolution {
        token_id: String,
        #[source]
        source: anyhow::Error,
    },

    // balance and shape
    #[error("there is no input")]
    NoInputs,
    #[error("there is no output")]
    NoOutputs,
    #[error("input sum {inputs} does not match output sum {outputs}")]
    BalanceMismatch { inputs: Quantity, outputs: Quantity },
    #[error("token type [{got}] does not match type [{expected}]")]
    TypeMismatch { expected: String, got: String },
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("quantity is zero")]
    ZeroQuantity,
    #[error("invalid owner: {0}")]
    InvalidOwner(String),

    // issuers
    #[error("issuer [{issuer}] is not in issuers")]
    IssuerNotAuthorized { issuer: String },
    #[error("missing issuer")]
    MissingIssuer,

    // metadata accounting
    #[error("more metadata than those validated [{expected}]!=[{got}]")]
    MetadataMismatch { expected: usize, got: usize },
    #[error("metadata key [{key}] appeared more than one time")]
    DuplicateMetadataKey { key: String },

    // scripts
    #[error("invalid script: {0}")]
    InvalidScript(String),
    #[error("invalid transfer action: {0}")]
    InvalidHtlcSpend(String),
    #[error("invalid transfer action: the output corresponding to a script spending should not be a redeem")]
    RedeemNotAllowed,
    #[error("script invalid: expiration date [{deadline}] has already passed")]
    ScriptExpired { deadline: String },
    #[error("cannot reclaim pledge yet: wait for deadline [{deadline}] to elapse")]
    ReclaimTooEarly { deadline: String },
    #[error("recipient of token does not correspond to sender of reclaim request")]
    ReclaimRecipientMismatch,
    #[error("invalid pledge metadata: {0}")]
    InvalidPledgeMetadata(String),
    #[error("invalid htlc metadata: {0}")]
    InvalidHtlcMetadata(String),
}

impl ValidationError {
    /// Returns the innermost engine error, skipping the anchor and action
    /// index wrappers the validator adds on the way out.
    pub fn root_cause(&self) -> &ValidationError {
        match self {
            Self::AuditorSignatureInvalid { source, .. }
            | Self::Issue { source, .. }
            | Self::Transfer { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn decode(what: &'static str, source: minicbor::decode::Error) -> Self {
        Self::Decode { what, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_nested_wrappers() {
        let err = ValidationError::Transfer {
            anchor: "tx1".into(),
            index: 2,
            source: Box::new(ValidationError::NoInputs),
        };

        assert!(matches!(err.root_cause(), ValidationError::NoInputs));
        assert!(err.to_string().contains("tx1"));
        assert!(err.to_string().contains("[2]"));
    }

    #[test]
    fn root_cause_of_leaf_is_itself() {
        let err = ValidationError::DuplicateMetadataKey { key: "k".into() };
        assert!(matches!(
            err.root_cause(),
            ValidationError::DuplicateMetadataKey { .. }
        ));
    }
}
