//! Identities and the typed-identity wrapper that script owners travel in.
use super::config::Clock;
use super::driver::{Deserializer, Verifier};
use super::error::ValidationError;
use super::{htlc, pledge, utils};
use std::fmt;
use std::sync::Arc;

/// Opaque serialized identity. What the bytes mean is up to the
/// [`Deserializer`](crate::driver::Deserializer) that resolves verifiers for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(Vec<u8>);

impl Identity {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self(raw.into())
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn unique_id(&self) -> String {
        utils::unique_id(&self.0)
    }
}

impl From<Vec<u8>> for Identity {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Identity {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<[u8]> for Identity {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unique_id())
    }
}

impl<C> minicbor::Encode<C> for Identity {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Identity {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Identity(d.bytes()?.to_vec()))
    }
}

/// `{Type, Identity}` envelope. `typ` selects who interprets `identity`.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TypedIdentity {
    #[n(0)]
    pub typ: String,
    #[n(1)]
    pub identity: Identity,
}

impl TypedIdentity {
    pub fn new(typ: impl Into<String>, identity: impl Into<Identity>) -> Self {
        Self {
            typ: typ.into(),
            identity: identity.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw).map_err(|e| ValidationError::decode("typed identity", e))
    }

    /// Wraps `raw` with the given type and returns the serialized envelope.
    pub fn wrap(typ: &str, raw: impl Into<Identity>) -> Result<Identity, ValidationError> {
        Self::new(typ, raw).to_bytes().map(Identity::from)
    }
}

/// Who owns a token, as far as the script rules are concerned.
///
/// Owners that are not typed identities, or whose type is not a script
/// family this crate knows, are `Ignored`: signature checks for them are the
/// deserializer's business, not the script rules'.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOwner {
    Htlc(htlc::Script),
    Pledge(pledge::Script),
    Ignored,
}

impl ScriptOwner {
    pub fn from_owner(raw: &[u8]) -> Result<Self, ValidationError> {
        let Ok(typed) = TypedIdentity::from_bytes(raw) else {
            return Ok(ScriptOwner::Ignored);
        };
        match typed.typ.as_str() {
            htlc::SCRIPT_TYPE => htlc::Script::from_bytes(typed.identity.as_bytes())
                .map(ScriptOwner::Htlc),
            pledge::SCRIPT_TYPE => pledge::Script::from_bytes(typed.identity.as_bytes())
                .map(ScriptOwner::Pledge),
            _ => Ok(ScriptOwner::Ignored),
        }
    }
}

/// Resolves verifiers for script-owned tokens and hands every other
/// identity to the wrapped deserializer.
pub struct ScriptDeserializer<D> {
    inner: D,
    clock: Arc<dyn Clock>,
}

impl<D: Deserializer> ScriptDeserializer<D> {
    /// `clock` must be the validator's
    /// ([`ValidatorConfig::clock`](crate::config::ValidatorConfig::clock)):
    /// HTLC verifiers read it to pick claim or reclaim.
    pub fn new(inner: D, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }
}

impl<D: Deserializer> Deserializer for ScriptDeserializer<D> {
    fn owner_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        match ScriptOwner::from_owner(identity)? {
            ScriptOwner::Htlc(script) => Ok(Box::new(htlc::ScriptVerifier::from_script(
                &self.inner,
                &script,
                self.clock.clone(),
            )?)),
            ScriptOwner::Pledge(script) => Ok(Box::new(pledge::ScriptVerifier::from_script(
                &self.inner,
                &script,
            )?)),
            ScriptOwner::Ignored => self.inner.owner_verifier(identity),
        }
    }

    fn issuer_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        self.inner.issuer_verifier(identity)
    }

    fn auditor_verifier(&self, identity: &[u8]) -> anyhow::Result<Box<dyn Verifier>> {
        self.inner.auditor_verifier(identity)
    }
}
