//! Hash time-locked transfers.
//!
//! A token owned by an HTLC script can be claimed by the recipient with a
//! preimage of the script's hash before the deadline, or reclaimed by the
//! sender once the deadline is reached. Claims are recorded as action
//! metadata so that the generic accounting check covers them.
use super::config::Clock;
use super::context::Context;
use super::driver::{
    Deserializer, Metadata, Output, PublicParameters, Token, TransferAction, Verifier,
};
use super::error::ValidationError;
use super::identity::{Identity, ScriptOwner, TypedIdentity};
use super::types::{Quantity, TimeStamp};
use super::utils;
use chrono::Utc;
use minicbor::bytes::ByteVec;
use std::sync::Arc;

pub const SCRIPT_TYPE: &str = "htlc";

const CLAIM_PRE_IMAGE_PREFIX: &str = "htlc.cpi.";
const LOCK_HASH_PREFIX: &str = "htlc.lh.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum HashFunction {
    #[default]
    #[n(0)]
    Sha256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum HashEncoding {
    #[default]
    #[n(0)]
    None,
    #[n(1)]
    Hex,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct HashInfo {
    #[n(0)]
    pub hash: ByteVec,
    #[n(1)]
    pub hash_func: HashFunction,
    #[n(2)]
    pub encoding: HashEncoding,
}

impl HashInfo {
    pub fn new(hash: impl Into<Vec<u8>>) -> Self {
        Self {
            hash: ByteVec::from(hash.into()),
            hash_func: HashFunction::default(),
            encoding: HashEncoding::default(),
        }
    }

    pub fn set_encoding(mut self, encoding: HashEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Hash of `preimage`, encoded the way `hash` is.
    pub fn image(&self, preimage: &[u8]) -> Vec<u8> {
        let digest = match self.hash_func {
            HashFunction::Sha256 => utils::digest(preimage),
        };
        match self.encoding {
            HashEncoding::None => digest,
            HashEncoding::Hex => hex::encode(digest).into_bytes(),
        }
    }

    pub fn compare(&self, image: &[u8]) -> Result<(), ValidationError> {
        if image != self.hash.as_slice() {
            return Err(ValidationError::InvalidHtlcSpend(format!(
                "hash mismatch: SHA(pre) = {}, hash = {}",
                hex::encode(image),
                hex::encode(self.hash.as_slice())
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Script {
    #[n(0)]
    pub sender: Identity,
    #[n(1)]
    pub recipient: Identity,
    #[n(2)]
    pub deadline: TimeStamp<Utc>,
    #[n(3)]
    pub hash_info: HashInfo,
}

impl Script {
    pub fn new(
        sender: impl Into<Identity>,
        recipient: impl Into<Identity>,
        deadline: TimeStamp<Utc>,
        hash_info: HashInfo,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            deadline,
            hash_info,
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw)
            .map_err(|e| ValidationError::InvalidScript(format!("failed to decode htlc script: {e}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }

    /// The script wrapped as a typed owner identity.
    pub fn owner(&self) -> Result<Identity, ValidationError> {
        TypedIdentity::wrap(SCRIPT_TYPE, self.to_bytes()?)
    }

    /// A script is valid while its deadline has not passed.
    pub fn validate(&self, now: &TimeStamp<Utc>) -> Result<(), ValidationError> {
        if self.sender.is_empty() {
            return Err(ValidationError::InvalidScript("sender not set".to_string()));
        }
        if self.recipient.is_empty() {
            return Err(ValidationError::InvalidScript("recipient not set".to_string()));
        }
        if self.deadline.is_before(now) {
            return Err(ValidationError::ScriptExpired {
                deadline: self.deadline.to_string(),
            });
        }
        Ok(())
    }
}

/// What the recipient attaches when claiming.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ClaimSignature {
    #[n(0)]
    pub recipient_signature: ByteVec,
    #[n(1)]
    pub preimage: ByteVec,
}

impl ClaimSignature {
    pub fn new(recipient_signature: impl Into<Vec<u8>>, preimage: impl Into<Vec<u8>>) -> Self {
        Self {
            recipient_signature: ByteVec::from(recipient_signature.into()),
            preimage: ByteVec::from(preimage.into()),
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw).map_err(|e| ValidationError::decode("htlc claim signature", e))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Claim,
    Reclaim,
}

pub fn claim_key(image: &[u8]) -> String {
    format!("{CLAIM_PRE_IMAGE_PREFIX}{}", hex::encode(image))
}

pub fn lock_key(hash: &[u8]) -> String {
    format!("{LOCK_HASH_PREFIX}{}", hex::encode(hash))
}

pub fn lock_value(hash: &[u8]) -> Vec<u8> {
    hash.to_vec()
}

/// Decides whether spending the script in `input_owner` towards
/// `output_owner` at `now` is a claim or a reclaim.
pub fn verify_owner(
    input_owner: &[u8],
    output_owner: &[u8],
    now: &TimeStamp<Utc>,
) -> Result<(Script, Operation), ValidationError> {
    let ScriptOwner::Htlc(script) = ScriptOwner::from_owner(input_owner)? else {
        return Err(ValidationError::InvalidScript(format!(
            "input owner is not an [{SCRIPT_TYPE}] script"
        )));
    };

    if now.is_before(&script.deadline) {
        if script.recipient != *output_owner {
            return Err(ValidationError::InvalidHtlcSpend(
                "owner of output token does not correspond to recipient in htlc request".to_string(),
            ));
        }
        return Ok((script, Operation::Claim));
    }

    if script.sender != *output_owner {
        return Err(ValidationError::InvalidHtlcSpend(
            "owner of output token does not correspond to sender in htlc request".to_string(),
        ));
    }
    Ok((script, Operation::Reclaim))
}

/// Checks the preimage disclosed by a claim. Returns the metadata key the
/// claim occupies, or `None` for a reclaim.
pub fn metadata_claim_key_check(
    metadata: &Metadata,
    script: &Script,
    op: Operation,
    signature: &[u8],
) -> Result<Option<String>, ValidationError> {
    if op == Operation::Reclaim {
        return Ok(None);
    }

    let claim = ClaimSignature::from_bytes(signature)
        .map_err(|e| ValidationError::InvalidHtlcMetadata(format!("failed unmarshalling claim signature: {e}")))?;
    if claim.recipient_signature.is_empty() {
        return Err(ValidationError::InvalidHtlcMetadata(
            "expected a valid claim preImage and recipient signature".to_string(),
        ));
    }
    if claim.preimage.is_empty() {
        return Err(ValidationError::InvalidHtlcMetadata(
            "expected a valid claim preImage".to_string(),
        ));
    }

    let image = script.hash_info.image(&claim.preimage);
    script.hash_info.compare(&image)?;

    let key = claim_key(&image);
    match metadata.get(&key) {
        Some(value) if value.as_slice() == claim.preimage.as_slice() => Ok(Some(key)),
        Some(_) => Err(ValidationError::InvalidHtlcMetadata(format!(
            "invalid action, cannot match htlc claim with metadata [{key}]"
        ))),
        None => Err(ValidationError::InvalidHtlcMetadata(format!(
            "cannot find htlc pre-image, missing metadata entry [{key}]"
        ))),
    }
}

/// Checks the lock entry of a freshly locked output and returns its key.
pub fn metadata_lock_key_check(metadata: &Metadata, script: &Script) -> Result<String, ValidationError> {
    let key = lock_key(&script.hash_info.hash);
    match metadata.get(&key) {
        Some(value) if value.as_slice() == lock_value(&script.hash_info.hash) => Ok(key),
        Some(_) => Err(ValidationError::InvalidHtlcMetadata(format!(
            "invalid action, cannot match htlc lock with metadata [{key}]"
        ))),
        None => Err(ValidationError::InvalidHtlcMetadata(format!(
            "cannot find htlc lock, missing metadata entry [{key}]"
        ))),
    }
}

/// Verifies a recipient's claim: the preimage hashes to the script hash and
/// the recipient signed `message || preimage`.
pub struct ClaimVerifier {
    pub recipient: Box<dyn Verifier>,
    pub hash_info: HashInfo,
}

impl Verifier for ClaimVerifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> anyhow::Result<()> {
        let claim = ClaimSignature::from_bytes(signature)?;
        let image = self.hash_info.image(&claim.preimage);
        self.hash_info.compare(&image)?;

        let mut signed = message.to_vec();
        signed.extend_from_slice(&claim.preimage);
        self.recipient.verify(&signed, &claim.recipient_signature)
    }
}

/// Verifier for an HTLC-owned token: a claim before the deadline, the
/// sender's signature from the deadline on.
pub struct ScriptVerifier {
    pub sender: Box<dyn Verifier>,
    pub claim: ClaimVerifier,
    pub deadline: TimeStamp<Utc>,
    pub clock: Arc<dyn Clock>,
}

impl ScriptVerifier {
    pub fn from_script(
        deserializer: &dyn Deserializer,
        script: &Script,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let sender = deserializer.owner_verifier(script.sender.as_bytes())?;
        let recipient = deserializer.owner_verifier(script.recipient.as_bytes())?;
        Ok(Self {
            sender,
            claim: ClaimVerifier {
                recipient,
                hash_info: script.hash_info.clone(),
            },
            deadline: script.deadline.clone(),
            clock,
        })
    }
}

impl Verifier for ScriptVerifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> anyhow::Result<()> {
        if self.clock.now().is_before(&self.deadline) {
            return self.claim.verify(message, signature);
        }
        self.sender.verify(message, signature)
    }
}

/// Transfer rule for HTLC-owned inputs and HTLC-locked outputs.
pub fn transfer_validate<P, TA, T>(ctx: &mut Context<'_, P, TA, T>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    TA: TransferAction,
    T: Token,
{
    let action = ctx.action;
    let inputs = ctx.input_tokens;
    let outputs = action.outputs();
    let now = ctx.now.clone();

    for (i, input) in inputs.iter().enumerate() {
        let ScriptOwner::Htlc(_) = ScriptOwner::from_owner(input.owner())? else {
            continue;
        };
        if inputs.len() != 1 || outputs.len() != 1 {
            return Err(ValidationError::InvalidHtlcSpend(
                "an htlc script only transfers the ownership of a token".to_string(),
            ));
        }

        let output = &outputs[0];
        if input.token_type() != output.token_type() {
            return Err(ValidationError::InvalidHtlcSpend(
                "type of input does not match type of output".to_string(),
            ));
        }
        let precision = ctx.pp.precision();
        if Quantity::parse(input.quantity(), precision)? != Quantity::parse(output.quantity(), precision)? {
            return Err(ValidationError::InvalidHtlcSpend(
                "quantity of input does not match quantity of output".to_string(),
            ));
        }
        if output.is_redeem() {
            return Err(ValidationError::RedeemNotAllowed);
        }

        let (script, op) = verify_owner(input.owner(), output.owner(), &now)?;
        let signature = ctx.signatures.get(i).cloned().ok_or_else(|| {
            ValidationError::InvalidHtlcSpend(format!("missing signature for input [{i}]"))
        })?;
        let key = metadata_claim_key_check(action.metadata(), &script, op, &signature)?;
        tracing::debug!(anchor = ctx.anchor, ?op, deadline = %script.deadline, "htlc input spent");
        if let Some(key) = key {
            ctx.count_metadata_key(&key);
        }
    }

    for output in outputs.iter().filter(|o| !o.is_redeem()) {
        let ScriptOwner::Htlc(script) = ScriptOwner::from_owner(output.owner())? else {
            continue;
        };
        script.validate(&now)?;
        let key = metadata_lock_key_check(action.metadata(), &script)?;
        tracing::debug!(anchor = ctx.anchor, deadline = %script.deadline, "htlc output locked");
        ctx.count_metadata_key(&key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> TimeStamp<Utc> {
        TimeStamp::from_unix(secs).unwrap()
    }

    fn script(deadline: i64) -> Script {
        Script::new("s", "r", at(deadline), HashInfo::new(b"h".to_vec()))
    }

    #[test]
    fn claim_before_and_reclaim_from_deadline() {
        let owner = script(1_000).owner().unwrap();

        let (_, op) = verify_owner(owner.as_bytes(), b"r", &at(999)).unwrap();
        assert_eq!(op, Operation::Claim);

        let (s, op) = verify_owner(owner.as_bytes(), b"s", &at(1_000)).unwrap();
        assert_eq!(op, Operation::Reclaim);
        assert_eq!(s.sender, Identity::from("s"));

        assert!(verify_owner(owner.as_bytes(), b"s", &at(999)).is_err());
        assert!(verify_owner(owner.as_bytes(), b"r", &at(1_000)).is_err());
        assert!(verify_owner(owner.as_bytes(), b"x", &at(0)).is_err());
    }

    #[test]
    fn verify_owner_rejects_non_scripts() {
        assert!(verify_owner(b"invalid", b"r", &at(0)).is_err());

        let other = TypedIdentity::wrap("foo", "x").unwrap();
        assert!(verify_owner(other.as_bytes(), b"r", &at(0)).is_err());
    }

    #[test]
    fn claim_key_check() {
        let preimage = b"pre".to_vec();
        let hash_info = HashInfo::new(utils::digest(&preimage));
        let script = Script::new("s", "r", at(1_000), hash_info.clone());
        let key = claim_key(&hash_info.image(&preimage));
        let signature = ClaimSignature::new(b"sig".to_vec(), preimage.clone())
            .to_bytes()
            .unwrap();

        let mut metadata = Metadata::new();
        metadata.insert(key.clone(), preimage.clone().into());
        assert_eq!(
            metadata_claim_key_check(&metadata, &script, Operation::Claim, &signature).unwrap(),
            Some(key.clone())
        );

        // wrong value
        metadata.insert(key.clone(), b"x".to_vec().into());
        assert!(metadata_claim_key_check(&metadata, &script, Operation::Claim, &signature).is_err());

        // missing entry
        assert!(metadata_claim_key_check(&Metadata::new(), &script, Operation::Claim, &signature).is_err());

        // malformed and empty bundles
        assert!(metadata_claim_key_check(&metadata, &script, Operation::Claim, b"x").is_err());
        let empty = ClaimSignature::new(Vec::new(), Vec::new()).to_bytes().unwrap();
        assert!(metadata_claim_key_check(&metadata, &script, Operation::Claim, &empty).is_err());

        // reclaim needs nothing
        assert_eq!(
            metadata_claim_key_check(&Metadata::new(), &script, Operation::Reclaim, &[]).unwrap(),
            None
        );
    }

    #[test]
    fn lock_key_check() {
        let script = script(1_000);
        let key = lock_key(&script.hash_info.hash);

        let mut metadata = Metadata::new();
        metadata.insert(key.clone(), lock_value(&script.hash_info.hash).into());
        assert_eq!(metadata_lock_key_check(&metadata, &script).unwrap(), key);

        metadata.insert(key, b"x".to_vec().into());
        assert!(metadata_lock_key_check(&metadata, &script).is_err());
        assert!(metadata_lock_key_check(&Metadata::new(), &script).is_err());
    }

    #[test]
    fn script_validity_window() {
        let script = script(1_000);
        assert!(script.validate(&at(1_000)).is_ok());
        assert!(matches!(
            script.validate(&at(1_001)),
            Err(ValidationError::ScriptExpired { .. })
        ));

        let anonymous = Script::new("", "r", at(1_000), HashInfo::new(b"h".to_vec()));
        assert!(matches!(
            anonymous.validate(&at(0)),
            Err(ValidationError::InvalidScript(_))
        ));
    }

    #[test]
    fn hex_encoded_image() {
        let info = HashInfo::new(Vec::new()).set_encoding(HashEncoding::Hex);
        assert_eq!(
            info.image(b"abc"),
            b"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_vec()
        );
    }
}
