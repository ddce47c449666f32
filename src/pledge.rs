//! Cross-network pledges.
//!
//! A pledged token is locked on its origin network for a recipient on a
//! destination network. It leaves the lock either as a redeem, once the
//! destination network proves the claim, or as a reclaim by the original
//! sender once the deadline has elapsed.
use super::context::Context;
use super::driver::{
    Deserializer, IssueAction, Output, PublicParameters, Token, TransferAction, Verifier,
};
use super::error::ValidationError;
use super::identity::{Identity, ScriptOwner, TypedIdentity};
use super::types::{TimeStamp, TokenId};
use chrono::Utc;
use minicbor::bytes::ByteVec;

pub const SCRIPT_TYPE: &str = "pledge";

/// Prefix of the lock entry of a pledged output, followed by the script id.
pub const METADATA_KEY: &str = "metadata.pledge.";
/// Prefix of the proof entry of a redeemed pledge, followed by the input key.
pub const REDEEM_PLEDGE_KEY: &str = "metadata.redeem.pledge.";
/// Prefix of the proof entry of a reclaimed pledge, followed by the input key.
pub const METADATA_RECLAIM_KEY: &str = "metadata.reclaim.pledge.";
/// Entry carrying the [`IssueInfo`] of a pledge-claim issuance.
pub const ISSUE_INFO_KEY: &str = "metadata.issue.pledge";

const LOCK_VALUE: &[u8] = b"1";

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Script {
    #[n(0)]
    pub sender: Identity,
    /// Lives on the destination network, so it is never verified here.
    #[n(1)]
    pub recipient: Identity,
    #[n(2)]
    pub destination_network: String,
    #[n(3)]
    pub deadline: TimeStamp<Utc>,
    #[n(4)]
    pub issuer: Identity,
    #[n(5)]
    pub id: String,
}

impl Script {
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw)
            .map_err(|e| ValidationError::InvalidScript(format!("failed to decode pledge script: {e}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }

    pub fn owner(&self) -> Result<Identity, ValidationError> {
        TypedIdentity::wrap(SCRIPT_TYPE, self.to_bytes()?)
    }

    pub fn validate(&self, now: &TimeStamp<Utc>) -> Result<(), ValidationError> {
        if self.sender.is_empty() {
            return Err(ValidationError::InvalidScript("sender not set".to_string()));
        }
        if self.issuer.is_empty() {
            return Err(ValidationError::InvalidScript("issuer not set".to_string()));
        }
        if self.destination_network.is_empty() {
            return Err(ValidationError::InvalidScript("destination network not set".to_string()));
        }
        if self.deadline.is_before(now) {
            return Err(ValidationError::ScriptExpired {
                deadline: self.deadline.to_string(),
            });
        }
        Ok(())
    }
}

/// Where an issued pledge-claim token comes from.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct IssueInfo {
    #[n(0)]
    pub origin_token_id: TokenId,
    #[n(1)]
    pub origin_network: String,
    #[n(2)]
    pub proof: ByteVec,
}

impl IssueInfo {
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw).map_err(|e| ValidationError::decode("pledge issue info", e))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ReclaimSignature {
    #[n(0)]
    pub requestor_signature: ByteVec,
    #[n(1)]
    pub issuer_signature: ByteVec,
}

impl ReclaimSignature {
    pub fn new(requestor_signature: impl Into<Vec<u8>>, issuer_signature: impl Into<Vec<u8>>) -> Self {
        Self {
            requestor_signature: ByteVec::from(requestor_signature.into()),
            issuer_signature: ByteVec::from(issuer_signature.into()),
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw).map_err(|e| ValidationError::decode("pledge reclaim signature", e))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

pub fn lock_key(script_id: &str) -> String {
    format!("{METADATA_KEY}{script_id}")
}

pub fn redeem_key(input: &TokenId) -> String {
    format!("{REDEEM_PLEDGE_KEY}{}", input.key())
}

pub fn reclaim_key(input: &TokenId) -> String {
    format!("{METADATA_RECLAIM_KEY}{}", input.key())
}

/// Verifier for a pledge-owned token: the sender signs the request and the
/// issuer signs the pledge id.
pub struct ScriptVerifier {
    pub sender: Box<dyn Verifier>,
    pub issuer: Box<dyn Verifier>,
    pub pledge_id: String,
}

impl ScriptVerifier {
    pub fn from_script(deserializer: &dyn Deserializer, script: &Script) -> anyhow::Result<Self> {
        Ok(Self {
            sender: deserializer.owner_verifier(script.sender.as_bytes())?,
            issuer: deserializer.owner_verifier(script.issuer.as_bytes())?,
            pledge_id: script.id.clone(),
        })
    }
}

impl Verifier for ScriptVerifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> anyhow::Result<()> {
        let signature = ReclaimSignature::from_bytes(signature)?;
        self.sender.verify(message, &signature.requestor_signature)?;
        self.issuer
            .verify(self.pledge_id.as_bytes(), &signature.issuer_signature)
    }
}

fn require_proof<'m>(value: Option<&'m ByteVec>, key: &str) -> Result<&'m [u8], ValidationError> {
    match value {
        Some(proof) if !proof.is_empty() => Ok(proof.as_slice()),
        Some(_) => Err(ValidationError::InvalidPledgeMetadata(format!(
            "empty proof under [{key}]"
        ))),
        None => Err(ValidationError::InvalidPledgeMetadata(format!(
            "missing metadata entry [{key}]"
        ))),
    }
}

/// Transfer rule for pledge-owned inputs and pledge-locked outputs.
pub fn transfer_validate<P, TA, T>(ctx: &mut Context<'_, P, TA, T>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    TA: TransferAction,
    T: Token,
{
    let action = ctx.action;
    let inputs = ctx.input_tokens;
    let outputs = action.outputs();
    let metadata = action.metadata();
    let now = ctx.now.clone();

    for input in inputs {
        let ScriptOwner::Pledge(script) = ScriptOwner::from_owner(input.owner())? else {
            continue;
        };
        if inputs.len() != 1 || outputs.len() != 1 || action.inputs().len() != 1 {
            return Err(ValidationError::InvalidScript(
                "a pledge script only transfers the ownership of a token".to_string(),
            ));
        }
        let input_id = &action.inputs()[0];
        let output = &outputs[0];

        if output.is_redeem() {
            let key = redeem_key(input_id);
            require_proof(metadata.get(&key), &key)?;
            tracing::debug!(anchor = ctx.anchor, pledge = %script.id, "pledge redeemed");
            ctx.count_metadata_key(&key);
            continue;
        }

        let key = reclaim_key(input_id);
        require_proof(metadata.get(&key), &key)?;
        if script.sender != *output.owner() {
            return Err(ValidationError::ReclaimRecipientMismatch);
        }
        if now.is_before(&script.deadline) {
            return Err(ValidationError::ReclaimTooEarly {
                deadline: script.deadline.to_string(),
            });
        }
        tracing::debug!(anchor = ctx.anchor, pledge = %script.id, "pledge reclaimed");
        ctx.count_metadata_key(&key);
    }

    for output in outputs.iter().filter(|o| !o.is_redeem()) {
        let ScriptOwner::Pledge(script) = ScriptOwner::from_owner(output.owner())? else {
            continue;
        };
        script.validate(&now)?;

        let key = lock_key(&script.id);
        match metadata.get(&key) {
            Some(value) if value.as_slice() == LOCK_VALUE => {}
            _ => {
                return Err(ValidationError::InvalidPledgeMetadata(format!(
                    "expected [{key}] to be set to [1]"
                )));
            }
        }
        tracing::debug!(anchor = ctx.anchor, pledge = %script.id, "pledge locked");
        ctx.count_metadata_key(&key);
    }
    Ok(())
}

/// Issue rule of a destination network: every metadata entry of a
/// pledge-claim issuance belongs to the pledge.
pub fn issue_validate<P, IA>(ctx: &mut Context<'_, P, IA>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    IA: IssueAction,
{
    let action = ctx.action;
    let metadata = action.metadata();

    if let Some(raw) = metadata.get(ISSUE_INFO_KEY) {
        let info = IssueInfo::from_bytes(raw)?;
        if info.proof.is_empty() {
            return Err(ValidationError::InvalidPledgeMetadata(format!(
                "empty proof for pledged token {}",
                info.origin_token_id
            )));
        }
        tracing::debug!(
            anchor = ctx.anchor,
            origin = %info.origin_token_id,
            network = %info.origin_network,
            "pledge claim issued"
        );
    }

    for key in metadata.keys() {
        ctx.count_metadata_key(key);
    }
    Ok(())
}
