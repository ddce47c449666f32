//! Cleartext token driver.
//!
//! Tokens carry their owner, type and quantity in the clear. Actions and
//! tokens travel as CBOR. This is the driver the standard validators are
//! wired for.
use super::config::ValidatorConfig;
use super::driver::{
    self, ActionDeserializer, Deserializer, Ledger, Metadata, PublicParameters, TokenLoader,
};
use super::error::ValidationError;
use super::identity::{Identity, ScriptDeserializer};
use super::request::TokenRequest;
use super::rules;
use super::types::{MAX_PRECISION, TokenId};
use super::validator::Validator;
use super::{htlc, pledge};
use anyhow::Context as _;
use minicbor::bytes::ByteVec;

pub type PlainValidator = Validator<PublicParams, IssueAction, TransferAction, Token>;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PublicParams {
    #[n(0)]
    pub precision: u64,
    #[n(1)]
    pub auditors: Vec<Identity>,
    #[n(2)]
    pub issuers: Vec<Identity>,
}

impl PublicParams {
    pub fn new(precision: u64) -> Result<Self, ValidationError> {
        if precision == 0 || precision > MAX_PRECISION {
            return Err(ValidationError::InvalidQuantity(format!(
                "invalid precision [{precision}], expected 1..={MAX_PRECISION}"
            )));
        }
        Ok(Self {
            precision,
            auditors: Vec::new(),
            issuers: Vec::new(),
        })
    }
    pub fn add_auditor(mut self, auditor: impl Into<Identity>) -> Self {
        self.auditors.push(auditor.into());
        self
    }
    pub fn add_issuer(mut self, issuer: impl Into<Identity>) -> Self {
        self.issuers.push(issuer.into());
        self
    }
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        let pp: Self =
            minicbor::decode(raw).map_err(|e| ValidationError::decode("public parameters", e))?;
        // re-check the precision bound
        Self::new(pp.precision)?;
        Ok(pp)
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

impl PublicParameters for PublicParams {
    fn precision(&self) -> u64 {
        self.precision
    }
    fn auditors(&self) -> &[Identity] {
        &self.auditors
    }
    fn issuers(&self) -> &[Identity] {
        &self.issuers
    }
}

/// A cleartext token. As an output, an empty owner marks a redeem.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Token {
    #[n(0)]
    pub owner: Identity,
    #[n(1)]
    pub token_type: String,
    #[n(2)]
    pub quantity: String,
}

impl Token {
    pub fn new(
        owner: impl Into<Identity>,
        token_type: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            token_type: token_type.into(),
            quantity: quantity.into(),
        }
    }
    pub fn redeem(token_type: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self::new(Identity::default(), token_type, quantity)
    }
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ValidationError> {
        minicbor::decode(raw).map_err(|e| ValidationError::decode("token", e))
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

impl driver::Token for Token {
    fn owner(&self) -> &[u8] {
        self.owner.as_bytes()
    }
    fn token_type(&self) -> &str {
        &self.token_type
    }
    fn quantity(&self) -> &str {
        &self.quantity
    }
}

impl driver::Output for Token {}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct IssueAction {
    #[n(0)]
    pub issuer: Identity,
    #[n(1)]
    pub outputs: Vec<Token>,
    #[n(2)]
    pub metadata: Metadata,
}

impl IssueAction {
    pub fn new(issuer: impl Into<Identity>) -> Self {
        Self {
            issuer: issuer.into(),
            outputs: Vec::new(),
            metadata: Metadata::new(),
        }
    }
    pub fn add_output(mut self, output: Token) -> Self {
        self.outputs.push(output);
        self
    }
    pub fn add_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.metadata.insert(key.into(), ByteVec::from(value.into()));
        self
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

impl driver::Action for IssueAction {
    type Output = Token;

    fn outputs(&self) -> &[Token] {
        &self.outputs
    }
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl driver::IssueAction for IssueAction {
    fn issuer(&self) -> &Identity {
        &self.issuer
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TransferAction {
    #[n(0)]
    pub inputs: Vec<TokenId>,
    #[n(1)]
    pub outputs: Vec<Token>,
    #[n(2)]
    pub issuer: Option<Identity>,
    #[n(3)]
    pub metadata: Metadata,
}

impl TransferAction {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_input(mut self, input: TokenId) -> Self {
        self.inputs.push(input);
        self
    }
    pub fn add_output(mut self, output: Token) -> Self {
        self.outputs.push(output);
        self
    }
    pub fn set_issuer(mut self, issuer: impl Into<Identity>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
    pub fn add_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.metadata.insert(key.into(), ByteVec::from(value.into()));
        self
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        minicbor::to_vec(self).map_err(|e| ValidationError::Encode(e.to_string()))
    }
}

impl driver::Action for TransferAction {
    type Output = Token;

    fn outputs(&self) -> &[Token] {
        &self.outputs
    }
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl driver::TransferAction for TransferAction {
    fn inputs(&self) -> &[TokenId] {
        &self.inputs
    }
    fn issuer(&self) -> Option<&Identity> {
        self.issuer.as_ref()
    }
}

/// Decodes the CBOR actions of a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct CborActionDeserializer;

impl ActionDeserializer<IssueAction, TransferAction> for CborActionDeserializer {
    fn deserialize_actions(
        &self,
        request: &TokenRequest,
    ) -> anyhow::Result<(Vec<IssueAction>, Vec<TransferAction>)> {
        let issues = request
            .issues
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                minicbor::decode::<IssueAction>(raw)
                    .with_context(|| format!("failed to unmarshal issue action [{i}]"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let transfers = request
            .transfers
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                minicbor::decode::<TransferAction>(raw)
                    .with_context(|| format!("failed to unmarshal transfer action [{i}]"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((issues, transfers))
    }
}

/// Reads spent tokens from the ledger as CBOR [`Token`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerTokenLoader;

impl TokenLoader<TransferAction, Token> for LedgerTokenLoader {
    fn load_input_tokens(
        &self,
        ledger: &dyn Ledger,
        action: &TransferAction,
    ) -> Result<Vec<Token>, ValidationError> {
        action
            .inputs
            .iter()
            .map(|id| {
                let resolution = |source: anyhow::Error| ValidationError::InputResolution {
                    token_id: id.to_string(),
                    source,
                };
                let raw = ledger
                    .get_state(id)
                    .map_err(resolution)?
                    .ok_or_else(|| resolution(anyhow::anyhow!("token does not exist")))?;
                minicbor::decode::<Token>(&raw).map_err(|e| resolution(e.into()))
            })
            .collect()
    }
}

/// Validator with the standard chains, HTLC and pledge rules included.
/// `deserializer` is wrapped in a [`ScriptDeserializer`] running on the
/// clock of `config`.
pub fn new_validator(
    pp: PublicParams,
    deserializer: impl Deserializer + 'static,
    config: ValidatorConfig,
) -> PlainValidator {
    with_transfer_chain(base_validator(pp, deserializer, config))
        .add_issue_rule(Box::new(rules::issue_application_data::<PublicParams, IssueAction>))
}

/// Validator for a pledge destination network: issuance carries pledge
/// claims instead of application data.
pub fn new_pledge_validator(
    pp: PublicParams,
    deserializer: impl Deserializer + 'static,
    config: ValidatorConfig,
) -> PlainValidator {
    with_transfer_chain(base_validator(pp, deserializer, config))
        .add_issue_rule(Box::new(pledge::issue_validate::<PublicParams, IssueAction>))
}

fn base_validator(
    pp: PublicParams,
    deserializer: impl Deserializer + 'static,
    config: ValidatorConfig,
) -> PlainValidator {
    let deserializer = ScriptDeserializer::new(deserializer, config.clock());
    Validator::new(pp, deserializer, CborActionDeserializer, LedgerTokenLoader)
        .set_config(config)
        .add_auditing_rule(Box::new(rules::auditing_signature::<PublicParams>))
        .add_issue_rule(Box::new(rules::issue_action_validate::<PublicParams, IssueAction>))
        .add_issue_rule(Box::new(rules::issue_authorization::<PublicParams, IssueAction>))
}

fn with_transfer_chain(validator: PlainValidator) -> PlainValidator {
    validator
        .add_transfer_rule(Box::new(
            rules::transfer_action_validate::<PublicParams, TransferAction, Token>,
        ))
        .add_transfer_rule(Box::new(
            rules::transfer_signature::<PublicParams, TransferAction, Token>,
        ))
        .add_transfer_rule(Box::new(
            rules::transfer_balance::<PublicParams, TransferAction, Token>,
        ))
        .add_transfer_rule(Box::new(
            htlc::transfer_validate::<PublicParams, TransferAction, Token>,
        ))
        .add_transfer_rule(Box::new(
            pledge::transfer_validate::<PublicParams, TransferAction, Token>,
        ))
        .add_transfer_rule(Box::new(
            rules::transfer_application_data::<PublicParams, TransferAction, Token>,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_params_reject_bad_precision() {
        assert!(PublicParams::new(0).is_err());
        assert!(PublicParams::new(65).is_err());

        let pp = PublicParams::new(64).unwrap().add_auditor("auditor");
        let decoded = PublicParams::from_bytes(&pp.to_bytes().unwrap()).unwrap();
        assert_eq!(pp, decoded);
    }

    #[test]
    fn deserializes_actions_in_order() {
        let issue = IssueAction::new("issuer").add_output(Token::new("alice", "USD", "10"));
        let transfer = TransferAction::new()
            .add_input(TokenId::new("tx0", 0))
            .add_output(Token::redeem("USD", "10"))
            .set_issuer("issuer");
        let request = TokenRequest::new()
            .add_issue(issue.to_bytes().unwrap())
            .add_transfer(transfer.to_bytes().unwrap());

        let (issues, transfers) = CborActionDeserializer.deserialize_actions(&request).unwrap();
        assert_eq!(issues, vec![issue]);
        assert_eq!(transfers, vec![transfer]);
        assert!(driver::Output::is_redeem(&transfers[0].outputs[0]));
    }

    #[test]
    fn garbage_action_names_its_index() {
        let request = TokenRequest::new().add_transfer(vec![0xff]);
        let err = CborActionDeserializer.deserialize_actions(&request).unwrap_err();
        assert!(err.to_string().contains("transfer action [0]"));
    }

    #[test]
    fn missing_input_is_an_input_resolution_error() {
        let ledger = |_: &TokenId| -> anyhow::Result<Option<Vec<u8>>> { Ok(None) };
        let action = TransferAction::new().add_input(TokenId::new("tx0", 1));

        let err = LedgerTokenLoader.load_input_tokens(&ledger, &action).unwrap_err();
        assert!(matches!(err, ValidationError::InputResolution { token_id, .. } if token_id == "[tx0:1]"));
    }
}
