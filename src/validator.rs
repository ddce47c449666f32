//! Orchestration: auditor check, action decoding, per-action rule chains.
use super::backend::Backend;
use super::config::ValidatorConfig;
use super::context::{Context, TOKEN_REQUEST_SIGNATURES, TOKEN_REQUEST_TO_SIGN, ValidationAttributes};
use super::driver::{
    ActionDeserializer, Deserializer, IssueAction, Ledger, PublicParameters, TokenLoader,
    TransferAction,
};
use super::error::ValidationError;
use super::request::TokenRequest;
use super::rules::Rule;
use super::types::TimeStamp;
use chrono::Utc;
use minicbor::bytes::ByteVec;
use std::collections::BTreeMap;
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedAction<IA, TA> {
    Issue(IA),
    Transfer(TA),
}

/// Outcome of a successful validation. The caller applies the actions.
#[derive(Debug, Clone)]
pub struct ValidatedRequest<IA, TA> {
    pub actions: Vec<ValidatedAction<IA, TA>>,
    pub attributes: ValidationAttributes,
    /// Signatures the rules consumed, auditor's included.
    pub signatures_consumed: usize,
}

/// Validates token requests with the rule chains registered at
/// construction. Holds no per-request state.
pub struct Validator<P, IA, TA, T = ()> {
    pp: P,
    deserializer: Box<dyn Deserializer>,
    action_deserializer: Box<dyn ActionDeserializer<IA, TA>>,
    token_loader: Box<dyn TokenLoader<TA, T>>,
    auditing: Vec<Rule<P, TokenRequest>>,
    issue: Vec<Rule<P, IA>>,
    transfer: Vec<Rule<P, TA, T>>,
    config: ValidatorConfig,
}

impl<P, IA, TA, T> Validator<P, IA, TA, T>
where
    P: PublicParameters,
    IA: IssueAction,
    TA: TransferAction,
{
    pub fn new(
        pp: P,
        deserializer: impl Deserializer + 'static,
        action_deserializer: impl ActionDeserializer<IA, TA> + 'static,
        token_loader: impl TokenLoader<TA, T> + 'static,
    ) -> Self {
        Self {
            pp,
            deserializer: Box::new(deserializer),
            action_deserializer: Box::new(action_deserializer),
            token_loader: Box::new(token_loader),
            auditing: Vec::new(),
            issue: Vec::new(),
            transfer: Vec::new(),
            config: ValidatorConfig::default(),
        }
    }

    pub fn set_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_auditing_rule(mut self, rule: Rule<P, TokenRequest>) -> Self {
        self.auditing.push(rule);
        self
    }

    pub fn add_issue_rule(mut self, rule: Rule<P, IA>) -> Self {
        self.issue.push(rule);
        self
    }

    pub fn add_transfer_rule(mut self, rule: Rule<P, TA, T>) -> Self {
        self.transfer.push(rule);
        self
    }

    pub fn public_parameters(&self) -> &P {
        &self.pp
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn verify_token_request_from_raw(
        &self,
        ledger: &dyn Ledger,
        anchor: &str,
        raw: &[u8],
    ) -> Result<ValidatedRequest<IA, TA>, ValidationError> {
        let request = TokenRequest::from_bytes(raw)?;
        self.verify_token_request(ledger, anchor, &request)
    }

    /// Runs every chain over `request`. Any failing action rejects the
    /// whole request.
    pub fn verify_token_request(
        &self,
        ledger: &dyn Ledger,
        anchor: &str,
        request: &TokenRequest,
    ) -> Result<ValidatedRequest<IA, TA>, ValidationError> {
        if request.is_empty() {
            return Err(ValidationError::EmptyRequest);
        }
        let now = self.config.now();
        let message = request.message_to_sign(anchor)?;
        let signatures = request.signatures_for_backend(!self.pp.auditors().is_empty());
        let backend = Backend::new(ledger, &message, &signatures);

        let mut attributes = ValidationAttributes::new();
        attributes.insert(TOKEN_REQUEST_TO_SIGN.to_string(), message.clone());
        let encoded: Vec<ByteVec> = signatures.iter().cloned().map(ByteVec::from).collect();
        attributes.insert(
            TOKEN_REQUEST_SIGNATURES.to_string(),
            minicbor::to_vec(&encoded).map_err(|e| ValidationError::Encode(e.to_string()))?,
        );

        tracing::debug!(anchor, issues = request.issues.len(), transfers = request.transfers.len(), "verifying token request");

        self.verify_auditing(&backend, anchor, request, &now)?;
        tracing::debug!(anchor, "auditor verified");

        let (issues, transfers) = self.unmarshal_actions(anchor, request)?;
        tracing::debug!(anchor, "actions deserialized");

        for (index, action) in issues.iter().enumerate() {
            self.verify_issue(&backend, anchor, index, action, &now)?;
        }
        tracing::debug!(anchor, "issues verified");

        for (index, action) in transfers.iter().enumerate() {
            self.verify_transfer(&backend, anchor, index, action, &now)?;
        }
        tracing::debug!(anchor, "transfers verified");

        let signatures_consumed = backend.consumed();
        tracing::info!(anchor, signatures_consumed, "token request valid");

        let actions = issues
            .into_iter()
            .map(ValidatedAction::Issue)
            .chain(transfers.into_iter().map(ValidatedAction::Transfer))
            .collect();
        Ok(ValidatedRequest {
            actions,
            attributes,
            signatures_consumed,
        })
    }

    /// Validates independent requests on at most `max_workers` threads.
    /// Results come back in the order of `batch`.
    pub fn verify_token_requests_from_raw(
        &self,
        ledger: &dyn Ledger,
        batch: &[(String, Vec<u8>)],
    ) -> Vec<Result<ValidatedRequest<IA, TA>, ValidationError>>
    where
        IA: Send,
        TA: Send,
        Self: Sync,
    {
        let verify_all = |requests: &[(String, Vec<u8>)]| -> Vec<_> {
            requests
                .iter()
                .map(|(anchor, raw)| self.verify_token_request_from_raw(ledger, anchor, raw))
                .collect()
        };

        let workers = self.config.max_workers().min(batch.len());
        if workers <= 1 {
            return verify_all(batch);
        }

        let chunk = batch.len().div_ceil(workers);
        tracing::debug!(requests = batch.len(), workers, "verifying batch");
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .chunks(chunk)
                .map(|requests| scope.spawn(move || verify_all(requests)))
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    fn verify_auditing(
        &self,
        backend: &Backend<'_>,
        anchor: &str,
        request: &TokenRequest,
        now: &TimeStamp<Utc>,
    ) -> Result<(), ValidationError> {
        let mut ctx = Context {
            pp: &self.pp,
            anchor,
            deserializer: self.deserializer.as_ref(),
            signature_provider: backend,
            action: request,
            input_tokens: &[],
            signatures: Vec::new(),
            metadata_counter: BTreeMap::new(),
            now: now.clone(),
        };
        run_chain(&self.auditing, &mut ctx).map_err(|e| ValidationError::AuditorSignatureInvalid {
            anchor: anchor.to_string(),
            source: Box::new(e),
        })
    }

    fn unmarshal_actions(
        &self,
        anchor: &str,
        request: &TokenRequest,
    ) -> Result<(Vec<IA>, Vec<TA>), ValidationError> {
        self.action_deserializer
            .deserialize_actions(request)
            .map_err(|source| ValidationError::ActionDeserialization {
                anchor: anchor.to_string(),
                source,
            })
    }

    fn verify_issue(
        &self,
        backend: &Backend<'_>,
        anchor: &str,
        index: usize,
        action: &IA,
        now: &TimeStamp<Utc>,
    ) -> Result<(), ValidationError> {
        tracing::debug!(anchor, index, "running issue chain");
        let mut ctx = Context {
            pp: &self.pp,
            anchor,
            deserializer: self.deserializer.as_ref(),
            signature_provider: backend,
            action,
            input_tokens: &[],
            signatures: Vec::new(),
            metadata_counter: BTreeMap::new(),
            now: now.clone(),
        };
        run_chain(&self.issue, &mut ctx)
            .and_then(|_| ctx.check_metadata_accounting())
            .map_err(|e| ValidationError::Issue {
                anchor: anchor.to_string(),
                index,
                source: Box::new(e),
            })
    }

    fn verify_transfer(
        &self,
        backend: &Backend<'_>,
        anchor: &str,
        index: usize,
        action: &TA,
        now: &TimeStamp<Utc>,
    ) -> Result<(), ValidationError> {
        tracing::debug!(anchor, index, "running transfer chain");
        let wrap = |e: ValidationError| ValidationError::Transfer {
            anchor: anchor.to_string(),
            index,
            source: Box::new(e),
        };

        let input_tokens = self.token_loader.load_input_tokens(backend, action).map_err(wrap)?;
        let mut ctx = Context {
            pp: &self.pp,
            anchor,
            deserializer: self.deserializer.as_ref(),
            signature_provider: backend,
            action,
            input_tokens: &input_tokens,
            signatures: Vec::new(),
            metadata_counter: BTreeMap::new(),
            now: now.clone(),
        };
        run_chain(&self.transfer, &mut ctx)
            .and_then(|_| ctx.check_metadata_accounting())
            .map_err(wrap)
    }
}

fn run_chain<P, A, T>(
    rules: &[Rule<P, A, T>],
    ctx: &mut Context<'_, P, A, T>,
) -> Result<(), ValidationError> {
    for rule in rules {
        rule(ctx)?;
    }
    Ok(())
}
