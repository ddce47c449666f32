//! Standard auditing, issue and transfer rules.
//!
//! A rule reads the [`Context`] of one action, may consume signatures
//! through its signature provider and may claim metadata keys. Rules of a
//! chain run in registration order and the first error wins.
use super::context::Context;
use super::driver::{
    Action, IssueAction, Output, PublicParameters, Token, TransferAction, Verifier,
};
use super::error::ValidationError;
use super::request::TokenRequest;
use super::types::Quantity;
use super::utils;

/// Namespace of metadata any application may attach to an action.
pub const PUBLIC_METADATA_PREFIX: &str = "pub.";

/// Boxed rule over actions of type `A` spending tokens of type `T`.
pub type Rule<P, A, T = ()> =
    Box<dyn for<'a> Fn(&mut Context<'a, P, A, T>) -> Result<(), ValidationError> + Send + Sync>;

fn verify_signature<P, A, T>(
    ctx: &mut Context<'_, P, A, T>,
    identity: &[u8],
    resolve: impl FnOnce(&[u8]) -> anyhow::Result<Box<dyn Verifier>>,
) -> Result<(), ValidationError> {
    let verifier = resolve(identity).map_err(|source| ValidationError::VerifierResolution {
        identity: utils::unique_id(identity),
        source,
    })?;
    let signature = ctx
        .signature_provider
        .has_been_signed_by(identity, verifier.as_ref())?;
    ctx.signatures.push(signature);
    Ok(())
}

/// The first configured auditor must have signed the request. Nothing is
/// consumed when no auditor is configured.
pub fn auditing_signature<P: PublicParameters>(
    ctx: &mut Context<'_, P, TokenRequest>,
) -> Result<(), ValidationError> {
    let pp = ctx.pp;
    let Some(auditor) = pp.auditors().first() else {
        return Ok(());
    };
    let deserializer = ctx.deserializer;
    tracing::debug!(anchor = ctx.anchor, auditor = %auditor, "checking auditor signature");
    verify_signature(ctx, auditor.as_bytes(), |id| deserializer.auditor_verifier(id))
}

/// Structural checks of an issue action.
pub fn issue_action_validate<P, IA>(ctx: &mut Context<'_, P, IA>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    IA: IssueAction,
{
    let action = ctx.action;
    if action.issuer().is_empty() {
        return Err(ValidationError::MissingIssuer);
    }
    if action.outputs().is_empty() {
        return Err(ValidationError::NoOutputs);
    }
    for output in action.outputs() {
        if output.is_redeem() {
            return Err(ValidationError::InvalidOwner(
                "issued token must have an owner".to_string(),
            ));
        }
        if Quantity::parse(output.quantity(), ctx.pp.precision())?.is_zero() {
            return Err(ValidationError::ZeroQuantity);
        }
    }
    Ok(())
}

/// The issuer must be allowed to issue and must have signed.
pub fn issue_authorization<P, IA>(ctx: &mut Context<'_, P, IA>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    IA: IssueAction,
{
    let action = ctx.action;
    let issuer = action.issuer();
    let issuers = ctx.pp.issuers();
    if !issuers.is_empty() && !issuers.contains(issuer) {
        return Err(ValidationError::IssuerNotAuthorized {
            issuer: issuer.unique_id(),
        });
    }

    let deserializer = ctx.deserializer;
    verify_signature(ctx, issuer.as_bytes(), |id| deserializer.issuer_verifier(id))
}

pub fn issue_application_data<P, IA>(ctx: &mut Context<'_, P, IA>) -> Result<(), ValidationError>
where
    IA: IssueAction,
{
    claim_public_metadata(ctx);
    Ok(())
}

/// Structural checks of a transfer action against its loaded inputs.
pub fn transfer_action_validate<P, TA, T>(ctx: &mut Context<'_, P, TA, T>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    TA: TransferAction,
{
    let action = ctx.action;
    if action.inputs().is_empty() {
        return Err(ValidationError::NoInputs);
    }
    if action.outputs().is_empty() {
        return Err(ValidationError::NoOutputs);
    }
    if action.inputs().len() != ctx.input_tokens.len() {
        return Err(ValidationError::InputResolution {
            token_id: action
                .inputs()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
            source: anyhow::anyhow!(
                "expected [{}] input tokens, loaded [{}]",
                action.inputs().len(),
                ctx.input_tokens.len()
            ),
        });
    }
    Ok(())
}

/// Every spent token's owner must have signed, in input order. A redeem
/// additionally needs the issuer's signature, consumed last.
pub fn transfer_signature<P, TA, T>(ctx: &mut Context<'_, P, TA, T>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    TA: TransferAction,
    T: Token,
{
    let deserializer = ctx.deserializer;
    let inputs = ctx.input_tokens;
    for token in inputs {
        let owner = token.owner();
        tracing::debug!(anchor = ctx.anchor, sender = %utils::unique_id(owner), "checking sender signature");
        verify_signature(ctx, owner, |id| deserializer.owner_verifier(id))?;
    }

    let action = ctx.action;
    if !action.outputs().iter().any(|o| o.is_redeem()) {
        return Ok(());
    }
    let Some(issuer) = action.issuer() else {
        return Err(ValidationError::MissingIssuer);
    };
    tracing::info!(anchor = ctx.anchor, issuer = %issuer, "action is a redeem, checking issuer signature");
    verify_signature(ctx, issuer.as_bytes(), |id| deserializer.issuer_verifier(id))
}

/// Inputs and outputs carry one token type and the same total quantity.
pub fn transfer_balance<P, TA, T>(ctx: &mut Context<'_, P, TA, T>) -> Result<(), ValidationError>
where
    P: PublicParameters,
    TA: TransferAction,
    T: Token,
{
    let outputs = ctx.action.outputs();
    if outputs.is_empty() {
        return Err(ValidationError::NoOutputs);
    }
    let Some(first) = ctx.input_tokens.first() else {
        return Err(ValidationError::NoInputs);
    };

    let precision = ctx.pp.precision();
    let typ = first.token_type();
    let inputs = sum_quantities(
        ctx.input_tokens.iter().map(|t| (t.token_type(), t.quantity())),
        typ,
        precision,
    )?;
    let outputs = sum_quantities(
        outputs.iter().map(|o| (o.token_type(), o.quantity())),
        typ,
        precision,
    )?;
    if inputs != outputs {
        return Err(ValidationError::BalanceMismatch { inputs, outputs });
    }
    Ok(())
}

fn sum_quantities<'t>(
    tokens: impl Iterator<Item = (&'t str, &'t str)>,
    typ: &str,
    precision: u64,
) -> Result<Quantity, ValidationError> {
    let mut total = Quantity::zero(precision);
    for (token_type, quantity) in tokens {
        if token_type != typ {
            return Err(ValidationError::TypeMismatch {
                expected: typ.to_string(),
                got: token_type.to_string(),
            });
        }
        total = total.checked_add(Quantity::parse(quantity, precision)?)?;
    }
    Ok(total)
}

pub fn transfer_application_data<P, TA, T>(ctx: &mut Context<'_, P, TA, T>) -> Result<(), ValidationError>
where
    TA: TransferAction,
{
    claim_public_metadata(ctx);
    Ok(())
}

fn claim_public_metadata<P, A: Action, T>(ctx: &mut Context<'_, P, A, T>) {
    let action = ctx.action;
    for key in action.metadata().keys() {
        if key.starts_with(PUBLIC_METADATA_PREFIX) {
            ctx.count_metadata_key(key);
        }
    }
}
