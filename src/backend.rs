//! Ordered signature consumption over a ledger.
use super::driver::{Ledger, SignatureProvider, Verifier};
use super::error::ValidationError;
use super::types::TokenId;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-request signature cursor, also handed out as the request's [`Ledger`].
///
/// Every [`has_been_signed_by`](SignatureProvider::has_been_signed_by) call
/// consumes exactly one signature, whether or not it verifies.
pub struct Backend<'a> {
    ledger: &'a dyn Ledger,
    message: &'a [u8],
    signatures: &'a [Vec<u8>],
    cursor: AtomicUsize,
}

impl<'a> Backend<'a> {
    pub fn new(ledger: &'a dyn Ledger, message: &'a [u8], signatures: &'a [Vec<u8>]) -> Self {
        Self {
            ledger,
            message,
            signatures,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of signatures consumed so far.
    pub fn consumed(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl SignatureProvider for Backend<'_> {
    fn has_been_signed_by(
        &self,
        identity: &[u8],
        verifier: &dyn Verifier,
    ) -> Result<Vec<u8>, ValidationError> {
        let available = self.signatures.len();
        let cursor = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                (c < available).then_some(c + 1)
            })
            .map_err(|consumed| ValidationError::InsufficientSignatures { consumed })?;
        let signature = &self.signatures[cursor];

        let identity = super::utils::unique_id(identity);
        tracing::debug!(%identity, cursor, "consuming signature");

        verifier
            .verify(self.message, signature)
            .map_err(|source| ValidationError::SignatureInvalid { identity, source })?;
        Ok(signature.clone())
    }
}

impl Ledger for Backend<'_> {
    fn get_state(&self, id: &TokenId) -> anyhow::Result<Option<Vec<u8>>> {
        self.ledger.get_state(id)
    }
}
