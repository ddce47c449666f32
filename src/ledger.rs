//! Sled-backed ledger state.
use super::driver::Ledger;
use super::types::TokenId;
use sled::{Batch, Db, Tree};
use std::sync::Arc;

const TOKENS_TREE: &str = "tokens";

/// Committed tokens keyed by [`TokenId::key`].
pub struct SledLedger {
    instance: Arc<Db>,
    tokens: Tree,
}

impl SledLedger {
    pub fn new(instance: Arc<Db>) -> anyhow::Result<Self> {
        let tokens = instance.open_tree(TOKENS_TREE)?;
        Ok(Self { instance, tokens })
    }

    pub fn put_token(&self, id: &TokenId, raw: &[u8]) -> anyhow::Result<()> {
        self.tokens.insert(id.key().as_bytes(), raw)?;
        Ok(())
    }

    /// Inserts all tokens or none.
    pub fn put_tokens(&self, tokens: &[(TokenId, Vec<u8>)]) -> anyhow::Result<()> {
        let mut batch = Batch::default();
        for (id, raw) in tokens {
            batch.insert(id.key().as_bytes(), raw.as_slice());
        }
        self.tokens.apply_batch(batch)?;
        Ok(())
    }

    pub fn remove_token(&self, id: &TokenId) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.tokens.remove(id.key().as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.instance.flush()?;
        Ok(())
    }
}

impl Ledger for SledLedger {
    fn get_state(&self, id: &TokenId) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.tokens.get(id.key().as_bytes())?.map(|v| v.to_vec()))
    }
}
