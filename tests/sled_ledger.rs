mod common;

use common::*;
use std::sync::Arc;
use tempfile::tempdir;
use token_validator::ValidationError;
use token_validator::driver::Ledger;
use token_validator::ledger::SledLedger;
use token_validator::plain::{self, PublicParams, Token, TransferAction};
use token_validator::types::TokenId;

#[test]
fn validates_against_persisted_tokens() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Arc::new(sled::open(dir.path())?);
    let ledger = SledLedger::new(db)?;

    let alice = TokenId::new("tx0", 0);
    let bob = TokenId::new("tx0", 1);
    ledger.put_tokens(&[
        (alice.clone(), Token::new("alice", "USD", "10").to_bytes()?),
        (bob.clone(), Token::new("bob", "USD", "0x20").to_bytes()?),
    ])?;
    ledger.flush()?;

    let validator = plain::new_validator(PublicParams::new(64)?, deserializer(), config(NOW));
    let transfer = TransferAction::new()
        .add_input(alice.clone())
        .add_input(bob.clone())
        .add_output(Token::new("carol", "USD", "42"));
    let request = signed_request(&[], &[transfer], |msg| {
        vec![sign(b"alice", msg), sign(b"bob", msg)]
    });
    validator.verify_token_request(&ledger, ANCHOR, &request)?;

    // spent elsewhere in the meantime
    assert!(ledger.remove_token(&bob)?.is_some());
    assert!(ledger.get_state(&bob)?.is_none());
    let err = validator
        .verify_token_request(&ledger, ANCHOR, &request)
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ValidationError::InputResolution { token_id, .. } if token_id == "[tx0:1]"
    ));
    Ok(())
}

#[test]
fn reopened_ledger_keeps_tokens() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let id = TokenId::new("tx7", 3);
    let raw = Token::new("alice", "EUR", "5").to_bytes()?;
    {
        let ledger = SledLedger::new(Arc::new(sled::open(dir.path())?))?;
        ledger.put_token(&id, &raw)?;
        ledger.flush()?;
    }

    let ledger = SledLedger::new(Arc::new(sled::open(dir.path())?))?;
    assert_eq!(ledger.get_state(&id)?, Some(raw));
    assert_eq!(ledger.get_state(&TokenId::new("tx7", 4))?, None);
    Ok(())
}
