pub mod backend;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod htlc;
pub mod identity;
pub mod ledger;
pub mod plain;
pub mod pledge;
pub mod request;
pub mod rules;
pub mod types;
pub mod utils;
pub mod validator;

pub use error::ValidationError;
pub use validator::{ValidatedAction, ValidatedRequest, Validator};
