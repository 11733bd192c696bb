//! Typed credential records

mod application;
mod types;

pub use application::{
    ApplicationIdentifierCredential, APPLICATION_IDENTIFIER_ACCOUNT, APPLICATION_IDENTIFIER_SERVICE,
};
pub use types::*;
