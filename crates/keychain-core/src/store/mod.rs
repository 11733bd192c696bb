//! Secure store backends
//!
//! This module provides two backends behind the [`SecureStore`] gateway:
//! 1. OS Keychain via the `keyring` crate (secrets) plus a JSON attribute manifest
//! 2. In-memory store (tests and ephemeral use)

mod traits;
mod table;
mod memory;
mod keychain;

pub use traits::{RawRecord, SecureStore};
pub use memory::MemoryStore;
pub use keychain::{KeyringStore, DEFAULT_NAMESPACE};
