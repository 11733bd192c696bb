//! # keychain-core
//!
//! Typed access to the platform credential store including:
//! - Generic (service/account) and internet (server/protocol/port) credentials
//! - Attribute queries with validated typed fields and open-ended extras
//! - OS keychain backend with an in-memory fallback
//! - Per-installation application identifier
//! - Session lock gate for desktop keychains

pub mod attributes;
pub mod credential;
pub mod error;
pub mod lock;
pub mod query;
pub mod secret;
pub mod settings;
pub mod store;
mod keychain;

pub use attributes::{AttributeValue, Attributes, AuthenticationType, ItemClass, Protocol};
pub use credential::{
    ApplicationIdentifierCredential, Credential, CredentialRecord, GenericCredential,
    InternetCredential, InternetTarget,
};
pub use error::{KeychainError, Result};
pub use keychain::Keychain;
pub use lock::SessionLock;
pub use query::{CredentialQuery, QueryBuilder};
pub use secret::{Password, Secret};
pub use settings::{Backend, Settings, SettingsManager};
pub use store::{KeyringStore, MemoryStore, RawRecord, SecureStore};
