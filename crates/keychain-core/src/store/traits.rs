//! Gateway trait definitions

use crate::attributes::{AttributeValue, Attributes, ItemClass};
use crate::error::Result;
use crate::query::CredentialQuery;
use crate::secret::Secret;

/// One item as returned by a store, before it is wrapped into a typed record
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Class of the stored item
    pub class: ItemClass,
    /// Every attribute of the item, including the store-stamped dates
    pub attributes: Attributes,
    /// Secret data, or `None` when the store refused to hand it out
    pub secret: Option<Secret>,
}

impl RawRecord {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Gateway to a secure credential store
///
/// All operations are synchronous and either complete or fail; implementations
/// must make `add` atomic with respect to other callers of the same store.
pub trait SecureStore: Send + Sync {
    /// Return every item matching the query (possibly none)
    fn search(&self, query: &CredentialQuery) -> Result<Vec<RawRecord>>;

    /// Create a new item from the query's attributes.
    /// Fails with `DuplicateItem` when an item with the same identity exists.
    fn add(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord>;

    /// Replace the secret of the single item matching the query
    fn update(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord>;

    /// Remove the single item matching the query.
    /// Fails with `ItemNotFound` when nothing matches.
    fn delete(&self, query: &CredentialQuery) -> Result<()>;

    /// Get a human-readable name for this backend
    fn backend_name(&self) -> &'static str;
}
