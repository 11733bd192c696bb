//! Attribute table shared by the store backends
//!
//! Holds the searchable, non-secret half of every item. Backends keep the
//! secrets elsewhere, keyed by the item id.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::{keys, Attributes, ItemClass};
use crate::error::{KeychainError, Result};
use crate::query::CredentialQuery;

/// Non-secret part of a stored item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredItem {
    pub id: Uuid,
    pub class: ItemClass,
    pub attributes: Attributes,
}

impl StoredItem {
    /// Whether this item and `attributes` agree on every identity key of `class`
    fn same_identity(&self, class: ItemClass, attributes: &Attributes) -> bool {
        self.class == class
            && class
                .identity_keys()
                .iter()
                .all(|key| self.attributes.get(*key) == attributes.get(*key))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct ItemTable {
    items: Vec<StoredItem>,
}

impl ItemTable {
    pub fn find(&self, query: &CredentialQuery) -> Vec<&StoredItem> {
        self.items
            .iter()
            .filter(|item| query.matches(item.class, &item.attributes))
            .collect()
    }

    /// Resolve a query that must address exactly one item
    pub fn single(&self, query: &CredentialQuery) -> Result<&StoredItem> {
        let mut matches = self.find(query);
        match matches.len() {
            0 => Err(KeychainError::ItemNotFound),
            1 => Ok(matches.remove(0)),
            count => Err(KeychainError::AmbiguousMatch { count }),
        }
    }

    /// Insert a new item built from the query, stamping creation and
    /// modification dates. Fails if an item with the same identity exists.
    pub fn insert(&mut self, query: &CredentialQuery) -> Result<StoredItem> {
        let class = query
            .class()
            .ok_or_else(|| KeychainError::invalid("adding an item requires an item class"))?;

        if self
            .items
            .iter()
            .any(|item| item.same_identity(class, query.attributes()))
        {
            return Err(KeychainError::DuplicateItem);
        }

        let now = Utc::now();
        let mut attributes = query.attributes().clone();
        attributes.insert(keys::CREATION_DATE.to_string(), now.into());
        attributes.insert(keys::MODIFICATION_DATE.to_string(), now.into());

        let item = StoredItem {
            id: Uuid::new_v4(),
            class,
            attributes,
        };
        self.items.push(item.clone());
        Ok(item)
    }

    /// Bump the modification date of an item
    pub fn touch(&mut self, id: Uuid) -> Result<StoredItem> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(KeychainError::ItemNotFound)?;

        item.attributes
            .insert(keys::MODIFICATION_DATE.to_string(), Utc::now().into());
        Ok(item.clone())
    }

    pub fn remove(&mut self, id: Uuid) -> Option<StoredItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
