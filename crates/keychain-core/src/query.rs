//! Attribute query construction
//!
//! A [`CredentialQuery`] is the only thing a [`SecureStore`](crate::store::SecureStore)
//! understands. Queries are built through [`QueryBuilder`], which validates the
//! typed fields and merges caller-supplied extras. Typed fields always win: an
//! extra attribute whose key names a typed field is dropped with a warning.

use std::collections::BTreeSet;
use tracing::warn;

use crate::attributes::{keys, AttributeValue, Attributes, AuthenticationType, ItemClass, Protocol};
use crate::error::{KeychainError, Result};

/// Normalized attribute query against the secure store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialQuery {
    class: Option<ItemClass>,
    attributes: Attributes,
    /// Keys a matching item must not carry
    absent: BTreeSet<String>,
}

impl CredentialQuery {
    /// Build the query that addresses exactly one stored item by its identity
    /// attributes. Identity keys missing from `attributes` must be missing on
    /// the stored item too, so an item without a port never matches one with.
    pub fn identity(class: ItemClass, attributes: &Attributes) -> Self {
        let (present, absent): (Vec<&str>, Vec<&str>) = class
            .identity_keys()
            .iter()
            .copied()
            .partition(|key| attributes.contains_key(*key));

        Self {
            class: Some(class),
            attributes: present
                .into_iter()
                .filter_map(|key| attributes.get(key).map(|v| (key.to_string(), v.clone())))
                .collect(),
            absent: absent.into_iter().map(str::to_string).collect(),
        }
    }

    /// Item class this query is restricted to (`None` matches every class)
    pub fn class(&self) -> Option<ItemClass> {
        self.class
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Check whether an item with the given class and attributes satisfies this query
    pub fn matches(&self, class: ItemClass, attributes: &Attributes) -> bool {
        if self.class.is_some_and(|c| c != class) {
            return false;
        }

        self.attributes
            .iter()
            .all(|(key, value)| attributes.get(key) == Some(value))
            && self.absent.iter().all(|key| !attributes.contains_key(key))
    }
}

/// Builder for [`CredentialQuery`]
///
/// Setters never fail; problems are collected and reported by [`build`](Self::build)
/// so a whole chain can be written without intermediate `?`.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    class: Option<ItemClass>,
    typed: Attributes,
    extras: Attributes,
    errors: Vec<String>,
}

impl QueryBuilder {
    fn new(class: Option<ItemClass>) -> Self {
        Self {
            class,
            typed: Attributes::new(),
            extras: Attributes::new(),
            errors: Vec::new(),
        }
    }

    /// Query over generic (service/account) items
    pub fn generic() -> Self {
        Self::new(Some(ItemClass::Generic))
    }

    /// Query over internet (server/protocol/port) items
    pub fn internet() -> Self {
        Self::new(Some(ItemClass::Internet))
    }

    /// Query over items of every class
    pub fn any() -> Self {
        Self::new(None)
    }

    /// Query over items of the given class
    pub fn for_class(class: ItemClass) -> Self {
        Self::new(Some(class))
    }

    pub fn service(self, service: &str) -> Self {
        self.set_typed(keys::SERVICE, service.into(), &[ItemClass::Generic])
    }

    pub fn account(self, account: &str) -> Self {
        self.set_typed(keys::ACCOUNT, account.into(), &[ItemClass::Generic, ItemClass::Internet])
    }

    pub fn server(self, server: &str) -> Self {
        self.set_typed(keys::SERVER, server.into(), &[ItemClass::Internet])
    }

    pub fn security_domain(self, domain: &str) -> Self {
        self.set_typed(keys::SECURITY_DOMAIN, domain.into(), &[ItemClass::Internet])
    }

    pub fn path(self, path: &str) -> Self {
        self.set_typed(keys::PATH, path.into(), &[ItemClass::Internet])
    }

    /// Port of an internet item; anything above 65535 fails at `build`
    pub fn port(mut self, port: u32) -> Self {
        match u16::try_from(port) {
            Ok(port) => self.set_typed(keys::PORT, port.into(), &[ItemClass::Internet]),
            Err(_) => {
                self.errors.push(format!("port {} is outside 0..=65535", port));
                self
            }
        }
    }

    pub fn protocol(self, protocol: Protocol) -> Self {
        self.set_typed(keys::PROTOCOL, protocol.code().into(), &[ItemClass::Internet])
    }

    /// Protocol given by name or code; unrecognized tags fail at `build`
    pub fn protocol_tag(mut self, tag: &str) -> Self {
        match tag.parse::<Protocol>() {
            Ok(protocol) => self.protocol(protocol),
            Err(e) => {
                self.errors.push(e.to_string());
                self
            }
        }
    }

    pub fn authentication_type(self, auth: AuthenticationType) -> Self {
        self.set_typed(keys::AUTHENTICATION_TYPE, auth.code().into(), &[ItemClass::Internet])
    }

    /// Authentication type given by name or code; unrecognized tags fail at `build`
    pub fn authentication_type_tag(mut self, tag: &str) -> Self {
        match tag.parse::<AuthenticationType>() {
            Ok(auth) => self.authentication_type(auth),
            Err(e) => {
                self.errors.push(e.to_string());
                self
            }
        }
    }

    /// Add a single caller-supplied attribute
    pub fn attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }

    /// Merge caller-supplied attributes
    pub fn extras(mut self, extras: Option<&Attributes>) -> Self {
        if let Some(extras) = extras {
            self.extras
                .extend(extras.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self
    }

    /// Validate and produce the query
    pub fn build(self) -> Result<CredentialQuery> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(KeychainError::InvalidAttribute(first));
        }

        let mut attributes = self.typed;
        for (key, value) in self.extras {
            if key.is_empty() {
                return Err(KeychainError::invalid("attribute keys must not be empty"));
            }
            if keys::is_reserved(&key) {
                warn!("Dropping extra attribute '{}': typed fields take precedence", key);
                continue;
            }
            attributes.insert(key, value);
        }

        Ok(CredentialQuery {
            class: self.class,
            attributes,
            absent: BTreeSet::new(),
        })
    }

    fn set_typed(mut self, key: &str, value: AttributeValue, classes: &[ItemClass]) -> Self {
        match self.class {
            Some(class) if !classes.contains(&class) => {
                self.errors
                    .push(format!("attribute '{}' does not apply to {} items", key, class));
            }
            None if classes.len() == 1 => {
                self.errors
                    .push(format!("attribute '{}' requires an item class", key));
            }
            _ => {
                self.typed.insert(key.to_string(), value);
            }
        }
        self
    }
}
