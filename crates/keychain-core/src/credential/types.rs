//! Credential record types
//!
//! Records are read-only views over one stored item. They can only be built
//! from a store response that carried the identifying attributes and the
//! secret; anything less is an error, never a half-filled record.

use chrono::{DateTime, Utc};

use crate::attributes::{keys, AttributeValue, Attributes, AuthenticationType, ItemClass, Protocol};
use crate::error::{KeychainError, Result};
use crate::keychain::Keychain;
use crate::query::{CredentialQuery, QueryBuilder};
use crate::secret::Password;
use crate::store::RawRecord;

/// Read-only accessors shared by every credential kind
pub trait Credential {
    /// Class of the underlying keychain item
    fn class(&self) -> ItemClass;

    fn account(&self) -> &str;

    /// The password (use carefully)
    fn password(&self) -> &str;

    /// Every attribute of the item, typed fields included
    fn attributes(&self) -> &Attributes;

    /// Look up any attribute by key; unknown keys yield `None`
    fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes().get(key)
    }

    fn label(&self) -> Option<&str> {
        self.attribute(keys::LABEL).and_then(AttributeValue::as_str)
    }

    fn comment(&self) -> Option<&str> {
        self.attribute(keys::COMMENT).and_then(AttributeValue::as_str)
    }

    fn description(&self) -> Option<&str> {
        self.attribute(keys::DESCRIPTION).and_then(AttributeValue::as_str)
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.attribute(keys::CREATION_DATE).and_then(AttributeValue::as_date)
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.attribute(keys::MODIFICATION_DATE).and_then(AttributeValue::as_date)
    }

    /// Query addressing exactly this item in the store
    fn identity_query(&self) -> CredentialQuery {
        CredentialQuery::identity(self.class(), self.attributes())
    }

    /// Delete this item from the keychain.
    /// A handle whose item was already removed reports `ItemNotFound`.
    fn remove_from(&self, keychain: &Keychain) -> Result<()>
    where
        Self: Sized,
    {
        keychain.remove(self)
    }
}

/// Fields common to every record
#[derive(Debug, Clone)]
struct ItemBase {
    account: String,
    password: Password,
    attributes: Attributes,
}

impl ItemBase {
    fn from_raw(raw: RawRecord, expected: ItemClass) -> Result<Self> {
        if raw.class != expected {
            return Err(KeychainError::invalid(format!(
                "expected a {} item, found {}",
                expected, raw.class
            )));
        }

        let account = required_str(&raw.attributes, keys::ACCOUNT)?;
        let secret = raw.secret.ok_or(KeychainError::SecretUnavailable)?;

        Ok(Self {
            account,
            password: secret.to_password()?,
            attributes: raw.attributes,
        })
    }
}

fn required_str(attributes: &Attributes, key: &str) -> Result<String> {
    optional_str(attributes, key)?
        .ok_or_else(|| KeychainError::invalid(format!("item is missing '{}'", key)))
}

fn optional_str(attributes: &Attributes, key: &str) -> Result<Option<String>> {
    match attributes.get(key) {
        None => Ok(None),
        Some(AttributeValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(KeychainError::invalid(format!(
            "attribute '{}' should be a string, found {:?}",
            key, other
        ))),
    }
}

/// Service/account password
#[derive(Debug, Clone)]
pub struct GenericCredential {
    base: ItemBase,
    service: String,
}

impl GenericCredential {
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl TryFrom<RawRecord> for GenericCredential {
    type Error = KeychainError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let service = required_str(&raw.attributes, keys::SERVICE)?;
        Ok(Self {
            base: ItemBase::from_raw(raw, ItemClass::Generic)?,
            service,
        })
    }
}

impl Credential for GenericCredential {
    fn class(&self) -> ItemClass {
        ItemClass::Generic
    }

    fn account(&self) -> &str {
        &self.base.account
    }

    fn password(&self) -> &str {
        self.base.password.expose()
    }

    fn attributes(&self) -> &Attributes {
        &self.base.attributes
    }
}

/// Password scoped to a network endpoint
#[derive(Debug, Clone)]
pub struct InternetCredential {
    base: ItemBase,
    server: String,
    security_domain: Option<String>,
    path: Option<String>,
    port: u16,
    protocol: Option<Protocol>,
    authentication_type: Option<AuthenticationType>,
}

impl InternetCredential {
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn security_domain(&self) -> Option<&str> {
        self.security_domain.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Port of the endpoint, 0 when unspecified
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    pub fn authentication_type(&self) -> Option<AuthenticationType> {
        self.authentication_type
    }
}

impl TryFrom<RawRecord> for InternetCredential {
    type Error = KeychainError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let attrs = &raw.attributes;
        let server = required_str(attrs, keys::SERVER)?;
        let security_domain = optional_str(attrs, keys::SECURITY_DOMAIN)?;
        let path = optional_str(attrs, keys::PATH)?;

        let port = match attrs.get(keys::PORT) {
            None => 0,
            Some(value) => value
                .as_integer()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| KeychainError::invalid(format!("invalid port {:?}", value)))?,
        };

        let protocol = optional_str(attrs, keys::PROTOCOL)?
            .map(|code| {
                Protocol::from_code(&code)
                    .ok_or_else(|| KeychainError::invalid(format!("unrecognized protocol '{}'", code)))
            })
            .transpose()?;

        let authentication_type = optional_str(attrs, keys::AUTHENTICATION_TYPE)?
            .map(|code| {
                AuthenticationType::from_code(&code).ok_or_else(|| {
                    KeychainError::invalid(format!("unrecognized authentication type '{}'", code))
                })
            })
            .transpose()?;

        Ok(Self {
            base: ItemBase::from_raw(raw, ItemClass::Internet)?,
            server,
            security_domain,
            path,
            port,
            protocol,
            authentication_type,
        })
    }
}

impl Credential for InternetCredential {
    fn class(&self) -> ItemClass {
        ItemClass::Internet
    }

    fn account(&self) -> &str {
        &self.base.account
    }

    fn password(&self) -> &str {
        self.base.password.expose()
    }

    fn attributes(&self) -> &Attributes {
        &self.base.attributes
    }
}

/// Any credential, as returned by class-agnostic searches
#[derive(Debug, Clone)]
pub enum CredentialRecord {
    Generic(GenericCredential),
    Internet(InternetCredential),
}

impl CredentialRecord {
    pub fn as_generic(&self) -> Option<&GenericCredential> {
        match self {
            Self::Generic(c) => Some(c),
            Self::Internet(_) => None,
        }
    }

    pub fn as_internet(&self) -> Option<&InternetCredential> {
        match self {
            Self::Internet(c) => Some(c),
            Self::Generic(_) => None,
        }
    }

    fn inner(&self) -> &dyn Credential {
        match self {
            Self::Generic(c) => c,
            Self::Internet(c) => c,
        }
    }
}

impl TryFrom<RawRecord> for CredentialRecord {
    type Error = KeychainError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        match raw.class {
            ItemClass::Generic => GenericCredential::try_from(raw).map(Self::Generic),
            ItemClass::Internet => InternetCredential::try_from(raw).map(Self::Internet),
        }
    }
}

impl Credential for CredentialRecord {
    fn class(&self) -> ItemClass {
        self.inner().class()
    }

    fn account(&self) -> &str {
        self.inner().account()
    }

    fn password(&self) -> &str {
        self.inner().password()
    }

    fn attributes(&self) -> &Attributes {
        self.inner().attributes()
    }
}

/// Network endpoint an internet credential is scoped to
///
/// `None` fields leave that part of the endpoint unconstrained when searching
/// and absent when creating. The port is range-checked when the query is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternetTarget {
    pub server: Option<String>,
    pub security_domain: Option<String>,
    pub path: Option<String>,
    pub port: Option<u32>,
    pub protocol: Option<Protocol>,
    pub authentication_type: Option<AuthenticationType>,
}

impl InternetTarget {
    pub fn new(server: &str) -> Self {
        Self {
            server: Some(server.to_string()),
            ..Self::default()
        }
    }

    /// Target matching every internet item
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_security_domain(mut self, domain: &str) -> Self {
        self.security_domain = Some(domain.to_string());
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_port(mut self, port: u32) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_authentication_type(mut self, auth: AuthenticationType) -> Self {
        self.authentication_type = Some(auth);
        self
    }

    /// Start an internet query constrained by this target
    pub(crate) fn query(&self) -> QueryBuilder {
        let mut builder = QueryBuilder::internet();
        if let Some(server) = &self.server {
            builder = builder.server(server);
        }
        if let Some(domain) = &self.security_domain {
            builder = builder.security_domain(domain);
        }
        if let Some(path) = &self.path {
            builder = builder.path(path);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(protocol) = self.protocol {
            builder = builder.protocol(protocol);
        }
        if let Some(auth) = self.authentication_type {
            builder = builder.authentication_type(auth);
        }
        builder
    }
}
