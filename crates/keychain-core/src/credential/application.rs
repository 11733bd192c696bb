//! Per-installation application identifier
//!
//! A generic item under a fixed service whose password is a random UUID.
//! At most one exists per store scope; that is kept by convention
//! (look up before generating), not by the store.

use std::ops::Deref;

use super::types::{Credential, GenericCredential};
use crate::attributes::{Attributes, ItemClass};
use crate::error::{KeychainError, Result};
use crate::store::RawRecord;

/// Service name of the application identifier item
pub const APPLICATION_IDENTIFIER_SERVICE: &str = "application-identifier";

/// Account name of the application identifier item
pub const APPLICATION_IDENTIFIER_ACCOUNT: &str = "application-identifier";

/// Generic credential carrying the application's UUID
#[derive(Debug, Clone)]
pub struct ApplicationIdentifierCredential {
    inner: GenericCredential,
}

impl ApplicationIdentifierCredential {
    /// The identifier in canonical hyphenated form
    pub fn uuid(&self) -> &str {
        self.inner.password()
    }

    pub fn into_generic(self) -> GenericCredential {
        self.inner
    }
}

impl TryFrom<GenericCredential> for ApplicationIdentifierCredential {
    type Error = KeychainError;

    fn try_from(inner: GenericCredential) -> Result<Self> {
        if inner.service() != APPLICATION_IDENTIFIER_SERVICE {
            return Err(KeychainError::invalid(format!(
                "service '{}' is not the application identifier service",
                inner.service()
            )));
        }
        Ok(Self { inner })
    }
}

impl TryFrom<RawRecord> for ApplicationIdentifierCredential {
    type Error = KeychainError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        GenericCredential::try_from(raw).and_then(Self::try_from)
    }
}

impl Deref for ApplicationIdentifierCredential {
    type Target = GenericCredential;

    fn deref(&self) -> &GenericCredential {
        &self.inner
    }
}

impl Credential for ApplicationIdentifierCredential {
    fn class(&self) -> ItemClass {
        ItemClass::Generic
    }

    fn account(&self) -> &str {
        self.inner.account()
    }

    fn password(&self) -> &str {
        self.inner.password()
    }

    fn attributes(&self) -> &Attributes {
        self.inner.attributes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::keys;
    use crate::secret::Secret;

    fn raw(service: &str) -> RawRecord {
        let mut attributes = Attributes::new();
        attributes.insert(keys::SERVICE.to_string(), service.into());
        attributes.insert(keys::ACCOUNT.to_string(), APPLICATION_IDENTIFIER_ACCOUNT.into());
        RawRecord {
            class: ItemClass::Generic,
            attributes,
            secret: Some(Secret::from("6f1c2a8e-3b0d-4f7e-9a51-2c4d8e9f0a1b")),
        }
    }

    #[test]
    fn test_uuid_is_password() {
        let cred = ApplicationIdentifierCredential::try_from(raw(APPLICATION_IDENTIFIER_SERVICE)).unwrap();
        assert_eq!(cred.uuid(), "6f1c2a8e-3b0d-4f7e-9a51-2c4d8e9f0a1b");
        assert_eq!(cred.service(), APPLICATION_IDENTIFIER_SERVICE);
    }

    #[test]
    fn test_other_service_rejected() {
        assert!(matches!(
            ApplicationIdentifierCredential::try_from(raw("svc")),
            Err(KeychainError::InvalidAttribute(_))
        ));
    }
}
