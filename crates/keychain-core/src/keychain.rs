//! Keychain facade
//!
//! Ties the query builder, a store backend and the session lock together and
//! exposes the typed create/lookup/list/update/remove operations.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::attributes::Attributes;
use crate::credential::{
    ApplicationIdentifierCredential, Credential, CredentialRecord, GenericCredential,
    InternetCredential, InternetTarget, APPLICATION_IDENTIFIER_ACCOUNT,
    APPLICATION_IDENTIFIER_SERVICE,
};
use crate::error::{KeychainError, Result};
use crate::lock::SessionLock;
use crate::query::{CredentialQuery, QueryBuilder};
use crate::secret::Secret;
use crate::settings::{Backend, Settings};
use crate::store::{MemoryStore, RawRecord, SecureStore};

/// Entry point for all keychain operations
///
/// Cheap to clone; clones share the store and the session lock.
#[derive(Clone)]
pub struct Keychain {
    store: Arc<dyn SecureStore>,
    session: SessionLock,
}

impl Keychain {
    /// Create a keychain over a store, with session locking as the platform allows
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self::with_session(store, SessionLock::for_platform())
    }

    /// Create a keychain with an explicit session lock (for testing)
    pub fn with_session(store: Arc<dyn SecureStore>, session: SessionLock) -> Self {
        debug!("Keychain using {}", store.backend_name());
        Self { store, session }
    }

    /// Create a keychain over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Create the keychain described by the settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn SecureStore> = match settings.backend {
            Backend::Keyring => Arc::new(settings.open_keyring_store()?),
            Backend::Memory => Arc::new(MemoryStore::new()),
        };

        let session = match settings.session_locking {
            Some(supported) => SessionLock::new(supported),
            None => SessionLock::for_platform(),
        };

        Ok(Self::with_session(store, session))
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn session(&self) -> &SessionLock {
        &self.session
    }

    /// Lock the keychain for this session; a no-op where unsupported
    pub fn lock_store(&self) {
        self.session.lock();
    }

    /// Unlock the keychain for this session; a no-op where unsupported
    pub fn unlock_store(&self) {
        self.session.unlock();
    }

    pub fn is_locked(&self) -> bool {
        self.session.is_locked()
    }

    /// Run any query and wrap every match
    pub fn search(&self, query: &CredentialQuery) -> Result<Vec<CredentialRecord>> {
        self.search_raw(query)?
            .into_iter()
            .map(CredentialRecord::try_from)
            .collect()
    }

    /// Find the generic item for a service and account
    pub fn lookup_generic(
        &self,
        service: &str,
        account: &str,
        extra: Option<&Attributes>,
    ) -> Result<GenericCredential> {
        let query = QueryBuilder::generic()
            .service(service)
            .account(account)
            .extras(extra)
            .build()?;

        GenericCredential::try_from(self.single_raw(&query)?)
    }

    /// List every generic item of a service
    pub fn list_generic(
        &self,
        service: &str,
        extra: Option<&Attributes>,
    ) -> Result<Vec<GenericCredential>> {
        let query = QueryBuilder::generic()
            .service(service)
            .extras(extra)
            .build()?;

        self.search_raw(&query)?
            .into_iter()
            .map(GenericCredential::try_from)
            .collect()
    }

    /// Add a generic item; fails with `DuplicateItem` if the service/account pair exists
    pub fn create_generic(
        &self,
        service: &str,
        account: &str,
        password: &str,
        extra: Option<&Attributes>,
    ) -> Result<GenericCredential> {
        let query = QueryBuilder::generic()
            .service(service)
            .account(account)
            .extras(extra)
            .build()?;

        let record = self.add_raw(&query, password)?;
        info!("Created generic item for service '{}'", service);
        GenericCredential::try_from(record)
    }

    /// Find the internet item for an endpoint and account
    pub fn lookup_internet(
        &self,
        target: &InternetTarget,
        account: &str,
        extra: Option<&Attributes>,
    ) -> Result<InternetCredential> {
        let query = target.query().account(account).extras(extra).build()?;

        InternetCredential::try_from(self.single_raw(&query)?)
    }

    /// List every internet item matching an endpoint
    pub fn list_internet(
        &self,
        target: &InternetTarget,
        extra: Option<&Attributes>,
    ) -> Result<Vec<InternetCredential>> {
        let query = target.query().extras(extra).build()?;

        self.search_raw(&query)?
            .into_iter()
            .map(InternetCredential::try_from)
            .collect()
    }

    /// Add an internet item; fails with `DuplicateItem` if the identity exists
    pub fn create_internet(
        &self,
        target: &InternetTarget,
        account: &str,
        password: &str,
        extra: Option<&Attributes>,
    ) -> Result<InternetCredential> {
        let server = target
            .server
            .as_deref()
            .ok_or_else(|| KeychainError::invalid("an internet item requires a server"))?;
        let query = target.query().account(account).extras(extra).build()?;

        let record = self.add_raw(&query, password)?;
        info!("Created internet item for server '{}'", server);
        InternetCredential::try_from(record)
    }

    /// Replace the password of a stored item and return the refreshed record.
    /// The record passed in keeps its old values.
    pub fn update_password<C>(&self, record: &C, password: &str) -> Result<C>
    where
        C: Credential + TryFrom<RawRecord, Error = KeychainError>,
    {
        self.session.ensure_unlocked()?;
        let updated = self
            .store
            .update(&record.identity_query(), &Secret::from(password))?;

        info!("Updated password of a {} item", record.class());
        C::try_from(updated)
    }

    /// Delete a record's item; `ItemNotFound` if it is already gone
    pub fn remove<C: Credential + ?Sized>(&self, record: &C) -> Result<()> {
        self.session.ensure_unlocked()?;
        self.store.delete(&record.identity_query())?;

        info!("Removed {} item", record.class());
        Ok(())
    }

    /// The application identifier, generating and storing one on first use
    pub fn application_identifier(&self) -> Result<String> {
        self.application_identifier_credential()
            .map(|item| item.uuid().to_string())
    }

    /// The application identifier item, generating it on first use.
    /// Losing a concurrent first-use race yields the winner's item.
    pub fn application_identifier_credential(&self) -> Result<ApplicationIdentifierCredential> {
        if let Some(existing) = self.application_identifier_item()? {
            return Ok(existing);
        }

        match self.generate_application_identifier_item() {
            Ok(created) => Ok(created),
            Err(KeychainError::DuplicateItem) => {
                debug!("Application identifier created concurrently, re-reading");
                self.application_identifier_item()?
                    .ok_or(KeychainError::ItemNotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Look up the application identifier item without creating one
    pub fn application_identifier_item(&self) -> Result<Option<ApplicationIdentifierCredential>> {
        match self.lookup_generic(
            APPLICATION_IDENTIFIER_SERVICE,
            APPLICATION_IDENTIFIER_ACCOUNT,
            None,
        ) {
            Ok(item) => ApplicationIdentifierCredential::try_from(item).map(Some),
            Err(KeychainError::ItemNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store a newly generated application identifier.
    /// Fails with `DuplicateItem` if one already exists.
    pub fn generate_application_identifier_item(&self) -> Result<ApplicationIdentifierCredential> {
        let uuid = Uuid::new_v4().to_string();
        let item = self.create_generic(
            APPLICATION_IDENTIFIER_SERVICE,
            APPLICATION_IDENTIFIER_ACCOUNT,
            &uuid,
            None,
        )?;

        info!("Generated application identifier");
        ApplicationIdentifierCredential::try_from(item)
    }

    fn search_raw(&self, query: &CredentialQuery) -> Result<Vec<RawRecord>> {
        self.session.ensure_unlocked()?;
        self.store.search(query)
    }

    fn single_raw(&self, query: &CredentialQuery) -> Result<RawRecord> {
        let mut records = self.search_raw(query)?;
        match records.len() {
            0 => Err(KeychainError::ItemNotFound),
            1 => Ok(records.remove(0)),
            count => Err(KeychainError::AmbiguousMatch { count }),
        }
    }

    fn add_raw(&self, query: &CredentialQuery, password: &str) -> Result<RawRecord> {
        self.session.ensure_unlocked()?;
        self.store.add(query, &Secret::from(password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{keys, AuthenticationType, ItemClass, Protocol};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    /// Delegates to a memory store, counting calls. With a barrier, the first
    /// two searches wait for each other so both callers see an empty store.
    struct RecordingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
        searches: AtomicUsize,
        barrier: Option<Barrier>,
    }

    impl RecordingStore {
        fn new(barrier: Option<Barrier>) -> Self {
            Self {
                inner: MemoryStore::new(),
                calls: AtomicUsize::new(0),
                searches: AtomicUsize::new(0),
                barrier,
            }
        }
    }

    impl SecureStore for RecordingStore {
        fn search(&self, query: &CredentialQuery) -> Result<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.inner.search(query);
            if let Some(barrier) = &self.barrier {
                if self.searches.fetch_add(1, Ordering::SeqCst) < 2 {
                    barrier.wait();
                }
            }
            result
        }

        fn add(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.add(query, secret)
        }

        fn update(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.update(query, secret)
        }

        fn delete(&self, query: &CredentialQuery) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(query)
        }

        fn backend_name(&self) -> &'static str {
            "Recording store"
        }
    }

    fn test_keychain() -> Keychain {
        Keychain::with_session(Arc::new(MemoryStore::new()), SessionLock::new(true))
    }

    fn endpoint() -> InternetTarget {
        InternetTarget::new("example.com")
            .with_port(443)
            .with_protocol(Protocol::Https)
            .with_authentication_type(AuthenticationType::HtmlForm)
    }

    #[test]
    fn test_create_and_lookup_generic() {
        let keychain = test_keychain();

        let created = keychain.create_generic("svc", "bob", "x", None).unwrap();
        assert_eq!(created.service(), "svc");
        assert!(created.created_at().is_some());

        let found = keychain.lookup_generic("svc", "bob", None).unwrap();
        assert_eq!(found.account(), "bob");
        assert_eq!(found.password(), "x");
    }

    #[test]
    fn test_duplicate_generic() {
        let keychain = test_keychain();
        keychain.create_generic("svc", "bob", "x", None).unwrap();

        let err = keychain.create_generic("svc", "bob", "y", None).unwrap_err();
        assert!(matches!(err, KeychainError::DuplicateItem));

        let found = keychain.lookup_generic("svc", "bob", None).unwrap();
        assert_eq!(found.password(), "x");
    }

    #[test]
    fn test_negative_lookup_and_empty_list() {
        let keychain = test_keychain();

        let err = keychain.lookup_generic("svc", "ghost", None).unwrap_err();
        assert!(err.is_not_found());
        assert!(keychain.list_generic("svc", None).unwrap().is_empty());
    }

    #[test]
    fn test_list_generic_by_service() {
        let keychain = test_keychain();
        keychain.create_generic("svc", "bob", "x", None).unwrap();
        keychain.create_generic("svc", "alice", "y", None).unwrap();
        keychain.create_generic("other", "bob", "z", None).unwrap();

        let mut accounts: Vec<String> = keychain
            .list_generic("svc", None)
            .unwrap()
            .iter()
            .map(|c| c.account().to_string())
            .collect();
        accounts.sort();
        assert_eq!(accounts, vec!["alice", "bob"]);
    }

    #[test]
    fn test_lookup_with_extras_filters() {
        let keychain = test_keychain();
        let mut extra = Attributes::new();
        extra.insert(keys::LABEL.to_string(), "Work".into());
        keychain.create_generic("svc", "bob", "x", Some(&extra)).unwrap();

        let found = keychain.lookup_generic("svc", "bob", Some(&extra)).unwrap();
        assert_eq!(found.label(), Some("Work"));

        let mut other = Attributes::new();
        other.insert(keys::LABEL.to_string(), "Home".into());
        assert!(keychain.lookup_generic("svc", "bob", Some(&other)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_extra_cannot_override_account() {
        let keychain = test_keychain();
        let mut extra = Attributes::new();
        extra.insert(keys::ACCOUNT.to_string(), "mallory".into());

        let created = keychain.create_generic("svc", "bob", "x", Some(&extra)).unwrap();
        assert_eq!(created.account(), "bob");
        assert!(keychain.lookup_generic("svc", "mallory", None).is_err());
    }

    #[test]
    fn test_ambiguous_lookup() {
        let keychain = test_keychain();
        keychain.create_internet(&endpoint().with_path("/a"), "bob", "x", None).unwrap();
        keychain.create_internet(&endpoint().with_path("/b"), "bob", "y", None).unwrap();

        let err = keychain.lookup_internet(&endpoint(), "bob", None).unwrap_err();
        assert!(matches!(err, KeychainError::AmbiguousMatch { count: 2 }));

        let found = keychain.lookup_internet(&endpoint().with_path("/b"), "bob", None).unwrap();
        assert_eq!(found.password(), "y");
    }

    #[test]
    fn test_remove_twice() {
        let keychain = test_keychain();
        let created = keychain.create_generic("svc", "bob", "x", None).unwrap();

        created.remove_from(&keychain).unwrap();
        let err = created.remove_from(&keychain).unwrap_err();
        assert!(matches!(err, KeychainError::ItemNotFound));
    }

    #[test]
    fn test_internet_roundtrip() {
        let keychain = test_keychain();
        let target = endpoint().with_security_domain("realm").with_path("/login");

        keychain.create_internet(&target, "alice", "pw", None).unwrap();
        let found = keychain.lookup_internet(&target, "alice", None).unwrap();

        assert_eq!(found.server(), "example.com");
        assert_eq!(found.security_domain(), Some("realm"));
        assert_eq!(found.path(), Some("/login"));
        assert_eq!(found.port(), 443);
        assert_eq!(found.protocol(), Some(Protocol::Https));
        assert_eq!(found.authentication_type(), Some(AuthenticationType::HtmlForm));
        assert_eq!(found.password(), "pw");
    }

    #[test]
    fn test_duplicate_internet() {
        let keychain = test_keychain();
        keychain.create_internet(&endpoint(), "bob", "x", None).unwrap();

        let err = keychain.create_internet(&endpoint(), "bob", "y", None).unwrap_err();
        assert!(matches!(err, KeychainError::DuplicateItem));

        let found = keychain.lookup_internet(&endpoint(), "bob", None).unwrap();
        assert_eq!(found.password(), "x");
    }

    #[test]
    fn test_negative_internet_lookup() {
        let keychain = test_keychain();
        keychain.create_internet(&endpoint(), "bob", "x", None).unwrap();

        let err = keychain.lookup_internet(&endpoint(), "ghost", None).unwrap_err();
        assert!(matches!(err, KeychainError::ItemNotFound));

        let elsewhere = InternetTarget::new("other.example");
        assert!(keychain.lookup_internet(&elsewhere, "bob", None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_internet_twice() {
        let keychain = test_keychain();
        let created = keychain.create_internet(&endpoint(), "bob", "x", None).unwrap();

        created.remove_from(&keychain).unwrap();
        assert!(keychain.lookup_internet(&endpoint(), "bob", None).unwrap_err().is_not_found());

        let err = created.remove_from(&keychain).unwrap_err();
        assert!(matches!(err, KeychainError::ItemNotFound));
    }

    #[test]
    fn test_internet_records_with_and_without_optional_fields() {
        let keychain = test_keychain();
        let bare = InternetTarget::new("example.com");
        let with_port = InternetTarget::new("example.com").with_port(443);
        let with_path = InternetTarget::new("example.com").with_path("/login");

        let bare_record = keychain.create_internet(&bare, "bob", "a", None).unwrap();
        let port_record = keychain.create_internet(&with_port, "bob", "b", None).unwrap();
        let path_record = keychain.create_internet(&with_path, "bob", "c", None).unwrap();
        assert_eq!(bare_record.port(), 0);

        let updated = keychain.update_password(&bare_record, "a2").unwrap();
        assert_eq!(updated.password(), "a2");
        assert_eq!(updated.port(), 0);

        keychain.remove(&bare_record).unwrap();
        assert!(matches!(keychain.remove(&bare_record), Err(KeychainError::ItemNotFound)));

        let remaining = keychain.list_internet(&bare, None).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|r| r.password() != "a2"));

        keychain.remove(&path_record).unwrap();
        let found = keychain.lookup_internet(&bare, "bob", None).unwrap();
        assert_eq!(found.port(), 443);

        keychain.remove(&port_record).unwrap();
        assert!(keychain.list_internet(&bare, None).unwrap().is_empty());
    }

    #[test]
    fn test_list_internet_without_identity_fields() {
        let keychain = test_keychain();
        keychain.create_internet(&InternetTarget::new("a.example"), "bob", "x", None).unwrap();
        keychain.create_internet(&InternetTarget::new("b.example"), "bob", "y", None).unwrap();
        keychain.create_generic("svc", "bob", "z", None).unwrap();

        assert_eq!(keychain.list_internet(&InternetTarget::any(), None).unwrap().len(), 2);
        assert_eq!(
            keychain.list_internet(&InternetTarget::new("a.example"), None).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_create_internet_requires_server() {
        let keychain = test_keychain();
        let err = keychain
            .create_internet(&InternetTarget::any(), "bob", "x", None)
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidAttribute(_)));
    }

    #[test]
    fn test_port_boundary_checked_before_store() {
        let store = Arc::new(RecordingStore::new(None));
        let keychain = Keychain::with_session(store.clone(), SessionLock::unsupported());

        let max = InternetTarget::new("example.com").with_port(65535);
        let created = keychain.create_internet(&max, "bob", "x", None).unwrap();
        assert_eq!(created.port(), 65535);
        let calls = store.calls.load(Ordering::SeqCst);

        let over = InternetTarget::new("example.com").with_port(65536);
        let err = keychain.create_internet(&over, "bob", "x", None).unwrap_err();
        assert!(matches!(err, KeychainError::InvalidAttribute(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_search_any_class() {
        let keychain = test_keychain();
        keychain.create_generic("svc", "bob", "x", None).unwrap();
        keychain.create_internet(&endpoint(), "bob", "y", None).unwrap();
        keychain.create_generic("svc", "alice", "z", None).unwrap();

        let query = QueryBuilder::any().account("bob").build().unwrap();
        let records = keychain.search(&query).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.class() == ItemClass::Generic));
        assert!(records.iter().any(|r| r.class() == ItemClass::Internet));
    }

    #[test]
    fn test_update_password() {
        let keychain = test_keychain();
        let original = keychain.create_generic("svc", "bob", "x", None).unwrap();

        let updated = keychain.update_password(&original, "new").unwrap();
        assert_eq!(updated.password(), "new");
        assert_eq!(original.password(), "x");
        assert!(updated.modified_at() >= original.modified_at());

        let found = keychain.lookup_generic("svc", "bob", None).unwrap();
        assert_eq!(found.password(), "new");
    }

    #[test]
    fn test_update_removed_item() {
        let keychain = test_keychain();
        let created = keychain.create_generic("svc", "bob", "x", None).unwrap();
        keychain.remove(&created).unwrap();

        assert!(keychain.update_password(&created, "new").unwrap_err().is_not_found());
    }

    #[test]
    fn test_locked_store() {
        let keychain = test_keychain();
        let created = keychain.create_generic("svc", "bob", "x", None).unwrap();

        keychain.lock_store();
        assert!(keychain.is_locked());
        assert!(matches!(
            keychain.lookup_generic("svc", "bob", None),
            Err(KeychainError::StoreUnavailable(_))
        ));
        assert!(matches!(
            keychain.list_generic("svc", None),
            Err(KeychainError::StoreUnavailable(_))
        ));
        assert!(matches!(
            keychain.create_generic("svc", "alice", "y", None),
            Err(KeychainError::StoreUnavailable(_))
        ));
        assert!(matches!(
            keychain.remove(&created),
            Err(KeychainError::StoreUnavailable(_))
        ));
        assert!(matches!(
            keychain.application_identifier(),
            Err(KeychainError::StoreUnavailable(_))
        ));

        keychain.unlock_store();
        assert!(keychain.lookup_generic("svc", "bob", None).is_ok());
    }

    #[test]
    fn test_lock_unsupported_is_noop() {
        let keychain =
            Keychain::with_session(Arc::new(MemoryStore::new()), SessionLock::unsupported());
        keychain.lock_store();

        assert!(!keychain.is_locked());
        assert!(keychain.create_generic("svc", "bob", "x", None).is_ok());
    }

    #[test]
    fn test_secret_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let keychain = Keychain::with_session(store.clone(), SessionLock::unsupported());
        keychain.create_generic("svc", "bob", "x", None).unwrap();

        store.set_deny_secret_access(true);
        assert!(matches!(
            keychain.lookup_generic("svc", "bob", None),
            Err(KeychainError::SecretUnavailable)
        ));
    }

    #[test]
    fn test_application_identifier_is_stable() {
        let keychain = test_keychain();
        assert!(keychain.application_identifier_item().unwrap().is_none());

        let first = keychain.application_identifier().unwrap();
        let second = keychain.application_identifier().unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        assert!(matches!(
            keychain.generate_application_identifier_item(),
            Err(KeychainError::DuplicateItem)
        ));
    }

    #[test]
    fn test_application_identifier_race() {
        let store = Arc::new(RecordingStore::new(Some(Barrier::new(2))));
        let keychain = Keychain::with_session(store, SessionLock::unsupported());

        let (a, b) = std::thread::scope(|scope| {
            let first = scope.spawn(|| keychain.application_identifier());
            let second = scope.spawn(|| keychain.application_identifier());
            (first.join().unwrap(), second.join().unwrap())
        });

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(
            keychain
                .list_generic(APPLICATION_IDENTIFIER_SERVICE, None)
                .unwrap()
                .len(),
            1
        );
    }
}
