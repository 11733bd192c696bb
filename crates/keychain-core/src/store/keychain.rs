//! OS Keychain store backend
//!
//! Uses the system keychain for secret data:
//! - macOS: Keychain
//! - Windows: Credential Manager (DPAPI)
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//!
//! The OS APIs behind `keyring` can only address an entry by service and user
//! name, so the searchable attributes of every item are kept in a JSON
//! manifest next to the settings. The manifest never contains secret data;
//! each item's secret lives in the keychain under `(namespace, item id)`.
//!
//! Every manifest read-modify-write runs under an advisory lock on
//! `<namespace>.manifest.lock`, so separate processes (or separate stores in
//! one process) sharing a data directory see each other's inserts.

use fs2::FileExt;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::table::{ItemTable, StoredItem};
use super::{RawRecord, SecureStore};
use crate::error::{KeychainError, Result};
use crate::query::CredentialQuery;
use crate::secret::Secret;
use crate::settings::default_data_dir;

/// Default service name used for keychain entries
pub const DEFAULT_NAMESPACE: &str = "keychain-items";

/// Manifest file format version
const MANIFEST_VERSION: u32 = 1;

/// File format for the attribute manifest
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    #[serde(flatten)]
    table: ItemTable,
}

/// Held manifest lock, released when dropped
struct ManifestLock<'a> {
    _file: File,
    _guard: MutexGuard<'a, ()>,
}

/// OS Keychain store backend
pub struct KeyringStore {
    /// Service name under which secrets are filed
    namespace: String,
    /// Location of the attribute manifest
    manifest_path: PathBuf,
    /// Advisory lock file guarding the manifest across processes
    lock_path: PathBuf,
    /// Keeps threads of this instance from queueing on the file lock
    guard: Mutex<()>,
}

impl KeyringStore {
    /// Create a keychain store using the default data directory
    pub fn new(namespace: &str) -> Result<Self> {
        Self::with_dir(namespace, &default_data_dir()?)
    }

    /// Create with a custom manifest directory (for testing)
    pub fn with_dir(namespace: &str, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(KeychainError::unavailable)?;

        let manifest_path = data_dir.join(format!("{}.manifest.json", namespace));
        let lock_path = data_dir.join(format!("{}.manifest.lock", namespace));
        debug!("Keychain manifest at: {:?}", manifest_path);

        Ok(Self {
            namespace: namespace.to_string(),
            manifest_path,
            lock_path,
            guard: Mutex::new(()),
        })
    }

    /// Test if the OS keychain accepts writes
    pub fn is_available(&self) -> bool {
        let entry = match Entry::new(&self.namespace, "__test_availability__") {
            Ok(entry) => entry,
            Err(_) => return false,
        };

        if entry.set_password("test").is_ok() {
            let _ = entry.delete_password();
            true
        } else {
            false
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Take the manifest lock; exclusive for writers, shared for readers
    fn lock(&self, exclusive: bool) -> Result<ManifestLock<'_>> {
        let guard = self
            .guard
            .lock()
            .map_err(|_| KeychainError::unavailable("keychain manifest lock poisoned"))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| {
                KeychainError::unavailable(format!(
                    "failed to open manifest lock '{}': {}",
                    self.lock_path.display(),
                    e
                ))
            })?;

        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        };
        locked.map_err(|e| {
            KeychainError::unavailable(format!("failed to lock keychain manifest: {}", e))
        })?;

        Ok(ManifestLock {
            _file: file,
            _guard: guard,
        })
    }

    fn load_table(&self) -> Result<ItemTable> {
        if !self.manifest_path.exists() {
            debug!("No keychain manifest found, starting empty");
            return Ok(ItemTable::default());
        }

        let contents =
            std::fs::read_to_string(&self.manifest_path).map_err(KeychainError::unavailable)?;
        let file: ManifestFile = serde_json::from_str(&contents)
            .map_err(|e| KeychainError::unavailable(format!("corrupt keychain manifest: {}", e)))?;

        if file.version != MANIFEST_VERSION {
            return Err(KeychainError::unavailable(format!(
                "unsupported keychain manifest version {}",
                file.version
            )));
        }

        Ok(file.table)
    }

    fn save_table(&self, table: ItemTable) -> Result<()> {
        let file = ManifestFile {
            version: MANIFEST_VERSION,
            table,
        };
        let contents = serde_json::to_string_pretty(&file).map_err(KeychainError::unavailable)?;

        // Write atomically using temp file
        let temp_path = self.manifest_path.with_extension("tmp");
        std::fs::write(&temp_path, contents).map_err(KeychainError::unavailable)?;
        std::fs::rename(&temp_path, &self.manifest_path).map_err(KeychainError::unavailable)?;
        Ok(())
    }

    /// Get the keyring entry holding an item's secret
    fn entry(&self, id: Uuid) -> Result<Entry> {
        Entry::new(&self.namespace, &id.to_string()).map_err(KeychainError::unavailable)
    }

    fn read_secret(&self, id: Uuid) -> Result<Option<Secret>> {
        match self.entry(id)?.get_password() {
            Ok(encoded) => Ok(Some(Secret::new(base64_decode(&encoded)?))),
            Err(keyring::Error::NoEntry) => {
                warn!("Keychain has no secret for manifest item {}", id);
                Ok(None)
            }
            Err(keyring::Error::NoStorageAccess(e)) => {
                debug!("Keychain denied secret access for {}: {}", id, e);
                Ok(None)
            }
            Err(e) => Err(KeychainError::unavailable(e)),
        }
    }

    fn write_secret(&self, id: Uuid, secret: &Secret) -> Result<()> {
        // Keychain stores strings
        self.entry(id)?
            .set_password(&base64_encode(secret.expose()))
            .map_err(KeychainError::unavailable)
    }

    fn delete_secret(&self, id: Uuid) -> Result<()> {
        match self.entry(id)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::unavailable(e)),
        }
    }

    fn to_record(&self, item: &StoredItem) -> Result<RawRecord> {
        Ok(RawRecord {
            class: item.class,
            attributes: item.attributes.clone(),
            secret: self.read_secret(item.id)?,
        })
    }
}

impl SecureStore for KeyringStore {
    fn search(&self, query: &CredentialQuery) -> Result<Vec<RawRecord>> {
        let _lock = self.lock(false)?;
        let table = self.load_table()?;

        let records = table
            .find(query)
            .into_iter()
            .map(|item| self.to_record(item))
            .collect::<Result<Vec<_>>>()?;

        debug!("Keychain search matched {} items", records.len());
        Ok(records)
    }

    fn add(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord> {
        let _lock = self.lock(true)?;
        let mut table = self.load_table()?;
        let item = table.insert(query)?;

        self.write_secret(item.id, secret)?;
        if let Err(e) = self.save_table(table) {
            if let Err(cleanup) = self.delete_secret(item.id) {
                warn!("Failed to remove orphaned secret {}: {}", item.id, cleanup);
            }
            return Err(e);
        }

        info!("Added {} item {} to keychain", item.class, item.id);
        Ok(RawRecord {
            class: item.class,
            attributes: item.attributes,
            secret: Some(secret.clone()),
        })
    }

    fn update(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord> {
        let _lock = self.lock(true)?;
        let mut table = self.load_table()?;
        let id = table.single(query)?.id;
        let item = table.touch(id)?;

        self.write_secret(id, secret)?;
        self.save_table(table)?;

        info!("Updated keychain item {}", id);
        Ok(RawRecord {
            class: item.class,
            attributes: item.attributes,
            secret: Some(secret.clone()),
        })
    }

    fn delete(&self, query: &CredentialQuery) -> Result<()> {
        let _lock = self.lock(true)?;
        let mut table = self.load_table()?;
        let id = table.single(query)?.id;

        // Secret first: a failure here leaves the item intact and addressable
        self.delete_secret(id)?;
        table.remove(id);
        self.save_table(table)?;

        info!("Deleted keychain item {}", id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        return "macOS Keychain";

        #[cfg(target_os = "windows")]
        return "Windows Credential Manager";

        #[cfg(target_os = "linux")]
        return "Linux Secret Service";

        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        return "System Keychain";
    }
}

/// Base64 encode bytes
fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Base64 decode string
fn base64_decode(encoded: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| KeychainError::unavailable(format!("Base64 decode error: {}", e)))
}
