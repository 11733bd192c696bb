//! Session lock for the secure store
//!
//! Desktop keychains can be locked for the whole login session. A
//! [`SessionLock`] models that gate as an explicit value owned by each
//! [`Keychain`](crate::Keychain): while locked, every store operation fails
//! with `StoreUnavailable`. Where the platform has no session locking the
//! lock is inert and `lock`/`unlock` do nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{KeychainError, Result};

/// Whether the current platform exposes session-level keychain locking
pub fn platform_supports_locking() -> bool {
    cfg!(target_os = "macos")
}

/// Advisory lock/unlock gate shared by clones of a keychain
#[derive(Debug, Clone)]
pub struct SessionLock {
    supported: bool,
    locked: Arc<AtomicBool>,
}

impl SessionLock {
    /// Lock gate matching the current platform
    pub fn for_platform() -> Self {
        Self::new(platform_supports_locking())
    }

    /// Lock gate with explicit support; starts unlocked
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Gate that ignores lock requests
    pub fn unsupported() -> Self {
        Self::new(false)
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_locked(&self) -> bool {
        self.supported && self.locked.load(Ordering::SeqCst)
    }

    pub fn lock(&self) {
        if !self.supported {
            debug!("Session locking unsupported on this platform, ignoring lock");
            return;
        }
        self.locked.store(true, Ordering::SeqCst);
        info!("Keychain locked");
    }

    pub fn unlock(&self) {
        if !self.supported {
            debug!("Session locking unsupported on this platform, ignoring unlock");
            return;
        }
        self.locked.store(false, Ordering::SeqCst);
        info!("Keychain unlocked");
    }

    /// Fail with `StoreUnavailable` while locked
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(KeychainError::unavailable("the keychain is locked"));
        }
        Ok(())
    }
}

impl Default for SessionLock {
    fn default() -> Self {
        Self::for_platform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_and_unlock() {
        let lock = SessionLock::new(true);
        assert!(lock.ensure_unlocked().is_ok());

        lock.lock();
        assert!(lock.is_locked());
        assert!(matches!(
            lock.ensure_unlocked(),
            Err(KeychainError::StoreUnavailable(_))
        ));

        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_double_lock_is_idempotent() {
        let lock = SessionLock::new(true);
        lock.lock();
        lock.lock();
        lock.unlock();
        assert!(lock.ensure_unlocked().is_ok());
    }

    #[test]
    fn test_unsupported_is_noop() {
        let lock = SessionLock::unsupported();
        lock.lock();
        assert!(!lock.is_locked());
        assert!(lock.ensure_unlocked().is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let lock = SessionLock::new(true);
        let other = lock.clone();
        lock.lock();
        assert!(other.is_locked());
    }
}
