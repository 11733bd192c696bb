//! Keychain settings management
//!
//! Stores non-sensitive configuration in a plain JSON file: which backend to
//! use, the service namespace for OS keychain entries and whether session
//! locking is available.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{KeychainError, Result};
use crate::store::KeyringStore;

/// Get the default data directory for settings and the keychain manifest
pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "keychain-items", "keychain-items")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| KeychainError::unavailable("Could not determine data directory"))
}

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OS keychain through the `keyring` crate
    #[default]
    Keyring,
    /// Process-local store; nothing survives exit
    Memory,
}

/// Keychain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Which store backs the keychain
    pub backend: Backend,
    /// Service name under which OS keychain entries are filed
    pub namespace: String,
    /// Directory for the attribute manifest (defaults to the user data directory)
    pub data_dir: Option<PathBuf>,
    /// Override platform detection of session lock support
    pub session_locking: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            backend: Backend::Keyring,
            namespace: crate::store::DEFAULT_NAMESPACE.to_string(),
            data_dir: None,
            session_locking: None,
        }
    }
}

impl Settings {
    /// Get the effective manifest directory
    pub fn effective_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    /// Open the store these settings describe
    pub fn open_keyring_store(&self) -> Result<KeyringStore> {
        KeyringStore::with_dir(&self.namespace, &self.effective_data_dir()?)
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Create a settings manager for `settings.json` in the given directory
    pub fn new(storage_dir: &Path) -> Result<Self> {
        Self::from_file(storage_dir.join("settings.json"))
    }

    /// Create a settings manager for an explicit settings file
    pub fn from_file(settings_file: PathBuf) -> Result<Self> {
        let settings = Self::load_from_file(&settings_file)?;
        Ok(Self {
            settings_file,
            settings,
        })
    }

    /// Load settings from file
    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        if let Some(parent) = self.settings_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        std::fs::write(&temp_path, &contents)?;
        std::fs::rename(&temp_path, &self.settings_file)?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Get mutable settings
    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Update settings and save
    pub fn update(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save()
    }

    /// Reset settings to defaults and delete settings file
    pub fn reset(&mut self) -> Result<()> {
        self.settings = Settings::default();

        if self.settings_file.exists() {
            std::fs::remove_file(&self.settings_file)?;
        }

        Ok(())
    }
}
