// crates/stratum-providers/src/local_storage.rs
// ============================================================================
// Module: Local Temporary Storage
// Description: Host-local object storage rooted in a capability directory.
// Purpose: Hold bootstrap artifacts until the control node serves them.
// Dependencies: stratum-core, cap-std, sha2
// ============================================================================

//! ## Overview
//! [`LocalStorage`] keeps flat objects in a single directory opened through
//! `cap-std`, so every access is confined to that directory. Each object is
//! written with an atomic rename and paired with a hidden SHA-256 digest
//! file that is checked on every read. The store reports itself as
//! temporary: once the control node has an address, [`Storage::expose`]
//! returns the agent settings needed to serve it from there.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use sha2::Digest;
use sha2::Sha256;
use stratum_core::Storage;
use stratum_core::StorageError;
use tracing::debug;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum object name length.
const MAX_NAME_LENGTH: usize = 200;
/// Agent setting carrying the exposed storage address.
pub const STORAGE_ADDR_KEY: &str = "STORAGE_ADDR";
/// Agent setting carrying the storage directory on the control node.
pub const STORAGE_DIR_KEY: &str = "STORAGE_DIR";
/// Agent setting carrying the storage auth key.
pub const STORAGE_AUTH_KEY: &str = "STORAGE_AUTH_KEY";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`LocalStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStorageConfig {
    /// Directory holding the objects. Created when missing.
    pub root: PathBuf,
    /// Port the control node serves storage on once exposed.
    pub port: u16,
    /// Shared secret agents use to authenticate to exposed storage.
    pub auth_key: String,
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Host-local temporary storage.
///
/// # Invariants
/// - Object names never contain path separators or start with `.`.
/// - Every visible object has a digest file written after it.
pub struct LocalStorage {
    /// Storage configuration.
    config: LocalStorageConfig,
    /// Capability handle for the root directory.
    dir: Dir,
    /// Serializes object and digest updates.
    guard: Mutex<()>,
}

impl LocalStorage {
    /// Opens (creating if needed) local storage at the configured root.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the directory cannot be opened.
    pub fn open(config: LocalStorageConfig) -> Result<Self, StorageError> {
        Dir::create_ambient_dir_all(&config.root, ambient_authority()).map_err(io_error)?;
        let dir = Dir::open_ambient_dir(&config.root, ambient_authority()).map_err(io_error)?;
        debug!(root = %config.root.display(), "opened local storage");
        Ok(Self {
            config,
            dir,
            guard: Mutex::new(()),
        })
    }

    /// Returns the storage configuration.
    #[must_use]
    pub const fn config(&self) -> &LocalStorageConfig {
        &self.config
    }

    /// Acquires the update guard.
    fn lock(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.guard.lock().map_err(|_| StorageError::Io("local storage mutex poisoned".to_string()))
    }

    /// Writes bytes to `name` through a temporary sibling and rename.
    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let temp = format!(".tmp-{name}.{}", std::process::id());
        self.dir.write(&temp, data).map_err(io_error)?;
        if let Err(err) = self.dir.rename(&temp, &self.dir, name) {
            let _ = self.dir.remove_file(&temp);
            return Err(io_error(err));
        }
        Ok(())
    }

    /// Removes a file, treating absence as success.
    fn remove_quiet(&self, name: &str) -> Result<(), StorageError> {
        match self.dir.remove_file(name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(err)),
        }
    }
}

impl Storage for LocalStorage {
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        let _guard = self.lock()?;
        self.write_atomic(name, data)?;
        self.write_atomic(&digest_name(name), sha256_hex(data).as_bytes())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_name(name)?;
        let _guard = self.lock()?;
        let data = match self.dir.read(name) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(err) => return Err(io_error(err)),
        };
        let expected = self
            .dir
            .read_to_string(digest_name(name))
            .map_err(|_| StorageError::Corrupt(format!("{name}: digest missing")))?;
        if expected.trim() != sha256_hex(&data) {
            return Err(StorageError::Corrupt(format!("{name}: digest mismatch")));
        }
        Ok(data)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let _guard = self.lock()?;
        let mut names = Vec::new();
        for entry in self.dir.entries().map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with('.') && name.starts_with(prefix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        let _guard = self.lock()?;
        self.remove_quiet(name)?;
        self.remove_quiet(&digest_name(name))
    }

    fn remove_all(&self) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        for entry in self.dir.entries().map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            self.dir.remove_file(entry.file_name()).map_err(io_error)?;
        }
        Ok(())
    }

    fn url(&self, name: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        Url::from_file_path(self.config.root.join(name))
            .map(String::from)
            .map_err(|()| StorageError::InvalidName(format!("{name}: root is not absolute")))
    }

    fn is_temporary(&self) -> bool {
        true
    }

    fn expose(&self, address: &str) -> Result<BTreeMap<String, String>, StorageError> {
        if address.trim().is_empty() {
            return Err(StorageError::Expose("control node address is empty".to_string()));
        }
        debug!(address, port = self.config.port, "exposing local storage");
        Ok(BTreeMap::from([
            (STORAGE_ADDR_KEY.to_string(), format!("{address}:{}", self.config.port)),
            (STORAGE_DIR_KEY.to_string(), self.config.root.display().to_string()),
            (STORAGE_AUTH_KEY.to_string(), self.config.auth_key.clone()),
        ]))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects names that could escape the root or collide with digest files.
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || name.starts_with('.') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')) {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Returns the hidden digest file name for an object.
fn digest_name(name: &str) -> String {
    format!(".{name}.sha256")
}

/// Returns the lowercase hex SHA-256 of `data`.
fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Maps an I/O error into a storage error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err adapter.")]
fn io_error(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}
