//! Mutex-Guarded Engine Facade
//!
//! The process-wide store shared by every connection task. A single mutex
//! serializes all table access; each public operation takes the lock for
//! exactly one table operation and materializes any borrowed result into an
//! owned value before releasing it.
//!
//! The facade also owns the persistence policy: the configured snapshot file
//! is loaded on open (missing file = clean bootstrap) and written back on
//! shutdown when auto-save is enabled and the store is non-empty.
//!
//! # Example
//!
//! ```
//! use ferrokv::storage::{EngineConfig, KvEngine};
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let engine = KvEngine::open(EngineConfig {
//!     db_file: dir.path().join("kvstore.db"),
//!     ..Default::default()
//! }).unwrap();
//!
//! engine.set_string("name", "Alice").unwrap();
//! engine.set_int64("count", -42).unwrap();
//! assert_eq!(engine.get_int64("count").unwrap(), -42);
//! ```

use crate::storage::snapshot;
use crate::storage::table::{HashTable, StoreError, DEFAULT_CAPACITY};
use crate::storage::value::{TypeTag, Value};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Engine configuration, normally filled in from the server CLI.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial bucket capacity hint.
    pub capacity: usize,
    /// Snapshot path used by SAVE/LOAD when none is given, and by auto-save.
    pub db_file: PathBuf,
    /// Write a snapshot on shutdown when the store is non-empty.
    pub auto_save: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            db_file: PathBuf::from("kvstore.db"),
            auto_save: true,
        }
    }
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Live entries.
    pub keys: usize,
    /// Bucket count.
    pub capacity: usize,
    /// keys / capacity.
    pub load_factor: f64,
    /// Arena capacity in bytes.
    pub arena_allocated: usize,
    /// Arena bytes consumed since the last clear.
    pub arena_used: usize,
}

/// Thread-safe store facade. Wrap in an `Arc` and share freely.
#[derive(Debug)]
pub struct KvEngine {
    table: Mutex<HashTable>,
    config: EngineConfig,
}

impl KvEngine {
    /// Creates the store and loads the configured snapshot file. A missing
    /// file is a clean bootstrap, not an error.
    pub fn open(config: EngineConfig) -> Result<Self, StoreError> {
        let mut table = HashTable::with_capacity(config.capacity);
        snapshot::load(&mut table, &config.db_file)?;

        if !table.is_empty() {
            info!(
                entries = table.len(),
                db_file = %config.db_file.display(),
                "Loaded existing database"
            );
        }

        Ok(Self {
            table: Mutex::new(table),
            config,
        })
    }

    /// Creates an engine with defaults and no backing file loaded, for
    /// embedding and tests.
    pub fn in_memory() -> Self {
        Self {
            table: Mutex::new(HashTable::default()),
            config: EngineConfig {
                auto_save: false,
                ..Default::default()
            },
        }
    }

    // ========================================================================
    // Typed puts
    // ========================================================================

    /// Stores `value` under `key` with any tag.
    pub fn put(&self, key: &[u8], value: &Value) -> Result<(), StoreError> {
        self.table.lock().unwrap().put(key, value)
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(
            key.as_bytes(),
            &Value::String(Bytes::copy_from_slice(value.as_bytes())),
        )
    }

    /// Stores raw bytes as a String value; the payload is not validated as
    /// UTF-8.
    pub fn set_string_bytes(&self, key: &[u8], value: Bytes) -> Result<(), StoreError> {
        self.put(key, &Value::String(value))
    }

    pub fn set_int64(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put(key.as_bytes(), &Value::Int64(value))
    }

    pub fn set_double(&self, key: &str, value: f64) -> Result<(), StoreError> {
        self.put(key.as_bytes(), &Value::Double(value))
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key.as_bytes(), &Value::Bool(value))
    }

    pub fn set_null(&self, key: &str) -> Result<(), StoreError> {
        self.put(key.as_bytes(), &Value::Null)
    }

    pub fn set_binary(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.put(key.as_bytes(), &Value::Binary(value))
    }

    // ========================================================================
    // Gets
    // ========================================================================

    /// Fetches the value for `key` with its stored tag, copied out under the
    /// lock.
    pub fn get(&self, key: &[u8]) -> Result<Value, StoreError> {
        let table = self.table.lock().unwrap();
        table.get(key).map(|v| v.to_owned())
    }

    fn get_expecting(&self, key: &str, expected: TypeTag) -> Result<Value, StoreError> {
        let value = self.get(key.as_bytes())?;
        if value.tag() != expected {
            return Err(StoreError::TypeMismatch {
                expected,
                actual: value.tag(),
            });
        }
        Ok(value)
    }

    pub fn get_string(&self, key: &str) -> Result<Bytes, StoreError> {
        match self.get_expecting(key, TypeTag::String)? {
            Value::String(s) => Ok(s),
            _ => unreachable!("tag checked above"),
        }
    }

    pub fn get_int64(&self, key: &str) -> Result<i64, StoreError> {
        match self.get_expecting(key, TypeTag::Int64)? {
            Value::Int64(n) => Ok(n),
            _ => unreachable!("tag checked above"),
        }
    }

    pub fn get_double(&self, key: &str) -> Result<f64, StoreError> {
        match self.get_expecting(key, TypeTag::Double)? {
            Value::Double(d) => Ok(d),
            _ => unreachable!("tag checked above"),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, StoreError> {
        match self.get_expecting(key, TypeTag::Bool)? {
            Value::Bool(b) => Ok(b),
            _ => unreachable!("tag checked above"),
        }
    }

    pub fn get_binary(&self, key: &str) -> Result<Bytes, StoreError> {
        match self.get_expecting(key, TypeTag::Binary)? {
            Value::Binary(b) => Ok(b),
            _ => unreachable!("tag checked above"),
        }
    }

    // ========================================================================
    // Key management
    // ========================================================================

    /// Removes `key`. Returns `false` when it was absent.
    pub fn delete(&self, key: &[u8]) -> Result<bool, StoreError> {
        match self.table.lock().unwrap().delete(key) {
            Ok(()) => Ok(true),
            Err(StoreError::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.table.lock().unwrap().contains_key(key)
    }

    /// Tag of the value stored under `key`.
    pub fn type_of(&self, key: &[u8]) -> Result<TypeTag, StoreError> {
        self.table.lock().unwrap().type_of(key)
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.table.lock().unwrap().capacity()
    }

    pub fn load_factor(&self) -> f64 {
        self.table.lock().unwrap().load_factor()
    }

    /// Drops every entry and reclaims all arena memory in one sweep.
    pub fn clear(&self) {
        self.table.lock().unwrap().clear();
    }

    /// All live keys, copied out in iteration order.
    pub fn keys(&self) -> Vec<Bytes> {
        let table = self.table.lock().unwrap();
        table
            .iter()
            .map(|(key, _)| Bytes::copy_from_slice(key))
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        let table = self.table.lock().unwrap();
        EngineStats {
            keys: table.len(),
            capacity: table.capacity(),
            load_factor: table.load_factor(),
            arena_allocated: table.arena_allocated(),
            arena_used: table.arena_used(),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Snapshot to `path`, or the configured db file when `None`.
    pub fn save(&self, path: Option<&Path>) -> Result<(), StoreError> {
        let path = path.unwrap_or(&self.config.db_file);
        let table = self.table.lock().unwrap();
        snapshot::save(&table, path)
    }

    /// Replaces the store contents from the snapshot at `path` (default:
    /// the configured db file). A missing file leaves the store empty.
    pub fn load(&self, path: Option<&Path>) -> Result<(), StoreError> {
        let path = path.unwrap_or(&self.config.db_file);
        let mut table = self.table.lock().unwrap();
        snapshot::load(&mut table, path)
    }

    /// Snapshot to `path`, or to `<db-file>.backup.YYYYMMDD-HHMMSS` when no
    /// name is given. Returns the path written.
    pub fn backup(&self, path: Option<&Path>) -> Result<PathBuf, StoreError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                let mut name = self.config.db_file.as_os_str().to_os_string();
                name.push(format!(".backup.{}", stamp));
                PathBuf::from(name)
            }
        };
        self.save(Some(&path))?;
        Ok(path)
    }

    /// Shutdown hook: auto-save to the configured file iff enabled and the
    /// store holds data.
    pub fn shutdown(&self) {
        if !self.config.auto_save {
            return;
        }
        let entries = self.len();
        if entries == 0 {
            warn!("Auto-save skipped: store is empty");
            return;
        }
        info!(entries, "Auto-saving before shutdown");
        if let Err(e) = self.save(None) {
            error!(error = %e, "Auto-save failed");
        }
    }
}
