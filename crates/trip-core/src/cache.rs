//! Content-addressed result cache.
//!
//! A [`CacheKey`] is built from a function name and an explicit list of named
//! arguments. Whatever is left out of the key (such as the data directory a
//! pipeline happens to read from) cannot invalidate an entry. Values are
//! stored as JSON in a pluggable [`CacheStore`].
//!
//! The cache is not synchronized across processes; give concurrent runs
//! their own cache directory.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{TripError, TripResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    function: String,
    args: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument by its display form.
    pub fn arg(mut self, name: &str, value: impl Display) -> Self {
        self.args.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a float array argument, hashed by exact bit pattern.
    pub fn arg_f64s(mut self, name: &str, values: &[f64]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((values.len() as u64).to_le_bytes());
        for v in values {
            hasher.update(v.to_bits().to_le_bytes());
        }
        self.args
            .push((name.to_string(), format!("{:x}", hasher.finalize())));
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// SHA-256 hex digest of the function name and arguments, in order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.function.as_bytes());
        for (name, value) in &self.args {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

pub trait CacheStore {
    fn get(&self, key: &CacheKey) -> TripResult<Option<Vec<u8>>>;
    fn put(&self, key: &CacheKey, bytes: &[u8]) -> TripResult<()>;
}

/// In-process store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> TripResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| TripError::Cache("memory store lock poisoned".into()))?;
        Ok(entries.get(&key.digest()).cloned())
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) -> TripResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| TripError::Cache("memory store lock poisoned".into()))?;
        entries.insert(key.digest(), bytes.to_vec());
        Ok(())
    }
}

/// On-disk store: `<root>/<function>/<digest>.json`.
///
/// Entries are written to a temp file in the same directory and renamed into
/// place, so a reader sees either the whole entry or none.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(sanitize(key.function()))
            .join(format!("{}.json", key.digest()))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl CacheStore for DiskStore {
    fn get(&self, key: &CacheKey) -> TripResult<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TripError::Cache(format!(
                "reading cache entry {}: {err}",
                path.display()
            ))),
        }
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) -> TripResult<()> {
        let path = self.entry_path(key);
        let dir = path
            .parent()
            .ok_or_else(|| TripError::Cache(format!("bad cache path {}", path.display())))?;
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| TripError::Io(err.error))?;
        Ok(())
    }
}

/// Memoizes serializable results in a [`CacheStore`].
#[derive(Debug)]
pub struct ResultCache<S> {
    store: S,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<S: CacheStore> ResultCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Return the cached value for `key`, or run `compute` and store its result.
    ///
    /// Entries that no longer decode are recomputed and overwritten. Errors
    /// from `compute` are passed through and nothing is stored.
    pub fn get_or_compute<T, E, F>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TripError>,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(bytes) = self.store.get(key)? {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(function = key.function(), digest = %key.digest(), "cache hit");
                    return Ok(value);
                }
                Err(err) => warn!(
                    function = key.function(),
                    "discarding undecodable cache entry: {err}"
                ),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(function = key.function(), digest = %key.digest(), "cache miss");
        let value = compute()?;
        let bytes = serde_json::to_vec(&value).map_err(TripError::from)?;
        self.store.put(key, &bytes)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    #[test]
    fn key_digest_depends_on_args_and_order() {
        let a = CacheKey::new("load").arg("x", 1).arg("y", 2);
        let b = CacheKey::new("load").arg("y", 2).arg("x", 1);
        let c = CacheKey::new("load").arg("x", 1).arg("y", 2);
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), c.digest());
        assert_ne!(a.digest(), CacheKey::new("other").arg("x", 1).arg("y", 2).digest());
    }

    #[test]
    fn float_args_hash_bit_patterns() {
        let a = CacheKey::new("f").arg_f64s("t", &[1.0, 2.0]);
        let b = CacheKey::new("f").arg_f64s("t", &[1.0, 2.0000000000000004]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn computes_once_per_key() {
        let cache = ResultCache::new(MemoryStore::new());
        let calls = Cell::new(0);
        let key = CacheKey::new("square").arg("n", 12);
        for _ in 0..3 {
            let v: Result<u64, TripError> = cache.get_or_compute(&key, || {
                calls.set(calls.get() + 1);
                Ok(144)
            });
            assert_eq!(v.unwrap(), 144);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = ResultCache::new(MemoryStore::new());
        let key = CacheKey::new("fails");
        let r: Result<u32, TripError> =
            cache.get_or_compute(&key, || Err(TripError::Other("nope".into())));
        assert!(r.is_err());
        assert!(cache.store().is_empty());
    }

    #[test]
    fn disk_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let key = CacheKey::new("vec").arg("len", 3);
        let first = ResultCache::new(DiskStore::new(dir.path()));
        let v: Vec<f64> = first
            .get_or_compute(&key, || Ok::<_, TripError>(vec![1.0, 2.5, -3.0]))
            .unwrap();

        let second = ResultCache::new(DiskStore::new(dir.path()));
        let again: Vec<f64> = second
            .get_or_compute(&key, || -> Result<Vec<f64>, TripError> {
                panic!("should be served from disk")
            })
            .unwrap();
        assert_eq!(v, again);
        assert_eq!(second.hits(), 1);
    }

    #[test]
    fn corrupt_entries_are_recomputed() {
        let dir = tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let key = CacheKey::new("num");
        store.put(&key, b"{not json").unwrap();
        let cache = ResultCache::new(store);
        let v: u8 = cache.get_or_compute(&key, || Ok::<_, TripError>(7)).unwrap();
        assert_eq!(v, 7);
        let v: u8 = cache.get_or_compute(&key, || Ok::<_, TripError>(9)).unwrap();
        assert_eq!(v, 7);
    }
}
