//! # Content Cache
//!
//! Memoizes expensive, deterministic preparation steps (vocabulary
//! construction, dataset encoding) on disk. Entries are addressed by the
//! SHA-256 of a [`CacheKey`] and stored as JSON.
//!
//! Writes go to a temporary file in the cache directory and are renamed
//! into place, so a reader sees either no entry or a complete one. Two
//! processes computing the same key race benignly as long as the factory
//! is pure for that key.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{CacheError, ConfigError};

/// Identity of a cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    parts: Vec<String>,
}

impl CacheKey {
    /// Starts a key from a code fingerprint, so entries produced by
    /// another revision of the preparation code are never reused.
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            parts: vec![fingerprint.into()],
        }
    }

    /// Adds a free-form component.
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Adds a path by identity only.
    pub fn with_path(self, path: &Path) -> Self {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        self.with_part(path.display().to_string())
    }

    /// Adds a file by path and content, so editing the file changes the key.
    pub fn with_file(self, path: &Path) -> io::Result<Self> {
        let digest = file_digest(path)?;
        Ok(self.with_path(path).with_part(digest))
    }

    /// Like [`with_file`](Self::with_file); an absent file is a distinct
    /// component of its own.
    pub fn with_optional_file(self, path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => self.with_file(path),
            None => Ok(self.with_part("<none>")),
        }
    }

    /// Hex SHA-256 over all components.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in &self.parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Revision of the code producing cached values.
///
/// The git commit of the source tree when available, otherwise the
/// package name and version.
pub fn code_fingerprint() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .output();
    if let Ok(output) = output {
        if output.status.success() {
            let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !hash.is_empty() {
                return hash;
            }
        }
    }
    format!("{}@{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// A directory of JSON entries keyed by [`CacheKey`].
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    /// Binds the cache to `dir`. With `mkdir` the directory is created
    /// when absent; without it a missing directory is a configuration error.
    pub fn new(dir: impl Into<PathBuf>, mkdir: bool) -> Result<Self, CacheError> {
        let dir = dir.into();
        if !dir.exists() {
            if !mkdir {
                return Err(ConfigError::MissingFile {
                    what: "cache directory",
                    path: dir,
                }
                .into());
            }
            std::fs::create_dir_all(&dir)?;
        }
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                what: "cache directory",
                path: dir,
            }
            .into());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the entry for `key` lives.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }

    /// Returns the stored value for `key`, computing and storing it first
    /// when there is none or `refresh` is set.
    ///
    /// `factory` runs at most once per call. If it fails nothing is
    /// written and the failure comes back as [`CacheError::Compute`].
    pub fn load_or_create<T, E, F>(
        &self,
        key: &CacheKey,
        refresh: bool,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = self.entry_path(key);

        if !refresh {
            if let Some(value) = self.read_entry(&path)? {
                info!(path = %path.display(), "loaded cached value");
                return Ok(value);
            }
        }

        debug!(path = %path.display(), refresh, "computing cache entry");
        let value = factory().map_err(|e| CacheError::Compute(e.into()))?;
        self.write_entry(&path, &value)?;
        info!(path = %path.display(), "cached value");
        Ok(value)
    }

    fn read_entry<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, CacheError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    fn write_entry<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CacheError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, value)?;
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn key(name: &str) -> CacheKey {
        CacheKey::new("test").with_part(name)
    }

    #[test]
    fn factory_runs_once_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();
        let calls = Cell::new(0);
        let factory = || {
            calls.set(calls.get() + 1);
            Ok::<_, io::Error>(vec![1u32, 2, 3])
        };

        let first: Vec<u32> = cache.load_or_create(&key("a"), false, factory).unwrap();
        let second: Vec<u32> = cache.load_or_create(&key("a"), false, factory).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn refresh_recomputes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();

        let _: u32 = cache
            .load_or_create(&key("a"), false, || Ok::<_, io::Error>(1))
            .unwrap();
        let refreshed: u32 = cache
            .load_or_create(&key("a"), true, || Ok::<_, io::Error>(2))
            .unwrap();
        assert_eq!(refreshed, 2);

        let stored: u32 = cache
            .load_or_create(&key("a"), false, || -> Result<u32, io::Error> {
                panic!("entry should be cached")
            })
            .unwrap();
        assert_eq!(stored, 2);
    }

    #[test]
    fn failed_factory_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();

        let err = cache
            .load_or_create::<u32, _, _>(&key("a"), false, || Err("no data"))
            .unwrap_err();
        assert!(matches!(err, CacheError::Compute(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_entry_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();
        std::fs::write(cache.entry_path(&key("a")), "{not json").unwrap();

        let value: u32 = cache
            .load_or_create(&key("a"), false, || Ok::<_, io::Error>(7))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn missing_directory_requires_mkdir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("cache");

        assert!(matches!(
            ContentCache::new(&target, false),
            Err(CacheError::Config(ConfigError::MissingFile { .. }))
        ));
        let cache = ContentCache::new(&target, true).unwrap();
        assert!(cache.dir().is_dir());
    }

    #[test]
    fn file_content_is_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.conll");
        std::fs::write(&path, "a").unwrap();
        let before = CacheKey::new("rev").with_file(&path).unwrap();
        std::fs::write(&path, "b").unwrap();
        let after = CacheKey::new("rev").with_file(&path).unwrap();

        assert_ne!(before.digest(), after.digest());
        assert_eq!(before.digest(), before.clone().digest());
    }

    #[test]
    fn optional_file_distinguishes_absence() {
        let with_none = CacheKey::new("rev").with_optional_file(None).unwrap();
        assert_ne!(with_none.digest(), CacheKey::new("rev").digest());
    }

    #[test]
    fn fingerprint_is_never_empty() {
        assert!(!code_fingerprint().is_empty());
    }
}
