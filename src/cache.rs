//! Local durable cache
//!
//! String-keyed slots that survive a restart, the same role browser local
//! storage plays for the editor: one slot per template draft plus the last
//! known record identity and the persisted session.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Durable string slots. Calls are synchronous; callers never suspend on them.
pub trait LocalCache: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Reject keys that could escape the cache directory.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains("..")
        && !key.contains('/')
        && !key.contains('\\')
        && !key.contains('\0')
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "local cache opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalCache for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        // Write-then-rename so a crash never leaves a half-written slot.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process slots, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, CacheError> {
        self.slots
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

impl LocalCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        self.slots()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.slots()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        assert_eq!(cache.read("templateOneData").unwrap(), None);
        cache.write("templateOneData", "{\"a\":1}").unwrap();
        assert_eq!(
            cache.read("templateOneData").unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        cache.remove("templateOneData").unwrap();
        assert_eq!(cache.read("templateOneData").unwrap(), None);
        // Removing a missing slot is not an error.
        cache.remove("templateOneData").unwrap();
    }

    #[test]
    fn test_file_cache_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        assert!(matches!(
            cache.write("../escape", "x"),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(cache.read("a/b"), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_memory_cache_overwrites() {
        let cache = MemoryCache::new();
        cache.write("k", "1").unwrap();
        cache.write("k", "2").unwrap();
        assert_eq!(cache.read("k").unwrap().as_deref(), Some("2"));
    }
}
