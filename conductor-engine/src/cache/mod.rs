// Cache Store
// Content-addressed key -> blob store used to skip redundant step work

use crate::error::CacheError;

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::debug;

/// Configuration for the cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory blobs are persisted under (default: ~/.conductor/cache/)
    pub cache_dir: PathBuf,

    /// Whether to persist blobs to disk at all
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conductor")
            .join("cache");

        Self {
            cache_dir,
            persist: true,
        }
    }
}

/// A cached entry: the blob plus the digest it is addressed by.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub digest: String,
    pub blob: Vec<u8>,
    pub created_at: SystemTime,
}

/// Shared cache store.
///
/// Safe for concurrent readers and writers across in-flight job instances.
/// `put` is idempotent under key collision with identical content; a
/// collision with differing content surfaces as [`CacheError::Corruption`]
/// and the caller bypasses the key. A miss is never an error.
#[derive(Debug)]
pub struct CacheStore {
    config: CacheConfig,
    /// In-memory index of loaded entries
    index: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl CacheStore {
    /// Create a cache store with default configuration.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache store with custom configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a cache store persisting under a specific directory.
    pub fn with_cache_dir(cache_dir: impl AsRef<Path>) -> Self {
        Self::with_config(CacheConfig {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            persist: true,
        })
    }

    /// Create a purely in-memory store (nothing touches disk).
    pub fn in_memory() -> Self {
        Self::with_config(CacheConfig {
            cache_dir: PathBuf::new(),
            persist: false,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Hex SHA-256 digest of a blob.
    pub fn content_digest(blob: &[u8]) -> String {
        hex::encode(Sha256::digest(blob))
    }

    /// Fold the contents of the given files (relative to `base`) into a
    /// short hex digest for cache key derivation. Files are hashed in the
    /// declared order; a missing file hashes as absent rather than failing,
    /// so a bad path only changes the key.
    pub fn digest_inputs(base: &Path, inputs: &[PathBuf]) -> String {
        let mut hasher = Sha256::new();
        for input in inputs {
            hasher.update(input.to_string_lossy().as_bytes());
            match fs::read(base.join(input)) {
                Ok(bytes) => {
                    hasher.update([1u8]);
                    hasher.update(&bytes);
                }
                Err(_) => hasher.update([0u8]),
            }
        }
        hex::encode(&hasher.finalize()[..8])
    }

    /// Look up a key. Checks the in-memory index first, then the on-disk
    /// blob. Returns the blob on a hit, `None` on a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let index = self.index.read().await;
            if let Some(entry) = index.get(key) {
                return Some(entry.blob.clone());
            }
        }

        if !self.config.persist {
            return None;
        }

        let path = self.blob_path(key);
        let blob = fs::read(&path).ok()?;
        debug!(key, path = %path.display(), "cache entry loaded from disk");

        let entry = CacheEntry {
            key: key.to_string(),
            digest: Self::content_digest(&blob),
            blob: blob.clone(),
            created_at: SystemTime::now(),
        };
        self.index.write().await.insert(key.to_string(), entry);

        Some(blob)
    }

    /// Store a blob under a key.
    ///
    /// Storing identical content under an existing key is a no-op; differing
    /// content is a corruption error, left to the caller to surface.
    pub async fn put(&self, key: &str, blob: &[u8]) -> Result<(), CacheError> {
        let digest = Self::content_digest(blob);

        let mut index = self.index.write().await;

        if let Some(existing) = index.get(key) {
            if existing.digest == digest {
                return Ok(());
            }
            return Err(CacheError::Corruption {
                key: key.to_string(),
            });
        }

        if self.config.persist {
            let path = self.blob_path(key);
            if let Ok(existing) = fs::read(&path) {
                if Self::content_digest(&existing) != digest {
                    return Err(CacheError::Corruption {
                        key: key.to_string(),
                    });
                }
            } else {
                fs::create_dir_all(&self.config.cache_dir)?;
                // Write-then-rename: a concurrent reader sees a miss or the
                // complete blob, never a partial one
                let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
                fs::write(&tmp, blob)?;
                fs::rename(&tmp, &path)?;
            }
        }

        index.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                digest,
                blob: blob.to_vec(),
                created_at: SystemTime::now(),
            },
        );

        Ok(())
    }

    /// Remove every cached blob (disk and memory).
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.index.write().await.clear();
        if self.config.persist && self.config.cache_dir.exists() {
            fs::remove_dir_all(&self.config.cache_dir)?;
        }
        Ok(())
    }

    /// On-disk location for a key's blob. Keys are addressed by their own
    /// digest so arbitrary key strings stay filesystem-safe.
    fn blob_path(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.config.cache_dir.join(format!("{}.blob", &name[..32]))
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let cache = CacheStore::in_memory();
        cache.put("deps-stable", b"blob contents").await.unwrap();
        assert_eq!(
            cache.get("deps-stable").await,
            Some(b"blob contents".to_vec())
        );
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let cache = CacheStore::in_memory();
        assert_eq!(cache.get("absent").await, None);
    }

    #[tokio::test]
    async fn test_put_is_idempotent_for_identical_content() {
        let cache = CacheStore::in_memory();
        cache.put("key", b"same").await.unwrap();
        cache.put("key", b"same").await.unwrap();
        assert_eq!(cache.get("key").await, Some(b"same".to_vec()));
    }

    #[tokio::test]
    async fn test_differing_content_is_corruption() {
        let cache = CacheStore::in_memory();
        cache.put("key", b"one").await.unwrap();
        let result = cache.put("key", b"two").await;
        assert!(matches!(result, Err(CacheError::Corruption { key }) if key == "key"));

        // The original content survives
        assert_eq!(cache.get("key").await, Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn test_blobs_persist_across_store_instances() {
        let dir = tempfile::tempdir().unwrap();

        let cache = CacheStore::with_cache_dir(dir.path());
        cache.put("deps", b"persisted").await.unwrap();

        let reopened = CacheStore::with_cache_dir(dir.path());
        assert_eq!(reopened.get("deps").await, Some(b"persisted".to_vec()));
    }

    #[tokio::test]
    async fn test_disk_corruption_detected_on_put() {
        let dir = tempfile::tempdir().unwrap();

        let first = CacheStore::with_cache_dir(dir.path());
        first.put("deps", b"one").await.unwrap();

        // A fresh store with an empty index still sees the disk blob
        let second = CacheStore::with_cache_dir(dir.path());
        let result = second.put("deps", b"two").await;
        assert!(matches!(result, Err(CacheError::Corruption { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_identical_puts_all_succeed() {
        let cache = Arc::new(CacheStore::in_memory());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put("shared", b"same blob").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(cache.get("shared").await, Some(b"same blob".to_vec()));
    }

    #[test]
    fn test_digest_inputs_is_deterministic_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.lock"), "lockfile v1").unwrap();

        let inputs = vec![PathBuf::from("Cargo.lock")];
        let a = CacheStore::digest_inputs(dir.path(), &inputs);
        let b = CacheStore::digest_inputs(dir.path(), &inputs);
        assert_eq!(a, b);

        fs::write(dir.path().join("Cargo.lock"), "lockfile v2").unwrap();
        let c = CacheStore::digest_inputs(dir.path(), &inputs);
        assert_ne!(a, c);
    }

    #[test]
    fn test_digest_inputs_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![PathBuf::from("not-there.lock")];
        let a = CacheStore::digest_inputs(dir.path(), &inputs);
        let b = CacheStore::digest_inputs(dir.path(), &inputs);
        assert_eq!(a, b);
    }
}
