//! File-backed key pool store with per-product locking.
//!
//! Each product's pool is loaded lazily from `<keys_dir>/<label>.txt` and kept
//! in memory behind its own mutex. Writers hold the product lock for the whole
//! check-and-remove cycle, so two redemptions against the same pool never
//! interleave.

use crate::persist::write_atomic;
use crate::pool::format::{normalize_key, parse_pool, pool_file_name, render_pool};
use crate::KeyledgerError;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-memory copy of one product's pool file.
#[derive(Debug)]
pub struct KeyPool {
    product: String,
    path: PathBuf,
    keys: Vec<String>,
    loaded: bool,
}

impl KeyPool {
    fn unloaded(product: &str, path: PathBuf) -> Self {
        Self {
            product: product.to_string(),
            path,
            keys: Vec::new(),
            loaded: false,
        }
    }

    /// Product label this pool belongs to.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Keys in file order, as stored.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Case-normalized exact membership test.
    pub fn contains(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.keys.iter().any(|k| normalize_key(k) == key)
    }

    async fn ensure_loaded(&mut self) -> Result<(), KeyledgerError> {
        if self.loaded {
            return Ok(());
        }

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KeyledgerError::PoolNotFound {
                    product: self.product.clone(),
                });
            }
            Err(e) => {
                return Err(KeyledgerError::PoolIO(format!(
                    "Failed to read pool {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        self.keys = parse_pool(&contents);
        self.loaded = true;
        tracing::debug!(product = %self.product, keys = self.keys.len(), "key pool loaded");
        Ok(())
    }
}

/// Exclusive access to one loaded pool.
pub struct PoolGuard {
    guard: OwnedMutexGuard<KeyPool>,
}

impl PoolGuard {
    /// The locked pool.
    pub fn pool(&self) -> &KeyPool {
        &self.guard
    }

    /// Case-normalized membership test.
    pub fn contains(&self, key: &str) -> bool {
        self.guard.contains(key)
    }

    /// Remove every occurrence of `key` and persist the pool.
    ///
    /// Returns how many entries were removed. Memory is only updated after the
    /// file has been replaced.
    pub async fn remove(&mut self, key: &str) -> Result<usize, KeyledgerError> {
        let key = normalize_key(key);
        let remaining: Vec<String> = self
            .guard
            .keys
            .iter()
            .filter(|k| normalize_key(k) != key)
            .cloned()
            .collect();
        let removed = self.guard.keys.len() - remaining.len();
        if removed == 0 {
            return Ok(0);
        }

        write_atomic(&self.guard.path, &render_pool(&remaining))
            .await
            .map_err(|e| {
                KeyledgerError::PoolIO(format!(
                    "Failed to write pool {}: {}",
                    self.guard.path.display(),
                    e
                ))
            })?;

        self.guard.keys = remaining;
        Ok(removed)
    }
}

/// Key pools for all products, one lock per product.
pub struct KeyPoolStore {
    dir: PathBuf,
    slots: Mutex<HashMap<String, Arc<Mutex<KeyPool>>>>,
}

impl KeyPoolStore {
    /// Create a store reading pool files from `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the pool files.
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    async fn slot(&self, product: &str) -> Result<Arc<Mutex<KeyPool>>, KeyledgerError> {
        if product.trim().is_empty() || product.contains(['/', '\\']) || product.starts_with('.')
        {
            return Err(KeyledgerError::PoolNotFound {
                product: product.to_string(),
            });
        }

        let mut slots = self.slots.lock().await;
        let slot = slots.entry(product.to_string()).or_insert_with(|| {
            let path = self.dir.join(pool_file_name(product));
            Arc::new(Mutex::new(KeyPool::unloaded(product, path)))
        });
        Ok(Arc::clone(slot))
    }

    /// Lock a product's pool, loading it from disk on first use.
    ///
    /// # Errors
    /// - `PoolNotFound` - No pool file exists for the product
    /// - `PoolIO` - The pool file could not be read
    pub async fn lock(&self, product: &str) -> Result<PoolGuard, KeyledgerError> {
        let slot = self.slot(product).await?;
        let mut guard = slot.lock_owned().await;
        guard.ensure_loaded().await?;
        Ok(PoolGuard { guard })
    }

    /// Keys currently in a product's pool.
    pub async fn load(&self, product: &str) -> Result<Vec<String>, KeyledgerError> {
        let guard = self.lock(product).await?;
        Ok(guard.pool().keys().to_vec())
    }

    /// Whether a product's pool holds `key`.
    pub async fn contains(&self, product: &str, key: &str) -> Result<bool, KeyledgerError> {
        let guard = self.lock(product).await?;
        Ok(guard.contains(key))
    }

    /// Remove all occurrences of `key` from a product's pool.
    pub async fn remove(&self, product: &str, key: &str) -> Result<usize, KeyledgerError> {
        let mut guard = self.lock(product).await?;
        guard.remove(key).await
    }

    /// Drop the cached copy so the next access re-reads the file.
    ///
    /// Used after keys have been provisioned into a pool file externally.
    pub async fn reload(&self, product: &str) -> Result<(), KeyledgerError> {
        let slot = self.slot(product).await?;
        let mut pool = slot.lock().await;
        pool.loaded = false;
        pool.keys.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_pool(dir: &TempDir, label: &str, contents: &str) {
        std::fs::write(dir.path().join(pool_file_name(label)), contents).unwrap();
    }

    fn read_pool(dir: &TempDir, label: &str) -> String {
        std::fs::read_to_string(dir.path().join(pool_file_name(label))).unwrap()
    }

    #[tokio::test]
    async fn test_load_pool() {
        let dir = TempDir::new().unwrap();
        write_pool(&dir, "Temp Spoofer", "ABC-123\n\nDEF-456\n");
        let store = KeyPoolStore::new(dir.path().to_path_buf());

        let keys = store.load("Temp Spoofer").await.unwrap();
        assert_eq!(keys, vec!["ABC-123", "DEF-456"]);
    }

    #[tokio::test]
    async fn test_load_missing_pool() {
        let dir = TempDir::new().unwrap();
        let store = KeyPoolStore::new(dir.path().to_path_buf());

        let result = store.load("Perm Spoofer").await;
        assert!(matches!(result, Err(KeyledgerError::PoolNotFound { product }) if product == "Perm Spoofer"));
    }

    #[tokio::test]
    async fn test_rejects_path_like_product() {
        let dir = TempDir::new().unwrap();
        let store = KeyPoolStore::new(dir.path().to_path_buf());

        assert!(matches!(
            store.load("../users").await,
            Err(KeyledgerError::PoolNotFound { .. })
        ));
        assert!(matches!(
            store.load("").await,
            Err(KeyledgerError::PoolNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_contains_is_case_normalized() {
        let dir = TempDir::new().unwrap();
        write_pool(&dir, "P1", "abc-123\nDEF-456");
        let store = KeyPoolStore::new(dir.path().to_path_buf());

        assert!(store.contains("P1", "ABC-123").await.unwrap());
        assert!(store.contains("P1", " def-456 ").await.unwrap());
        assert!(!store.contains("P1", "ABC-12").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_all_occurrences_and_persist() {
        let dir = TempDir::new().unwrap();
        write_pool(&dir, "P1", "ABC-123\nDEF-456\nabc-123");
        let store = KeyPoolStore::new(dir.path().to_path_buf());

        let removed = store.remove("P1", "ABC-123").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(read_pool(&dir, "P1"), "DEF-456");
        assert_eq!(store.load("P1").await.unwrap(), vec!["DEF-456"]);
    }

    #[tokio::test]
    async fn test_remove_absent_key_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        write_pool(&dir, "P1", "ABC-123\n\n");
        let store = KeyPoolStore::new(dir.path().to_path_buf());

        assert_eq!(store.remove("P1", "ZZZ").await.unwrap(), 0);
        assert_eq!(read_pool(&dir, "P1"), "ABC-123\n\n");
    }

    #[tokio::test]
    async fn test_reload_picks_up_provisioned_keys() {
        let dir = TempDir::new().unwrap();
        write_pool(&dir, "P1", "ABC-123");
        let store = KeyPoolStore::new(dir.path().to_path_buf());
        assert_eq!(store.load("P1").await.unwrap().len(), 1);

        write_pool(&dir, "P1", "ABC-123\nNEW-999");
        assert_eq!(store.load("P1").await.unwrap().len(), 1);

        store.reload("P1").await.unwrap();
        assert_eq!(store.load("P1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_pool_can_appear_later() {
        let dir = TempDir::new().unwrap();
        let store = KeyPoolStore::new(dir.path().to_path_buf());
        assert!(store.load("P1").await.is_err());

        write_pool(&dir, "P1", "ABC-123");
        assert_eq!(store.load("P1").await.unwrap(), vec!["ABC-123"]);
    }
}
