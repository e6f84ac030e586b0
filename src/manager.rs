//! Entitlement Manager - the main public API for Keyledger.
//!
//! The `EntitlementManager` wires the store, the redemption engine and access
//! control together:
//! - Key redemption with at-most-once enforcement
//! - Download access checks against the ledger
//! - Artifact resolution for entitled downloads

use crate::clock::{Clock, SystemClock};
use crate::config::KeyledgerConfig;
use crate::engine::{Redemption, RedemptionEngine};
use crate::ledger::record::{EntitlementRecord, UserIdentity};
use crate::policy::access::{AccessControl, ArtifactHandle};
use crate::store::Store;
use crate::KeyledgerError;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

/// Main entitlement manager for Keyledger.
///
/// Create one instance per process and share it across requests; all
/// mutations are serialized internally.
pub struct EntitlementManager {
    config: KeyledgerConfig,
    store: Store,
    engine: RedemptionEngine,
    access: AccessControl,
}

impl EntitlementManager {
    /// Open the stores and build a manager using the system clock.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Configuration validation fails
    /// - Keys directory creation fails
    /// - The ledger file cannot be read
    pub async fn open(config: KeyledgerConfig) -> Result<Self, KeyledgerError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Open with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub async fn open_with_clock(
        config: KeyledgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyledgerError> {
        Self::with_clock(config, clock).await
    }

    async fn with_clock(
        config: KeyledgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyledgerError> {
        let store = Store::open(&config).await?;
        let catalog = Arc::new(config.catalog.clone());

        let engine = RedemptionEngine::new(
            store.clone(),
            Arc::clone(&catalog),
            clock,
            config.repeat_redemption,
        );
        let access = AccessControl::new(Arc::clone(store.ledger()), catalog);

        Ok(Self {
            config,
            store,
            engine,
            access,
        })
    }

    /// Redeem a key for a product (by label) as `user`.
    ///
    /// # Errors
    /// - `InvalidProduct` - Unknown product or no key pool
    /// - `InvalidOrUsedKey` - Key unknown or already redeemed
    /// - `AlreadyEntitled` - Repeat redemption rejected by policy
    /// - `MalformedField` - Identity cannot be stored in the ledger
    /// - `PoolIO` / `LedgerIO` - Persistence failed
    pub async fn redeem(
        &self,
        user: &UserIdentity,
        product: &str,
        key: &str,
    ) -> Result<Redemption, KeyledgerError> {
        self.engine.redeem(user, product, key).await
    }

    /// Whether `user_id` may download the product behind `slug`.
    pub fn check_access(&self, user_id: &str, slug: &str) -> bool {
        self.access.check_access(user_id, slug)
    }

    /// Resolve the artifact for `slug` without checking entitlement.
    pub fn resolve_artifact(&self, slug: &str) -> Result<ArtifactHandle, KeyledgerError> {
        self.access.resolve_artifact(slug)
    }

    /// Decide whether a download may proceed and return the artifact path.
    ///
    /// Checks run in order: product known, user entitled, artifact present on
    /// disk.
    ///
    /// # Errors
    /// - `ProductNotFound` - Slug is not in the catalog
    /// - `AccessDenied` - User holds no entitlement for the product
    /// - `ArtifactUnavailable` - No artifact is published or the file is missing
    /// - `PoolIO` - The downloads directory could not be inspected
    pub async fn authorize_download(
        &self,
        user_id: &str,
        slug: &str,
    ) -> Result<PathBuf, KeyledgerError> {
        self.access.require_access(user_id, slug)?;
        let handle = self.access.resolve_artifact(slug)?;
        let path = self.config.downloads_dir.join(&handle.file_name);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(KeyledgerError::ArtifactUnavailable {
                slug: slug.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(slug = %slug, path = %path.display(), "artifact missing");
                Err(KeyledgerError::ArtifactUnavailable {
                    slug: slug.to_string(),
                })
            }
            Err(e) => Err(KeyledgerError::PoolIO(format!(
                "Failed to inspect artifact {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Records held by `user_id`, in redemption order.
    pub fn entitlements_for(&self, user_id: &str) -> Vec<EntitlementRecord> {
        self.store.ledger().entitlements_for(user_id)
    }

    /// Product labels offered for redemption.
    pub fn products(&self) -> Vec<&str> {
        self.config.catalog.labels()
    }

    /// Re-read a product's pool file after external provisioning.
    pub async fn reload_pool(&self, product: &str) -> Result<(), KeyledgerError> {
        self.store.pools().reload(product).await
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Get the current configuration.
    pub fn config(&self) -> &KeyledgerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::pool::format::pool_file_name;
    use tempfile::TempDir;

    async fn manager_with(dir: &TempDir) -> EntitlementManager {
        let config = KeyledgerConfig::new(dir.path());
        std::fs::create_dir_all(&config.keys_dir).unwrap();
        std::fs::create_dir_all(&config.downloads_dir).unwrap();
        std::fs::write(
            config.keys_dir.join(pool_file_name("Temp Spoofer")),
            "ABC-123\nDEF-456",
        )
        .unwrap();
        std::fs::write(config.downloads_dir.join("temp.rar"), b"payload").unwrap();

        EntitlementManager::open_with_clock(
            config,
            Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")),
        )
        .await
        .unwrap()
    }

    fn alice() -> UserIdentity {
        UserIdentity::new("U1", "alice", "alice@example.com")
    }

    #[tokio::test]
    async fn test_products_listing() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir).await;
        assert_eq!(
            manager.products(),
            vec!["Fortnite Private", "Fortnite Public", "Temp Spoofer", "Perm Spoofer"]
        );
    }

    #[tokio::test]
    async fn test_authorize_download_after_redeem() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir).await;

        assert!(matches!(
            manager.authorize_download("U1", "temp-spoofer").await,
            Err(KeyledgerError::AccessDenied)
        ));

        manager
            .redeem(&alice(), "Temp Spoofer", "abc-123")
            .await
            .unwrap();

        let path = manager
            .authorize_download("U1", "temp-spoofer")
            .await
            .unwrap();
        assert!(path.ends_with("downloads/temp.rar"));
    }

    #[tokio::test]
    async fn test_authorize_download_unknown_slug() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir).await;

        assert!(matches!(
            manager.authorize_download("U1", "nonexistent-slug").await,
            Err(KeyledgerError::ProductNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_authorize_download_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir).await;
        std::fs::remove_file(dir.path().join("downloads/temp.rar")).unwrap();

        manager
            .redeem(&alice(), "Temp Spoofer", "ABC-123")
            .await
            .unwrap();

        assert!(matches!(
            manager.authorize_download("U1", "temp-spoofer").await,
            Err(KeyledgerError::ArtifactUnavailable { .. })
        ));
        assert!(manager.check_access("U1", "temp-spoofer"));
    }

    #[tokio::test]
    async fn test_reload_pool() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir).await;
        manager
            .redeem(&alice(), "Temp Spoofer", "ABC-123")
            .await
            .unwrap();

        std::fs::write(
            dir.path().join("keys").join(pool_file_name("Temp Spoofer")),
            "DEF-456\nGHI-789",
        )
        .unwrap();
        manager.reload_pool("Temp Spoofer").await.unwrap();

        manager
            .redeem(&alice(), "Temp Spoofer", "ghi-789")
            .await
            .unwrap();
        assert_eq!(manager.entitlements_for("U1").len(), 2);
    }
}
