//! Store service owning the key pools and the entitlement ledger.
//!
//! Opened once (loading the ledger from disk) and shared by the redemption
//! engine and access control. Every mutation is flushed to disk before it
//! becomes visible in memory.

use crate::config::KeyledgerConfig;
use crate::ledger::store::EntitlementLedger;
use crate::pool::store::KeyPoolStore;
use crate::KeyledgerError;
use std::sync::Arc;

/// Persistent entitlement state.
#[derive(Clone)]
pub struct Store {
    pools: Arc<KeyPoolStore>,
    ledger: Arc<EntitlementLedger>,
}

impl Store {
    /// Open the stores described by `config`, creating the keys directory if needed.
    ///
    /// # Errors
    /// - `ConfigError` - Configuration is invalid
    /// - `PoolIO` - Keys directory could not be created
    /// - `LedgerIO` - Ledger file could not be read
    pub async fn open(config: &KeyledgerConfig) -> Result<Self, KeyledgerError> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.keys_dir)
            .await
            .map_err(|e| {
                KeyledgerError::PoolIO(format!(
                    "Failed to create keys dir {}: {}",
                    config.keys_dir.display(),
                    e
                ))
            })?;

        let ledger = EntitlementLedger::open(config.ledger_path()).await?;
        let pools = KeyPoolStore::new(config.keys_dir.clone());

        Ok(Self {
            pools: Arc::new(pools),
            ledger: Arc::new(ledger),
        })
    }

    /// Key pools.
    pub fn pools(&self) -> &Arc<KeyPoolStore> {
        &self.pools
    }

    /// Entitlement ledger.
    pub fn ledger(&self) -> &Arc<EntitlementLedger> {
        &self.ledger
    }
}
