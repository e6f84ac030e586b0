//! Key redemption engine.
//!
//! Enforces at-most-once redemption and performs the two-store mutation:
//! the ledger record is appended first, then the key leaves its pool. A crash
//! between the two leaves the key listed but already consumed, which the
//! ledger check keeps unredeemable.

use crate::clock::Clock;
use crate::config::RepeatRedemption;
use crate::ledger::record::{check_identity, EntitlementRecord, UserIdentity};
use crate::policy::catalog::Catalog;
use crate::pool::format::{key_fingerprint, normalize_key};
use crate::store::Store;
use crate::KeyledgerError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Successful redemption.
#[derive(Debug, Clone)]
pub struct Redemption {
    /// The record appended to the ledger.
    pub record: EntitlementRecord,

    /// When the redemption completed.
    pub redeemed_at: DateTime<Utc>,

    /// Pool entries removed (more than one when the pool held duplicates).
    pub retired_occurrences: usize,

    /// The user's entitlements after this redemption.
    pub entitlements: Vec<EntitlementRecord>,
}

/// Redeems keys against the store.
pub struct RedemptionEngine {
    store: Store,
    catalog: Arc<Catalog>,
    clock: Arc<dyn Clock>,
    repeat_redemption: RepeatRedemption,
}

impl RedemptionEngine {
    /// Create an engine over a store and catalog.
    pub fn new(
        store: Store,
        catalog: Arc<Catalog>,
        clock: Arc<dyn Clock>,
        repeat_redemption: RepeatRedemption,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            repeat_redemption,
        }
    }

    /// Redeem `raw_key` for the product labelled `product` on behalf of `user`.
    ///
    /// The key is trimmed and uppercased before any lookup. The product's pool
    /// stays locked from the membership check until the key is removed.
    ///
    /// # Errors
    /// - `InvalidProduct` - Product is not in the catalog or has no pool
    /// - `InvalidOrUsedKey` - Key is not in the pool or was already redeemed
    /// - `AlreadyEntitled` - User holds the product and repeats are rejected
    /// - `MalformedField` - Identity contains the ledger delimiter
    /// - `PoolIO` / `LedgerIO` - Persistence failed
    pub async fn redeem(
        &self,
        user: &UserIdentity,
        product: &str,
        raw_key: &str,
    ) -> Result<Redemption, KeyledgerError> {
        let key = normalize_key(raw_key);
        let invalid_product = || KeyledgerError::InvalidProduct {
            product: product.to_string(),
        };
        let invalid_key = || KeyledgerError::InvalidOrUsedKey {
            product: product.to_string(),
            key: raw_key.to_string(),
        };

        let Some(entry) = self.catalog.by_label(product) else {
            tracing::warn!(product = %product, "redemption for unknown product");
            return Err(invalid_product());
        };
        let label = entry.label.as_str();

        if key.is_empty() {
            return Err(invalid_key());
        }
        check_identity(user)?;

        let mut pool = match self.store.pools().lock(label).await {
            Ok(pool) => pool,
            Err(KeyledgerError::PoolNotFound { .. }) => {
                tracing::warn!(product = %label, "redemption for product without key pool");
                return Err(invalid_product());
            }
            Err(e) => return Err(e),
        };

        let ledger = self.store.ledger();
        let fingerprint = key_fingerprint(&key);

        // Both checks are required: unknown keys and consumed-but-still-listed keys.
        if !pool.contains(&key) || ledger.is_key_consumed(&key) {
            tracing::warn!(
                user_id = %user.id,
                product = %label,
                key = %fingerprint,
                "rejected invalid or used key"
            );
            return Err(invalid_key());
        }

        if self.repeat_redemption == RepeatRedemption::Reject
            && ledger.has_access(&user.id, label)
        {
            tracing::warn!(user_id = %user.id, product = %label, "repeat redemption rejected");
            return Err(KeyledgerError::AlreadyEntitled {
                product: label.to_string(),
            });
        }

        let record = EntitlementRecord::new(user, &key, label)?;
        let index = match ledger.append(record.clone()).await {
            Ok(index) => index,
            // Same literal key redeemed concurrently through another pool.
            Err(KeyledgerError::KeyAlreadyConsumed) => return Err(invalid_key()),
            Err(e) => return Err(e),
        };

        let retired_occurrences = pool.remove(&key).await.map_err(|e| {
            tracing::error!(
                product = %label,
                key = %fingerprint,
                error = %e,
                "key recorded in ledger but still listed in pool"
            );
            e
        })?;

        if retired_occurrences > 1 {
            tracing::warn!(
                product = %label,
                key = %fingerprint,
                retired = retired_occurrences,
                "retired duplicate pool entries"
            );
        }

        tracing::info!(
            user_id = %user.id,
            product = %label,
            key = %fingerprint,
            "key redeemed"
        );

        Ok(Redemption {
            record,
            redeemed_at: self.clock.now_utc(),
            retired_occurrences,
            entitlements: index.entitlements_for(&user.id),
        })
    }
}
