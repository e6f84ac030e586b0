//! Download access control.
//!
//! Answers whether a user may download a product requested by slug, and which
//! artifact backs that product. Reads the ledger snapshot only; never takes a
//! writer lock.

use crate::ledger::store::EntitlementLedger;
use crate::policy::catalog::{Catalog, Product};
use crate::KeyledgerError;
use std::sync::Arc;

/// Artifact released for a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    /// Product slug.
    pub slug: String,

    /// Product label.
    pub label: String,

    /// Artifact file name under the downloads directory.
    pub file_name: String,
}

/// Resolve a slug to its artifact.
///
/// # Returns
/// * `Ok(handle)` - Product is known and publishes an artifact
/// * `Err(ProductNotFound)` - Slug is not in the catalog
/// * `Err(ArtifactUnavailable)` - Product is known but has no artifact
pub fn resolve_artifact(catalog: &Catalog, slug: &str) -> Result<ArtifactHandle, KeyledgerError> {
    let product = catalog
        .by_slug(slug)
        .ok_or_else(|| KeyledgerError::ProductNotFound {
            slug: slug.to_string(),
        })?;

    let file_name = product
        .artifact
        .clone()
        .ok_or_else(|| KeyledgerError::ArtifactUnavailable {
            slug: slug.to_string(),
        })?;

    Ok(ArtifactHandle {
        slug: product.slug.clone(),
        label: product.label.clone(),
        file_name,
    })
}

/// Ledger-backed access queries.
#[derive(Clone)]
pub struct AccessControl {
    ledger: Arc<EntitlementLedger>,
    catalog: Arc<Catalog>,
}

impl AccessControl {
    /// Create an access checker over a ledger and catalog.
    pub fn new(ledger: Arc<EntitlementLedger>, catalog: Arc<Catalog>) -> Self {
        Self { ledger, catalog }
    }

    /// Whether `user_id` may download the product behind `slug`.
    ///
    /// Unknown slugs are never accessible.
    pub fn check_access(&self, user_id: &str, slug: &str) -> bool {
        match self.catalog.by_slug(slug) {
            Some(product) => self.ledger.has_access(user_id, &product.label),
            None => false,
        }
    }

    /// Like [`check_access`](Self::check_access) but distinguishes why access fails.
    ///
    /// # Errors
    /// - `ProductNotFound` - Slug is not in the catalog
    /// - `AccessDenied` - User holds no entitlement for the product
    pub fn require_access(&self, user_id: &str, slug: &str) -> Result<&Product, KeyledgerError> {
        let product = self
            .catalog
            .by_slug(slug)
            .ok_or_else(|| KeyledgerError::ProductNotFound {
                slug: slug.to_string(),
            })?;

        if !self.ledger.has_access(user_id, &product.label) {
            return Err(KeyledgerError::AccessDenied);
        }
        Ok(product)
    }

    /// Resolve the artifact for `slug`.
    pub fn resolve_artifact(&self, slug: &str) -> Result<ArtifactHandle, KeyledgerError> {
        resolve_artifact(&self.catalog, slug)
    }
}
