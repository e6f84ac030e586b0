//! Closed product catalog.
//!
//! Maps URL-style slugs to canonical product labels and artifact file names.
//! The label is the string stored in ledger records and used to name pool files,
//! so it must never contain the ledger delimiter.

use crate::ledger::record::FIELD_DELIMITER;
use crate::pool::format::pool_file_name;
use crate::KeyledgerError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A product that keys can be redeemed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// URL-style identifier (e.g., "temp-spoofer").
    pub slug: String,

    /// Canonical display name (e.g., "Temp Spoofer").
    pub label: String,

    /// Artifact file name under the downloads directory, if one is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl Product {
    fn new(slug: &str, label: &str, artifact: Option<&str>) -> Self {
        Self {
            slug: slug.to_string(),
            label: label.to_string(),
            artifact: artifact.map(String::from),
        }
    }
}

static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog {
    products: vec![
        Product::new("fortnite-private", "Fortnite Private", Some("fnpriv.rar")),
        Product::new("fortnite-public", "Fortnite Public", Some("fnpub.rar")),
        Product::new("temp-spoofer", "Temp Spoofer", Some("temp.rar")),
        Product::new("perm-spoofer", "Perm Spoofer", Some("perm.rar")),
    ],
});

/// Fixed set of products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Default for Catalog {
    fn default() -> Self {
        DEFAULT_CATALOG.clone()
    }
}

impl Catalog {
    /// Build a catalog from an explicit product list.
    pub fn new(products: Vec<Product>) -> Result<Self, KeyledgerError> {
        let catalog = Self { products };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from a JSON array of products.
    pub fn from_json(json: &str) -> Result<Self, KeyledgerError> {
        let products: Vec<Product> = serde_json::from_str(json)
            .map_err(|e| KeyledgerError::ConfigError(format!("Invalid catalog JSON: {}", e)))?;
        Self::new(products)
    }

    /// Check slugs and labels are unique, non-empty and delimiter-free.
    pub fn validate(&self) -> Result<(), KeyledgerError> {
        let mut slugs = HashSet::new();
        let mut labels = HashSet::new();
        let mut pool_files = HashSet::new();

        for product in &self.products {
            if product.slug.trim().is_empty() || product.label.trim().is_empty() {
                return Err(KeyledgerError::ConfigError(
                    "catalog slug and label cannot be empty".to_string(),
                ));
            }
            if product.label.contains(FIELD_DELIMITER)
                || product.label.contains(['\n', '\r'])
            {
                return Err(KeyledgerError::ConfigError(format!(
                    "catalog label {:?} contains a reserved character",
                    product.label
                )));
            }
            if !slugs.insert(product.slug.as_str()) {
                return Err(KeyledgerError::ConfigError(format!(
                    "duplicate catalog slug {:?}",
                    product.slug
                )));
            }
            if !labels.insert(product.label.as_str()) {
                return Err(KeyledgerError::ConfigError(format!(
                    "duplicate catalog label {:?}",
                    product.label
                )));
            }
            // Labels differing only in whitespace share one pool file.
            if !pool_files.insert(pool_file_name(&product.label)) {
                return Err(KeyledgerError::ConfigError(format!(
                    "catalog label {:?} maps to an existing pool file",
                    product.label
                )));
            }
        }

        Ok(())
    }

    /// All products in catalog order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Product labels in catalog order.
    pub fn labels(&self) -> Vec<&str> {
        self.products.iter().map(|p| p.label.as_str()).collect()
    }

    /// Look up a product by slug.
    pub fn by_slug(&self, slug: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.slug == slug)
    }

    /// Look up a product by exact label.
    pub fn by_label(&self, label: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.label == label)
    }
}
