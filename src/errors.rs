//! Keyledger error types.

use thiserror::Error;

/// Errors that can occur while redeeming keys or checking entitlements.
#[derive(Debug, Error)]
pub enum KeyledgerError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The requested product is unknown or has no key pool.
    #[error("Invalid product: {product}")]
    InvalidProduct {
        /// Product label as submitted.
        product: String,
    },

    /// Key is not in the product's pool, or was already redeemed.
    #[error("Invalid or already used key for {product}")]
    InvalidOrUsedKey {
        /// Product label as submitted.
        product: String,
        /// Key exactly as submitted, for re-display.
        key: String,
    },

    /// User already holds the product and repeat redemption is rejected.
    #[error("Already entitled to {product}")]
    AlreadyEntitled {
        /// Product label.
        product: String,
    },

    /// Authenticated user has no entitlement for the product.
    #[error("Access denied")]
    AccessDenied,

    /// Product slug is not part of the catalog.
    #[error("Product not found: {slug}")]
    ProductNotFound {
        /// Slug as requested.
        slug: String,
    },

    /// Product is known but its artifact is currently missing.
    #[error("Artifact unavailable for {slug}")]
    ArtifactUnavailable {
        /// Slug as requested.
        slug: String,
    },

    /// No pool file exists for the product.
    #[error("Key pool not found: {product}")]
    PoolNotFound {
        /// Product label.
        product: String,
    },

    /// Ledger already holds a record for this key.
    #[error("Key already consumed")]
    KeyAlreadyConsumed,

    /// A record field would corrupt the delimiter-joined ledger format.
    #[error("Field `{field}` contains a delimiter or is empty")]
    MalformedField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Key pool I/O error.
    #[error("Key pool I/O error: {0}")]
    PoolIO(String),

    /// Ledger I/O error.
    #[error("Ledger I/O error: {0}")]
    LedgerIO(String),
}

impl KeyledgerError {
    /// User-facing message for the routing layer to render.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidProduct { .. } | Self::PoolNotFound { .. } => {
                "The selected product is invalid or not available."
            }
            Self::InvalidOrUsedKey { .. } | Self::KeyAlreadyConsumed => {
                "Invalid or already used key"
            }
            Self::AlreadyEntitled { .. } => "You already own this product.",
            Self::AccessDenied => "You don't have access to this product.",
            Self::ProductNotFound { .. } => "Product not found",
            Self::ArtifactUnavailable { .. } => "This product is currently out of service.",
            Self::MalformedField { .. } => "Your account details cannot be used to redeem keys.",
            Self::ConfigError(_) | Self::PoolIO(_) | Self::LedgerIO(_) => {
                "Something went wrong. Please try again later."
            }
        }
    }

    /// Whether the error is an unexpected failure rather than a user-level rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::PoolIO(_) | Self::LedgerIO(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_fatal() {
        assert!(KeyledgerError::PoolIO("disk".to_string()).is_fatal());
        assert!(KeyledgerError::LedgerIO("disk".to_string()).is_fatal());
        assert!(!KeyledgerError::AccessDenied.is_fatal());
        assert!(!KeyledgerError::InvalidProduct {
            product: "x".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_denied_and_unavailable_messages_differ() {
        let denied = KeyledgerError::AccessDenied.user_message();
        let unavailable = KeyledgerError::ArtifactUnavailable {
            slug: "temp-spoofer".to_string(),
        }
        .user_message();
        let missing = KeyledgerError::ProductNotFound {
            slug: "nope".to_string(),
        }
        .user_message();
        assert_ne!(denied, unavailable);
        assert_ne!(denied, missing);
        assert_ne!(unavailable, missing);
    }
}
