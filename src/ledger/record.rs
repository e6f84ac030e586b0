//! Entitlement record and its line format.
//!
//! Each ledger line holds five positional fields joined by `=`:
//!
//! ```text
//! user_id=username=email=redeemed_key=product_label
//! ```
//!
//! No escaping is performed, so a field containing `=` (or a line break)
//! is rejected when a record is built rather than written corrupt.

use crate::KeyledgerError;

/// Separator between record fields.
pub const FIELD_DELIMITER: char = '=';

const FIELD_COUNT: usize = 5;

/// Authenticated identity supplied by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable, unique user identifier.
    pub id: String,

    /// Display username.
    pub username: String,

    /// Email address.
    pub email: String,
}

impl UserIdentity {
    /// Create an identity.
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
        }
    }
}

/// One redemption: who consumed which key for which product.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitlementRecord {
    /// User identifier.
    pub user_id: String,

    /// Username at redemption time.
    pub username: String,

    /// Email at redemption time.
    pub email: String,

    /// Normalized key that was consumed.
    pub redeemed_key: String,

    /// Canonical product label.
    pub product_label: String,
}

impl EntitlementRecord {
    /// Build a record, rejecting fields that would break the line format.
    pub fn new(
        user: &UserIdentity,
        redeemed_key: &str,
        product_label: &str,
    ) -> Result<Self, KeyledgerError> {
        check_identity(user)?;
        check_field("redeemed_key", redeemed_key, false)?;
        check_field("product_label", product_label, false)?;

        Ok(Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            redeemed_key: redeemed_key.to_string(),
            product_label: product_label.to_string(),
        })
    }

    /// Parse one ledger line. Returns `None` for blank or malformed lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\r');
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return None;
        }
        if fields[0].is_empty() || fields[3].is_empty() || fields[4].is_empty() {
            return None;
        }

        Some(Self {
            user_id: fields[0].to_string(),
            username: fields[1].to_string(),
            email: fields[2].to_string(),
            redeemed_key: fields[3].to_string(),
            product_label: fields[4].to_string(),
        })
    }

    /// Render as a ledger line (no trailing newline).
    pub fn to_line(&self) -> String {
        [
            self.user_id.as_str(),
            self.username.as_str(),
            self.email.as_str(),
            self.redeemed_key.as_str(),
            self.product_label.as_str(),
        ]
        .join("=")
    }
}

/// Validate identity fields before a redemption touches any store.
pub fn check_identity(user: &UserIdentity) -> Result<(), KeyledgerError> {
    check_field("user_id", &user.id, false)?;
    check_field("username", &user.username, true)?;
    check_field("email", &user.email, true)
}

fn check_field(
    field: &'static str,
    value: &str,
    allow_empty: bool,
) -> Result<(), KeyledgerError> {
    let empty = value.trim().is_empty();
    if (empty && !allow_empty) || value.contains(FIELD_DELIMITER) || value.contains(['\n', '\r'])
    {
        return Err(KeyledgerError::MalformedField { field });
    }
    Ok(())
}
