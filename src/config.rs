//! Keyledger configuration.

use crate::policy::catalog::Catalog;
use crate::KeyledgerError;
use std::path::PathBuf;

/// Default ledger file name inside the keys directory.
pub const DEFAULT_LEDGER_FILE: &str = "users.txt";

/// What to do when a user redeems a key for a product they already hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatRedemption {
    /// Record the additional key (keys stack).
    #[default]
    Allow,
    /// Refuse with `AlreadyEntitled` and leave the key in the pool.
    Reject,
}

/// Configuration for the entitlement stores.
#[derive(Debug, Clone)]
pub struct KeyledgerConfig {
    /// Directory holding one pool file per product plus the ledger file.
    pub keys_dir: PathBuf,

    /// Directory holding downloadable artifacts.
    pub downloads_dir: PathBuf,

    /// Ledger file name inside `keys_dir`.
    pub ledger_file: String,

    /// Products that can be redeemed and downloaded.
    pub catalog: Catalog,

    /// Policy for redeeming a second key for a held product.
    pub repeat_redemption: RepeatRedemption,
}

impl KeyledgerConfig {
    /// Configuration rooted at `root`: `root/keys` and `root/downloads`,
    /// the built-in catalog, and repeat redemption allowed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            keys_dir: root.join("keys"),
            downloads_dir: root.join("downloads"),
            ledger_file: DEFAULT_LEDGER_FILE.to_string(),
            catalog: Catalog::default(),
            repeat_redemption: RepeatRedemption::default(),
        }
    }

    /// Configuration rooted at `dirs::data_dir()/<namespace>/`.
    pub fn with_namespace(namespace: &str) -> Result<Self, KeyledgerError> {
        if namespace.trim().is_empty() {
            return Err(KeyledgerError::ConfigError(
                "namespace cannot be empty".to_string(),
            ));
        }
        let base_dir = dirs::data_dir().ok_or_else(|| {
            KeyledgerError::ConfigError("Could not find data directory".to_string())
        })?;
        Ok(Self::new(base_dir.join(namespace)))
    }

    /// Replace the catalog.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set the repeat redemption policy.
    pub fn repeat_redemption(mut self, policy: RepeatRedemption) -> Self {
        self.repeat_redemption = policy;
        self
    }

    /// Full path of the ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.keys_dir.join(&self.ledger_file)
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), KeyledgerError> {
        if self.keys_dir.as_os_str().is_empty() {
            return Err(KeyledgerError::ConfigError(
                "keys_dir cannot be empty".to_string(),
            ));
        }
        if self.ledger_file.is_empty() || self.ledger_file.contains(['/', '\\']) {
            return Err(KeyledgerError::ConfigError(format!(
                "ledger_file must be a plain file name, got {:?}",
                self.ledger_file
            )));
        }
        // A product whose pool file would collide with the ledger.
        if let Some(product) = self
            .catalog
            .products()
            .iter()
            .find(|p| crate::pool::format::pool_file_name(&p.label) == self.ledger_file)
        {
            return Err(KeyledgerError::ConfigError(format!(
                "product {:?} collides with the ledger file",
                product.label
            )));
        }
        self.catalog.validate()
    }
}
