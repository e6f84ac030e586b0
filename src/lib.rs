//! # Keyledger
//!
//! **Single-use license key redemption and download entitlements.**
//!
//! Keyledger exchanges license keys for permanent entitlement records and
//! answers whether an authenticated user may download a product. Keys live in
//! one pool file per product; redemptions are appended to a flat ledger file.
//!
//! ## Features
//!
//! - **At-most-once redemption** — a key produces at most one ledger record, ever
//! - **Serialized mutations** — one lock per key pool, one for the ledger
//! - **Lock-free access checks** — downloads read an immutable ledger snapshot
//! - **Crash-safe ordering** — ledger append precedes pool removal
//! - **Flat-file compatibility** — `user_id=username=email=key=product` lines
//!
//! ## Quickstart
//!
//! ```no_run
//! use keyledger::{EntitlementManager, KeyledgerConfig, UserIdentity};
//!
//! # async fn run() -> Result<(), keyledger::KeyledgerError> {
//! let manager = EntitlementManager::open(KeyledgerConfig::new("/srv/shop")).await?;
//! let user = UserIdentity::new("80351110224678912", "nelly", "nelly@example.com");
//!
//! let redemption = manager.redeem(&user, "Temp Spoofer", " abc-123 ").await?;
//! println!("redeemed {}", redemption.record.redeemed_key);
//!
//! if manager.check_access(&user.id, "temp-spoofer") {
//!     let path = manager.authorize_download(&user.id, "temp-spoofer").await?;
//!     println!("serve {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## On-disk layout
//!
//! - `keys/<Label%20With%20Spaces>.txt` — one key per line, blank lines ignored
//! - `keys/users.txt` — one entitlement record per line
//! - `downloads/<artifact>` — files released to entitled users
//!
//! Identity, sessions and HTTP routing are the caller's concern. Errors carry
//! a [`KeyledgerError::user_message`] for rendering.

#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
mod persist;

// Storage layer
pub mod ledger;
pub mod pool;
pub mod store;

// Policy layer
pub mod policy;

// Redemption
pub mod engine;

// Manager (main public API)
pub mod manager;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::{KeyledgerConfig, RepeatRedemption};
pub use engine::{Redemption, RedemptionEngine};
pub use errors::KeyledgerError;
pub use ledger::record::{EntitlementRecord, UserIdentity};
pub use manager::EntitlementManager;
pub use policy::access::{AccessControl, ArtifactHandle};
pub use policy::catalog::{Catalog, Product};
pub use store::Store;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
