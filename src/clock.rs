//! Time source for `Redemption::redeemed_at`.
//!
//! Ledger lines carry no timestamp, so the stamp only appears on the receipt
//! returned to the caller. Engines take an `Arc<dyn Clock>` to keep that
//! receipt reproducible in tests.

use chrono::{DateTime, Utc};

/// Stamps completed redemptions.
pub trait Clock: Send + Sync {
    /// Instant recorded on the next redemption receipt.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock stamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Stamp that only changes when a test moves it.
///
/// Shared behind an `Arc`, so a test can move time between two redemptions
/// made through the same engine.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug)]
pub struct MockClock {
    stamp: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Stamp every redemption with an RFC 3339 instant.
    ///
    /// # Panics
    /// On an unparseable timestamp; only fixtures call this.
    pub fn from_rfc3339(s: &str) -> Self {
        let stamp = DateTime::parse_from_rfc3339(s)
            .unwrap_or_else(|e| panic!("bad fixture timestamp {:?}: {}", s, e))
            .with_timezone(&Utc);
        Self {
            stamp: std::sync::Mutex::new(stamp),
        }
    }

    /// Move the stamp used by later redemptions.
    pub fn set(&self, s: &str) {
        let next = Self::from_rfc3339(s).now_utc();
        *self.stamp.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.stamp.lock().unwrap_or_else(|p| p.into_inner())
    }
}
