//! Entitlement records and the ledger that stores them.

pub mod record;
pub mod store;
