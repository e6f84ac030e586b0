//! Per-product key pools.

pub mod format;
pub mod store;
