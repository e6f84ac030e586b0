//! Product catalog and download access policy.

pub mod access;
pub mod catalog;
