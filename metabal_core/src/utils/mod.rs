//! Utility functions shared between modules
pub(crate) mod hashing;
