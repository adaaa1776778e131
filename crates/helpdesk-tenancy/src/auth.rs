//! Password hashing for staff accounts (bcrypt).
//!
//! Hashing and verification are CPU-bound; async callers should run them
//! on a blocking thread.

use helpdesk_core::error::{HelpdeskError, Result};

/// Hash a password with the default bcrypt cost.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with_cost(password, bcrypt::DEFAULT_COST)
}

/// Hash with an explicit cost factor (4..=31).
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| HelpdeskError::Tenant(format!("Password hashing failed: {e}")))
}

/// Verify a password against a stored bcrypt hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}
