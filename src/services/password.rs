//! Password hashing with Argon2id
//!
//! Hashes are stored in PHC string format, which carries the algorithm,
//! parameters and salt alongside the digest.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Hash verified against when a login names an unknown user, so that both
/// failure paths cost one Argon2 verification.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("newsdesk-dummy").ok());

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and an error only for a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// Burn one verification for a login that matched no user.
pub fn verify_against_dummy(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}
