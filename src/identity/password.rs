//! Argon2id password hashing for the credentials verifier.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

const DUMMY_PASSWORD: &str = "pairgate-dummy-password";

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Hash checked when there is no stored hash, so a miss costs the same as a hit.
fn dummy_hash() -> Result<&'static str> {
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash);
    }
    let hash = hash_password(DUMMY_PASSWORD)?;
    Ok(DUMMY_HASH.get_or_init(|| hash))
}

/// Hash a password into a PHC string with a fresh random salt.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string())
}

/// Check a password against a stored PHC string.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid password hash"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Check a password against a stored hash, or against a dummy hash when the
/// account has none. A missing hash never matches.
///
/// # Errors
/// Returns an error if either hash cannot be parsed or produced.
pub fn verify_candidate(password: &str, stored_hash: Option<&str>) -> Result<bool> {
    match stored_hash {
        Some(stored) => verify_password(password, stored),
        None => {
            verify_password(password, dummy_hash()?)?;
            Ok(false)
        }
    }
}
