//! Password hashing and verification using Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::LogbookError;

/// Minimum password length, in characters
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password, returning the PHC string (salt and parameters included)
pub fn hash_password(password: &str) -> Result<String, LogbookError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LogbookError::Internal(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored PHC hash.
///
/// A stored hash that cannot be parsed is an internal failure, not a
/// mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, LogbookError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| LogbookError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
