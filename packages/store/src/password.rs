//! Password hashing for [`crate::MemoryBackend`] accounts.
//!
//! Argon2id with a small memory cost: the in-process identity backend stands in
//! for a hosted service during development and tests, so hashing has to stay
//! fast even in debug builds. Hashes are PHC strings.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::error::{BackendError, ErrorCode};

fn hasher() -> Result<Argon2<'static>, BackendError> {
    let params = Params::new(1024, 1, 1, None)
        .map_err(|e| BackendError::new(ErrorCode::Unknown, format!("Invalid hash params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub(crate) fn hash_password(password: &str) -> Result<String, BackendError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BackendError::new(ErrorCode::Unknown, format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool, BackendError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| BackendError::new(ErrorCode::Unknown, format!("Invalid password hash: {e}")))?;
    Ok(hasher()?
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
