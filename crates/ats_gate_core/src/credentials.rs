//! crates/ats_gate_core/src/credentials.rs
//!
//! Salted one-way hashing of account secrets (Argon2id, PHC string format).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hashes `secret` with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks `secret` against a stored hash. A mismatch is `Ok(false)`;
/// only an unparseable stored hash is an error.
pub fn verify_secret(secret: &str, stored_hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(stored_hash)?;
    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_and_rejects_wrong_secret() {
        let hash = hash_secret("pw1").unwrap();
        assert!(!hash.contains("pw1"));
        assert!(verify_secret("pw1", &hash).unwrap());
        assert!(!verify_secret("wrong", &hash).unwrap());
    }

    #[test]
    fn salts_differ_per_hash() {
        assert_ne!(hash_secret("same").unwrap(), hash_secret("same").unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_secret("pw1", "not-a-phc-string").is_err());
    }
}
