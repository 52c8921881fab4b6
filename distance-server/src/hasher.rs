//! Password hashing

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::spawn_blocking;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Cannot hash password: {0}")]
    Hashing(String),
}

/// Password hashing capability
pub trait Hasher: Send + Sync {
    /// Produces a self-describing digest of the password
    fn hash(&self, password: &str) -> Result<String, Error>;

    /// Checks the password against the digest. Malformed digests never verify.
    fn verify(&self, password: &str, digest: &str) -> bool;

    /// Verifies the password against a placeholder digest, always failing.
    ///
    /// Used when the user doesn't exist, so the caller does the same amount of work as for the
    /// wrong password.
    fn verify_missing(&self, password: &str) -> bool {
        let _ = password;
        false
    }
}

/// Hashes the password on the blocking thread pool
pub async fn hash(hasher: Arc<dyn Hasher>, password: &str) -> Result<String, Error> {
    let password = password.to_owned();
    spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|err| Error::Hashing(err.to_string()))?
}

/// Verifies the password on the blocking thread pool
///
/// Without a digest the placeholder verification is performed. Fails closed if the blocking task
/// doesn't complete.
pub async fn verify(hasher: Arc<dyn Hasher>, password: &str, digest: Option<String>) -> bool {
    let password = password.to_owned();
    spawn_blocking(move || match digest {
        Some(digest) => hasher.verify(&password, &digest),
        None => hasher.verify_missing(&password),
    })
    .await
    .unwrap_or(false)
}

/// Argon2id hasher with random salts, producing PHC strings
pub struct Argon2Hasher {
    /// Valid digest of a random password, verified against for missing users
    placeholder: String,
}

impl Argon2Hasher {
    pub fn new() -> Result<Self, Error> {
        let placeholder = uuid::Uuid::new_v4().to_string();
        let placeholder = Self::hash_with_salt(&placeholder)?;
        Ok(Self { placeholder })
    }

    fn hash_with_salt(password: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| Error::Hashing(err.to_string()))
    }
}

impl Hasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, Error> {
        Self::hash_with_salt(password)
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(digest) = PasswordHash::new(digest) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &digest)
            .is_ok()
    }

    fn verify_missing(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.placeholder);
        false
    }
}

/// Cheap, deterministic hasher for tests
#[cfg(test)]
pub struct PlainHasher;

#[cfg(test)]
impl Hasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String, Error> {
        use base64::prelude::*;
        use sha3::{Digest, Sha3_256};

        let digest = Sha3_256::digest(password.as_bytes());
        Ok(format!("plain${}", BASE64_STANDARD.encode(digest)))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        self.hash(password).is_ok_and(|hash| hash == digest)
    }
}
