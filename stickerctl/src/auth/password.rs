//! Password hashing, verification and validation.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{config::PasswordConfig, errors::Error};

/// Throwaway hashes per parameter set, verified when a login names an unknown account.
static DUMMY_HASHES: Lazy<DashMap<Argon2Params, String>> = Lazy::new(DashMap::new);

#[cfg(test)]
pub(crate) static VERIFICATIONS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Hash a password with Argon2id into a PHC string (salt and params embedded).
pub fn hash_string(input: &str, params: Argon2Params) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = params.to_argon2()?.hash_password(input.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Verify a password against a PHC hash. Uses the parameters embedded in the hash.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    #[cfg(test)]
    VERIFICATIONS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse password hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Hash on a blocking thread so argon2 doesn't stall the async runtime.
pub async fn hash_blocking(password: String, params: Argon2Params) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_string(&password, params))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

pub async fn verify_blocking(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

/// Spend the same Argon2 work as a real verification, against a hash no password matches.
///
/// The hash for `params` is built on first use and cached.
pub async fn verify_dummy_blocking(password: String, params: Argon2Params) -> Result<(), Error> {
    let cached = DUMMY_HASHES.get(&params).map(|hash| hash.value().clone());
    let hash = match cached {
        Some(hash) => hash,
        None => {
            let hash = hash_blocking("stickerctl-unknown-account".to_string(), params).await?;
            DUMMY_HASHES.entry(params).or_insert(hash).value().clone()
        }
    };

    verify_blocking(password, hash).await?;
    Ok(())
}

/// Check a candidate password against the configured length rules (counted in characters).
pub fn validate(password: &str, config: &PasswordConfig) -> Result<(), Error> {
    let length = password.chars().count();
    if length < config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", config.min_length),
        });
    }
    if length > config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", config.max_length),
        });
    }
    Ok(())
}
