use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed")]
    Hashing,
    #[error("password verification failed")]
    Verification,
}

/// Argon2id hasher with deployment-tuned cost.
#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    pub fn new(cfg: PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.lanes, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produces a PHC string with a fresh random salt.
    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                PasswordError::Hashing
            })?
            .to_string();
        Ok(hash)
    }

    /// Checks `plain` against a stored PHC string. Cost parameters come from the hash itself.
    pub fn verify(&self, hash: &str, plain: &str) -> Result<(), PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            PasswordError::Verification
        })?;
        self.argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .map_err(|_| PasswordError::Verification)
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> Hasher {
    Hasher::new(PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        lanes: 1,
    })
    .expect("test params are valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = cheap_hasher();
        let password = "Secur3P@ssw0rd!";
        let hash = hasher.hash(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(hash.starts_with("$argon2id$"));
        hasher.verify(&hash, password).expect("verify should succeed");
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("correct-horse-battery-staple").expect("hashing should succeed");
        let err = hasher.verify(&hash, "wrong-password").unwrap_err();
        assert!(matches!(err, PasswordError::Verification));
    }

    #[test]
    fn same_input_gets_a_fresh_salt() {
        let hasher = cheap_hasher();
        let a = hasher.hash("password").unwrap();
        let b = hasher.hash("password").unwrap();
        assert_ne!(a, b);
        hasher.verify(&a, "password").unwrap();
        hasher.verify(&b, "password").unwrap();
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = cheap_hasher().verify("not-a-valid-hash", "anything").unwrap_err();
        assert!(matches!(err, PasswordError::Verification));
    }

    #[test]
    fn hashes_from_other_cost_settings_still_verify() {
        let strong = Hasher::new(PasswordConfig {
            memory_kib: 2048,
            iterations: 2,
            lanes: 1,
        })
        .unwrap();
        let hash = strong.hash("password").unwrap();
        cheap_hasher().verify(&hash, "password").unwrap();
    }

    #[test]
    fn rejects_impossible_params() {
        assert!(Hasher::new(PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            lanes: 1,
        })
        .is_err());
    }
}
