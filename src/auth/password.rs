use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::Deserialize;
use tracing::{debug, error};

use crate::auth::errors::AccountError;

/// Work factor settings for [`Hasher`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HasherConfig {
    /// Argon2 iteration count. Raised to the library default when lower.
    pub cost: Option<u32>,
    /// Fast mode for test suites: minimal memory and a single pass.
    pub minimum_cost_override: bool,
}

impl HasherConfig {
    pub fn fast() -> Self {
        Self {
            cost: None,
            minimum_cost_override: true,
        }
    }
}

/// Salted one-way hashing for passwords and tokens alike.
#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    pub fn new(config: HasherConfig) -> Result<Self, AccountError> {
        let params = if config.minimum_cost_override {
            Params::new(Params::MIN_M_COST, Params::MIN_T_COST, Params::MIN_P_COST, None)
        } else {
            let t_cost = config
                .cost
                .unwrap_or(Params::DEFAULT_T_COST)
                .max(Params::DEFAULT_T_COST);
            Params::new(Params::DEFAULT_M_COST, t_cost, Params::DEFAULT_P_COST, None)
        }
        .map_err(|e| AccountError::Hash(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// PHC-format digest of `secret`.
    pub fn digest(&self, secret: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AccountError::Hash(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// True iff `candidate` matches `hash`. A missing or unparseable hash is
    /// a mismatch.
    pub fn verify(&self, hash: Option<&str>, candidate: &str) -> bool {
        let Some(hash) = hash else {
            return false;
        };
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "stored digest is malformed");
                return false;
            }
        };
        // Parameters come from the PHC string, not from `self.params`.
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }
}
