//! Password hashing via argon2. A work factor of at least 12 is required;
//! argon2 has no single "work factor" knob, so this pins the iteration
//! count (`t_cost`) to 12 and uses the library's recommended
//! memory/parallelism defaults.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use gitaudit_core::{GitopsError, GitopsResult};

const MIN_T_COST: u32 = 12;

fn hasher() -> Argon2<'static> {
    let params = Params::new(Params::DEFAULT_M_COST, MIN_T_COST, Params::DEFAULT_P_COST, None)
        .expect("valid argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

pub fn hash_password(password: &str) -> GitopsResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GitopsError::internal(format!("failed to hash password: {e}")))
}

/// Always runs the hash comparison, even for a hash that doesn't parse, so
/// that an unknown username and a wrong password take the same time —
/// timing side channels for user existence are flattened by always
/// computing the hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => hasher().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => {
            let _ = hash_password(password);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn malformed_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-real-hash"));
    }
}
