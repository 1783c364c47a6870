//! API keys: 32 random bytes encoded with a fixed prefix; only the hash
//! is stored. Verification is a constant-time compare via
//! `gitaudit_core::Fingerprint`, the same SHA-256 fingerprint primitive
//! gitaudit-core defines for deployment file hashes.

use gitaudit_core::Fingerprint;
use rand::RngCore;

const KEY_PREFIX: &str = "gita";
/// Characters of the encoded key (after the prefix) used as the lookup
/// key in the store, so a full-table scan isn't needed to find the hash
/// to compare against.
const LOOKUP_PREFIX_LEN: usize = 8;

pub struct GeneratedApiKey {
    pub plaintext: String,
    pub lookup_prefix: String,
    pub hash_hex: String,
}

pub fn generate() -> GeneratedApiKey {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let body = hex::encode(bytes);
    let plaintext = format!("{KEY_PREFIX}_{body}");
    let lookup_prefix = body[..LOOKUP_PREFIX_LEN].to_string();
    let hash_hex = Fingerprint::of(plaintext.as_bytes()).to_hex();
    GeneratedApiKey { plaintext, lookup_prefix, hash_hex }
}

pub fn lookup_prefix_of(plaintext: &str) -> Option<String> {
    let body = plaintext.strip_prefix(&format!("{KEY_PREFIX}_"))?;
    body.get(..LOOKUP_PREFIX_LEN).map(str::to_string)
}

pub fn verify(plaintext: &str, stored_hash_hex: &str) -> bool {
    let Some(stored) = Fingerprint::from_hex(stored_hash_hex) else {
        return false;
    };
    let candidate = Fingerprint::of(plaintext.as_bytes());
    candidate.constant_time_eq(&stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_verifies_against_its_own_hash() {
        let key = generate();
        assert!(verify(&key.plaintext, &key.hash_hex));
    }

    #[test]
    fn wrong_key_does_not_verify() {
        let key = generate();
        assert!(!verify("gita_deadbeef", &key.hash_hex));
    }

    #[test]
    fn lookup_prefix_roundtrips() {
        let key = generate();
        assert_eq!(lookup_prefix_of(&key.plaintext).unwrap(), key.lookup_prefix);
    }
}
