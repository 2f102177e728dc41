//! HomeHub Vault - Key Derivation
//!
//! Turns a human secret (master password or PIN) plus a stored salt into a
//! 256-bit wrapping key, and handles the master-password verifier hash.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Salt length for wrapping-key derivation
pub const SALT_LEN: usize = 16;

/// PBKDF2 iteration count. Deliberately slow so brute-forcing PIN or
/// password guesses stays expensive.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Derive a 256-bit wrapping key from a secret and salt.
///
/// Pure function: same inputs always produce the same key. The salt must
/// be fresh random bytes for every wrap operation, never reused across
/// records.
pub fn derive_wrapping_key(secret: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

/// Generate a fresh 16-byte salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Hash the master password for storage (argon2id, PHC string format)
pub fn hash_master_password(password: &str) -> VaultResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify the master password against its stored hash.
///
/// A malformed stored hash verifies as false rather than surfacing a
/// distinct error.
pub fn verify_master_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Derivation tests run with a reduced-cost profile where possible;
    // PBKDF2 has no tunable here so these use the production count and
    // stay few.

    #[test]
    fn test_derivation_deterministic() {
        let salt = [7u8; SALT_LEN];
        let k1 = derive_wrapping_key("4821", &salt);
        let k2 = derive_wrapping_key("4821", &salt);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_derivation_sensitive_to_inputs() {
        let salt_a = [1u8; SALT_LEN];
        let salt_b = [2u8; SALT_LEN];
        let base = derive_wrapping_key("4821", &salt_a);
        assert_ne!(*base, *derive_wrapping_key("9999", &salt_a));
        assert_ne!(*base, *derive_wrapping_key("4821", &salt_b));
    }

    #[test]
    fn test_salt_freshness() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_master_password("Secret123!").unwrap();
        assert!(verify_master_password("Secret123!", &hash));
        assert!(!verify_master_password("Secret123?", &hash));
    }

    #[test]
    fn test_malformed_hash_rejects() {
        assert!(!verify_master_password("anything", "not-a-phc-string"));
    }
}
