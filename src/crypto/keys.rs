//! HomeHub Vault - Master Key
//!
//! The single symmetric key that encrypts vault file bodies. Generated once
//! at setup, never persisted in plaintext, held in memory only while the
//! vault is unlocked.

use rand::RngCore;
use secrecy::{ExposeSecret, Secret};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Secure key wrapper. The inner bytes are zeroized when the last clone
/// is dropped.
#[derive(Clone)]
pub struct MasterKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl MasterKey {
    /// Create a master key from raw bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique() {
        let k1 = MasterKey::generate();
        let k2 = MasterKey::generate();
        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_clone_shares_bytes() {
        let k = MasterKey::generate();
        let c = k.clone();
        assert_eq!(k.expose(), c.expose());
    }

    #[test]
    fn test_debug_redacts() {
        let k = MasterKey::generate();
        assert_eq!(format!("{:?}", k), "MasterKey(..)");
    }
}
