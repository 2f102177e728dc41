//! HomeHub Vault - Master Key Wrapping
//!
//! Authenticated encryption of the small master-key blob under a
//! password- or PIN-derived wrapping key.
//!
//! Serialized form: `nonce(12) ‖ AES-256-GCM ciphertext ‖ tag(16)`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::keys::{MasterKey, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length
const TAG_LEN: usize = 16;

/// One wrapped copy of the master key together with the salt its
/// wrapping key was derived from. Two records exist per installation:
/// one under the master password, one under the PIN. Both unwrap to the
/// identical master key.
#[derive(Clone)]
pub struct WrappedKeyRecord {
    /// Salt fed to the KDF for this record's wrapping key
    pub salt: [u8; super::kdf::SALT_LEN],
    /// `nonce ‖ ciphertext ‖ tag`
    pub blob: Vec<u8>,
}

/// Wrap the master key under a wrapping key.
///
/// A fresh random nonce is generated on every call.
pub fn wrap_key(key: &MasterKey, wrapping_key: &[u8; 32]) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(wrapping_key)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, key.expose().as_slice())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Unwrap a master key blob.
///
/// Fails closed: a wrong wrapping key, a corrupted blob or a truncated
/// one all yield the same generic `InvalidCredential`, never partial
/// plaintext.
pub fn unwrap_key(blob: &[u8], wrapping_key: &[u8; 32]) -> VaultResult<MasterKey> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::InvalidCredential);
    }

    let cipher =
        Aes256Gcm::new_from_slice(wrapping_key).map_err(|_| VaultError::InvalidCredential)?;
    let nonce = Nonce::from_slice(&blob[..NONCE_LEN]);

    let plaintext = cipher
        .decrypt(nonce, &blob[NONCE_LEN..])
        .map_err(|_| VaultError::InvalidCredential)?;

    let bytes: [u8; KEY_LEN] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::InvalidCredential)?;
    Ok(MasterKey::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::{derive_wrapping_key, generate_salt};

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let master = MasterKey::generate();
        let wrapping = [0x42u8; 32];

        let blob = wrap_key(&master, &wrapping).unwrap();
        let recovered = unwrap_key(&blob, &wrapping).unwrap();

        assert_eq!(master.expose(), recovered.expose());
    }

    #[test]
    fn test_blob_layout() {
        let master = MasterKey::generate();
        let wrapping = [0x42u8; 32];

        let blob = wrap_key(&master, &wrapping).unwrap();
        // nonce + key-sized ciphertext + tag
        assert_eq!(blob.len(), NONCE_LEN + KEY_LEN + TAG_LEN);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let master = MasterKey::generate();
        let blob = wrap_key(&master, &[1u8; 32]).unwrap();

        assert!(matches!(
            unwrap_key(&blob, &[2u8; 32]),
            Err(VaultError::InvalidCredential)
        ));
    }

    #[test]
    fn test_corrupted_blob_fails_closed() {
        let master = MasterKey::generate();
        let wrapping = [3u8; 32];
        let mut blob = wrap_key(&master, &wrapping).unwrap();
        blob[NONCE_LEN + 4] ^= 0xFF;

        assert!(matches!(
            unwrap_key(&blob, &wrapping),
            Err(VaultError::InvalidCredential)
        ));
    }

    #[test]
    fn test_truncated_blob_fails_closed() {
        assert!(matches!(
            unwrap_key(&[0u8; 8], &[0u8; 32]),
            Err(VaultError::InvalidCredential)
        ));
    }

    #[test]
    fn test_derived_key_roundtrip_per_secret() {
        // Round-trip through the real KDF path for both secret kinds.
        let master = MasterKey::generate();
        for secret in ["Secret123!", "4821"] {
            let salt = generate_salt();
            let wk = derive_wrapping_key(secret, &salt);
            let blob = wrap_key(&master, &wk).unwrap();
            let recovered = unwrap_key(&blob, &derive_wrapping_key(secret, &salt)).unwrap();
            assert_eq!(master.expose(), recovered.expose());
        }
    }

    #[test]
    fn test_wrong_pin_rejected() {
        let master = MasterKey::generate();
        let salt = generate_salt();
        let blob = wrap_key(&master, &derive_wrapping_key("4821", &salt)).unwrap();

        for wrong in ["9999", "4820", "48210", ""] {
            let wk = derive_wrapping_key(wrong, &salt);
            assert!(matches!(
                unwrap_key(&blob, &wk),
                Err(VaultError::InvalidCredential)
            ));
        }
    }
}
