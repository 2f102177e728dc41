//! HomeHub Vault - Vault Session
//!
//! Process-wide holder of the unwrapped master key. One instance exists
//! per running process, shared by every request handler; all access goes
//! through the lock so readers observe either the fully-old or the
//! fully-new key, never a torn one.

use parking_lot::RwLock;

use crate::catalog::{MediaCatalog, SetupState};
use crate::crypto::kdf;
use crate::crypto::keys::MasterKey;
use crate::crypto::wrap::{self, WrappedKeyRecord};
use crate::error::{VaultError, VaultResult};

/// Unlock/lock state machine around the master key
pub struct VaultSession {
    key: RwLock<Option<MasterKey>>,
}

impl Default for VaultSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultSession {
    /// A fresh session starts locked
    pub fn new() -> Self {
        Self {
            key: RwLock::new(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // TRANSITIONS
    // ═══════════════════════════════════════════════════════════════

    /// First-time security setup.
    ///
    /// Generates the master key, wraps it under both the master password
    /// and the PIN (fresh salt each), persists the configuration and
    /// leaves the session unlocked. Fails with `AlreadyConfigured` if
    /// setup has already run.
    pub fn setup(&self, catalog: &MediaCatalog, password: &str, pin: &str) -> VaultResult<()> {
        if catalog.is_setup_complete()? {
            return Err(VaultError::AlreadyConfigured);
        }

        let master = MasterKey::generate();

        let password_wrap = wrap_under(&master, password)?;
        let pin_wrap = wrap_under(&master, pin)?;

        catalog.save_setup(&SetupState {
            master_password_hash: kdf::hash_master_password(password)?,
            password_wrap,
            pin_wrap,
        })?;

        *self.key.write() = Some(master);
        log::info!("Vault security configured");
        Ok(())
    }

    /// Unlock with the PIN. Re-entrant: logging in while already
    /// unlocked just replaces the held key with the identical one. On a
    /// wrong PIN the session keeps its prior state.
    pub fn login(&self, catalog: &MediaCatalog, pin: &str) -> VaultResult<()> {
        let state = catalog.load_setup()?.ok_or(VaultError::NotSetUp)?;

        let wrapping = kdf::derive_wrapping_key(pin, &state.pin_wrap.salt);
        let master = wrap::unwrap_key(&state.pin_wrap.blob, &wrapping)?;

        *self.key.write() = Some(master);
        Ok(())
    }

    /// Rotate the PIN. Requires the master password; recovers the master
    /// key through the password wrap, rewraps it under the new PIN with a
    /// fresh salt and persists only the PIN record. Session state is not
    /// touched.
    pub fn change_pin(
        &self,
        catalog: &MediaCatalog,
        master_password: &str,
        new_pin: &str,
    ) -> VaultResult<()> {
        let state = catalog.load_setup()?.ok_or(VaultError::NotSetUp)?;

        if !kdf::verify_master_password(master_password, &state.master_password_hash) {
            return Err(VaultError::InvalidCredential);
        }

        let wrapping = kdf::derive_wrapping_key(master_password, &state.password_wrap.salt);
        let master = wrap::unwrap_key(&state.password_wrap.blob, &wrapping)?;

        catalog.save_pin_wrap(&wrap_under(&master, new_pin)?)?;
        log::info!("Vault PIN rotated");
        Ok(())
    }

    /// Clear the held key. Legal from any state; always ends locked.
    pub fn lock(&self) {
        *self.key.write() = None;
    }

    // ═══════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════

    /// Per-operation copy of the current key, or `VaultLocked`. Callers
    /// use the copy for the duration of one operation and never store it,
    /// so a concurrent lock cannot tear an in-flight decrypt.
    pub fn master_key(&self) -> VaultResult<MasterKey> {
        self.key.read().clone().ok_or(VaultError::VaultLocked)
    }

    pub fn is_unlocked(&self) -> bool {
        self.key.read().is_some()
    }
}

/// Derive a fresh-salted wrapping key from `secret` and wrap `master`
/// under it.
fn wrap_under(master: &MasterKey, secret: &str) -> VaultResult<WrappedKeyRecord> {
    let salt = kdf::generate_salt();
    let wrapping = kdf::derive_wrapping_key(secret, &salt);
    Ok(WrappedKeyRecord {
        salt,
        blob: wrap::wrap_key(master, &wrapping)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> (MediaCatalog, VaultSession) {
        let catalog = MediaCatalog::open_in_memory().unwrap();
        let session = VaultSession::new();
        session.setup(&catalog, "Secret123!", "4821").unwrap();
        (catalog, session)
    }

    #[test]
    fn test_setup_unlocks_and_is_once_only() {
        let (catalog, session) = configured();
        assert!(session.is_unlocked());

        assert!(matches!(
            session.setup(&catalog, "Other", "0000"),
            Err(VaultError::AlreadyConfigured)
        ));
    }

    #[test]
    fn test_login_before_setup() {
        let catalog = MediaCatalog::open_in_memory().unwrap();
        let session = VaultSession::new();
        assert!(matches!(
            session.login(&catalog, "4821"),
            Err(VaultError::NotSetUp)
        ));
    }

    #[test]
    fn test_both_wraps_yield_identical_key() {
        let (catalog, session) = configured();
        let via_setup = session.master_key().unwrap();

        session.lock();
        session.login(&catalog, "4821").unwrap();
        let via_pin = session.master_key().unwrap();
        assert_eq!(via_setup.expose(), via_pin.expose());

        // The password path is exercised by change_pin; after rotation
        // the new PIN must still recover the same key.
        session.change_pin(&catalog, "Secret123!", "1357").unwrap();
        session.lock();
        session.login(&catalog, "1357").unwrap();
        assert_eq!(via_setup.expose(), session.master_key().unwrap().expose());
    }

    #[test]
    fn test_wrong_pin_keeps_prior_state() {
        let (catalog, session) = configured();
        session.lock();

        assert!(matches!(
            session.login(&catalog, "9999"),
            Err(VaultError::InvalidCredential)
        ));
        assert!(!session.is_unlocked());

        // And from the unlocked side: a failed re-login keeps the key.
        session.login(&catalog, "4821").unwrap();
        assert!(session.login(&catalog, "9999").is_err());
        assert!(session.is_unlocked());
    }

    #[test]
    fn test_lock_clears_key() {
        let (_catalog, session) = configured();
        session.lock();
        assert!(!session.is_unlocked());
        assert!(matches!(
            session.master_key(),
            Err(VaultError::VaultLocked)
        ));
        // Locking twice is fine.
        session.lock();
        assert!(!session.is_unlocked());
    }

    #[test]
    fn test_change_pin_requires_master_password() {
        let (catalog, session) = configured();
        assert!(matches!(
            session.change_pin(&catalog, "WrongPassword", "1357"),
            Err(VaultError::InvalidCredential)
        ));
        // Old PIN still valid after the rejected attempt.
        session.lock();
        session.login(&catalog, "4821").unwrap();
    }

    #[test]
    fn test_change_pin_does_not_touch_session() {
        let (catalog, session) = configured();
        session.lock();
        session.change_pin(&catalog, "Secret123!", "1357").unwrap();
        // Rotation ran while locked and the session stayed locked.
        assert!(!session.is_unlocked());
    }

    #[test]
    fn test_full_credential_scenario() {
        // Setup "Secret123!" / "4821" → lock → bad PIN fails and stays
        // locked → good PIN unlocks → rotate to "1357" → old PIN dead,
        // new PIN works.
        let (catalog, session) = configured();
        session.lock();

        assert!(session.login(&catalog, "9999").is_err());
        assert!(!session.is_unlocked());

        session.login(&catalog, "4821").unwrap();
        assert!(session.is_unlocked());

        session.change_pin(&catalog, "Secret123!", "1357").unwrap();
        session.lock();
        assert!(session.login(&catalog, "4821").is_err());
        session.login(&catalog, "1357").unwrap();
        assert!(session.is_unlocked());
    }
}
