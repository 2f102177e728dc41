//! HomeHub Vault - Transition Engine
//!
//! Moves media files between plaintext and vault storage, encrypting or
//! decrypting the body as it goes. Ordering is crash-safe: the source is
//! only deleted and the catalog flag only flipped after the destination
//! verifiably exists, so an interrupted transition can simply be retried.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::Serialize;

use crate::catalog::{MediaCatalog, MediaRecord};
use crate::crypto::keys::MasterKey;
use crate::crypto::stream;
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;
use crate::storage::StorageLayout;

/// Outcome of one item inside a batch. Failures are data, not thrown
/// exceptions; a batch never aborts because of one item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Body transformed, source removed, catalog flag flipped
    Transitioned,
    /// Item was already on the requested side; nothing to do
    AlreadyDone,
    /// Source file absent on disk; catalog record left untouched
    SourceMissing,
    /// Any other per-item error
    Failed(VaultError),
}

/// Aggregate result of a batch transition
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    /// Items actually transitioned by this call
    pub transitioned: usize,
    pub already_done: usize,
    pub missing: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Transitioned => self.transitioned += 1,
            ItemOutcome::AlreadyDone => self.already_done += 1,
            ItemOutcome::SourceMissing => self.missing += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Bulk encrypt/decrypt orchestrator
pub struct TransitionEngine<'a> {
    catalog: &'a MediaCatalog,
    storage: &'a StorageLayout,
    session: &'a VaultSession,
}

impl<'a> TransitionEngine<'a> {
    pub fn new(
        catalog: &'a MediaCatalog,
        storage: &'a StorageLayout,
        session: &'a VaultSession,
    ) -> Self {
        Self {
            catalog,
            storage,
            session,
        }
    }

    /// Move the given items into the vault, encrypting their bodies.
    /// Requires an unlocked session.
    pub fn encrypt_items(&self, ids: &[i64]) -> VaultResult<BatchReport> {
        self.run_batch(ids, Direction::Encrypt)
    }

    /// Move the given items back to plaintext storage, decrypting their
    /// bodies. Requires an unlocked session.
    pub fn decrypt_items(&self, ids: &[i64]) -> VaultResult<BatchReport> {
        self.run_batch(ids, Direction::Decrypt)
    }

    fn run_batch(&self, ids: &[i64], direction: Direction) -> VaultResult<BatchReport> {
        // One key copy for the whole batch: a concurrent lock() cannot
        // tear items already in flight.
        let key = self.session.master_key()?;

        let mut report = BatchReport {
            requested: ids.len(),
            ..Default::default()
        };
        for &id in ids {
            let outcome = self.transition_item(&key, id, direction);
            match &outcome {
                ItemOutcome::Transitioned => log::debug!("Media {} transitioned", id),
                ItemOutcome::AlreadyDone => log::debug!("Media {} already transitioned", id),
                ItemOutcome::SourceMissing => {
                    log::warn!("Media {}: source file missing, skipped", id)
                }
                ItemOutcome::Failed(e) => log::warn!("Media {}: transition failed: {}", id, e),
            }
            report.record(outcome);
        }
        Ok(report)
    }

    fn transition_item(&self, key: &MasterKey, id: i64, direction: Direction) -> ItemOutcome {
        let record = match self.catalog.find_media(id) {
            Ok(record) => record,
            Err(e) => return ItemOutcome::Failed(e),
        };

        if record.is_encrypted == (direction == Direction::Encrypt) {
            return ItemOutcome::AlreadyDone;
        }

        let name = match stored_file_name(&record) {
            Some(name) => name,
            None => {
                return ItemOutcome::Failed(VaultError::FileMissing(record.original_path.clone()))
            }
        };
        let (source, dest) = match direction {
            Direction::Encrypt => (
                self.storage.plaintext_path(&name),
                self.storage.vault_path(&name),
            ),
            Direction::Decrypt => (
                self.storage.vault_path(&name),
                self.storage.plaintext_path(&name),
            ),
        };

        if !source.exists() {
            return ItemOutcome::SourceMissing;
        }

        if let Err(e) = self.transform(&source, &dest, key, direction) {
            remove_partial(&dest);
            return ItemOutcome::Failed(e);
        }

        // Only after the destination verifiably has content does the
        // source go away and the catalog flip. Anything short of that
        // leaves the item fully on its original side, safe to retry.
        if !has_content(&dest) {
            remove_partial(&dest);
            return ItemOutcome::Failed(VaultError::FileMissing(dest.display().to_string()));
        }

        if let Err(e) = fs::remove_file(&source) {
            remove_partial(&dest);
            return ItemOutcome::Failed(e.into());
        }
        if let Err(e) = self
            .catalog
            .update_encryption_state(id, direction == Direction::Encrypt)
        {
            return ItemOutcome::Failed(e);
        }

        // A freshly vaulted item must leave no plaintext preview behind.
        if direction == Direction::Encrypt {
            let thumb = self.storage.thumbnail_path(id);
            if thumb.exists() {
                if let Err(e) = fs::remove_file(&thumb) {
                    log::warn!("Failed to drop thumbnail for media {}: {}", id, e);
                }
            }
        }

        ItemOutcome::Transitioned
    }

    fn transform(
        &self,
        source: &Path,
        dest: &Path,
        key: &MasterKey,
        direction: Direction,
    ) -> VaultResult<()> {
        let reader = BufReader::new(File::open(source)?);
        let writer = BufWriter::new(File::create(dest)?);
        match direction {
            Direction::Encrypt => stream::encrypt_stream(reader, writer, key)?,
            Direction::Decrypt => stream::decrypt_stream(reader, writer, key)?,
        };
        Ok(())
    }
}

/// Filenames are preserved across transitions; only the final path
/// component of the stored original path is used under either root.
pub(crate) fn stored_file_name(record: &MediaRecord) -> Option<String> {
    Path::new(&record.original_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove partial file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::stream::IV_LEN;
    use tempfile::{tempdir, TempDir};

    struct Env {
        _dir: TempDir,
        catalog: MediaCatalog,
        storage: StorageLayout,
        session: VaultSession,
    }

    fn unlocked_env() -> Env {
        let dir = tempdir().unwrap();
        let storage = StorageLayout::new(dir.path());
        storage.init_directories().unwrap();
        let catalog = MediaCatalog::open_in_memory().unwrap();
        let session = VaultSession::new();
        session.setup(&catalog, "Secret123!", "4821").unwrap();
        Env {
            _dir: dir,
            catalog,
            storage,
            session,
        }
    }

    fn add_plaintext(env: &Env, name: &str, body: &[u8]) -> i64 {
        fs::write(env.storage.plaintext_path(name), body).unwrap();
        env.catalog
            .insert_media(name, name, "image/jpeg", body.len() as u64)
            .unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt_roundtrip() {
        let env = unlocked_env();
        let body = vec![0xCDu8; 200_000];
        let id = add_plaintext(&env, "trip.jpg", &body);
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        let report = engine.encrypt_items(&[id]).unwrap();
        assert_eq!(report.transitioned, 1);
        assert!(!env.storage.plaintext_path("trip.jpg").exists());
        let encrypted = fs::read(env.storage.vault_path("trip.jpg")).unwrap();
        assert_eq!(encrypted.len(), IV_LEN + body.len());
        assert_ne!(&encrypted[IV_LEN..IV_LEN + 64], &body[..64]);
        assert!(env.catalog.find_media(id).unwrap().is_encrypted);

        let report = engine.decrypt_items(&[id]).unwrap();
        assert_eq!(report.transitioned, 1);
        assert!(!env.storage.vault_path("trip.jpg").exists());
        assert_eq!(
            fs::read(env.storage.plaintext_path("trip.jpg")).unwrap(),
            body
        );
        assert!(!env.catalog.find_media(id).unwrap().is_encrypted);
    }

    #[test]
    fn test_encrypt_is_idempotent() {
        let env = unlocked_env();
        let id = add_plaintext(&env, "once.jpg", b"body");
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        assert_eq!(engine.encrypt_items(&[id]).unwrap().transitioned, 1);

        // Second run: already encrypted, zero newly transitioned.
        let second = engine.encrypt_items(&[id]).unwrap();
        assert_eq!(second.transitioned, 0);
        assert_eq!(second.already_done, 1);
        assert_eq!(second.failed, 0);
    }

    #[test]
    fn test_missing_source_is_skipped_not_fatal() {
        let env = unlocked_env();
        let id = env
            .catalog
            .insert_media("ghost.jpg", "ghost.jpg", "image/jpeg", 0)
            .unwrap();
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        let report = engine.encrypt_items(&[id]).unwrap();
        assert_eq!(report.transitioned, 0);
        assert_eq!(report.missing, 1);
        // Catalog record untouched.
        assert!(!env.catalog.find_media(id).unwrap().is_encrypted);
    }

    #[test]
    fn test_batch_continues_past_bad_items() {
        let env = unlocked_env();
        let good = add_plaintext(&env, "good.jpg", b"data");
        let ghost = env
            .catalog
            .insert_media("gone.jpg", "gone.jpg", "image/jpeg", 0)
            .unwrap();
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        let report = engine.encrypt_items(&[ghost, 9999, good]).unwrap();
        assert_eq!(report.requested, 3);
        assert_eq!(report.transitioned, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, 1);
        assert!(env.catalog.find_media(good).unwrap().is_encrypted);
    }

    #[test]
    fn test_locked_session_refuses_batch() {
        let env = unlocked_env();
        let id = add_plaintext(&env, "locked.jpg", b"data");
        env.session.lock();
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        assert!(matches!(
            engine.encrypt_items(&[id]),
            Err(VaultError::VaultLocked)
        ));
        assert!(env.storage.plaintext_path("locked.jpg").exists());
    }

    #[test]
    fn test_encrypt_invalidates_persisted_thumbnail() {
        let env = unlocked_env();
        let id = add_plaintext(&env, "pic.jpg", b"data");
        fs::write(env.storage.thumbnail_path(id), b"jpeg bytes").unwrap();
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        engine.encrypt_items(&[id]).unwrap();
        assert!(!env.storage.thumbnail_path(id).exists());
    }

    #[test]
    fn test_decrypt_of_plaintext_item_is_noop() {
        let env = unlocked_env();
        let id = add_plaintext(&env, "plain.jpg", b"data");
        let engine = TransitionEngine::new(&env.catalog, &env.storage, &env.session);

        let report = engine.decrypt_items(&[id]).unwrap();
        assert_eq!(report.transitioned, 0);
        assert_eq!(report.already_done, 1);
        assert!(env.storage.plaintext_path("plain.jpg").exists());
    }
}
