//! HomeHub Vault - Unified Public API
//!
//! Single entry point wiring the catalog, storage layout, vault session
//! and the derivation pipelines together. A transport layer (HTTP, CLI)
//! talks to this and nothing else.

use std::fs;
use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use crate::catalog::{MediaCatalog, MediaRecord};
use crate::content::{ContentPipeline, MediaContent};
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;
use crate::storage::StorageLayout;
use crate::thumbs::ThumbnailPipeline;
use crate::transition::{BatchReport, TransitionEngine};

/// Report from a library scan
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanReport {
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Library-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub is_setup: bool,
    pub is_unlocked: bool,
}

/// The media library with its optional encrypted vault
pub struct MediaLibrary {
    catalog: MediaCatalog,
    storage: StorageLayout,
    session: VaultSession,
}

impl MediaLibrary {
    /// Open the library rooted at `data_dir`, creating the directory
    /// layout and catalog database as needed. The session starts locked.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> VaultResult<Self> {
        let storage = StorageLayout::new(&data_dir);
        storage.init_directories()?;
        let catalog = MediaCatalog::open(data_dir.as_ref().join("homehub.db"))?;
        Ok(Self {
            catalog,
            storage,
            session: VaultSession::new(),
        })
    }

    // ═══════════════════════════════════════════════════════════════
    // SECURITY / SESSION
    // ═══════════════════════════════════════════════════════════════

    pub fn setup(&self, master_password: &str, pin: &str) -> VaultResult<()> {
        self.session.setup(&self.catalog, master_password, pin)
    }

    pub fn login(&self, pin: &str) -> VaultResult<()> {
        self.session.login(&self.catalog, pin)
    }

    pub fn change_pin(&self, master_password: &str, new_pin: &str) -> VaultResult<()> {
        self.session.change_pin(&self.catalog, master_password, new_pin)
    }

    /// Lock the vault: clear the held key and wipe the transient decrypt
    /// cache (plain unlink, best effort).
    pub fn lock(&self) {
        self.session.lock();
        let removed = self.storage.wipe_cache();
        log::info!("Vault locked, {} cached file(s) wiped", removed);
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    // ═══════════════════════════════════════════════════════════════
    // VAULT TRANSITIONS
    // ═══════════════════════════════════════════════════════════════

    pub fn encrypt_items(&self, ids: &[i64]) -> VaultResult<BatchReport> {
        TransitionEngine::new(&self.catalog, &self.storage, &self.session).encrypt_items(ids)
    }

    pub fn decrypt_items(&self, ids: &[i64]) -> VaultResult<BatchReport> {
        TransitionEngine::new(&self.catalog, &self.storage, &self.session).decrypt_items(ids)
    }

    // ═══════════════════════════════════════════════════════════════
    // CONTENT DERIVATION
    // ═══════════════════════════════════════════════════════════════

    pub fn get_content(&self, id: i64) -> VaultResult<MediaContent> {
        ContentPipeline::new(&self.catalog, &self.storage, &self.session).serve(id)
    }

    pub fn get_thumbnail(&self, id: i64) -> VaultResult<Vec<u8>> {
        ThumbnailPipeline::new(&self.catalog, &self.storage, &self.session).get_thumbnail(id)
    }

    // ═══════════════════════════════════════════════════════════════
    // CATALOG / FILES
    // ═══════════════════════════════════════════════════════════════

    pub fn find_media(&self, id: i64) -> VaultResult<MediaRecord> {
        self.catalog.find_media(id)
    }

    /// Plaintext listing is always available
    pub fn list_plain_ids(&self) -> VaultResult<Vec<i64>> {
        self.catalog.list_media_ids(false)
    }

    /// Vault listing requires an unlocked session
    pub fn list_vault_ids(&self) -> VaultResult<Vec<i64>> {
        if !self.session.is_unlocked() {
            return Err(VaultError::VaultLocked);
        }
        self.catalog.list_media_ids(true)
    }

    /// Copy a file into the plaintext root and register it. The original
    /// filename is preserved; collisions get a timestamp suffix.
    pub fn upload(&self, source: &Path) -> VaultResult<i64> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VaultError::FileMissing(source.display().to_string()))?;

        let name = self.storage.available_upload_name(filename);
        let dest = self.storage.plaintext_path(&name);
        fs::copy(source, &dest)?;
        let size = fs::metadata(&dest)?.len();

        let id = self
            .catalog
            .insert_media(&name, &name, guess_media_type(&name), size)?;
        log::debug!("Uploaded {} as media {}", name, id);
        Ok(id)
    }

    /// Walk the plaintext root and reconcile it with the catalog:
    /// register unknown files, backfill sizes and thumbnails. Per-file
    /// problems are counted and logged, never abort the scan.
    pub fn scan(&self) -> VaultResult<ScanReport> {
        let mut report = ScanReport::default();
        let thumbs = ThumbnailPipeline::new(&self.catalog, &self.storage, &self.session);

        for entry in WalkDir::new(self.storage.upload_dir())
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let media_type = guess_media_type(&name);
            if media_type == "application/octet-stream" {
                continue;
            }
            report.found += 1;

            if let Err(e) = self.scan_one(&thumbs, &name, media_type, &mut report) {
                log::warn!("Scan failed for {}: {}", name, e);
                report.errors += 1;
            }
        }

        log::info!(
            "Scan finished: {} found, {} added, {} updated, {} errors",
            report.found,
            report.added,
            report.updated,
            report.errors
        );
        Ok(report)
    }

    fn scan_one(
        &self,
        thumbs: &ThumbnailPipeline<'_>,
        name: &str,
        media_type: &str,
        report: &mut ScanReport,
    ) -> VaultResult<()> {
        let size = fs::metadata(self.storage.plaintext_path(name))?.len();

        match self.catalog.find_by_path(name)? {
            None => {
                let id = self.catalog.insert_media(name, name, media_type, size)?;
                // Best effort; an undecodable file is still registered.
                if let Err(e) = thumbs.get_thumbnail(id) {
                    log::debug!("No thumbnail for {}: {}", name, e);
                }
                report.added += 1;
            }
            Some(record) => {
                let mut touched = false;
                if record.file_size == 0 && size > 0 {
                    self.catalog.update_file_size(record.id, size)?;
                    touched = true;
                }
                if !self.storage.thumbnail_path(record.id).exists() {
                    if thumbs.get_thumbnail(record.id).is_ok() {
                        touched = true;
                    }
                }
                if touched {
                    report.updated += 1;
                }
            }
        }
        Ok(())
    }

    /// Delete media items: file (whichever root), cached thumbnail and
    /// catalog row. Returns the number of records removed; per-item
    /// failures are logged and skipped.
    pub fn delete_items(&self, ids: &[i64]) -> usize {
        let mut removed = 0;
        for &id in ids {
            match self.delete_one(id) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Delete failed for media {}: {}", id, e),
            }
        }
        removed
    }

    fn delete_one(&self, id: i64) -> VaultResult<()> {
        let record = self.catalog.find_media(id)?;
        if let Some(name) = crate::transition::stored_file_name(&record) {
            let path = if record.is_encrypted {
                self.storage.vault_path(&name)
            } else {
                self.storage.plaintext_path(&name)
            };
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        let thumb = self.storage.thumbnail_path(id);
        if thumb.exists() {
            let _ = fs::remove_file(&thumb);
        }
        self.catalog.delete_media(id)
    }

    pub fn stats(&self) -> VaultResult<LibraryStats> {
        Ok(LibraryStats {
            total_files: self.catalog.count_media()?,
            total_size_bytes: self.catalog.total_size()?,
            is_setup: self.catalog.is_setup_complete()?,
            is_unlocked: self.session.is_unlocked(),
        })
    }
}

/// Declared MIME type from the filename extension, mirroring the formats
/// the scanner accepts
fn guess_media_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "cr2" => "image/x-canon-cr2",
        "nef" => "image/x-nikon-nef",
        "dng" => "image/x-adobe-dng",
        "arw" => "image/x-sony-arw",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
