//! HomeHub Vault - Storage Layout
//!
//! The on-disk roots: plaintext uploads, the encrypted vault, the
//! persistent thumbnail cache and the transient decrypt cache.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::error::VaultResult;

/// Disk layout under a single data directory
pub struct StorageLayout {
    /// Plaintext storage root
    upload_dir: PathBuf,
    /// Encrypted storage root
    vault_dir: PathBuf,
    /// Persistent thumbnail cache (plaintext items only)
    thumbnail_dir: PathBuf,
    /// Transient decrypt cache; its entire contents are deletable on
    /// lock with no further guarantee
    cache_dir: PathBuf,
}

impl StorageLayout {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            upload_dir: data_dir.join("uploads"),
            vault_dir: data_dir.join("vault"),
            thumbnail_dir: data_dir.join("thumbnails"),
            cache_dir: data_dir.join("cache"),
        }
    }

    /// Create all storage roots
    pub fn init_directories(&self) -> VaultResult<()> {
        for dir in [
            &self.upload_dir,
            &self.vault_dir,
            &self.thumbnail_dir,
            &self.cache_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Path of a plaintext media file
    pub fn plaintext_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }

    /// Path of an encrypted media file
    pub fn vault_path(&self, filename: &str) -> PathBuf {
        self.vault_dir.join(filename)
    }

    /// Path of the persisted thumbnail for a media id
    pub fn thumbnail_path(&self, media_id: i64) -> PathBuf {
        self.thumbnail_dir.join(format!("thumb_{}.jpg", media_id))
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    /// A fresh uniquely-named file path in the transient decrypt cache
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(Uuid::new_v4().to_string())
    }

    /// Best-effort wipe of the transient decrypt cache: plain unlink of
    /// every file, no overwrite. Failures are logged, never escalated.
    /// Returns the number of files removed.
    pub fn wipe_cache(&self) -> usize {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Decrypt cache wipe skipped: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        removed
    }

    /// Pick an upload filename, preserving the original name and
    /// appending a timestamp suffix only on collision.
    pub fn available_upload_name(&self, filename: &str) -> String {
        if !self.plaintext_path(filename).exists() && !self.vault_path(filename).exists() {
            return filename.to_string();
        }

        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        match filename.rsplit_once('.') {
            Some((stem, ext)) => format!("{}_{}.{}", stem, stamp, ext),
            None => format!("{}_{}", filename, stamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_and_paths() {
        let dir = tempdir().unwrap();
        let storage = StorageLayout::new(dir.path());
        storage.init_directories().unwrap();

        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("vault").is_dir());
        assert!(dir.path().join("thumbnails").is_dir());
        assert!(dir.path().join("cache").is_dir());

        assert_eq!(
            storage.thumbnail_path(7),
            dir.path().join("thumbnails").join("thumb_7.jpg")
        );
    }

    #[test]
    fn test_wipe_cache_counts_files() {
        let dir = tempdir().unwrap();
        let storage = StorageLayout::new(dir.path());
        storage.init_directories().unwrap();

        fs::write(storage.cache_file(), b"a").unwrap();
        fs::write(storage.cache_file(), b"b").unwrap();

        assert_eq!(storage.wipe_cache(), 2);
        assert_eq!(storage.wipe_cache(), 0);
    }

    #[test]
    fn test_collision_rename() {
        let dir = tempdir().unwrap();
        let storage = StorageLayout::new(dir.path());
        storage.init_directories().unwrap();

        assert_eq!(storage.available_upload_name("photo.jpg"), "photo.jpg");

        fs::write(storage.plaintext_path("photo.jpg"), b"x").unwrap();
        let renamed = storage.available_upload_name("photo.jpg");
        assert_ne!(renamed, "photo.jpg");
        assert!(renamed.starts_with("photo_"));
        assert!(renamed.ends_with(".jpg"));
    }

    #[test]
    fn test_collision_rename_checks_vault_root_too() {
        // A name occupied in the vault root must not be handed out for a
        // new upload, or a later transition would overwrite it.
        let dir = tempdir().unwrap();
        let storage = StorageLayout::new(dir.path());
        storage.init_directories().unwrap();

        fs::write(storage.vault_path("clip.mp4"), b"x").unwrap();
        assert_ne!(storage.available_upload_name("clip.mp4"), "clip.mp4");
    }
}
