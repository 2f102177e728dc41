//! HomeHub Vault - Content Serving Pipeline
//!
//! Decides, per request, whether a media body is streamed raw,
//! decrypt-streamed, or decrypted and transcoded, and owns the scoped
//! temporary plaintext files that transcoding encrypted items requires.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::catalog::{MediaCatalog, MediaRecord};
use crate::crypto::stream::{self, DecryptChunks};
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;
use crate::storage::StorageLayout;
use crate::transition::stored_file_name;

/// Media types browsers display without help. Everything else (RAW
/// camera formats, HEIC, exotic containers) goes through conversion.
const NATIVE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
];

pub fn is_natively_displayable(media_type: &str) -> bool {
    NATIVE_TYPES.contains(&media_type)
}

/// What the transport layer should send back
pub enum MediaContent {
    /// Stream the file bytes straight from disk
    File {
        path: PathBuf,
        content_type: String,
    },
    /// Fully derived bytes (conversion output)
    Bytes {
        data: Vec<u8>,
        content_type: String,
    },
    /// Lazy decrypted chunk sequence from the vault root
    Stream {
        chunks: DecryptChunks<BufReader<File>>,
        content_type: String,
    },
}

impl MediaContent {
    pub fn content_type(&self) -> &str {
        match self {
            MediaContent::File { content_type, .. } => content_type,
            MediaContent::Bytes { content_type, .. } => content_type,
            MediaContent::Stream { content_type, .. } => content_type,
        }
    }
}

/// Scoped plaintext materialization of an encrypted item. The file lives
/// in the transient decrypt cache and is unlinked when the guard drops,
/// on every exit path including unwind.
pub struct TempPlaintext {
    path: PathBuf,
}

impl TempPlaintext {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempPlaintext {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            // Leftovers are still swept by the cache wipe on lock.
            log::warn!("Failed to remove temp plaintext {}: {}", self.path.display(), e);
        }
    }
}

/// Per-request content resolution
pub struct ContentPipeline<'a> {
    catalog: &'a MediaCatalog,
    storage: &'a StorageLayout,
    session: &'a VaultSession,
}

impl<'a> ContentPipeline<'a> {
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

    /// Resolve a media item to servable content.
    ///
    /// | encrypted | native | action                                   |
    /// |-----------|--------|------------------------------------------|
    /// | no        | yes    | stream the plaintext file                |
    /// | no        | no     | convert from the plaintext file          |
    /// | yes       | yes    | decrypt-stream from the vault            |
    /// | yes       | no     | decrypt to temp, convert, delete temp    |
    pub fn serve(&self, id: i64) -> VaultResult<MediaContent> {
        let record = self.catalog.find_media(id)?;
        let name = stored_file_name(&record)
            .ok_or_else(|| VaultError::FileMissing(record.original_path.clone()))?;
        let native = is_natively_displayable(&record.media_type);

        if !record.is_encrypted {
            let path = self.storage.plaintext_path(&name);
            if !path.exists() {
                return Err(VaultError::FileMissing(path.display().to_string()));
            }
            if native {
                return Ok(MediaContent::File {
                    path,
                    content_type: record.media_type,
                });
            }
            return Ok(MediaContent::Bytes {
                data: convert_to_jpeg(&path)?,
                content_type: "image/jpeg".into(),
            });
        }

        let key = self.session.master_key()?;
        let path = self.storage.vault_path(&name);
        if !path.exists() {
            return Err(VaultError::FileMissing(path.display().to_string()));
        }

        if native {
            let reader = BufReader::new(File::open(&path)?);
            return Ok(MediaContent::Stream {
                chunks: DecryptChunks::new(reader, &key)?,
                content_type: record.media_type,
            });
        }

        // Conversion needs random access, so the body is materialized in
        // the decrypt cache; the guard removes it whether conversion
        // succeeds or not.
        let temp = self.materialize(&record)?;
        let data = convert_to_jpeg(temp.path())?;
        Ok(MediaContent::Bytes {
            data,
            content_type: "image/jpeg".into(),
        })
    }

    /// Decrypt an encrypted item fully into a scoped temp file in the
    /// decrypt cache. Also used by the thumbnail pipeline.
    pub fn materialize(&self, record: &MediaRecord) -> VaultResult<TempPlaintext> {
        let key = self.session.master_key()?;
        let name = stored_file_name(record)
            .ok_or_else(|| VaultError::FileMissing(record.original_path.clone()))?;
        let source = self.storage.vault_path(&name);
        if !source.exists() {
            return Err(VaultError::FileMissing(source.display().to_string()));
        }

        // Guard first: a decrypt error must not strand a partial file.
        let temp = TempPlaintext::new(self.storage.cache_file());
        let reader = BufReader::new(File::open(&source)?);
        let writer = BufWriter::new(File::create(temp.path())?);
        stream::decrypt_stream(reader, writer, &key)?;
        Ok(temp)
    }
}

/// Decode any image format the decoder understands and re-encode as
/// JPEG, the universally displayable target.
fn convert_to_jpeg(path: &Path) -> VaultResult<Vec<u8>> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| VaultError::ConversionError(e.to_string()))?;

    // JPEG carries no alpha; flatten before encoding.
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| VaultError::ConversionError(e.to_string()))?;
    Ok(out.into_inner())
}
