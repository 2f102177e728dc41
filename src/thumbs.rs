//! HomeHub Vault - Thumbnail Pipeline
//!
//! Derives a small JPEG preview from any supported source. Plaintext
//! items get a disk-cached thumbnail keyed by media id; vault items are
//! rendered in memory only and never persisted, so a locked vault leaves
//! no decrypted residue behind.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::catalog::MediaCatalog;
use crate::content::{ContentPipeline, TempPlaintext};
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;
use crate::storage::StorageLayout;
use crate::transition::stored_file_name;

/// Thumbnails fit inside this square, preserving aspect ratio
pub const THUMB_BOUND: u32 = 400;

/// JPEG quality for encoded thumbnails
pub const THUMB_QUALITY: u8 = 85;

/// Thumbnail derivation and caching
pub struct ThumbnailPipeline<'a> {
    catalog: &'a MediaCatalog,
    storage: &'a StorageLayout,
    session: &'a VaultSession,
}

impl<'a> ThumbnailPipeline<'a> {
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

    /// Get (generating if needed) the thumbnail for a media item.
    ///
    /// Plaintext items: cached under the thumbnail dir, generated on the
    /// first request. Vault items: require an unlocked session, rendered
    /// from a scoped temp decrypt and never written to disk.
    pub fn get_thumbnail(&self, id: i64) -> VaultResult<Vec<u8>> {
        let record = self.catalog.find_media(id)?;

        if record.is_encrypted {
            let pipeline = ContentPipeline::new(self.catalog, self.storage, self.session);
            let temp = pipeline.materialize(&record)?;
            return self.generate_from_path(temp.path(), record.is_video());
        }

        let cache_path = self.storage.thumbnail_path(id);
        if cache_path.exists() {
            return Ok(fs::read(&cache_path)?);
        }

        let name = stored_file_name(&record)
            .ok_or_else(|| VaultError::FileMissing(record.original_path.clone()))?;
        let source = self.storage.plaintext_path(&name);
        if !source.exists() {
            return Err(VaultError::FileMissing(source.display().to_string()));
        }

        let bytes = self.generate_from_path(&source, record.is_video())?;
        if let Err(e) = fs::write(&cache_path, &bytes) {
            // Caching is an optimization; the thumbnail itself is fine.
            log::warn!("Failed to cache thumbnail for media {}: {}", id, e);
        }
        Ok(bytes)
    }

    fn generate_from_path(&self, path: &Path, is_video: bool) -> VaultResult<Vec<u8>> {
        let img = if is_video {
            self.extract_video_frame(path)?
        } else {
            let bytes = fs::read(path)?;
            let img = image::load_from_memory(&bytes)
                .map_err(|e| VaultError::ThumbnailUnavailable(e.to_string()))?;
            auto_orient(img, exif_orientation(&bytes).unwrap_or(1))
        };

        let thumb = img.thumbnail(THUMB_BOUND, THUMB_BOUND);
        let thumb = DynamicImage::ImageRgb8(thumb.to_rgb8());

        let mut out = Cursor::new(Vec::new());
        thumb
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, THUMB_QUALITY))
            .map_err(|e| VaultError::ThumbnailUnavailable(e.to_string()))?;
        Ok(out.into_inner())
    }

    /// Pull one decodable frame out of a video, aiming one second in and
    /// falling back to the very first frame.
    fn extract_video_frame(&self, path: &Path) -> VaultResult<DynamicImage> {
        for seek in ["1", "0"] {
            let frame = TempPlaintext::new(self.storage.cache_file());
            let status = Command::new("ffmpeg")
                .args(["-y", "-loglevel", "error", "-ss", seek, "-i"])
                .arg(path)
                .args(["-frames:v", "1", "-c:v", "mjpeg", "-f", "image2"])
                .arg(frame.path())
                .status();

            match status {
                Ok(status) if status.success() => {
                    if let Ok(bytes) = fs::read(frame.path()) {
                        if !bytes.is_empty() {
                            if let Ok(img) = image::load_from_memory(&bytes) {
                                return Ok(img);
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(VaultError::ThumbnailUnavailable(format!(
                        "ffmpeg not available: {}",
                        e
                    )))
                }
            }
        }
        Err(VaultError::ThumbnailUnavailable(
            "no decodable video frame".into(),
        ))
    }
}

/// Read the EXIF orientation (1..=8) out of a JPEG, if present.
///
/// Hand-parsed the same way MIME sniffing is: walk the JPEG markers to
/// the APP1/Exif segment, then the first IFD for tag 0x0112.
fn exif_orientation(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        let seg_len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if seg_len < 2 || pos + 2 + seg_len > bytes.len() {
            return None;
        }
        if marker == 0xE1 {
            return parse_tiff_orientation(&bytes[pos + 4..pos + 2 + seg_len]);
        }
        // Stop at the start-of-scan marker; EXIF only lives before it.
        if marker == 0xDA {
            return None;
        }
        pos += 2 + seg_len;
    }
    None
}

fn parse_tiff_orientation(seg: &[u8]) -> Option<u16> {
    let tiff = seg.strip_prefix(b"Exif\0\0")?;
    if tiff.len() < 8 {
        return None;
    }
    let le = match &tiff[0..2] {
        b"II" => true,
        b"MM" => false,
        _ => return None,
    };
    let read_u16 = |b: &[u8]| -> u16 {
        let pair = [b[0], b[1]];
        if le {
            u16::from_le_bytes(pair)
        } else {
            u16::from_be_bytes(pair)
        }
    };
    let read_u32 = |b: &[u8]| -> u32 {
        let quad = [b[0], b[1], b[2], b[3]];
        if le {
            u32::from_le_bytes(quad)
        } else {
            u32::from_be_bytes(quad)
        }
    };

    let ifd_offset = read_u32(&tiff[4..8]) as usize;
    if ifd_offset + 2 > tiff.len() {
        return None;
    }
    let entry_count = read_u16(&tiff[ifd_offset..ifd_offset + 2]) as usize;
    for i in 0..entry_count {
        let entry = ifd_offset + 2 + i * 12;
        if entry + 12 > tiff.len() {
            return None;
        }
        if read_u16(&tiff[entry..entry + 2]) == 0x0112 {
            let value = read_u16(&tiff[entry + 8..entry + 10]);
            if (1..=8).contains(&value) {
                return Some(value);
            }
            return None;
        }
    }
    None
}

/// Apply an EXIF orientation so the pixels end up upright
fn auto_orient(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
