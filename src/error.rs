//! HomeHub Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // AUTHENTICATION / SESSION ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// Wrong PIN or master password. Deliberately generic: the caller
    /// never learns whether the salt, the derived key or the AEAD tag
    /// was at fault.
    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Vault is locked")]
    VaultLocked,

    #[error("Vault security is already configured")]
    AlreadyConfigured,

    #[error("Vault security has not been set up yet")]
    NotSetUp,

    // ═══════════════════════════════════════════════════════════════
    // CATALOG / FILE ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// No catalog record with this id.
    #[error("Media not found: {0}")]
    MediaNotFound(i64),

    /// Catalog record exists but the backing file does not. This is a
    /// recoverable inconsistency, not a fatal error.
    #[error("File not found on disk: {0}")]
    FileMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // ═══════════════════════════════════════════════════════════════
    // MEDIA DERIVATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// Best-effort format conversion failed; fails the request, never
    /// the process.
    #[error("Format conversion failed: {0}")]
    ConversionError(String),

    #[error("Thumbnail unavailable: {0}")]
    ThumbnailUnavailable(String),

    // ═══════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::ConversionError(e.to_string())
    }
}
