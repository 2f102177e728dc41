//! # HomeHub Vault
//!
//! Personal media library with an encrypted-at-rest vault.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      MEDIA LIBRARY                          │
//! │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────┐  │
//! │  │ VAULT SESSION│  │  TRANSITION   │  │ CONTENT/THUMBS  │  │
//! │  │ PIN+password │  │  ENGINE       │  │ PIPELINES       │  │
//! │  └──────┬───────┘  └──────┬────────┘  └───────┬─────────┘  │
//! │         │                 │                    │            │
//! │  ┌──────┴─────────────────┴────────────────────┴─────────┐ │
//! │  │                  CRYPTO CORE                           │ │
//! │  │   PBKDF2 → wrap key → AES-GCM(master) → AES-CTR(body)  │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! │                                                             │
//! │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────┐  │
//! │  │ uploads/     │  │  vault/       │  │ catalog (SQLite)│  │
//! │  │ plaintext    │  │  encrypted    │  │ + setup row     │  │
//! │  └──────────────┘  └───────────────┘  └─────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security model
//!
//! - One 256-bit master key, generated at setup, never stored in plaintext
//! - Wrapped twice: under a password-derived and a PIN-derived key
//!   (PBKDF2-HMAC-SHA256, 600k iterations, fresh 16-byte salts)
//! - Master-key blobs are AES-256-GCM authenticated; file bodies are
//!   AES-256-CTR streams with a random per-file IV and no body MAC
//! - Vault thumbnails are derived in memory only; locking wipes the
//!   transient decrypt cache

pub mod catalog;
pub mod content;
pub mod crypto;
pub mod error;
pub mod library;
pub mod session;
pub mod storage;
pub mod thumbs;
pub mod transition;

pub use catalog::{MediaCatalog, MediaRecord, SetupState};
pub use content::{ContentPipeline, MediaContent};
pub use error::{VaultError, VaultResult};
pub use library::{LibraryStats, MediaLibrary, ScanReport};
pub use session::VaultSession;
pub use storage::StorageLayout;
pub use thumbs::ThumbnailPipeline;
pub use transition::{BatchReport, TransitionEngine};

/// HomeHub Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
