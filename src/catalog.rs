//! HomeHub Vault - Media Catalog
//!
//! SQLite-backed catalog of media records plus the single-row security
//! configuration (master-password verifier and the two wrapped master-key
//! records).

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::kdf::SALT_LEN;
use crate::crypto::wrap::WrappedKeyRecord;
use crate::error::{VaultError, VaultResult};

/// One media item as the catalog sees it.
///
/// Invariant maintained by the transition engine: `is_encrypted == true`
/// means the file lives under the vault root encrypted with the current
/// master key; `false` means it lives under the plaintext root.
#[derive(Debug, Clone)]
pub struct MediaRecord {
    pub id: i64,
    pub filename: String,
    pub original_path: String,
    /// Declared MIME type, e.g. `image/jpeg`
    pub media_type: String,
    pub file_size: u64,
    pub is_encrypted: bool,
    pub created_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn is_video(&self) -> bool {
        self.media_type.starts_with("video/")
    }
}

/// Security configuration, created once at setup. The password hash and
/// the password wrap are immutable afterwards; the PIN wrap is replaced
/// by ChangePin.
#[derive(Clone)]
pub struct SetupState {
    pub master_password_hash: String,
    pub password_wrap: WrappedKeyRecord,
    pub pin_wrap: WrappedKeyRecord,
}

/// Media catalog over a SQLite database
pub struct MediaCatalog {
    conn: Mutex<Connection>,
}

impl MediaCatalog {
    /// Open (creating if necessary) the catalog database
    pub fn open<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    /// In-memory catalog, used by tests
    pub fn open_in_memory() -> VaultResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> VaultResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                original_path TEXT NOT NULL UNIQUE,
                media_type TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                is_encrypted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_media_encrypted ON media(is_encrypted);

            CREATE TABLE IF NOT EXISTS system_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                is_setup_complete INTEGER NOT NULL DEFAULT 0,
                master_password_hash TEXT,
                salt_mp BLOB,
                encrypted_mk_by_mp BLOB,
                salt_pin BLOB,
                encrypted_mk_by_pin BLOB
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ═══════════════════════════════════════════════════════════════
    // MEDIA RECORDS
    // ═══════════════════════════════════════════════════════════════

    pub fn insert_media(
        &self,
        filename: &str,
        original_path: &str,
        media_type: &str,
        file_size: u64,
    ) -> VaultResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO media (filename, original_path, media_type, file_size, is_encrypted, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                filename,
                original_path,
                media_type,
                file_size as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_media(&self, id: i64) -> VaultResult<MediaRecord> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, filename, original_path, media_type, file_size, is_encrypted, created_at
             FROM media WHERE id = ?1",
            params![id],
            row_to_record,
        )
        .optional()?
        .ok_or(VaultError::MediaNotFound(id))
    }

    pub fn find_by_path(&self, original_path: &str) -> VaultResult<Option<MediaRecord>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, filename, original_path, media_type, file_size, is_encrypted, created_at
                 FROM media WHERE original_path = ?1",
                params![original_path],
                row_to_record,
            )
            .optional()?)
    }

    /// Flip the encryption flag after a completed transition
    pub fn update_encryption_state(&self, id: i64, is_encrypted: bool) -> VaultResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE media SET is_encrypted = ?2 WHERE id = ?1",
            params![id, is_encrypted],
        )?;
        if changed == 0 {
            return Err(VaultError::MediaNotFound(id));
        }
        Ok(())
    }

    pub fn update_file_size(&self, id: i64, file_size: u64) -> VaultResult<()> {
        self.conn.lock().execute(
            "UPDATE media SET file_size = ?2 WHERE id = ?1",
            params![id, file_size as i64],
        )?;
        Ok(())
    }

    pub fn list_media_ids(&self, is_encrypted: bool) -> VaultResult<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id FROM media WHERE is_encrypted = ?1 ORDER BY created_at DESC",
        )?;
        let ids = stmt
            .query_map(params![is_encrypted], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn delete_media(&self, id: i64) -> VaultResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM media WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn count_media(&self) -> VaultResult<u64> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn total_size(&self) -> VaultResult<u64> {
        let n: i64 = self.conn.lock().query_row(
            "SELECT COALESCE(SUM(file_size), 0) FROM media",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    // ═══════════════════════════════════════════════════════════════
    // SECURITY CONFIGURATION (single row)
    // ═══════════════════════════════════════════════════════════════

    pub fn is_setup_complete(&self) -> VaultResult<bool> {
        let flag: Option<bool> = self
            .conn
            .lock()
            .query_row(
                "SELECT is_setup_complete FROM system_config WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    }

    pub fn load_setup(&self) -> VaultResult<Option<SetupState>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT master_password_hash, salt_mp, encrypted_mk_by_mp,
                        salt_pin, encrypted_mk_by_pin
                 FROM system_config WHERE id = 1 AND is_setup_complete = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((hash, salt_mp, blob_mp, salt_pin, blob_pin)) => Ok(Some(SetupState {
                master_password_hash: hash,
                password_wrap: WrappedKeyRecord {
                    salt: blob_to_salt(&salt_mp)?,
                    blob: blob_mp,
                },
                pin_wrap: WrappedKeyRecord {
                    salt: blob_to_salt(&salt_pin)?,
                    blob: blob_pin,
                },
            })),
        }
    }

    /// Persist the full security configuration (setup only)
    pub fn save_setup(&self, state: &SetupState) -> VaultResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO system_config
             (id, is_setup_complete, master_password_hash,
              salt_mp, encrypted_mk_by_mp, salt_pin, encrypted_mk_by_pin)
             VALUES (1, 1, ?1, ?2, ?3, ?4, ?5)",
            params![
                state.master_password_hash,
                state.password_wrap.salt.as_slice(),
                state.password_wrap.blob,
                state.pin_wrap.salt.as_slice(),
                state.pin_wrap.blob,
            ],
        )?;
        Ok(())
    }

    /// Replace only the PIN wrap record (ChangePin). The password wrap
    /// and the verifier hash stay untouched.
    pub fn save_pin_wrap(&self, record: &WrappedKeyRecord) -> VaultResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE system_config SET salt_pin = ?1, encrypted_mk_by_pin = ?2
             WHERE id = 1 AND is_setup_complete = 1",
            params![record.salt.as_slice(), record.blob],
        )?;
        if changed == 0 {
            return Err(VaultError::NotSetUp);
        }
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaRecord> {
    let created_raw: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(MediaRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_path: row.get(2)?,
        media_type: row.get(3)?,
        file_size: row.get::<_, i64>(4)? as u64,
        is_encrypted: row.get(5)?,
        created_at,
    })
}

fn blob_to_salt(blob: &[u8]) -> VaultResult<[u8; SALT_LEN]> {
    blob.try_into()
        .map_err(|_| VaultError::Database("Stored salt has the wrong length".into()))
}
