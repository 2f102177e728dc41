//! HomeHub Vault - Streaming File Cipher
//!
//! Chunked AES-256-CTR encryption for arbitrarily large file bodies.
//! Memory use is O(1) in file size.
//!
//! On-disk format: `IV(16, random) ‖ CTR ciphertext`. The IV is stored as
//! plaintext in the first 16 bytes of every encrypted file and never
//! reused with the same key.
//!
//! CTR mode provides confidentiality only: there is NO integrity or
//! authenticity over the body. A corrupted or truncated ciphertext, or a
//! decrypt attempt with the wrong key, produces silent garbage rather
//! than a detectable error. This is a documented format trade-off; do not
//! add a MAC here without a format revision.

use std::io::{self, Read, Write};

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes256;
use rand::RngCore;

use super::keys::MasterKey;
use crate::error::{VaultError, VaultResult};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Chunk size for streaming operations (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Initialization vector length (128-bit block size)
pub const IV_LEN: usize = 16;

fn make_cipher(key: &MasterKey, iv: &[u8; IV_LEN]) -> VaultResult<Aes256Ctr> {
    Aes256Ctr::new_from_slices(key.expose(), iv)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))
}

/// Encrypt everything from `reader` into `writer`.
///
/// Writes a fresh random IV first, then the ciphertext in 64 KiB chunks.
/// Returns the number of plaintext bytes consumed.
pub fn encrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    key: &MasterKey,
) -> VaultResult<u64> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let mut cipher = make_cipher(key, &iv)?;

    writer.write_all(&iv)?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Decrypt everything from `reader` into `writer`.
///
/// Reads the 16-byte IV prefix, then streams plaintext in 64 KiB chunks.
/// Returns the number of plaintext bytes produced.
pub fn decrypt_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    key: &MasterKey,
) -> VaultResult<u64> {
    let mut iv = [0u8; IV_LEN];
    reader.read_exact(&mut iv)?;
    let mut cipher = make_cipher(key, &iv)?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Decrypt an entire stream into memory
pub fn decrypt_to_memory<R: Read>(reader: R, key: &MasterKey) -> VaultResult<Vec<u8>> {
    let mut out = Vec::new();
    decrypt_stream(reader, &mut out, key)?;
    Ok(out)
}

/// Lazy sequence of decrypted 64 KiB chunks.
///
/// Finite, one-shot and not seekable; consume it front to back exactly
/// once (a streaming HTTP body). A source shorter than the IV prefix
/// yields an empty sequence.
pub struct DecryptChunks<R: Read> {
    reader: R,
    cipher: Option<Aes256Ctr>,
    done: bool,
}

impl<R: Read> DecryptChunks<R> {
    pub fn new(mut reader: R, key: &MasterKey) -> VaultResult<Self> {
        let mut iv = [0u8; IV_LEN];
        if read_exact_or_eof(&mut reader, &mut iv)? {
            Ok(Self {
                cipher: Some(make_cipher(key, &iv)?),
                reader,
                done: false,
            })
        } else {
            // Truncated before the IV ends: nothing to yield.
            Ok(Self {
                reader,
                cipher: None,
                done: true,
            })
        }
    }
}

impl<R: Read> Iterator for DecryptChunks<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        // Fill up to a whole chunk so consumers see uniform chunk sizes.
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if filled == 0 {
            self.done = true;
            return None;
        }
        buf.truncate(filled);
        self.cipher
            .as_mut()
            .expect("cipher present while not done")
            .apply_keystream(&mut buf);
        Some(Ok(buf))
    }
}

/// Like `read_exact`, but a clean EOF before any byte, or a truncated
/// fill, reports `false` instead of an error.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
