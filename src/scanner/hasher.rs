//! Block-wise file reader producing CRC32 and a BLAKE3 content hash.
//!
//! # Overview
//!
//! A file is read sequentially in fixed-size blocks ([`READ_BLOCK_SIZE`]).
//! Every block is appended to an in-memory buffer and folded into a running
//! CRC32, so size and checksum fall out of a single pass. The content hash
//! is then computed over that same buffer: the checksum and the hash always
//! describe the same byte sequence, even if the file changes on disk
//! between stages.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// Block size for streaming reads (64 KiB).
pub const READ_BLOCK_SIZE: usize = 64 * 1024;

/// Number of leading bytes inspected for magic-byte type detection.
pub const MAGIC_BUFFER_SIZE: usize = 8192;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Bytes of a file captured by one sequential read, with their CRC32.
#[derive(Clone)]
pub struct FileContent {
    bytes: Vec<u8>,
    crc32: u32,
}

impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContent")
            .field("size", &self.bytes.len())
            .field("crc32", &self.crc32_hex())
            .finish()
    }
}

impl FileContent {
    /// Wrap an in-memory buffer, computing its CRC32.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let crc32 = crc32fast::hash(&bytes);
        Self { bytes, crc32 }
    }

    /// The raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes read.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// CRC32 of the bytes.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// CRC32 rendered as 8 lowercase hex characters.
    #[must_use]
    pub fn crc32_hex(&self) -> String {
        format!("{:08x}", self.crc32)
    }

    /// BLAKE3 digest of the bytes.
    #[must_use]
    pub fn content_hash(&self) -> Hash {
        *blake3::hash(&self.bytes).as_bytes()
    }
}

/// Convert a hash to its lowercase hexadecimal representation.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Parse a 64-character hex string back into a hash.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    blake3::Hash::from_hex(hex).ok().map(|h| *h.as_bytes())
}

/// Streaming file reader.
///
/// Cheap to clone; share one instance across rayon workers behind an `Arc`
/// or clone it per worker.
#[derive(Debug, Clone)]
pub struct Hasher {
    block_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default 64 KiB block size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            block_size: READ_BLOCK_SIZE,
            shutdown_flag: None,
        }
    }

    /// Override the read block size (minimum 1 byte).
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Set the shutdown flag checked between blocks.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The configured block size.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Read up to [`MAGIC_BUFFER_SIZE`] leading bytes for type detection.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] if the file cannot be opened or read.
    pub fn read_header(&self, path: &Path) -> Result<Vec<u8>, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut header = Vec::with_capacity(MAGIC_BUFFER_SIZE);
        file.take(MAGIC_BUFFER_SIZE as u64)
            .read_to_end(&mut header)
            .map_err(|e| HashError::from_io(path, e))?;
        Ok(header)
    }

    /// Read the whole file block by block, accumulating the bytes and a
    /// running CRC32.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] if the file cannot be read, or
    /// [`HashError::Interrupted`] if shutdown is requested mid-read.
    pub fn read_content(&self, path: &Path) -> Result<FileContent, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let capacity = file
            .metadata()
            .map(|m| m.len() as usize)
            .unwrap_or(self.block_size);

        let mut bytes = Vec::with_capacity(capacity);
        let mut block = vec![0u8; self.block_size];
        let mut crc = crc32fast::Hasher::new();

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }

            let n = match file.read(&mut block) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            crc.update(&block[..n]);
            bytes.extend_from_slice(&block[..n]);
        }

        log::trace!("Read {} bytes from {}", bytes.len(), path.display());

        Ok(FileContent {
            bytes,
            crc32: crc.finalize(),
        })
    }
}
