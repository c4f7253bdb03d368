//! Staged identity extraction.
//!
//! A [`Fingerprint`] is filled in lazily by [`IdentityExtractor`], cheapest
//! signal first:
//!
//! 1. type check from magic bytes (non-images stop here)
//! 2. one sequential read producing size and CRC32
//! 3. content hash over the bytes of stage 2
//! 4. perceptual hashes decoded from the same bytes
//!
//! Each `ensure_*` method runs its stage (and any earlier stage it needs) at
//! most once, so a classifier can stop as soon as it has an answer.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use super::hasher::{hash_to_hex, FileContent, Hash, Hasher};
use super::media::MediaType;
use super::perceptual::{PerceptualError, PerceptualHasher, PerceptualHashes};
use super::HashError;

/// Errors produced while extracting a fingerprint.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Reading the file failed.
    #[error(transparent)]
    Read(#[from] HashError),

    /// Decoding the image for perceptual hashing failed.
    #[error(transparent)]
    Perceptual(#[from] PerceptualError),
}

/// Identity signals of one candidate file.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    path: PathBuf,
    filename: String,
    size: u64,
    media_type: MediaType,
    content: Option<FileContent>,
    crc32: Option<u32>,
    content_hash: Option<Hash>,
    perceptual: Option<PerceptualHashes>,
}

impl Fingerprint {
    fn new(path: &Path, size: u64, media_type: MediaType) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().nfc().collect::<String>())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            filename,
            size,
            media_type,
            content: None,
            crc32: None,
            content_hash: None,
            perceptual: None,
        }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, NFC-normalized.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Size in bytes. Exact once the file has been read.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Media type detected from magic bytes.
    #[must_use]
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Whether the file is one of the supported image types.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.media_type.is_supported_image()
    }

    /// CRC32, if the file has been read.
    #[must_use]
    pub fn crc32(&self) -> Option<u32> {
        self.crc32
    }

    /// CRC32 as 8 lowercase hex characters, if the file has been read.
    #[must_use]
    pub fn crc32_hex(&self) -> Option<String> {
        self.crc32.map(|crc| format!("{crc:08x}"))
    }

    /// Content hash, if computed.
    #[must_use]
    pub fn content_hash(&self) -> Option<&Hash> {
        self.content_hash.as_ref()
    }

    /// Content hash as hex, if computed.
    #[must_use]
    pub fn content_hash_hex(&self) -> Option<String> {
        self.content_hash.as_ref().map(hash_to_hex)
    }

    /// Perceptual hashes, if that stage ran. Fields are empty when decoding failed.
    #[must_use]
    pub fn perceptual(&self) -> Option<&PerceptualHashes> {
        self.perceptual.as_ref()
    }

    /// Drop the buffered file bytes once no further stage needs them.
    pub fn release_content(&mut self) {
        self.content = None;
    }
}

/// Runs the extraction stages against files on disk.
#[derive(Debug)]
pub struct IdentityExtractor {
    hasher: Hasher,
    perceptual: PerceptualHasher,
    compute_perceptual: bool,
}

impl Default for IdentityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityExtractor {
    /// Create an extractor that computes every stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
            perceptual: PerceptualHasher::new(),
            compute_perceptual: true,
        }
    }

    /// Enable or disable stage 4.
    #[must_use]
    pub fn with_perceptual(mut self, enabled: bool) -> Self {
        self.compute_perceptual = enabled;
        self
    }

    /// Abort in-progress reads when the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.hasher = self.hasher.with_shutdown_flag(flag);
        self
    }

    /// Override the streaming read block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.hasher = self.hasher.with_block_size(block_size);
        self
    }

    /// Stage 1: stat the file and detect its media type.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Read`] if the file cannot be opened.
    pub fn check_type(&self, path: &Path) -> Result<Fingerprint, ExtractError> {
        let size = std::fs::metadata(path)
            .map_err(|e| HashError::from_io(path, e))?
            .len();
        let header = self.hasher.read_header(path)?;
        let media_type = MediaType::detect(&header);

        if !media_type.is_supported_image() {
            log::trace!("Not a supported image ({}): {}", media_type, path.display());
        }
        Ok(Fingerprint::new(path, size, media_type))
    }

    /// Stage 2: read the file once, recording size and CRC32.
    ///
    /// Returns `None` for non-images, which are never read.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Read`] if the read fails.
    pub fn ensure_crc32(&self, fp: &mut Fingerprint) -> Result<Option<u32>, ExtractError> {
        if !fp.is_image() {
            return Ok(None);
        }
        if fp.crc32.is_none() {
            let content = self.hasher.read_content(&fp.path)?;
            fp.size = content.size();
            fp.crc32 = Some(content.crc32());
            fp.content = Some(content);
        }
        Ok(fp.crc32)
    }

    /// Stage 3: content hash over the buffered bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Read`] if stage 2 has to run and fails.
    pub fn ensure_content_hash(&self, fp: &mut Fingerprint) -> Result<Option<Hash>, ExtractError> {
        if fp.content_hash.is_some() {
            return Ok(fp.content_hash);
        }
        if self.ensure_crc32(fp)?.is_none() {
            return Ok(None);
        }
        fp.content_hash = fp.content.as_ref().map(FileContent::content_hash);
        Ok(fp.content_hash)
    }

    /// Stage 4: perceptual hashes decoded from the buffered bytes.
    ///
    /// Failures are logged and leave the digests empty; they never fail the file.
    pub fn ensure_perceptual<'a>(&self, fp: &'a mut Fingerprint) -> Option<&'a PerceptualHashes> {
        if !self.compute_perceptual || !fp.is_image() {
            return None;
        }
        if fp.perceptual.is_none() {
            let hashes = match self.try_perceptual(fp) {
                Ok(hashes) => hashes,
                Err(e) => {
                    log::warn!("Perceptual hashing skipped for {}: {}", fp.path.display(), e);
                    PerceptualHashes::default()
                }
            };
            fp.perceptual = Some(hashes);
        }
        fp.perceptual.as_ref()
    }

    fn try_perceptual(&self, fp: &mut Fingerprint) -> Result<PerceptualHashes, ExtractError> {
        self.ensure_crc32(fp)?;
        let label = fp.path.display().to_string();
        match fp.content.as_ref() {
            Some(content) => Ok(self
                .perceptual
                .compute_from_bytes(content.bytes(), &label)?),
            // Content already released; decoding from disk could see different bytes.
            None => Ok(PerceptualHashes::default()),
        }
    }

    /// Run every stage.
    ///
    /// Non-images come back after stage 1 with `is_image() == false`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Read`] if the file cannot be read. Perceptual
    /// failures are not errors.
    pub fn extract(&self, path: &Path) -> Result<Fingerprint, ExtractError> {
        let mut fp = self.check_type(path)?;
        if !fp.is_image() {
            return Ok(fp);
        }
        self.ensure_content_hash(&mut fp)?;
        self.ensure_perceptual(&mut fp);
        fp.release_content();
        Ok(fp)
    }
}
