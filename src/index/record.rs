//! Rows stored in the duplicate index.

use serde::{Deserialize, Serialize};

use super::IndexError;
use crate::scanner::{Fingerprint, PerceptualHashes};

/// A persisted record for one ingested source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Surrogate key
    pub id: i64,
    /// NFC-normalized filename
    pub filename: String,
    /// Path at ingest time
    pub full_path: String,
    /// CRC32 as 8 lowercase hex characters
    pub crc32: String,
    /// BLAKE3 content hash, hex
    pub content_hash: String,
    /// Perceptual digests; empty strings when not computed
    pub perceptual: PerceptualHashes,
    /// Size in bytes
    pub size: u64,
    /// Normalized media type (`jpeg`, `png`, `bmp`)
    pub media_type: String,
}

impl FileRecord {
    /// Build a record from a row selected with the standard record columns.
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let size: i64 = row.get(9)?;
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            full_path: row.get(2)?,
            crc32: row.get(3)?,
            content_hash: row.get(4)?,
            perceptual: PerceptualHashes {
                average: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                perceptual: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                difference: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                wavelet: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            },
            size: u64::try_from(size).unwrap_or_default(),
            media_type: row.get(10)?,
        })
    }
}

/// A record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// NFC-normalized filename
    pub filename: String,
    /// Full path
    pub full_path: String,
    /// CRC32 as 8 lowercase hex characters
    pub crc32: String,
    /// Content hash, hex
    pub content_hash: String,
    /// Perceptual digests (may be empty)
    pub perceptual: PerceptualHashes,
    /// Size in bytes
    pub size: u64,
    /// Normalized media type
    pub media_type: String,
}

impl NewRecord {
    /// Build a record from a fully extracted fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IncompleteRecord`] if the CRC32 or content hash
    /// has not been computed.
    pub fn from_fingerprint(fp: &Fingerprint) -> Result<Self, IndexError> {
        let incomplete = || IndexError::IncompleteRecord(fp.path().to_path_buf());
        let crc32 = fp.crc32_hex().ok_or_else(incomplete)?;
        let content_hash = fp.content_hash_hex().ok_or_else(incomplete)?;

        Ok(Self {
            filename: fp.filename().to_string(),
            full_path: fp.path().to_string_lossy().into_owned(),
            crc32,
            content_hash,
            perceptual: fp.perceptual().cloned().unwrap_or_default(),
            size: fp.size(),
            media_type: fp.media_type().as_str().to_string(),
        })
    }
}

/// Aggregate statistics over the whole index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of records
    pub total_images: u64,
    /// Number of distinct media types
    pub image_types: u64,
    /// Mean size in bytes
    pub average_size: f64,
    /// Sum of sizes in bytes
    pub total_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::IdentityExtractor;
    use image::{ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_new_record_from_fingerprint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let fp = IdentityExtractor::new().extract(&path).unwrap();
        let record = NewRecord::from_fingerprint(&fp).unwrap();

        assert_eq!(record.filename, "shot.png");
        assert_eq!(record.media_type, "png");
        assert_eq!(record.crc32.len(), 8);
        assert_eq!(record.content_hash.len(), 64);
        assert_eq!(record.size, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_new_record_requires_hashes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let fp = IdentityExtractor::new().check_type(&path).unwrap();
        assert!(matches!(
            NewRecord::from_fingerprint(&fp),
            Err(IndexError::IncompleteRecord(_))
        ));
    }
}
