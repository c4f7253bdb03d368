//! The duplicate / ambiguous / migrate decision.
//!
//! # Policies
//!
//! **Precise** (default) looks up the candidate's content hash. A match is a
//! duplicate; anything else is new. Never ambiguous.
//!
//! **Fast** starts from `(filename, size)`:
//!
//! ```text
//! Start ── name+size hit ──► name+size+crc32 hit ──► Duplicate
//!   │                    └─► no such row ─────────► Ambiguous
//!   └── no hit ──► [checksum fallback] crc32+size hit ──► Ambiguous
//!                                     └─ no hit ─────────► Migrate
//! ```
//!
//! The checksum fallback is off unless enabled with
//! [`Classifier::with_checksum_fallback`]. Ingest turns it on so near-twins
//! are not added to the index; classification leaves it off, which means a
//! renamed byte-identical copy is reported as `Migrate` under the fast policy.
//!
//! Perceptual hashes are never consulted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::{FileRecord, IndexError, Lookup, RecordLookup};
use crate::scanner::{hash_to_hex, ExtractError, Fingerprint, IdentityExtractor};

/// Classification strategy, chosen once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Content hash equality is authoritative.
    #[default]
    Precise,
    /// Filename, size and CRC32 only.
    Fast,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precise => write!(f, "precise"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Already present in the index.
    Duplicate,
    /// Cheap signals match an indexed record; identity unconfirmed.
    Ambiguous,
    /// Not present; a candidate for copying into the source tree.
    Migrate,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::Ambiguous => write!(f, "ambiguous"),
            Self::Migrate => write!(f, "migrate"),
        }
    }
}

/// A verdict plus the record that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The decision
    pub verdict: Verdict,
    /// The indexed record that matched (absent for `Migrate`)
    pub matched: Option<FileRecord>,
}

impl Classification {
    fn matched(verdict: Verdict, record: FileRecord) -> Self {
        Self {
            verdict,
            matched: Some(record),
        }
    }

    fn migrate() -> Self {
        Self {
            verdict: Verdict::Migrate,
            matched: None,
        }
    }
}

/// Errors raised while classifying one candidate.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The candidate is not a supported image.
    #[error("Not a supported image: {0}")]
    NotAnImage(PathBuf),

    /// Extracting a signal failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// An index lookup failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Decides the verdict for a candidate fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    policy: Policy,
    checksum_fallback: bool,
}

impl Classifier {
    /// Create a classifier for `policy`, checksum fallback off.
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            checksum_fallback: false,
        }
    }

    /// Enable the fast policy's `(crc32, size)` stage.
    #[must_use]
    pub fn with_checksum_fallback(mut self, enabled: bool) -> Self {
        self.checksum_fallback = enabled;
        self
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Classify `fp`, computing only the signals the policy needs.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::NotAnImage`] for non-images, or the read or
    /// lookup failure that prevented a decision.
    pub fn classify<L: RecordLookup + ?Sized>(
        &self,
        fp: &mut Fingerprint,
        index: &L,
        extractor: &IdentityExtractor,
    ) -> Result<Classification, ClassifyError> {
        if !fp.is_image() {
            return Err(ClassifyError::NotAnImage(fp.path().to_path_buf()));
        }

        match self.policy {
            Policy::Precise => self.classify_precise(fp, index, extractor),
            Policy::Fast => self.classify_fast(fp, index, extractor),
        }
    }

    fn classify_precise<L: RecordLookup + ?Sized>(
        &self,
        fp: &mut Fingerprint,
        index: &L,
        extractor: &IdentityExtractor,
    ) -> Result<Classification, ClassifyError> {
        let hash = extractor
            .ensure_content_hash(fp)?
            .ok_or_else(|| ClassifyError::NotAnImage(fp.path().to_path_buf()))?;
        let hex = hash_to_hex(&hash);

        Ok(match index.lookup(&Lookup::ContentHash(&hex))? {
            Some(record) => Classification::matched(Verdict::Duplicate, record),
            None => Classification::migrate(),
        })
    }

    fn classify_fast<L: RecordLookup + ?Sized>(
        &self,
        fp: &mut Fingerprint,
        index: &L,
        extractor: &IdentityExtractor,
    ) -> Result<Classification, ClassifyError> {
        let by_name = index.lookup(&Lookup::NameAndSize {
            filename: fp.filename(),
            size: fp.size(),
        })?;

        if let Some(record) = by_name {
            // Several rows may share the name and size; any one with the same CRC confirms it
            let crc = self.crc32_hex(fp, extractor)?;
            let confirmed = index.lookup(&Lookup::NameSizeAndCrc32 {
                filename: fp.filename(),
                size: fp.size(),
                crc32: &crc,
            })?;
            return Ok(match confirmed {
                Some(exact) => Classification::matched(Verdict::Duplicate, exact),
                None => Classification::matched(Verdict::Ambiguous, record),
            });
        }

        if !self.checksum_fallback {
            return Ok(Classification::migrate());
        }

        let crc = self.crc32_hex(fp, extractor)?;
        Ok(match index.lookup(&Lookup::Crc32AndSize {
            crc32: &crc,
            size: fp.size(),
        })? {
            Some(record) => Classification::matched(Verdict::Ambiguous, record),
            None => Classification::migrate(),
        })
    }

    fn crc32_hex(
        &self,
        fp: &mut Fingerprint,
        extractor: &IdentityExtractor,
    ) -> Result<String, ClassifyError> {
        extractor.ensure_crc32(fp)?;
        fp.crc32_hex()
            .ok_or_else(|| ClassifyError::NotAnImage(fp.path().to_path_buf()))
    }
}
