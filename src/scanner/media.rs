//! Content-based media type detection.
//!
//! Types are decided from magic bytes via [`infer`], never from the file
//! extension. Only JPEG, PNG and BMP are supported images; everything else
//! is carried along as [`MediaType::Other`] (or [`MediaType::Unknown`] when
//! no signature matches, e.g. empty files) and filtered out before hashing.

use serde::{Deserialize, Serialize};

/// Normalized media type of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// Windows bitmap
    Bmp,
    /// Recognized, unsupported type (lowercase MIME string)
    Other(String),
    /// No known signature
    Unknown,
}

impl MediaType {
    /// Classify a buffer holding the leading bytes of a file.
    #[must_use]
    pub fn detect(header: &[u8]) -> Self {
        match infer::get(header) {
            Some(kind) => Self::from_mime(kind.mime_type()),
            None => Self::Unknown,
        }
    }

    /// Map a MIME string onto a media type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/bmp" | "image/x-ms-bmp" => Self::Bmp,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this is one of the supported image types.
    #[must_use]
    pub fn is_supported_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Bmp)
    }

    /// Lowercase name stored in the index (`jpeg`, `png`, `bmp`, or the MIME type).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Other(mime) => mime,
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
