//! Perceptual image hashing.
//!
//! Four independent 64-bit digests are computed per image:
//!
//! | Digest     | Method                                                  |
//! |------------|---------------------------------------------------------|
//! | average    | mean threshold over an 8x8 grayscale thumbnail          |
//! | perceptual | median threshold over low DCT frequencies               |
//! | difference | horizontal gradient signs                               |
//! | wavelet    | median threshold over the Haar LL band, DC removed      |
//!
//! The first three come from [`image_hasher`]; the wavelet digest is computed
//! here. Each digest is rendered as 16 lowercase hex characters. These values
//! are stored in the index and reported, never used to decide duplicates.

use image::imageops::FilterType;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side length of the hash grid; every digest has `HASH_SIDE * HASH_SIDE` bits.
const HASH_SIDE: u32 = 8;

/// Thumbnail side length the wavelet transform starts from.
const WAVELET_SCALE: u32 = 64;

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum PerceptualError {
    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(String, #[source] image::ImageError),
}

/// The four perceptual digests of one image, as hex strings.
///
/// A field is empty when it was not computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHashes {
    /// Average hash
    pub average: String,
    /// DCT perceptual hash
    pub perceptual: String,
    /// Difference hash
    pub difference: String,
    /// Wavelet hash
    pub wavelet: String,
}

impl PerceptualHashes {
    /// True when none of the digests were computed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.average.is_empty()
            && self.perceptual.is_empty()
            && self.difference.is_empty()
            && self.wavelet.is_empty()
    }
}

/// Computes perceptual hashes for images.
pub struct PerceptualHasher {
    average: image_hasher::Hasher,
    perceptual: image_hasher::Hasher,
    difference: image_hasher::Hasher,
}

impl std::fmt::Debug for PerceptualHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptualHasher")
            .field("hash_side", &HASH_SIDE)
            .finish()
    }
}

impl PerceptualHasher {
    /// Create a hasher producing 64-bit digests.
    #[must_use]
    pub fn new() -> Self {
        let base = || HasherConfig::new().hash_size(HASH_SIDE, HASH_SIDE);

        Self {
            average: base().hash_alg(HashAlg::Mean).to_hasher(),
            perceptual: base().hash_alg(HashAlg::Median).preproc_dct().to_hasher(),
            difference: base().hash_alg(HashAlg::Gradient).to_hasher(),
        }
    }

    /// Compute all four digests for a decoded image.
    #[must_use]
    pub fn compute_all(&self, img: &DynamicImage) -> PerceptualHashes {
        PerceptualHashes {
            average: image_hash_to_hex(&self.average.hash_image(img)),
            perceptual: image_hash_to_hex(&self.perceptual.hash_image(img)),
            difference: image_hash_to_hex(&self.difference.hash_image(img)),
            wavelet: wavelet_hash(img),
        }
    }

    /// Decode an in-memory image and compute all four digests.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError::LoadError`] if the bytes cannot be decoded.
    pub fn compute_from_bytes(
        &self,
        bytes: &[u8],
        label: &str,
    ) -> Result<PerceptualHashes, PerceptualError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| PerceptualError::LoadError(label.to_string(), e))?;
        Ok(self.compute_all(&img))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn image_hash_to_hex(hash: &ImageHash) -> String {
    bytes_to_hex(hash.as_bytes())
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Wavelet hash: Haar-decompose a grayscale thumbnail down to an 8x8 LL band
/// after removing the DC component, then threshold against the band median.
fn wavelet_hash(img: &DynamicImage) -> String {
    let gray = img
        .resize_exact(WAVELET_SCALE, WAVELET_SCALE, FilterType::Lanczos3)
        .to_luma8();
    let mut band: Vec<f32> = gray.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect();

    // The lowest Haar coefficient is the global mean; removing it is a shift.
    let mean = band.iter().sum::<f32>() / band.len() as f32;
    for v in &mut band {
        *v -= mean;
    }

    let mut side = WAVELET_SCALE as usize;
    while side > HASH_SIDE as usize {
        band = haar_low_band(&band, side);
        side /= 2;
    }

    let median = median(&band);
    let mut bytes = vec![0u8; band.len() / 8];
    for (i, v) in band.iter().enumerate() {
        if *v > median {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bytes_to_hex(&bytes)
}

/// One level of the orthonormal 2D Haar transform, keeping only the LL band.
fn haar_low_band(src: &[f32], side: usize) -> Vec<f32> {
    let half = side / 2;
    let mut out = vec![0.0f32; half * half];
    for y in 0..half {
        for x in 0..half {
            let i = 2 * y * side + 2 * x;
            out[y * half + x] = (src[i] + src[i + 1] + src[i + side] + src[i + side + 1]) / 2.0;
        }
    }
    out
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
