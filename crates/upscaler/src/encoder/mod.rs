//! Size-targeting JPEG encoder.
//!
//! Finds the lowest JPEG quality whose output is at least `target_bytes`
//! long. Encoded size grows with quality for a fixed image, so a bisection
//! over `[1, 100]` needs one encode at 100 plus at most seven more.

pub mod metadata;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

use crate::error::EncodeError;

pub use metadata::{JpegMetadata, Orientation};

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Note attached to a task whose target could not be met.
pub const UNREACHABLE_NOTE: &str = "target size unreachable at quality 100";

#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub bytes: Vec<u8>,
    pub quality: u8,
    pub target_met: bool,
    pub notes: Vec<String>,
    /// Number of full encodes performed by the search.
    pub attempts: u32,
}

impl EncodeOutcome {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Encodes `image` at one quality and splices `metadata` into the result.
pub fn encode_at_quality(
    image: &RgbImage,
    quality: u8,
    metadata: &JpegMetadata,
) -> Result<Vec<u8>, EncodeError> {
    let quality = quality.clamp(MIN_QUALITY, MAX_QUALITY);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .map_err(|source| EncodeError::Jpeg { quality, source })?;

    if metadata.is_empty() {
        Ok(buf)
    } else {
        Ok(metadata.embed(&buf))
    }
}

/// Returns the encoding at the lowest quality whose size is `>= target_bytes`.
///
/// - If quality 100 is still too small, the quality-100 encoding is returned
///   with `target_met == false` and [`UNREACHABLE_NOTE`].
/// - If quality 1 already meets the target, quality 1 is returned.
pub fn encode_to_target(
    image: &RgbImage,
    target_bytes: u64,
    metadata: &JpegMetadata,
) -> Result<EncodeOutcome, EncodeError> {
    let top = encode_at_quality(image, MAX_QUALITY, metadata)?;
    let mut attempts = 1;

    if (top.len() as u64) < target_bytes {
        debug!(
            size = top.len(),
            target = target_bytes,
            "target unreachable at maximum quality"
        );
        return Ok(EncodeOutcome {
            bytes: top,
            quality: MAX_QUALITY,
            target_met: false,
            notes: vec![UNREACHABLE_NOTE.to_string()],
            attempts,
        });
    }

    // Invariant: `best` is the encoding at `hi`, and `hi` meets the target.
    let (mut lo, mut hi) = (MIN_QUALITY, MAX_QUALITY);
    let mut best = top;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let candidate = encode_at_quality(image, mid, metadata)?;
        attempts += 1;
        if candidate.len() as u64 >= target_bytes {
            hi = mid;
            best = candidate;
        } else {
            lo = mid + 1;
        }
    }

    debug!(
        quality = hi,
        size = best.len(),
        target = target_bytes,
        attempts,
        "size target met"
    );

    Ok(EncodeOutcome {
        bytes: best,
        quality: hi,
        target_met: true,
        notes: Vec::new(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Deterministic noisy image; noise keeps size strictly growing with quality.
    fn noisy_image(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x1234_5678;
        RgbImage::from_fn(width, height, |x, y| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let n = (state >> 24) as u8;
            Rgb([
                (x as u8).wrapping_add(n / 2),
                (y as u8).wrapping_add(n / 3),
                n,
            ])
        })
    }

    #[test]
    fn test_unreachable_target_stops_at_max_quality() {
        let img = noisy_image(32, 32);
        let outcome = encode_to_target(&img, 50 * 1024 * 1024, &JpegMetadata::default()).unwrap();

        assert_eq!(outcome.quality, MAX_QUALITY);
        assert!(!outcome.target_met);
        assert_eq!(outcome.notes, vec![UNREACHABLE_NOTE.to_string()]);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_tiny_target_uses_min_quality() {
        let img = noisy_image(32, 32);
        let outcome = encode_to_target(&img, 1, &JpegMetadata::default()).unwrap();

        assert_eq!(outcome.quality, MIN_QUALITY);
        assert!(outcome.target_met);
        assert!(outcome.notes.is_empty());
    }

    #[test]
    fn test_search_is_tight_and_bounded() {
        let img = noisy_image(96, 96);
        let meta = JpegMetadata::default();
        let target = encode_at_quality(&img, 60, &meta).unwrap().len() as u64;

        let outcome = encode_to_target(&img, target, &meta).unwrap();

        assert!(outcome.target_met);
        assert!(outcome.size_bytes() >= target);
        assert!(outcome.quality <= 60);
        assert!(outcome.attempts <= 8, "attempts = {}", outcome.attempts);
        if outcome.quality > MIN_QUALITY {
            let below = encode_at_quality(&img, outcome.quality - 1, &meta).unwrap();
            assert!((below.len() as u64) < target);
        }
    }

    #[test]
    fn test_search_is_idempotent() {
        let img = noisy_image(64, 48);
        let meta = JpegMetadata::default();
        let target = encode_at_quality(&img, 75, &meta).unwrap().len() as u64;

        let first = encode_to_target(&img, target, &meta).unwrap();
        let second = encode_to_target(&img, target, &meta).unwrap();

        assert_eq!(first.quality, second.quality);
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn test_metadata_is_carried_into_output() {
        let img = noisy_image(16, 16);
        let meta = JpegMetadata {
            exif: Some(metadata::tests::exif_with_orientation(1)),
            icc_profile: Some(vec![7u8; 512]),
            orientation: Orientation::Normal,
        };

        let outcome = encode_to_target(&img, 1, &meta).unwrap();
        let read_back = JpegMetadata::read(&outcome.bytes);

        assert_eq!(read_back.exif, meta.exif);
        assert_eq!(read_back.icc_profile, meta.icc_profile);
    }
}
