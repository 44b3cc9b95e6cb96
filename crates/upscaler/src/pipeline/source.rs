use std::io::Cursor;

use image::{ImageFormat, ImageReader, RgbImage};

use crate::encoder::JpegMetadata;
use crate::error::TaskError;
use crate::worker::job::Dims;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Decoded, upright RGB source with the metadata to carry into the output.
#[derive(Debug, Clone)]
pub struct Source {
    pub image: RgbImage,
    pub metadata: JpegMetadata,
}

impl Source {
    pub fn dims(&self) -> Dims {
        Dims::new(self.image.width(), self.image.height())
    }
}

/// Decodes a JPEG upload.
///
/// The header is read first so oversized images are rejected before any
/// pixel memory is allocated. EXIF orientation is baked into the pixels.
pub fn load_source(bytes: &[u8], max_pixels: u64) -> Result<Source, TaskError> {
    if !bytes.starts_with(&JPEG_MAGIC) {
        return Err(TaskError::Input("not a JPEG image".to_string()));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Jpeg)
        .into_dimensions()
        .map_err(|e| TaskError::Input(format!("invalid or unsupported image: {}", e)))?;
    if width as u64 * height as u64 > max_pixels {
        return Err(TaskError::Capacity("source exceeds pixel limit".to_string()));
    }

    let mut reader = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Jpeg);
    reader.no_limits();
    let decoded = reader
        .decode()
        .map_err(|e| TaskError::Input(format!("invalid or unsupported image: {}", e)))?;

    let mut metadata = JpegMetadata::read(bytes);
    let image = metadata.orientation.apply(decoded).to_rgb8();
    metadata.normalize_orientation();

    Ok(Source { image, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_at_quality, Orientation};
    use image::Rgb;

    fn jpeg(width: u32, height: u32, metadata: &JpegMetadata) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 60]));
        encode_at_quality(&img, 90, metadata).unwrap()
    }

    #[test]
    fn test_rejects_non_jpeg_bytes() {
        let err = load_source(b"\x89PNG\r\n\x1a\n", u64::MAX).unwrap_err();
        assert!(matches!(err, TaskError::Input(_)));
    }

    #[test]
    fn test_rejects_truncated_jpeg() {
        let bytes = jpeg(16, 16, &JpegMetadata::default());
        let err = load_source(&bytes[..bytes.len() / 3], u64::MAX).unwrap_err();
        assert!(matches!(err, TaskError::Input(_)));
    }

    #[test]
    fn test_pixel_limit_checked_before_decode() {
        let bytes = jpeg(40, 30, &JpegMetadata::default());
        let err = load_source(&bytes, 40 * 30 - 1).unwrap_err();
        assert_eq!(err.to_string(), "source exceeds pixel limit");
        assert!(load_source(&bytes, 40 * 30).is_ok());
    }

    #[test]
    fn test_orientation_is_applied_and_reset() {
        let meta = JpegMetadata {
            exif: Some(crate::encoder::metadata::tests::exif_with_orientation(6)),
            icc_profile: None,
            orientation: Orientation::Rotate90,
        };
        let bytes = jpeg(40, 20, &meta);

        let source = load_source(&bytes, u64::MAX).unwrap();
        assert_eq!(source.dims(), Dims::new(20, 40));
        assert_eq!(source.metadata.orientation, Orientation::Normal);

        let reread = JpegMetadata::read(&encode_at_quality(&source.image, 90, &source.metadata).unwrap());
        assert_eq!(reread.orientation, Orientation::Normal);
    }
}
