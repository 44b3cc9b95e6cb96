//! JPEG marker-level metadata handling: capture EXIF and ICC segments from a
//! source file, read and neutralize the EXIF orientation, and splice the
//! segments into a freshly encoded file.

use image::DynamicImage;
use log::warn;

const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP2: u8 = 0xE2;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const ICC_HEADER: &[u8] = b"ICC_PROFILE\0";

/// Largest payload a single marker segment can carry (length field included).
const MAX_SEGMENT_LEN: usize = u16::MAX as usize;
/// ICC bytes per APP2 chunk: 65535 - 2 (length) - 12 (signature) - 2 (seq/count).
const ICC_CHUNK_LEN: usize = MAX_SEGMENT_LEN - 2 - ICC_HEADER.len() - 2;

const TAG_ORIENTATION: u16 = 0x0112;
const TYPE_SHORT: u16 = 3;

/// EXIF orientation (tag 0x0112). Variant names describe the transform
/// that brings the stored pixels upright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    pub fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Orientation::Normal),
            2 => Some(Orientation::FlipHorizontal),
            3 => Some(Orientation::Rotate180),
            4 => Some(Orientation::FlipVertical),
            5 => Some(Orientation::Transpose),
            6 => Some(Orientation::Rotate90),
            7 => Some(Orientation::Transverse),
            8 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    /// Bakes the orientation into the pixel buffer.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Normal => image,
            Orientation::FlipHorizontal => image.fliph(),
            Orientation::Rotate180 => image.rotate180(),
            Orientation::FlipVertical => image.flipv(),
            Orientation::Transpose => image.rotate90().fliph(),
            Orientation::Rotate90 => image.rotate90(),
            Orientation::Transverse => image.rotate270().fliph(),
            Orientation::Rotate270 => image.rotate270(),
        }
    }

    /// True when applying the orientation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }
}

/// Metadata carried from a source JPEG into its re-encoded output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JpegMetadata {
    /// TIFF-structured EXIF payload, without the `Exif\0\0` signature.
    pub exif: Option<Vec<u8>>,
    /// Reassembled ICC profile.
    pub icc_profile: Option<Vec<u8>>,
    /// Orientation found in the EXIF payload at read time.
    pub orientation: Orientation,
}

impl JpegMetadata {
    /// Scans the marker segments of `jpeg` up to the first scan.
    /// Malformed or missing segments yield empty metadata, never an error.
    pub fn read(jpeg: &[u8]) -> Self {
        let mut exif = None;
        let mut icc_chunks: Vec<(u8, &[u8])> = Vec::new();

        for (marker, payload) in segments(jpeg) {
            match marker {
                MARKER_APP1 if exif.is_none() && payload.starts_with(EXIF_HEADER) => {
                    exif = Some(payload[EXIF_HEADER.len()..].to_vec());
                }
                MARKER_APP2 if payload.starts_with(ICC_HEADER) => {
                    let rest = &payload[ICC_HEADER.len()..];
                    if rest.len() >= 2 {
                        icc_chunks.push((rest[0], &rest[2..]));
                    }
                }
                _ => {}
            }
        }

        icc_chunks.sort_by_key(|(seq, _)| *seq);
        let icc_profile = if icc_chunks.is_empty() {
            None
        } else {
            Some(icc_chunks.iter().flat_map(|(_, c)| c.iter().copied()).collect())
        };

        let orientation = exif
            .as_deref()
            .and_then(orientation_value)
            .and_then(Orientation::from_exif)
            .unwrap_or_default();

        Self {
            exif,
            icc_profile,
            orientation,
        }
    }

    /// Rewrites the EXIF orientation tag to 1 (top-left), for use once the
    /// orientation has been applied to the pixels.
    pub fn normalize_orientation(&mut self) {
        if let Some(exif) = self.exif.as_mut() {
            reset_orientation(exif);
        }
        self.orientation = Orientation::Normal;
    }

    pub fn is_empty(&self) -> bool {
        self.exif.is_none() && self.icc_profile.is_none()
    }

    /// Inserts the EXIF and ICC segments into an encoded JPEG, right after
    /// SOI (and after a JFIF APP0 segment if one leads the file).
    pub fn embed(&self, jpeg: &[u8]) -> Vec<u8> {
        if self.is_empty() || jpeg.len() < 2 || jpeg[..2] != [0xFF, 0xD8] {
            return jpeg.to_vec();
        }

        let mut insert_at = 2;
        if jpeg.len() >= 6 && jpeg[2] == 0xFF && jpeg[3] == MARKER_APP0 {
            let len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
            if 4 + len <= jpeg.len() {
                insert_at = 4 + len;
            }
        }

        let extra = self.exif.as_ref().map_or(0, |e| e.len() + 16)
            + self.icc_profile.as_ref().map_or(0, |p| p.len() + 64);
        let mut out = Vec::with_capacity(jpeg.len() + extra);
        out.extend_from_slice(&jpeg[..insert_at]);

        if let Some(exif) = &self.exif {
            if 2 + EXIF_HEADER.len() + exif.len() <= MAX_SEGMENT_LEN {
                write_segment(&mut out, MARKER_APP1, &[EXIF_HEADER, exif]);
            } else {
                warn!("EXIF block of {} bytes does not fit a segment, dropping it", exif.len());
            }
        }

        if let Some(profile) = &self.icc_profile {
            let chunks: Vec<&[u8]> = profile.chunks(ICC_CHUNK_LEN).collect();
            if chunks.len() <= u8::MAX as usize {
                let count = chunks.len() as u8;
                for (i, chunk) in chunks.iter().enumerate() {
                    let seq = [(i + 1) as u8, count];
                    write_segment(&mut out, MARKER_APP2, &[ICC_HEADER, &seq, chunk]);
                }
            } else {
                warn!("ICC profile of {} bytes is too large, dropping it", profile.len());
            }
        }

        out.extend_from_slice(&jpeg[insert_at..]);
        out
    }
}

fn write_segment(out: &mut Vec<u8>, marker: u8, parts: &[&[u8]]) {
    let len = 2 + parts.iter().map(|p| p.len()).sum::<usize>();
    out.push(0xFF);
    out.push(marker);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    for part in parts {
        out.extend_from_slice(part);
    }
}

/// Marker segments (marker, payload) between SOI and the first SOS.
fn segments(jpeg: &[u8]) -> Vec<(u8, &[u8])> {
    let mut found = Vec::new();
    if jpeg.len() < 4 || jpeg[..2] != [0xFF, 0xD8] {
        return found;
    }

    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            break;
        }
        let marker = jpeg[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            MARKER_SOS | MARKER_EOI => break,
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > jpeg.len() {
            break;
        }
        found.push((marker, &jpeg[pos + 4..pos + 2 + len]));
        pos += 2 + len;
    }

    found
}

struct Tiff<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let little_endian = match data.get(0..2)? {
            b"II" => true,
            b"MM" => false,
            _ => return None,
        };
        let tiff = Self {
            data,
            little_endian,
        };
        (tiff.u16_at(2)? == 42).then_some(tiff)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.little_endian {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    /// Offset of the orientation value inside IFD0, if present as a SHORT.
    fn orientation_offset(&self) -> Option<usize> {
        let ifd = self.u32_at(4)? as usize;
        let count = self.u16_at(ifd)? as usize;
        (0..count)
            .map(|i| ifd + 2 + i * 12)
            .find(|&entry| self.u16_at(entry) == Some(TAG_ORIENTATION))
            .filter(|&entry| self.u16_at(entry + 2) == Some(TYPE_SHORT))
            .map(|entry| entry + 8)
    }
}

fn orientation_value(exif: &[u8]) -> Option<u16> {
    let tiff = Tiff::new(exif)?;
    tiff.u16_at(tiff.orientation_offset()?)
}

fn reset_orientation(exif: &mut [u8]) {
    let Some((offset, little_endian)) =
        Tiff::new(exif).and_then(|t| Some((t.orientation_offset()?, t.little_endian)))
    else {
        return;
    };
    let bytes = if little_endian {
        1u16.to_le_bytes()
    } else {
        1u16.to_be_bytes()
    };
    exif[offset..offset + 2].copy_from_slice(&bytes);
}
