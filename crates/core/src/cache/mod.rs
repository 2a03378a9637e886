//! Content-addressed preview cache.
//!
//! The pixel fingerprint is a SHA-256 over the decoded, un-oriented, downscaled RGB buffer,
//! so tag edits and orientation flags never change it. Thumbnails are rendered from the
//! same decode after orientation is applied.

pub mod region;

use std::io::Cursor;

use fast_image_resize::{self as fir, images::Image as FirImage};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Longest edge of the buffer that gets fingerprinted.
pub const FINGERPRINT_MAX_DIM: u32 = 256;
/// Longest edge of a rendered thumbnail.
pub const THUMBNAIL_MAX_DIM: u32 = 320;
pub const THUMBNAIL_QUALITY: u8 = 75;

/// Fingerprint plus thumbnail derived from one decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub fingerprint: String,
    pub thumbnail: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Reuse,
    Regenerate,
}

/// Keep the stored thumbnail only when one exists and the pixels it was rendered from
/// are the same.
pub fn decide(existing_fingerprint: Option<&str>, has_thumbnail: bool, new_fingerprint: &str) -> CacheDecision {
    match existing_fingerprint {
        Some(existing) if has_thumbnail && existing == new_fingerprint => CacheDecision::Reuse,
        _ => CacheDecision::Regenerate,
    }
}

/// A decoded image with its EXIF orientation, not yet rotated.
pub struct Decoded {
    rgb: RgbImage,
    orientation: u8,
}

impl Decoded {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| Error::CacheGeneration(format!("decode failed: {e}")))?;
        Ok(Self {
            rgb: img.to_rgb8(),
            orientation: read_exif_orientation(bytes),
        })
    }

    pub fn orientation(&self) -> u8 {
        self.orientation
    }

    /// Stored (un-oriented) dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    pub fn fingerprint(&self) -> Result<String> {
        let (w, h) = self.rgb.dimensions();
        let (fw, fh) = fit_within(w, h, FINGERPRINT_MAX_DIM);
        let pixels = resize_rgb(self.rgb.as_raw(), w, h, fw, fh)?;

        let mut hasher = Sha256::new();
        hasher.update(fw.to_be_bytes());
        hasher.update(fh.to_be_bytes());
        hasher.update(&pixels);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// The image as displayed: EXIF orientation applied.
    pub fn oriented(&self) -> Result<RgbImage> {
        let (w, h) = self.rgb.dimensions();
        let (buf, ow, oh) = apply_orientation_rgb(self.rgb.as_raw(), w as usize, h as usize, self.orientation);
        RgbImage::from_raw(ow as u32, oh as u32, buf)
            .ok_or_else(|| Error::CacheGeneration("oriented buffer has wrong size".into()))
    }

    pub fn thumbnail(&self) -> Result<Vec<u8>> {
        encode_thumbnail(&self.oriented()?)
    }
}

/// One decode, both derived artifacts.
pub fn derive(bytes: &[u8]) -> Result<Preview> {
    let decoded = Decoded::from_bytes(bytes)?;
    Ok(Preview {
        fingerprint: decoded.fingerprint()?,
        thumbnail: decoded.thumbnail()?,
    })
}

pub fn compute_fingerprint(bytes: &[u8]) -> Result<String> {
    Decoded::from_bytes(bytes)?.fingerprint()
}

/// Downscale to fit the thumbnail cap (never upscale) and encode as JPEG.
pub fn encode_thumbnail(img: &RgbImage) -> Result<Vec<u8>> {
    let (w, h) = img.dimensions();
    let (tw, th) = fit_within(w, h, THUMBNAIL_MAX_DIM);
    let pixels = if (tw, th) == (w, h) {
        img.as_raw().clone()
    } else {
        resize_rgb(img.as_raw(), w, h, tw, th)?
    };

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY);
    encoder
        .encode(&pixels, tw, th, ExtendedColorType::Rgb8)
        .map_err(|e| Error::CacheGeneration(format!("encode failed: {e}")))?;
    Ok(out)
}

/// Proportional fit inside a `max`×`max` box. Images already inside are returned as is.
pub fn fit_within(w: u32, h: u32, max: u32) -> (u32, u32) {
    if w <= max && h <= max {
        return (w, h);
    }
    let scale = max as f64 / w.max(h) as f64;
    let fw = ((w as f64 * scale).round() as u32).clamp(1, max);
    let fh = ((h as f64 * scale).round() as u32).clamp(1, max);
    (fw, fh)
}

fn resize_rgb(buf: &[u8], w: u32, h: u32, nw: u32, nh: u32) -> Result<Vec<u8>> {
    if (w, h) == (nw, nh) {
        return Ok(buf.to_vec());
    }
    let src = FirImage::from_vec_u8(w, h, buf.to_vec(), fir::PixelType::U8x3)
        .map_err(|e| Error::CacheGeneration(format!("resize source: {e}")))?;
    let mut dst = FirImage::new(nw, nh, fir::PixelType::U8x3);
    fir::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| Error::CacheGeneration(format!("resize failed: {e}")))?;
    Ok(dst.buffer().to_vec())
}

/// EXIF orientation (1-8) embedded in the bytes. 1 if missing or unreadable.
fn read_exif_orientation(bytes: &[u8]) -> u8 {
    let read = || -> Option<u8> {
        let mut cursor = Cursor::new(bytes);
        let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Rotate/mirror an RGB buffer into display orientation.
///
/// 1 normal, 2 mirror horizontal, 3 rotate 180, 4 mirror vertical,
/// 5 transpose, 6 rotate 90 CW, 7 transverse, 8 rotate 90 CCW.
fn apply_orientation_rgb(buf: &[u8], w: usize, h: usize, orientation: u8) -> (Vec<u8>, usize, usize) {
    if !(2..=8).contains(&orientation) {
        return (buf.to_vec(), w, h);
    }

    let mut out = vec![0u8; w * h * 3];
    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };

    for y in 0..h {
        for x in 0..w {
            let src_idx = (y * w + x) * 3;
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                _ => (y, w - 1 - x),
            };
            let dst_idx = (dy * new_w + dx) * 3;
            out[dst_idx..dst_idx + 3].copy_from_slice(&buf[src_idx..src_idx + 3]);
        }
    }
    (out, new_w, new_h)
}
