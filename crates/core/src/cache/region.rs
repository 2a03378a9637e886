use image::RgbImage;
use tracing::{debug, warn};

use super::{encode_thumbnail, Decoded};
use crate::domain::{RegionArea, RegionRecord, RegionSpec};
use crate::error::{Error, Result};
use crate::reconcile;

/// Absolute per-coordinate tolerance when matching a reported region to a stored one.
pub const REGION_TOLERANCE: f64 = 1e-6;

const NORMALIZED_UNIT: &str = "normalized";

fn close(a: Option<f64>, b: Option<f64>) -> bool {
    (a.unwrap_or(0.0) - b.unwrap_or(0.0)).abs() < REGION_TOLERANCE
}

/// Same name, type and unit, and every coordinate within tolerance (missing counts as 0).
pub fn region_matches(new: &RegionSpec, stored: &RegionSpec) -> bool {
    let (a, b) = (&new.area, &stored.area);
    new.name == stored.name
        && new.region_type == stored.region_type
        && a.unit == b.unit
        && close(a.h, b.h)
        && close(a.w, b.w)
        && close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.d, b.d)
}

/// Pixel box `(left, top, width, height)` for a centre-origin normalized area,
/// clamped to the image.
pub fn pixel_box(area: &RegionArea, width: u32, height: u32) -> Result<(u32, u32, u32, u32)> {
    match area.unit.as_deref() {
        Some(unit) if unit.eq_ignore_ascii_case(NORMALIZED_UNIT) => {}
        other => {
            return Err(Error::CacheGeneration(format!(
                "unsupported region unit {other:?}"
            )))
        }
    }
    let (Some(h), Some(w), Some(x), Some(y)) = (area.h, area.w, area.x, area.y) else {
        return Err(Error::CacheGeneration("region area is incomplete".into()));
    };

    let (img_w, img_h) = (width as f64, height as f64);
    let box_w = w * img_w;
    let box_h = h * img_h;
    let left = x * img_w - box_w / 2.0;
    let top = y * img_h - box_h / 2.0;

    let x0 = left.max(0.0).round();
    let y0 = top.max(0.0).round();
    let x1 = (left + box_w).min(img_w).round();
    let y1 = (top + box_h).min(img_h).round();

    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return Err(Error::CacheGeneration("region is empty after clamping".into()));
    }
    Ok((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Crop an already-oriented image and encode it like an asset thumbnail.
pub fn crop_region(oriented: &RgbImage, area: &RegionArea) -> Result<Vec<u8>> {
    let (left, top, w, h) = pixel_box(area, oriented.width(), oriented.height())?;
    let cropped = image::imageops::crop_imm(oriented, left, top, w, h).to_image();
    encode_thumbnail(&cropped)
}

/// Decode, orient, crop, encode.
pub fn extract_region(bytes: &[u8], area: &RegionArea) -> Result<Vec<u8>> {
    let oriented = Decoded::from_bytes(bytes)?.oriented()?;
    crop_region(&oriented, area)
}

/// Produces region preview blobs.
pub trait RegionRenderer {
    fn render(&mut self, area: &RegionArea) -> Result<Vec<u8>>;
}

/// Decodes the source bytes on first use only, so a scan where every region is reused
/// never pays for a decode.
pub struct LazyRenderer<'a> {
    bytes: &'a [u8],
    oriented: Option<RgbImage>,
}

impl<'a> LazyRenderer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            oriented: None,
        }
    }
}

impl RegionRenderer for LazyRenderer<'_> {
    fn render(&mut self, area: &RegionArea) -> Result<Vec<u8>> {
        let oriented = match self.oriented.take() {
            Some(img) => img,
            None => Decoded::from_bytes(self.bytes)?.oriented()?,
        };
        let result = crop_region(&oriented, area);
        self.oriented = Some(oriented);
        result
    }
}

/// What to do with an asset's regions after re-extraction.
#[derive(Debug, Default)]
pub struct RegionPlan {
    /// Stored regions that still match; thumbnail kept as is.
    pub keep: Vec<i64>,
    /// Stored regions with no counterpart in the new payload.
    pub remove: Vec<i64>,
    /// New regions with a freshly rendered thumbnail (None if rendering failed).
    pub insert: Vec<(RegionSpec, Option<Vec<u8>>)>,
    /// One message per region whose preview could not be rendered.
    pub failures: Vec<String>,
}

/// Match reported regions against stored ones. Only unmatched new regions are rendered.
/// When `render_thumbnails` is false new regions are inserted without a blob.
pub fn plan_regions(
    desired: &[RegionSpec],
    existing: &[RegionRecord],
    renderer: &mut dyn RegionRenderer,
    render_thumbnails: bool,
) -> RegionPlan {
    let matching = reconcile::reconcile(desired, existing, |new, stored| {
        region_matches(new, &stored.spec)
    });

    let mut plan = RegionPlan {
        keep: matching.kept.iter().map(|(_, stored)| stored.id).collect(),
        remove: matching.removed.iter().map(|stored| stored.id).collect(),
        insert: Vec::with_capacity(matching.added.len()),
        failures: Vec::new(),
    };

    for spec in matching.added {
        let blob = if render_thumbnails {
            match renderer.render(&spec.area) {
                Ok(blob) => Some(blob),
                Err(e) => {
                    let name = spec.name.as_deref().unwrap_or("unnamed");
                    warn!(region = name, "region preview failed: {e}");
                    plan.failures.push(format!("region preview failed for {name}: {e}"));
                    None
                }
            }
        } else {
            None
        };
        plan.insert.push((spec.clone(), blob));
    }

    debug!(
        kept = plan.keep.len(),
        removed = plan.remove.len(),
        inserted = plan.insert.len(),
        "region plan"
    );
    plan
}
