//! Region of interest mapping
//!
//! Maps a rectangle drawn over the preview surface onto the pixels of the
//! frame behind it. The preview shows the frame aspect-filled, so the frame is
//! first cropped to the preview's aspect ratio and the ROI is then scaled into
//! that crop. The two stages must run in this order.

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Size in preview (display) units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Rectangle in preview (display) units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check that the rectangle has a positive, finite area
    pub fn validate(&self) -> PipelineResult<()> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(PipelineError::geometry(format!(
                "region of interest has non-finite values: {:?}",
                self
            )));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(PipelineError::geometry(format!(
                "region of interest has zero area: {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Rectangle in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Computes the pixel crop for a frame; swap it out to change how the ROI is located
pub trait RegionMapper: Send + Sync {
    /// Crop rectangle in `image_size` pixels for an optional preview-space ROI
    fn crop_rect(
        &self,
        image_size: (u32, u32),
        preview: Size,
        roi: Option<Rect>,
    ) -> PipelineResult<PixelRect>;
}

/// Default mapper for previews that aspect-fill the frame
#[derive(Debug, Clone, Copy, Default)]
pub struct AspectFillMapper;

impl RegionMapper for AspectFillMapper {
    fn crop_rect(
        &self,
        image_size: (u32, u32),
        preview: Size,
        roi: Option<Rect>,
    ) -> PipelineResult<PixelRect> {
        crop_rect(image_size, preview, roi)
    }
}

/// Two-stage crop: aspect fit to the preview, then the ROI inside that
///
/// With no ROI the aspect-fitted rectangle is returned as is.
pub fn crop_rect(image_size: (u32, u32), preview: Size, roi: Option<Rect>) -> PipelineResult<PixelRect> {
    let fitted = aspect_fit(image_size, preview)?;
    match roi {
        Some(roi) => map_roi(fitted, preview, roi),
        None => Ok(fitted),
    }
}

/// Centered crop of the image matching the preview's aspect ratio
pub fn aspect_fit(image_size: (u32, u32), preview: Size) -> PipelineResult<PixelRect> {
    if !preview.is_valid() {
        return Err(PipelineError::geometry(format!(
            "preview size must be positive, got {}x{}",
            preview.width, preview.height
        )));
    }
    let (image_width, image_height) = image_size;
    if image_width == 0 || image_height == 0 {
        return Err(PipelineError::geometry(format!(
            "image has zero area: {}x{}",
            image_width, image_height
        )));
    }

    let iw = image_width as f64;
    let ih = image_height as f64;
    let ratio = preview.width / preview.height;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(PipelineError::geometry(format!(
            "preview aspect ratio is unusable: {}x{}",
            preview.width, preview.height
        )));
    }

    // Wider than the preview: keep the height and trim the sides
    let (crop_w, crop_h) = if iw / ih > ratio {
        (ih * ratio, ih)
    } else {
        (iw, iw / ratio)
    };

    let x = (((iw - crop_w) / 2.0).round().max(0.0) as u32).min(image_width - 1);
    let y = (((ih - crop_h) / 2.0).round().max(0.0) as u32).min(image_height - 1);
    let width = (crop_w.round() as u32).clamp(1, image_width - x);
    let height = (crop_h.round() as u32).clamp(1, image_height - y);

    Ok(PixelRect { x, y, width, height })
}

/// Scale a preview-space ROI into the aspect-fitted crop, clipped to its bounds
pub fn map_roi(fitted: PixelRect, preview: Size, roi: Rect) -> PipelineResult<PixelRect> {
    if !preview.is_valid() {
        return Err(PipelineError::geometry(format!(
            "preview size must be positive, got {}x{}",
            preview.width, preview.height
        )));
    }
    roi.validate()?;

    let sx = fitted.width as f64 / preview.width;
    let sy = fitted.height as f64 / preview.height;

    let (x0, x1) = clip_span(roi.x * sx, (roi.x + roi.width) * sx, fitted.width)
        .ok_or(PipelineError::EmptyRegion)?;
    let (y0, y1) = clip_span(roi.y * sy, (roi.y + roi.height) * sy, fitted.height)
        .ok_or(PipelineError::EmptyRegion)?;

    Ok(PixelRect {
        x: fitted.x + x0,
        y: fitted.y + y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Snap `[start, end)` outward to whole pixels and clip it to `[0, limit)`
fn clip_span(start: f64, end: f64, limit: u32) -> Option<(u32, u32)> {
    let lo = start.max(0.0).floor();
    let hi = end.min(limit as f64).ceil();
    if hi <= lo {
        return None;
    }
    Some((lo as u32, hi as u32))
}

/// Copy a rectangle out of a grayscale image
pub fn crop_image(image: &GrayImage, rect: PixelRect) -> GrayImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}
