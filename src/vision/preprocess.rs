//! Frame preprocessing for OCR
//!
//! Turns a raw frame into the grayscale, contrast-boosted crop that is sent to
//! the OCR engine. Stages run in a fixed order and stop at the first failure:
//!
//! 1. decode the frame into an RGBA buffer
//! 2. colour controls (desaturate, boost contrast)
//! 3. grayscale conversion
//! 4. aspect-fit crop, then region-of-interest crop

use image::{imageops, DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use crate::capture::{PixelFormat, RawFrame};
use crate::error::{PipelineError, PipelineResult};
use crate::vision::region::{crop_image, AspectFillMapper, Rect, RegionMapper, Size};

/// Default saturation: fully desaturated
pub const DEFAULT_SATURATION: f32 = 0.0;
/// Default contrast factor, tuned for printed text
pub const DEFAULT_CONTRAST: f32 = 1.45;

/// Rec. 709 luma weights used for desaturation
const LUMA_WEIGHTS: [f32; 3] = [0.2125, 0.7154, 0.0721];

/// Produces the image handed to the OCR engine
pub trait FramePreprocessor: Send + Sync {
    /// Prepare `frame` for recognition, cropped to `roi` as seen on a `preview`-sized surface
    ///
    /// Takes the frame by value so its buffer can be reused without a copy.
    fn prepare(&self, frame: RawFrame, preview: Size, roi: Option<Rect>) -> PipelineResult<GrayImage>;
}

/// Saturation and contrast adjustment applied before grayscale conversion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorControls {
    /// 0.0 = grayscale, 1.0 = unchanged
    pub saturation: f32,
    /// Contrast factor around mid-grey; > 1.0 increases contrast
    pub contrast: f32,
}

impl Default for ColorControls {
    fn default() -> Self {
        Self {
            saturation: DEFAULT_SATURATION,
            contrast: DEFAULT_CONTRAST,
        }
    }
}

impl ColorControls {
    /// Adjust every pixel in place; alpha is left untouched
    pub fn apply(&self, image: &mut RgbaImage) {
        for pixel in image.pixels_mut() {
            let rgb = [
                pixel[0] as f32 / 255.0,
                pixel[1] as f32 / 255.0,
                pixel[2] as f32 / 255.0,
            ];
            let luma: f32 = rgb.iter().zip(LUMA_WEIGHTS).map(|(c, w)| c * w).sum();

            for (i, channel) in rgb.iter().enumerate() {
                let saturated = luma + (channel - luma) * self.saturation;
                let contrasted = (saturated - 0.5) * self.contrast + 0.5;
                pixel[i] = (contrasted.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
    }
}

/// Default preprocessing pipeline
#[derive(Clone)]
pub struct ImagePreprocessor {
    controls: ColorControls,
    mapper: Arc<dyn RegionMapper>,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ImagePreprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePreprocessor")
            .field("controls", &self.controls)
            .finish_non_exhaustive()
    }
}

impl ImagePreprocessor {
    /// Pipeline with the default colour controls and aspect-fill mapping
    pub fn new() -> Self {
        Self {
            controls: ColorControls::default(),
            mapper: Arc::new(AspectFillMapper),
        }
    }

    /// Replace the colour controls
    pub fn with_controls(mut self, controls: ColorControls) -> Self {
        self.controls = controls;
        self
    }

    /// Replace the region mapper
    pub fn with_mapper(mut self, mapper: Arc<dyn RegionMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn controls(&self) -> ColorControls {
        self.controls
    }
}

impl FramePreprocessor for ImagePreprocessor {
    fn prepare(&self, frame: RawFrame, preview: Size, roi: Option<Rect>) -> PipelineResult<GrayImage> {
        let start = Instant::now();

        let mut rgba = decode_frame(frame)?;
        self.controls.apply(&mut rgba);
        let gray = imageops::grayscale(&rgba);
        let rect = self.mapper.crop_rect(gray.dimensions(), preview, roi)?;
        let cropped = crop_image(&gray, rect);

        trace!(
            "Prepared {}x{} frame -> {:?} in {:?}",
            gray.width(),
            gray.height(),
            rect,
            start.elapsed()
        );
        Ok(cropped)
    }
}

/// Stage 1: get an RGBA buffer out of whatever the frame source delivered
pub fn decode_frame(frame: RawFrame) -> PipelineResult<RgbaImage> {
    let image = match frame.format {
        PixelFormat::Encoded => image::load_from_memory(&frame.data)
            .map(|img| img.to_rgba8())
            .map_err(|e| PipelineError::FrameDecodeFailure(e.to_string()))?,
        _ => decode_raw(frame)?,
    };

    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::FrameDecodeFailure("frame has no pixels".into()));
    }
    Ok(image)
}

fn decode_raw(frame: RawFrame) -> PipelineResult<RgbaImage> {
    let (width, height) = frame.dimensions();
    let format = frame.format;
    let expected = frame.expected_len().ok_or_else(|| {
        PipelineError::FrameDecodeFailure(format!(
            "{:?} frame {}x{} is too large",
            format, width, height
        ))
    })?;
    if frame.data.len() != expected {
        return Err(PipelineError::FrameDecodeFailure(format!(
            "{:?} frame {}x{} needs {} bytes, got {}",
            format,
            width,
            height,
            expected,
            frame.data.len()
        )));
    }

    let data = frame.data;
    let image = match format {
        PixelFormat::Rgba8 => RgbaImage::from_raw(width, height, data),
        PixelFormat::Bgra8 => {
            let mut data = data;
            for chunk in data.chunks_exact_mut(4) {
                chunk.swap(0, 2);
            }
            RgbaImage::from_raw(width, height, data)
        }
        PixelFormat::Rgb8 => {
            RgbImage::from_raw(width, height, data).map(|img| DynamicImage::ImageRgb8(img).to_rgba8())
        }
        PixelFormat::Gray8 => {
            GrayImage::from_raw(width, height, data).map(|img| DynamicImage::ImageLuma8(img).to_rgba8())
        }
        PixelFormat::Encoded => None,
    };

    image.ok_or_else(|| PipelineError::FrameDecodeFailure(format!("unusable {:?} buffer", format)))
}
