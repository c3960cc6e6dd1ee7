//! Frame data structures delivered by the frame source

use std::time::Instant;

/// Layout of the bytes in a [`RawFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba8,
    /// 8-bit BGRA, 4 bytes per pixel (common camera/capture output)
    Bgra8,
    /// 8-bit RGB, 3 bytes per pixel
    Rgb8,
    /// 8-bit single channel
    Gray8,
    /// Compressed image file (PNG, JPEG, ...); dimensions come from the header
    Encoded,
}

impl PixelFormat {
    /// Bytes per pixel for raw formats, `None` for encoded data
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(4),
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Encoded => None,
        }
    }
}

/// A single frame from the video source
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel or file bytes, see `format`
    pub data: Vec<u8>,
    /// Frame width in pixels (0 for encoded frames until decoded)
    pub width: u32,
    /// Frame height in pixels (0 for encoded frames until decoded)
    pub height: u32,
    /// How `data` is laid out
    pub format: PixelFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl RawFrame {
    /// Create a frame from raw pixels
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp: Instant::now(),
        }
    }

    /// Create a frame from RGBA pixels
    pub fn rgba(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(data, width, height, PixelFormat::Rgba8)
    }

    /// Create a frame from an encoded image file
    pub fn encoded(data: Vec<u8>) -> Self {
        Self::new(data, 0, 0, PixelFormat::Encoded)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Expected buffer length for raw formats
    ///
    /// `None` for encoded data and for dimensions whose byte count overflows.
    pub fn expected_len(&self) -> Option<usize> {
        let bpp = self.format.bytes_per_pixel()?;
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(bpp)
    }
}
