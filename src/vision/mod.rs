//! Vision Layer
//!
//! Prepares frames for recognition and defines the recognizer interface:
//! - `region`: preview-space ROI to frame pixels
//! - `preprocess`: decode, enhance, grayscale, crop
//! - `ocr`: the asynchronous OCR engine trait

pub mod ocr;
pub mod preprocess;
pub mod region;

pub use ocr::{OcrEngine, TranscriptOcr};
pub use preprocess::{ColorControls, FramePreprocessor, ImagePreprocessor};
pub use region::{AspectFillMapper, PixelRect, Rect, RegionMapper, Size};
