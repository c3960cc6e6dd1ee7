//! ocr-consensus - Real-time OCR with multi-frame agreement
//!
//! Frames from a live camera preview are cropped to a region of interest,
//! enhanced, and handed to an asynchronous OCR engine. A value is reported
//! only after enough consecutive recognitions agree.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod vision;

pub use analysis::{ConsensusQueue, RecognitionReliability};
pub use capture::{ImageSequence, PixelFormat, RawFrame};
pub use config::AppConfig;
pub use engine::{
    result_channel, CompletionPolicy, Delivery, EngineOptions, EngineState, FrameOutcome,
    RecognitionEngine,
};
pub use error::{PipelineError, PipelineResult};
pub use vision::{
    ColorControls, FramePreprocessor, ImagePreprocessor, OcrEngine, Rect, RegionMapper, Size,
    TranscriptOcr,
};
