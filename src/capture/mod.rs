//! Frame Source Layer
//!
//! The camera itself lives outside this crate. Frames are pushed into the
//! engine together with the preview size they were displayed at; this module
//! only defines those types and a file-based source for replaying recordings.

pub mod frame;
pub mod replay;

pub use frame::{PixelFormat, RawFrame};
pub use replay::ImageSequence;
