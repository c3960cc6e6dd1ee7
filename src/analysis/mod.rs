//! Result analysis
//!
//! Decides when a stream of noisy recognition results has settled.

pub mod consensus;

pub use consensus::{ConsensusQueue, RecognitionReliability};
