//! OCR (Optical Character Recognition) module
//!
//! The recognizer itself is an external collaborator. The engine only needs an
//! asynchronous `recognize` that may be called for several images at once and
//! may complete in any order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::GrayImage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Text recognizer consumed by the engine
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text in a prepared grayscale image, `None` if nothing was read
    async fn recognize(&self, image: GrayImage) -> Option<String>;
}

/// Replays a prepared list of recognition results, one per call
///
/// Used by the replay CLI and in tests in place of a real recognizer. An empty
/// transcript line stands for "no result".
#[derive(Debug, Default)]
pub struct TranscriptOcr {
    results: Mutex<VecDeque<Option<String>>>,
    latency: Duration,
}

impl TranscriptOcr {
    /// Create from results in call order
    pub fn new<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            results: Mutex::new(results.into_iter().map(|r| r.map(Into::into)).collect()),
            latency: Duration::ZERO,
        }
    }

    /// Create from transcript lines; blank lines become `None`
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|line| {
            let line = line.trim_end_matches(['\r', '\n']);
            (!line.trim().is_empty()).then(|| line.to_string())
        }))
    }

    /// Load a transcript file with one result per line
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading OCR transcript {:?}", path))?;
        Ok(Self::from_lines(content.lines()))
    }

    /// Delay every recognition by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Results not yet handed out
    pub fn remaining(&self) -> usize {
        self.results.lock().len()
    }
}

#[async_trait]
impl OcrEngine for TranscriptOcr {
    async fn recognize(&self, _image: GrayImage) -> Option<String> {
        let result = self.results.lock().pop_front().flatten();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        result
    }
}
