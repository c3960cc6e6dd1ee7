//! Image-sequence frame source
//!
//! Replays image files as if they were consecutive camera frames. Files are
//! handed over undecoded so decoding happens inside the frame pipeline.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::frame::RawFrame;

/// Extensions picked up when a directory is given
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Ordered list of image files played back as frames
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
}

impl ImageSequence {
    /// Build a sequence from files and directories
    ///
    /// Directories contribute their image files in name order.
    pub fn from_paths<P: AsRef<Path>>(inputs: &[P]) -> Result<Self> {
        let mut paths = Vec::new();
        for input in inputs {
            let input = input.as_ref();
            if input.is_dir() {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                    .with_context(|| format!("reading frame directory {:?}", input))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| is_image(path))
                    .collect();
                entries.sort();
                debug!("Found {} frames in {:?}", entries.len(), input);
                paths.extend(entries);
            } else {
                paths.push(input.to_path_buf());
            }
        }
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Frames in playback order; unreadable files are reported per item
    pub fn frames(&self) -> impl Iterator<Item = (PathBuf, Result<RawFrame>)> + '_ {
        self.paths.iter().map(|path| {
            let frame = std::fs::read(path)
                .with_context(|| format!("reading frame {:?}", path))
                .map(RawFrame::encoded);
            (path.clone(), frame)
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
