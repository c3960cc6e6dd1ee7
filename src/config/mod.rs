//! Application Configuration
//!
//! Settings stored in TOML format. The engine itself keeps no persistent
//! state; this only configures how it is built and how frames are replayed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::RecognitionReliability;
use crate::engine::{CompletionPolicy, EngineOptions};
use crate::vision::preprocess::{ColorControls, DEFAULT_CONTRAST, DEFAULT_SATURATION};
use crate::vision::{Rect, Size};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Consensus and state machine settings
    pub recognition: RecognitionSettings,
    /// Image enhancement settings
    pub enhancement: EnhancementSettings,
    /// Frame source settings
    pub capture: CaptureSettings,
}

/// Recognition-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Required agreement tier
    pub reliability: RecognitionReliability,
    /// Keep running or stop after the first reported value
    pub completion_policy: CompletionPolicy,
    /// Recognise immediately on startup
    pub start_active: bool,
    /// Maximum concurrent OCR operations
    pub max_in_flight: usize,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            reliability: options.reliability,
            completion_policy: options.policy,
            start_active: options.start_active,
            max_in_flight: options.max_in_flight,
        }
    }
}

impl RecognitionSettings {
    /// Engine options for these settings
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            reliability: self.reliability,
            policy: self.completion_policy,
            start_active: self.start_active,
            max_in_flight: self.max_in_flight,
        }
    }
}

/// Colour adjustment applied before grayscale conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSettings {
    /// 0.0 = grayscale, 1.0 = unchanged
    pub saturation: f32,
    /// Contrast factor around mid-grey
    pub contrast: f32,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            saturation: DEFAULT_SATURATION,
            contrast: DEFAULT_CONTRAST,
        }
    }
}

impl EnhancementSettings {
    pub fn color_controls(&self) -> ColorControls {
        ColorControls {
            saturation: self.saturation,
            contrast: self.contrast,
        }
    }
}

/// Frame source settings used by the replay CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Frame delivery rate
    pub max_fps: u32,
    /// Displayed preview size the ROI is expressed in
    pub preview: Size,
    /// Region of interest in preview coordinates, whole preview if unset
    pub roi: Option<Rect>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_fps: 30,
            preview: Size::new(390.0, 844.0),
            roi: None,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {:?}", path))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("parsing config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "ocr-consensus", "ocr-consensus")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}
