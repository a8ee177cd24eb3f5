//! Configuration schemas and their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::compositor::DEFAULT_JPEG_QUALITY;
use crate::controller::SectionType;
use crate::error::{CaptureError, CaptureResult};
use crate::geometry::Margins;
use crate::selection::DEFAULT_DRAG_THRESHOLD;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    /// Reject values the capture engine cannot work with
    pub fn validate(&self) -> CaptureResult<()> {
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(CaptureError::Config {
                message: format!(
                    "capture.jpeg_quality must be between 1 and 100, got {}",
                    self.capture.jpeg_quality
                ),
            });
        }
        if !(self.render.min_scale > 0.0 && self.render.min_scale <= self.render.max_scale) {
            return Err(CaptureError::Config {
                message: format!(
                    "render scale bounds {}..{} are invalid",
                    self.render.min_scale, self.render.max_scale
                ),
            });
        }
        if self.render.scale_step <= 0.0 {
            return Err(CaptureError::Config {
                message: format!("render.scale_step must be positive, got {}", self.render.scale_step),
            });
        }
        Ok(())
    }
}

/// Section type as written in configuration files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionTypeSetting {
    Instruction,
    #[default]
    Question,
    Case,
}

/// Capture settings exposed to the UI layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub section_type: SectionTypeSetting,

    /// Linked questions per case group; required when `section_type` is `case`
    #[serde(default)]
    pub case_question_count: u32,

    #[serde(default)]
    pub margins: Margins,

    /// Drags shorter than this (in pixels) are discarded
    #[serde(default = "default_drag_threshold")]
    pub drag_threshold_px: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl CaptureConfig {
    /// Validated section type
    pub fn section_type(&self) -> CaptureResult<SectionType> {
        match self.section_type {
            SectionTypeSetting::Instruction => Ok(SectionType::Instruction),
            SectionTypeSetting::Question => Ok(SectionType::Question),
            SectionTypeSetting::Case if self.case_question_count < 1 => {
                Err(CaptureError::invalid_configuration(
                    "case_question_count must be at least 1 for case sections",
                ))
            }
            SectionTypeSetting::Case => Ok(SectionType::Case {
                question_count: self.case_question_count,
            }),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            section_type: SectionTypeSetting::default(),
            case_question_count: 0,
            margins: Margins::default(),
            drag_threshold_px: default_drag_threshold(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Page rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_scale")]
    pub scale: f32,

    #[serde(default = "default_min_scale")]
    pub min_scale: f32,

    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    /// Zoom in/out increment
    #[serde(default = "default_scale_step")]
    pub scale_step: f32,
}

impl RenderConfig {
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            scale_step: default_scale_step(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Save every captured section to the local screenshot store
    #[serde(default)]
    pub persist_captures: bool,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("pagecut.db")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist_captures: false,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_drag_threshold() -> u32 {
    DEFAULT_DRAG_THRESHOLD
}

pub(crate) fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

pub(crate) fn default_scale() -> f32 {
    1.5
}

pub(crate) fn default_min_scale() -> f32 {
    0.5
}

pub(crate) fn default_max_scale() -> f32 {
    3.0
}

pub(crate) fn default_scale_step() -> f32 {
    0.25
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_output_dir() -> PathBuf {
    PathBuf::from("./export")
}
