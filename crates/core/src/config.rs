use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::record::NumberingMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the Gaussian pass sits relative to binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlurPlacement {
    BeforeBinarize,
    #[default]
    AfterBinarize,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub blur: BlurPlacement,
    /// 1.1 is the sigma OpenCV derives for a 5×5 kernel.
    pub blur_sigma: f32,
    pub suppress_vertical_lines: bool,
    /// Off by default: many glyphs (E, F, T, Z…) contain horizontal strokes
    /// long enough to be taken for ruling and erased with it.
    pub suppress_horizontal_lines: bool,
    /// Length of the line structuring element in pixels.
    pub line_kernel_length: u32,
    /// Erode/dilate repetitions of the opening.
    pub open_iterations: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            blur: BlurPlacement::AfterBinarize,
            blur_sigma: 1.1,
            suppress_vertical_lines: true,
            suppress_horizontal_lines: false,
            line_kernel_length: 25,
            open_iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrEngine {
    /// Spawn the `tesseract` executable.
    #[default]
    Cli,
    /// Link libtesseract through leptess (`tesseract` feature).
    Leptess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub engine: OcrEngine,
    pub language: String,
    /// Tesseract `--psm`; 6 assumes a single uniform block of text.
    pub page_seg_mode: u8,
    /// Tesseract `--oem`; 3 lets the engine pick legacy and/or LSTM.
    pub engine_mode: u8,
    pub tessdata_dir: Option<PathBuf>,
    pub tesseract_bin: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: OcrEngine::Cli,
            language: "eng".to_string(),
            page_seg_mode: 6,
            engine_mode: 3,
            tessdata_dir: None,
            tesseract_bin: "tesseract".to_string(),
        }
    }
}

/// Which token of a line becomes the stage label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPolicy {
    /// Always the second token, even when it is a unit such as "km".
    #[default]
    SecondToken,
    /// Skip unit markers ("km", "mi", …) after the distance.
    /// Not yet validated against real boards, hence opt-in.
    SkipUnitMarkers,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub label_policy: LabelPolicy,
}

/// Everything one batch run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub output: PathBuf,
    pub numbering: NumberingMode,
    /// Images conditioned/recognized concurrently; 1 keeps the run sequential.
    pub workers: usize,
    pub debug_boxes_dir: Option<PathBuf>,
    pub transform: TransformConfig,
    pub ocr: OcrSettings,
    pub parser: ParserSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("raw_images"),
            processed_dir: PathBuf::from("processed_images"),
            output: PathBuf::from("routes.xlsx"),
            numbering: NumberingMode::Global,
            workers: 1,
            debug_boxes_dir: None,
            transform: TransformConfig::default(),
            ocr: OcrSettings::default(),
            parser: ParserSettings::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        let t = &self.transform;
        if t.blur != BlurPlacement::Disabled && !(t.blur_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "blur_sigma must be positive, got {}",
                t.blur_sigma
            )));
        }
        // Structuring elements are built as images; keep them within the
        // 511px a morphology mask can address.
        if !(1..=511).contains(&t.line_kernel_length) {
            return Err(ConfigError::Invalid(format!(
                "line_kernel_length must be in 1..=511, got {}",
                t.line_kernel_length
            )));
        }
        if t.open_iterations == 0 {
            return Err(ConfigError::Invalid("open_iterations must be at least 1".into()));
        }
        if self.ocr.page_seg_mode > 13 {
            return Err(ConfigError::Invalid(format!(
                "page_seg_mode must be 0..=13, got {}",
                self.ocr.page_seg_mode
            )));
        }
        if self.ocr.engine_mode > 3 {
            return Err(ConfigError::Invalid(format!(
                "engine_mode must be 0..=3, got {}",
                self.ocr.engine_mode
            )));
        }
        if self.ocr.language.trim().is_empty() {
            return Err(ConfigError::Invalid("language must not be empty".into()));
        }
        Ok(())
    }
}
