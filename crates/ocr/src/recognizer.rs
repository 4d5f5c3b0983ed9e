use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use stagetab_core::OcrSettings;
use thiserror::Error;

use crate::boxes::parse_box_text;
use crate::types::CharBox;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: {0}")]
    NotAvailable(String),
    #[error("{0} not supported by this OCR backend")]
    Unsupported(&'static str),
}

/// Abstraction over an OCR backend.
/// Implementations accept encoded image bytes (PNG/JPEG/…) and block until
/// the engine answers. Failures are not retried.
pub trait OcrBackend: Send + Sync {
    /// Recognized text, one line per row, for a uniform block of text.
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;

    /// Per-character boxes; only used for debug overlays.
    fn char_boxes(&self, _image_bytes: &[u8]) -> Result<Vec<CharBox>, OcrError> {
        Err(OcrError::Unsupported("character boxes"))
    }
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        (**self).recognize(image_bytes)
    }

    fn char_boxes(&self, image_bytes: &[u8]) -> Result<Vec<CharBox>, OcrError> {
        (**self).char_boxes(image_bytes)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set text and boxes, for testing the pipeline without
/// requiring Tesseract to be installed.
pub struct MockRecognizer {
    pub text: String,
    pub boxes: Vec<CharBox>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            boxes: Vec::new(),
        }
    }

    pub fn with_boxes(mut self, boxes: Vec<CharBox>) -> Self {
        self.boxes = boxes;
        self
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }

    fn char_boxes(&self, _image_bytes: &[u8]) -> Result<Vec<CharBox>, OcrError> {
        Ok(self.boxes.clone())
    }
}

// ── Tesseract executable backend ──────────────────────────────────────────────

/// Runs the `tesseract` binary, feeding the image on stdin and reading the
/// result from stdout.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    bin: String,
    language: String,
    page_seg_mode: u8,
    engine_mode: u8,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            bin: settings.tesseract_bin.clone(),
            language: settings.language.clone(),
            page_seg_mode: settings.page_seg_mode,
            engine_mode: settings.engine_mode,
            tessdata_dir: settings.tessdata_dir.clone(),
        }
    }

    /// Arguments before any trailing config names such as `makebox`.
    pub fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--oem".to_string(),
            self.engine_mode.to_string(),
            "--psm".to_string(),
            self.page_seg_mode.to_string(),
        ];
        if let Some(dir) = &self.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    fn run(&self, image_bytes: &[u8], configs: &[&str]) -> Result<String, OcrError> {
        let mut child = Command::new(&self.bin)
            .args(self.base_args())
            .args(configs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    OcrError::NotAvailable(format!("'{}' not found on PATH", self.bin))
                }
                _ => OcrError::Engine(e.to_string()),
            })?;

        // Feed stdin from a separate thread so a full stdout pipe cannot
        // deadlock against a half-written image.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Engine("tesseract stdin unavailable".into()))?;
        let data = image_bytes.to_vec();
        let feeder = std::thread::spawn(move || stdin.write_all(&data));

        let output = child
            .wait_with_output()
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(OcrError::ImageDecode(e.to_string())),
            Err(_) => return Err(OcrError::Engine("stdin writer panicked".into())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| OcrError::Engine(e.to_string()))
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        self.run(image_bytes, &[])
    }

    fn char_boxes(&self, image_bytes: &[u8]) -> Result<Vec<CharBox>, OcrError> {
        let text = self.run(image_bytes, &["makebox"])?;
        parse_box_text(&text)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use leptess::{LepTess, Variable};
    use stagetab_core::OcrSettings;

    /// In-process libtesseract. The engine mode is whatever the library
    /// initializes with (its default, 3); only the segmentation mode is set.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
        page_seg_mode: u8,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str, page_seg_mode: u8) -> Self {
            Self {
                data_path,
                lang: lang.to_string(),
                page_seg_mode,
            }
        }

        pub fn from_settings(settings: &OcrSettings) -> Self {
            Self::new(
                settings
                    .tessdata_dir
                    .as_ref()
                    .map(|p| p.display().to_string()),
                &settings.language,
                settings.page_seg_mode,
            )
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::NotAvailable(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &self.page_seg_mode.to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}

/// Build the backend named in the settings.
pub fn backend_for(settings: &OcrSettings) -> Result<Box<dyn OcrBackend>, OcrError> {
    match settings.engine {
        stagetab_core::OcrEngine::Cli => Ok(Box::new(TesseractCli::new(settings))),
        #[cfg(feature = "tesseract")]
        stagetab_core::OcrEngine::Leptess => Ok(Box::new(
            tesseract_backend::TesseractRecognizer::from_settings(settings),
        )),
        #[cfg(not(feature = "tesseract"))]
        stagetab_core::OcrEngine::Leptess => Err(OcrError::NotAvailable(
            "built without the `tesseract` feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("12 Col\n30 Pass");
        assert_eq!(r.recognize(b"fake image data").unwrap(), "12 Col\n30 Pass");
    }

    #[test]
    fn mock_ignores_image_content() {
        let r = MockRecognizer::new("hello");
        assert_eq!(r.recognize(b"anything").unwrap(), "hello");
        assert_eq!(r.recognize(b"").unwrap(), "hello");
    }

    #[test]
    fn boxed_backend_delegates() {
        let boxes = vec![CharBox {
            symbol: "1".into(),
            x1: 1,
            y1: 2,
            x2: 3,
            y2: 4,
            page: 0,
        }];
        let r: Box<dyn OcrBackend> = Box::new(MockRecognizer::new("x").with_boxes(boxes.clone()));
        assert_eq!(r.recognize(b"").unwrap(), "x");
        assert_eq!(r.char_boxes(b"").unwrap(), boxes);
    }

    #[test]
    fn boxes_unsupported_by_default() {
        struct TextOnly;
        impl OcrBackend for TextOnly {
            fn recognize(&self, _: &[u8]) -> Result<String, OcrError> {
                Ok(String::new())
            }
        }
        assert!(matches!(TextOnly.char_boxes(b""), Err(OcrError::Unsupported(_))));
    }

    #[test]
    fn cli_args_follow_settings() {
        let settings = OcrSettings {
            language: "fra".into(),
            page_seg_mode: 6,
            engine_mode: 3,
            tessdata_dir: Some(PathBuf::from("/opt/tessdata")),
            ..OcrSettings::default()
        };
        let args = TesseractCli::new(&settings).base_args();
        assert_eq!(
            args,
            vec![
                "stdin", "stdout", "-l", "fra", "--oem", "3", "--psm", "6",
                "--tessdata-dir", "/opt/tessdata",
            ]
        );
    }

    #[test]
    fn missing_binary_is_not_available() {
        let settings = OcrSettings {
            tesseract_bin: "stagetab-no-such-tesseract-binary".into(),
            ..OcrSettings::default()
        };
        let err = TesseractCli::new(&settings).recognize(b"").unwrap_err();
        assert!(matches!(err, OcrError::NotAvailable(_)));
    }
}
