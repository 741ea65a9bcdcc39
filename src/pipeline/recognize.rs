//! Text recognition: page bitmap → ordered text lines.
//!
//! [`Recognizer`] is the seam to the OCR engine. No semantic interpretation
//! happens here: the output is the engine's reading order, cleaned of
//! transport artefacts (CR line endings, trailing blanks, invisible
//! characters) and split into non-empty lines.
//!
//! The default [`TesseractRecognizer`] shells out to the `tesseract` binary
//! with a `hin+eng` language hint. The page image is written into a
//! [`TempDir`] that is removed when the call returns, on success or failure.

use crate::config::ExtractionConfig;
use crate::pipeline::render::PageImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Engine-level recognition failure, reported per page.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recognised text for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Non-empty lines in reading order.
    pub lines: Vec<String>,
}

impl RecognizedPage {
    /// Build a page from raw engine output.
    pub fn from_raw(page_num: usize, raw: &str) -> Self {
        Self {
            page_num,
            lines: clean_lines(raw),
        }
    }
}

/// Runs script-aware OCR over a page image.
///
/// Implementations must be `Send + Sync`: pages are recognised concurrently
/// from blocking tasks.
pub trait Recognizer: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Core OCR: raw text for one page image.
    fn recognize_text(&self, page: &PageImage) -> Result<String, RecognitionError>;

    /// Recognise a page and split it into cleaned lines.
    fn recognize(&self, page: &PageImage) -> Result<RecognizedPage, RecognitionError> {
        let raw = self.recognize_text(page)?;
        let recognized = RecognizedPage::from_raw(page.page_num, &raw);
        debug!(
            "Page {}: {} recognised {} lines",
            page.page_num,
            self.name(),
            recognized.lines.len()
        );
        Ok(recognized)
    }
}

/// Tesseract OCR via its command-line binary.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    languages: String,
    psm: Option<u8>,
    dpi: u32,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl TesseractRecognizer {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            languages: config.languages.clone(),
            psm: config.page_segmentation_mode,
            dpi: config.dpi,
        }
    }

    /// Command-line arguments after the input image path.
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "stdout".to_string(),
            "-l".to_string(),
            self.languages.clone(),
            "--dpi".to_string(),
            self.dpi.to_string(),
        ];
        if let Some(psm) = self.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        args
    }
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize_text(&self, page: &PageImage) -> Result<String, RecognitionError> {
        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join(format!("page-{:04}.png", page.page_num));
        page.image
            .save_with_format(&image_path, image::ImageFormat::Png)
            .map_err(|e| RecognitionError::Image(e.to_string()))?;

        let output = Command::new(&self.binary)
            .arg(&image_path)
            .args(self.args())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(RecognitionError::EngineFailed(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecognitionError::EngineUnavailable(format!(
                    "'{}' not found (install tesseract-ocr with the hin language pack)",
                    self.binary.display()
                )))
            }
            Err(e) => Err(RecognitionError::Io(e)),
        }
    }
}

// ── Text cleanup ─────────────────────────────────────────────────────────────

/// Normalise raw engine output and return its non-empty lines.
///
/// ZWJ and ZWNJ are kept: in Devanagari they select half-forms and are part
/// of the spelling.
pub fn clean_lines(raw: &str) -> Vec<String> {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    s.lines()
        .map(|line| line.trim_end())
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace(['\r', '\u{000C}'], "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}
