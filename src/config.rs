//! Configuration types for voter-roll extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct holds every knob so a
//! config can be cloned into blocking tasks and logged as a whole.
//!
//! The rule tables and the accepted age range are not configurable: they are
//! part of the extraction contract, and two runs with the same config over
//! the same bytes must produce the same records.

use crate::error::ExtractError;
use crate::pipeline::recognize::Recognizer;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one voter-roll extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use voterroll_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .concurrency(8)
///     .languages("hin+eng")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 400.
    ///
    /// Devanagari matras and the dots of nukta forms are a few pixels tall;
    /// below ~300 DPI Tesseract starts dropping them, which corrupts labels.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 6000.
    ///
    /// Caps either dimension independent of DPI so an oversized page cannot
    /// exhaust memory. A4 at 400 DPI is 3308 × 4677 px and fits.
    pub max_rendered_pixels: u32,

    /// Number of pages recognised in parallel. Default: 4.
    ///
    /// Each page runs one OCR engine process; pages share no state until the
    /// join point before segmentation.
    pub concurrency: usize,

    /// Tesseract language hint. Default: `hin+eng`.
    ///
    /// Hindi for names and labels, English for voter-ID tokens.
    pub languages: String,

    /// Path or name of the Tesseract binary. Default: `tesseract`.
    pub tesseract_path: PathBuf,

    /// Optional Tesseract page segmentation mode (`--psm`). Default: engine default.
    pub page_segmentation_mode: Option<u8>,

    /// Binarise page images (gray → Otsu → median) before recognition. Default: true.
    pub preprocess: bool,

    /// Fill missing section/polling-station pairs from the page header. Default: true.
    ///
    /// Roll pages print the section and constituency once at the top; entries
    /// below it belong to that section. Only complete pairs are inherited.
    pub inherit_page_header: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Directory containing the pdfium shared library. Default: system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Pre-constructed rasterizer. Takes precedence over the pdfium default.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Pre-constructed recognizer. Takes precedence over the Tesseract default.
    pub recognizer: Option<Arc<dyn Recognizer>>,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 400,
            max_rendered_pixels: 6000,
            concurrency: 4,
            languages: "hin+eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            page_segmentation_mode: None,
            preprocess: true,
            inherit_page_header: true,
            password: None,
            pages: PageSelection::default(),
            pdfium_library_path: None,
            rasterizer: None,
            recognizer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("languages", &self.languages)
            .field("tesseract_path", &self.tesseract_path)
            .field("page_segmentation_mode", &self.page_segmentation_mode)
            .field("preprocess", &self.preprocess)
            .field("inherit_page_header", &self.inherit_page_header)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field("recognizer", &self.recognizer.as_ref().map(|_| "<dyn Recognizer>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn languages(mut self, languages: impl Into<String>) -> Self {
        self.config.languages = languages.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn page_segmentation_mode(mut self, psm: u8) -> Self {
        self.config.page_segmentation_mode = Some(psm);
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.config.preprocess = v;
        self
    }

    pub fn inherit_page_header(mut self, v: bool) -> Self {
        self.config.inherit_page_header = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn pdfium_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(dir.into());
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.config.recognizer = Some(recognizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.languages.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Recognition languages must not be empty".into(),
            ));
        }
        if let Some(psm) = c.page_segmentation_mode {
            if psm > 13 {
                return Err(ExtractError::InvalidConfig(format!(
                    "Page segmentation mode must be 0–13, got {}",
                    psm
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to process.
///
/// Whatever the selection, records are always emitted in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// First page the selection asks for, used in out-of-range reports.
    pub fn first_requested(&self) -> usize {
        match self {
            PageSelection::All => 1,
            PageSelection::Single(p) => *p,
            PageSelection::Range(start, _) => *start,
            PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
        }
    }
}

/// Parses `all`, `5`, `3-15`, `1,3,5` and mixed lists such as `1-3,7`.
impl FromStr for PageSelection {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }

        let mut parts = spec
            .split(',')
            .map(str::trim)
            .map(parse_page_part)
            .collect::<Result<Vec<_>, _>>()?;

        if parts.len() == 1 {
            return Ok(match parts.remove(0) {
                (start, end) if start == end => PageSelection::Single(start),
                (start, end) => PageSelection::Range(start, end),
            });
        }
        Ok(PageSelection::Set(
            parts.into_iter().flat_map(|(start, end)| start..=end).collect(),
        ))
    }
}

/// One comma-separated item: `n` or `a-b`, 1-indexed, as an inclusive span.
fn parse_page_part(part: &str) -> Result<(usize, usize), ExtractError> {
    let invalid = |why: String| ExtractError::InvalidConfig(format!("page selection: {why}"));
    let number = |t: &str| {
        t.trim()
            .parse::<usize>()
            .map_err(|_| invalid(format!("'{}' is not a page number", t.trim())))
    };

    let (start, end) = match part.split_once('-') {
        Some((a, b)) => (number(a)?, number(b)?),
        None => {
            let n = number(part)?;
            (n, n)
        }
    };
    if start == 0 {
        return Err(invalid("pages are 1-indexed".into()));
    }
    if start > end {
        return Err(invalid(format!("range {start}-{end} runs backwards")));
    }
    Ok((start, end))
}
