//! # voterroll-extract
//!
//! Extract structured voter records from scanned Hindi electoral-roll PDFs.
//!
//! ## Why this crate?
//!
//! Electoral rolls are published as image-only PDFs: every page is a scan
//! of a printed grid of voter entries with Devanagari labels (`नाम`, `उम्र`,
//! `मकान संख्या`, …). There is no text layer to read. This crate rasterises
//! each page, runs Tesseract with a Hindi + English hint, cuts the text into
//! one block per voter at noise-tolerant anchor lines, and pulls labelled
//! values out of each block with rule tables that know the usual OCR
//! misspellings. Records that lack a name or a plausible age are dropped
//! rather than emitted with suspect values.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input       %PDF signature check
//!  ├─ 2. Render      rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Preprocess  grayscale → Otsu → median
//!  ├─ 4. Recognize   Tesseract hin+eng, pages in parallel, rejoined in order
//!  ├─ 5. Segment     anchor lines → voter blocks (document-wide index)
//!  ├─ 6. Fields      label rules → raw (field, value) map
//!  └─ 7. Normalize   cleanup, age range check → VoterRecord
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voterroll_extract::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("roll.pdf")?;
//!     let output = extract(bytes, &ExtractionConfig::default()).await?;
//!     println!("{}", output.to_json()?);
//!     eprintln!(
//!         "{} records, {} blocks rejected",
//!         output.stats.accepted_records, output.stats.rejected_blocks
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `voterroll` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! voterroll-extract = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! The default engines need a pdfium shared library and a `tesseract`
//! binary with the `hin` language pack. Both can be replaced through
//! [`ExtractionConfig::rasterizer`] and [`ExtractionConfig::recognizer`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use error::{ExtractError, PageError, RejectReason, UnreadableReason};
pub use extract::{extract, extract_file, extract_records, extract_sync, extract_to_file};
pub use output::{ExtractionOutput, ExtractionStats, PageResult, Rejection, VoterRecord};
pub use pipeline::normalize::{MAX_AGE, MIN_AGE};
pub use pipeline::recognize::{RecognitionError, Recognizer, TesseractRecognizer};
pub use pipeline::render::{
    PageImage, PageSink, PdfiumRasterizer, RasterOptions, RasterizedDocument, Rasterizer,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
