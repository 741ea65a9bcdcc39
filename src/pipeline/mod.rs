//! Pipeline stages for voter-roll extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable, and lets the two
//! engine-backed stages (render, recognize) be swapped behind traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ preprocess ──▶ recognize ──▶ segment ──▶ fields ──▶ normalize
//! (bytes)   (pdfium)   (otsu)         (tesseract)   (anchors)   (rules)    (validate)
//! ```
//!
//! 1. [`input`] : check the `%PDF` signature, load local files
//! 2. [`render`] : rasterise selected pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`preprocess`] : grayscale, binarise and denoise each page bitmap
//! 4. [`recognize`] : OCR each page into ordered text lines; pages run
//!    concurrently and rejoin in page order before the next stage
//! 5. [`segment`] : split the document's lines into voter blocks at anchor
//!    lines, numbering blocks across the whole document
//! 6. [`fields`] : apply the label rule tables to each block
//! 7. [`normalize`] : clean values, repair digit glyphs, validate name and
//!    age, keep paired fields whole

pub mod fields;
pub mod input;
pub mod normalize;
pub mod preprocess;
pub mod recognize;
pub mod render;
pub mod segment;
