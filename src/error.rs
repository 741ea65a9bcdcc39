//! Error types for the voterroll-extract library.
//!
//! Three tiers of failure exist, and only the first one ever aborts an
//! extraction:
//!
//! * [`ExtractError`] : **Fatal**: no voter can be extracted at all (the
//!   bytes are not a PDF, the PDF is encrypted, pdfium cannot be bound).
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] : **Non-fatal**: one page could not be rasterised or
//!   recognised. Stored inside [`crate::output::PageResult`]; the page
//!   contributes no text and the remaining pages carry on.
//!
//! * [`RejectReason`] : **Non-fatal**: one voter block was segmented but
//!   failed the minimum-viable-record check. Kept in the rejection log of
//!   [`crate::output::ExtractionOutput`] with its block index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the voterroll-extract library.
///
/// Page-level failures use [`PageError`] and block-level failures use
/// [`RejectReason`]; neither is ever propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The submitted bytes cannot yield a single page image.
    #[error("Document could not be read: {reason}")]
    DocumentUnreadable { reason: UnreadableReason },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Page selection matched none of the document's pages.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point to an existing copy with\n\
  --pdfium-lib /path/to/dir  (or VOTERROLL_PDFIUM_LIB)\n"
    )]
    RasterizerUnavailable(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Shorthand for building a [`ExtractError::DocumentUnreadable`].
    pub fn unreadable(reason: UnreadableReason) -> Self {
        ExtractError::DocumentUnreadable { reason }
    }

    /// True when the failure is about the submitted document itself.
    pub fn is_document_unreadable(&self) -> bool {
        matches!(self, ExtractError::DocumentUnreadable { .. })
    }
}

/// Why a document produced no pages at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreadableReason {
    /// The byte stream does not start with the `%PDF` signature.
    NotAPdf { magic: Vec<u8> },
    /// Header, trailer or xref table is damaged beyond what pdfium accepts.
    Corrupt { detail: String },
    /// The PDF is encrypted and no password was supplied.
    PasswordRequired,
    /// A password was supplied but pdfium rejected it.
    WrongPassword,
    /// The PDF parsed but contains zero pages.
    NoPages,
    /// Every selected page failed to rasterise.
    NoRenderablePages { total: usize },
}

impl fmt::Display for UnreadableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreadableReason::NotAPdf { magic } => {
                write!(f, "not a PDF (first bytes: {:?})", magic)
            }
            UnreadableReason::Corrupt { detail } => write!(f, "corrupt PDF: {}", detail),
            UnreadableReason::PasswordRequired => {
                write!(f, "PDF is encrypted and requires a password")
            }
            UnreadableReason::WrongPassword => write!(f, "wrong password for encrypted PDF"),
            UnreadableReason::NoPages => write!(f, "PDF contains no pages"),
            UnreadableReason::NoRenderablePages { total } => {
                write!(f, "none of the {} selected pages could be rasterised", total)
            }
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page fails.
/// The page contributes no text; extraction continues with the others.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The OCR engine could not process the page image.
    #[error("Page {page}: recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::RecognitionFailed { page, .. } => {
                *page
            }
        }
    }
}

/// Why a voter block was dropped by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("no elector name recognised")]
    MissingName,

    #[error("no age recognised")]
    MissingAge,

    /// The age text still contained non-digits after glyph repair.
    #[error("age '{raw}' is not numeric")]
    UnparsableAge { raw: String },

    #[error("age {age} outside the accepted range")]
    AgeOutOfRange { age: u32 },
}
