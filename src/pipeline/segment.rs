//! Segmentation: recognised page lines → ordered voter blocks.
//!
//! A block starts at every anchor line and runs up to the next anchor on the
//! same page. Anchors are short, digit-heavy tokens that survive OCR far
//! better than Hindi labels:
//!
//! | Kind    | Shape                                              |
//! |---------|----------------------------------------------------|
//! | `Tag`   | optional serial number, then a voter-ID token      |
//! | `House` | house-number label (`मकान संख्या`) at line start   |
//!
//! The kinds are totally ordered, `Tag` before `House`. A line matching
//! both is a `Tag` anchor. Each page splits on the highest-precedence kind
//! that occurs on it: a layout that prints voter IDs splits on IDs only
//! (its house-number lines sit inside the entries), and a layout without
//! IDs falls back to house-number markers.
//!
//! Lines before a page's first anchor never form a block; they are kept as
//! that page's [`PageHeader`]. Block indices run across the whole document.

use crate::pipeline::fields::HOUSE_LABEL;
use crate::pipeline::recognize::RecognizedPage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Serial + voter-ID anchor. `serial` captures the printed entry number,
/// `value` the ID token.
///
/// Digit positions accept the Latin look-alikes OCR substitutes for digits
/// (`O`/`o`/`I`/`l`/`S`/`B`/`Z`), the same set
/// [`repair_digits`](crate::pipeline::normalize::repair_digits) maps back.
pub(crate) const TAG_ANCHOR_PATTERN: &str = r"^[\s|\[(]*(?:(?P<serial>[0-9०-९OoIlSBZ]{1,4})[\s|.)\]]+)?(?P<value>[A-Z][A-Z0-9]{1,3}[0-9OoIlSBZ]{6,8}|[A-Z]{2}/[0-9OoIlSBZ]{2,3}/[0-9OoIlSBZ]{3}/[0-9OoIlSBZ]{5,7})(?:$|[\s|])";

static TAG_ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(TAG_ANCHOR_PATTERN).unwrap());

static HOUSE_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^[\s|]*{}", HOUSE_LABEL)).unwrap());

/// Anchor kinds in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Tag,
    House,
}

impl AnchorKind {
    pub const PRECEDENCE: [AnchorKind; 2] = [AnchorKind::Tag, AnchorKind::House];

    fn pattern(self) -> &'static Regex {
        match self {
            AnchorKind::Tag => &TAG_ANCHOR,
            AnchorKind::House => &HOUSE_ANCHOR,
        }
    }
}

/// The highest-precedence anchor kind `line` matches, if any.
pub fn classify_line(line: &str) -> Option<AnchorKind> {
    AnchorKind::PRECEDENCE
        .into_iter()
        .find(|kind| kind.pattern().is_match(line))
}

/// Contiguous lines believed to be one voter entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterBlock {
    /// Position in the document; the output ordering key.
    pub index: usize,
    /// 1-indexed source page.
    pub page_num: usize,
    /// Kind of the anchor line that opened the block.
    pub anchor: AnchorKind,
    /// Anchor line first, then every line up to the next anchor.
    pub lines: Vec<String>,
}

impl VoterBlock {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Lines preceding the first anchor of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_num: usize,
    pub lines: Vec<String>,
}

/// All blocks of a document plus the per-page headers.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub blocks: Vec<VoterBlock>,
    pub headers: Vec<PageHeader>,
}

impl Segmentation {
    pub fn header_for(&self, page_num: usize) -> Option<&PageHeader> {
        self.headers.iter().find(|h| h.page_num == page_num)
    }

    pub fn blocks_on_page(&self, page_num: usize) -> usize {
        self.blocks.iter().filter(|b| b.page_num == page_num).count()
    }
}

/// Split document pages into voter blocks.
///
/// `pages` must already be in document order; block indices follow it.
pub fn segment(pages: &[RecognizedPage]) -> Segmentation {
    let mut out = Segmentation::default();

    for page in pages {
        let kinds: Vec<Option<AnchorKind>> =
            page.lines.iter().map(|l| classify_line(l)).collect();

        let Some(boundary) = kinds.iter().flatten().min().copied() else {
            debug!("Page {}: no anchors, contributes no blocks", page.page_num);
            if !page.lines.is_empty() {
                out.headers.push(PageHeader {
                    page_num: page.page_num,
                    lines: page.lines.clone(),
                });
            }
            continue;
        };

        let mut header = Vec::new();
        let mut current: Option<VoterBlock> = None;

        for (line, kind) in page.lines.iter().zip(&kinds) {
            if *kind == Some(boundary) {
                if let Some(done) = current.take() {
                    out.blocks.push(done);
                }
                current = Some(VoterBlock {
                    index: out.blocks.len(),
                    page_num: page.page_num,
                    anchor: boundary,
                    lines: vec![line.clone()],
                });
            } else if let Some(block) = current.as_mut() {
                block.lines.push(line.clone());
            } else {
                header.push(line.clone());
            }
        }
        if let Some(done) = current.take() {
            out.blocks.push(done);
        }

        debug!(
            "Page {}: {} blocks on {:?} anchors, {} header lines",
            page.page_num,
            out.blocks_on_page(page.page_num),
            boundary,
            header.len()
        );
        if !header.is_empty() {
            out.headers.push(PageHeader {
                page_num: page.page_num,
                lines: header,
            });
        }
    }

    out
}
