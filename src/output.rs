//! Output types returned by the extraction entry points.
//!
//! [`VoterRecord`] is the interchange shape consumed by export: one flat
//! object per voter, optional attributes omitted entirely when not
//! recognised. Everything else here is diagnostics around it.

use crate::error::{PageError, RejectReason};
use serde::{Deserialize, Serialize};

/// One validated voter entry.
///
/// `name` and `age` are always present. Section number/name and
/// polling-station number/name are each all-or-nothing pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub name: String,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouse_or_parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_station_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_station_name: Option<String>,
}

impl VoterRecord {
    /// A record with only the required attributes set.
    pub fn new(name: impl Into<String>, age: u32) -> Self {
        Self {
            name: name.into(),
            age,
            house_number: None,
            spouse_or_parent_name: None,
            gender: None,
            tag_number: None,
            voter_surname: None,
            surname: None,
            section_number: None,
            section_name: None,
            polling_station_number: None,
            polling_station_name: None,
        }
    }
}

/// A block the validator refused, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Document-wide block index (0-based).
    pub block_index: usize,
    /// 1-indexed page the block came from.
    pub page_num: usize,
    pub reason: RejectReason,
}

/// Per-page outcome of rasterisation, recognition and segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Non-empty text lines the recognizer produced.
    pub line_count: usize,
    /// Voter blocks segmented from this page.
    pub block_count: usize,
    /// Blocks on this page that became records.
    pub record_count: usize,
    /// Wall-clock time spent preprocessing and recognising the page.
    pub duration_ms: u64,
    /// Set when the page contributed no text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

/// Aggregate counters for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages selected and attempted.
    pub selected_pages: usize,
    /// Pages that produced text.
    pub recognized_pages: usize,
    /// Pages that failed to render or recognise.
    pub failed_pages: usize,
    pub total_blocks: usize,
    pub accepted_records: usize,
    pub rejected_blocks: usize,
    pub render_duration_ms: u64,
    pub recognition_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything one extraction produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Accepted voters in document order.
    pub records: Vec<VoterRecord>,
    /// One entry per attempted page, sorted by page number.
    pub pages: Vec<PageResult>,
    /// Blocks dropped by the validator, in block order.
    pub rejections: Vec<Rejection>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Serialise the record sequence as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }

    /// Pages that failed, with their errors.
    pub fn page_errors(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|p| p.error.as_ref())
    }
}
