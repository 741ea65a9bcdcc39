//! End-to-end pipeline tests with scripted engines.
//!
//! The rasterizer and recognizer are replaced by fakes, so these run without
//! pdfium or Tesseract installed. Everything from the join point onward
//! (segmentation, field rules, validation, ordering) is the real code.

use image::{DynamicImage, GrayImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voterroll_extract::pipeline::input::Document;
use voterroll_extract::{
    extract, extract_records, extract_sync, extract_to_file, ExtractError, ExtractionConfig,
    ExtractionConfigBuilder, ExtractionProgressCallback, PageError, PageImage, PageSelection,
    PageSink, RasterOptions, Rasterizer, RecognitionError, Recognizer, RejectReason,
    UnreadableReason, VoterRecord,
};

const PDF: &[u8] = b"%PDF-1.7\n% scripted test document\n";

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Page bitmaps currently alive between rendering and recognition.
#[derive(Default)]
struct LiveGauge {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveGauge {
    fn enter(&self) {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct FakeRasterizer {
    page_count: usize,
    broken: Vec<usize>,
    locked: bool,
    gauge: Option<Arc<LiveGauge>>,
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(
        &self,
        _document: &Document,
        options: &RasterOptions,
        sink: &mut dyn PageSink,
    ) -> Result<(), ExtractError> {
        if self.locked {
            return Err(ExtractError::unreadable(UnreadableReason::PasswordRequired));
        }
        let indices = options.pages.to_indices(self.page_count);
        sink.begin(self.page_count, indices.len());
        for idx in indices {
            if !sink.ready() {
                break;
            }
            let page_num = idx + 1;
            let page = if self.broken.contains(&page_num) {
                Err(PageError::RenderFailed {
                    page: page_num,
                    detail: "broken content stream".into(),
                })
            } else {
                if let Some(ref gauge) = self.gauge {
                    gauge.enter();
                }
                Ok(PageImage {
                    page_num,
                    image: DynamicImage::ImageLuma8(GrayImage::new(8, 8)),
                })
            };
            if !sink.page(page) {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedRecognizer {
    text: HashMap<usize, String>,
    failing: Vec<usize>,
    slow: Vec<usize>,
    gauge: Option<Arc<LiveGauge>>,
}

impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize_text(&self, page: &PageImage) -> Result<String, RecognitionError> {
        if self.slow.contains(&page.page_num) {
            std::thread::sleep(Duration::from_millis(60));
        }
        if let Some(ref gauge) = self.gauge {
            gauge.leave();
        }
        if self.failing.contains(&page.page_num) {
            return Err(RecognitionError::EngineFailed("tesseract exited with 1".into()));
        }
        Ok(self.text.get(&page.page_num).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RecordingCallback {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ExtractionProgressCallback for RecordingCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.push(format!("start {total_pages}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, _lines: usize) {
        self.push(format!("ok {page_num}"));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.push(format!("err {page_num}"));
    }
    fn on_extraction_complete(&self, _total_pages: usize, record_count: usize) {
        self.push(format!("done {record_count}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn entry(serial: usize, name: &str, age: &str) -> String {
    format!(
        "{serial} ABC{serial:07}\n\
         निर्वाचक का नाम : {name}\n\
         पिता का नाम : रमेश चंद\n\
         मकान संख्या : {serial}\n\
         उम्र : {age} लिंग : पुरुष\n"
    )
}

fn scripted(pages: &[&str]) -> ScriptedRecognizer {
    ScriptedRecognizer {
        text: pages
            .iter()
            .enumerate()
            .map(|(i, t)| (i + 1, t.to_string()))
            .collect(),
        ..Default::default()
    }
}

fn builder(page_count: usize, recognizer: ScriptedRecognizer) -> ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .rasterizer(Arc::new(FakeRasterizer {
            page_count,
            ..Default::default()
        }))
        .recognizer(Arc::new(recognizer))
}

fn config_for(pages: &[&str]) -> ExtractionConfig {
    builder(pages.len(), scripted(pages)).build().unwrap()
}

fn names(records: &[VoterRecord]) -> Vec<&str> {
    records.iter().map(|r| r.name.as_str()).collect()
}

// ── Contract properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn single_anchor_yields_one_record() {
    let page = format!("मतदाता सूची\n{}", entry(1, "राम कुमार", "42"));
    let out = extract(PDF, &config_for(&[&page])).await.unwrap();

    assert_eq!(out.records.len(), 1);
    let r = &out.records[0];
    assert_eq!(r.name, "राम कुमार");
    assert_eq!(r.age, 42);
    assert_eq!(r.spouse_or_parent_name.as_deref(), Some("रमेश चंद"));
    assert_eq!(r.house_number.as_deref(), Some("1"));
    assert_eq!(r.gender.as_deref(), Some("पुरुष"));
    assert_eq!(r.tag_number.as_deref(), Some("1 ABC0000001"));
    assert!(out.rejections.is_empty());
}

#[tokio::test]
async fn n_blocks_keep_document_order() {
    let page1 = [entry(1, "अ", "30"), entry(2, "ब", "31"), entry(3, "स", "32")].concat();
    let page2 = [entry(4, "द", "33"), entry(5, "ए", "34")].concat();
    // Page 1 finishes last; order must still follow the document.
    let recognizer = ScriptedRecognizer {
        slow: vec![1],
        ..scripted(&[&page1, &page2])
    };
    let config = builder(2, recognizer).concurrency(2).build().unwrap();

    let out = extract(PDF, &config).await.unwrap();
    assert_eq!(names(&out.records), vec!["अ", "ब", "स", "द", "ए"]);
    assert_eq!(out.stats.total_blocks, 5);
    assert_eq!(
        out.pages.iter().map(|p| p.page_num).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(out.pages[0].record_count, 3);
    assert_eq!(out.pages[1].block_count, 2);
}

#[tokio::test]
async fn extraction_is_deterministic() {
    let page1 = [entry(1, "राम", "40"), entry(2, "सीता", "16")].concat();
    let page2 = entry(3, "गीता", "55");
    let config = config_for(&[&page1, &page2]);

    let first = extract(PDF, &config).await.unwrap();
    let second = extract(PDF, &config).await.unwrap();
    assert_eq!(first.records, second.records);
    assert_eq!(first.rejections, second.rejections);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[tokio::test]
async fn age_range_is_inclusive_at_both_ends() {
    let page = [
        entry(1, "सत्रह", "17"),
        entry(2, "अठारह", "18"),
        entry(3, "एक सौ बीस", "120"),
        entry(4, "एक सौ इक्कीस", "121"),
    ]
    .concat();
    let out = extract(PDF, &config_for(&[&page])).await.unwrap();

    assert_eq!(out.records.iter().map(|r| r.age).collect::<Vec<_>>(), vec![18, 120]);
    let rejected: Vec<(usize, &RejectReason)> = out
        .rejections
        .iter()
        .map(|r| (r.block_index, &r.reason))
        .collect();
    assert_eq!(
        rejected,
        vec![
            (0, &RejectReason::AgeOutOfRange { age: 17 }),
            (3, &RejectReason::AgeOutOfRange { age: 121 }),
        ]
    );
}

#[tokio::test]
async fn half_section_pair_yields_neither_field() {
    let page = format!(
        "{}अनुभाग संख्या एवं नाम : 4\n",
        entry(1, "राम", "40")
    );
    let out = extract(PDF, &config_for(&[&page])).await.unwrap();
    let r = &out.records[0];
    assert_eq!(r.section_number, None);
    assert_eq!(r.section_name, None);

    let json = serde_json::to_value(r).unwrap();
    assert!(json.get("section_number").is_none());
    assert!(json.get("section_name").is_none());
}

#[tokio::test]
async fn non_pdf_is_document_unreadable() {
    let err = extract(b"PK\x03\x04 not a pdf".to_vec(), &config_for(&["1 ABC0000001"]))
        .await
        .unwrap_err();
    assert!(err.is_document_unreadable(), "got {err:?}");
    assert!(matches!(
        err,
        ExtractError::DocumentUnreadable {
            reason: UnreadableReason::NotAPdf { .. }
        }
    ));
}

#[tokio::test]
async fn two_page_scenario_drops_block_missing_age() {
    let valid_1 = entry(1, "राम कुमार", "45");
    let no_age = "2 ABC0000002\nनिर्वाचक का नाम : सीता देवी\nलिंग : महिला\n";
    let valid_2 = entry(3, "मोहन लाल", "60");
    let page1 = format!("{valid_1}{no_age}");

    let out = extract(PDF, &config_for(&[&page1, &valid_2])).await.unwrap();

    assert_eq!(names(&out.records), vec!["राम कुमार", "मोहन लाल"]);
    assert_eq!(out.rejections.len(), 1);
    assert_eq!(out.rejections[0].block_index, 1);
    assert_eq!(out.rejections[0].page_num, 1);
    assert_eq!(out.rejections[0].reason, RejectReason::MissingAge);
    assert_eq!(out.stats.accepted_records, 2);
    assert_eq!(out.stats.rejected_blocks, 1);
}

#[tokio::test]
async fn misread_serial_still_starts_a_voter() {
    let page = "7 ABC1234567\nनाम राम\nउम्र 40\nB ABC7654321\nनाम सीता\nउम्र 38";
    let out = extract(PDF, &config_for(&[page])).await.unwrap();

    let got: Vec<(&str, u32)> = out.records.iter().map(|r| (r.name.as_str(), r.age)).collect();
    assert_eq!(got, vec![("राम", 40), ("सीता", 38)]);
    assert_eq!(out.stats.total_blocks, 2);
    assert_eq!(out.records[0].tag_number.as_deref(), Some("7 ABC1234567"));
    assert_eq!(out.records[1].tag_number.as_deref(), Some("8 ABC7654321"));
}

// ── Degradation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn recognition_failure_skips_only_that_page() {
    let pages = [entry(1, "अ", "30"), entry(2, "ब", "31"), entry(3, "स", "32")];
    let recognizer = ScriptedRecognizer {
        failing: vec![2],
        ..scripted(&[&pages[0], &pages[1], &pages[2]])
    };
    let out = extract(PDF, &builder(3, recognizer).build().unwrap())
        .await
        .unwrap();

    assert_eq!(names(&out.records), vec!["अ", "स"]);
    assert_eq!(out.stats.failed_pages, 1);
    assert_eq!(out.stats.recognized_pages, 2);
    assert!(matches!(
        out.pages[1].error,
        Some(PageError::RecognitionFailed { page: 2, .. })
    ));
    assert_eq!(out.page_errors().count(), 1);
}

#[tokio::test]
async fn render_failure_on_some_pages_is_not_fatal() {
    let config = ExtractionConfig::builder()
        .rasterizer(Arc::new(FakeRasterizer {
            page_count: 2,
            broken: vec![1],
            ..Default::default()
        }))
        .recognizer(Arc::new(scripted(&["", &entry(1, "राम", "40")])))
        .build()
        .unwrap();
    let out = extract(PDF, &config).await.unwrap();
    assert_eq!(names(&out.records), vec!["राम"]);
    assert!(matches!(
        out.pages[0].error,
        Some(PageError::RenderFailed { page: 1, .. })
    ));
}

#[tokio::test]
async fn no_renderable_page_is_fatal() {
    let config = ExtractionConfig::builder()
        .rasterizer(Arc::new(FakeRasterizer {
            page_count: 2,
            broken: vec![1, 2],
            ..Default::default()
        }))
        .recognizer(Arc::new(ScriptedRecognizer::default()))
        .build()
        .unwrap();
    let err = extract(PDF, &config).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::DocumentUnreadable {
            reason: UnreadableReason::NoRenderablePages { total: 2 }
        }
    ));
}

#[tokio::test]
async fn zero_page_document_is_fatal() {
    let config = builder(0, ScriptedRecognizer::default()).build().unwrap();
    let err = extract(PDF, &config).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::DocumentUnreadable {
            reason: UnreadableReason::NoPages
        }
    ));
}

#[tokio::test]
async fn rasterizer_refusal_is_fatal() {
    let config = ExtractionConfig::builder()
        .rasterizer(Arc::new(FakeRasterizer {
            page_count: 3,
            locked: true,
            ..Default::default()
        }))
        .recognizer(Arc::new(ScriptedRecognizer::default()))
        .build()
        .unwrap();
    let err = extract(PDF, &config).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::DocumentUnreadable {
            reason: UnreadableReason::PasswordRequired
        }
    ));
}

#[tokio::test]
async fn pages_without_anchors_contribute_nothing() {
    let out = extract(
        PDF,
        &config_for(&["मुख पृष्ठ\nभाग संख्या 12", "", &entry(1, "राम", "40")]),
    )
    .await
    .unwrap();
    assert_eq!(names(&out.records), vec!["राम"]);
    assert_eq!(out.pages[0].block_count, 0);
    assert!(out.pages[0].error.is_none());
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_bitmaps_are_bounded_by_concurrency() {
    let gauge = Arc::new(LiveGauge::default());
    let texts: Vec<String> = (1..=8).map(|n| entry(n, "राम", "40")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let recognizer = ScriptedRecognizer {
        slow: (1..=8).collect(),
        gauge: Some(gauge.clone()),
        ..scripted(&refs)
    };
    let config = ExtractionConfig::builder()
        .rasterizer(Arc::new(FakeRasterizer {
            page_count: 8,
            gauge: Some(gauge.clone()),
            ..Default::default()
        }))
        .recognizer(Arc::new(recognizer))
        .concurrency(2)
        .build()
        .unwrap();

    let out = extract(PDF, &config).await.unwrap();
    assert_eq!(out.records.len(), 8);
    assert!(gauge.peak() >= 1);
    assert!(gauge.peak() <= 2, "peak of {} live pages", gauge.peak());
}

#[tokio::test]
async fn concurrent_documents_stay_independent() {
    let roll_a = [entry(1, "अ", "30"), entry(2, "ब", "31")].concat();
    let roll_b = [entry(1, "क", "50"), entry(2, "ख", "16"), entry(3, "ग", "52")].concat();
    let config_a = builder(
        2,
        ScriptedRecognizer {
            slow: vec![1],
            ..scripted(&[&roll_a, &entry(3, "स", "32")])
        },
    )
    .build()
    .unwrap();
    let config_b = config_for(&[&roll_b]);

    let (a, b) = tokio::join!(extract(PDF, &config_a), extract(PDF, &config_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(names(&a.records), vec!["अ", "ब", "स"]);
    assert!(a.rejections.is_empty());
    assert_eq!(names(&b.records), vec!["क", "ग"]);
    assert_eq!(b.rejections.len(), 1);
    assert_eq!(b.rejections[0].block_index, 1);

    let alone = extract(PDF, &config_b).await.unwrap();
    assert_eq!(alone.records, b.records);
}

// ── Configuration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn page_selection_limits_pages() {
    let pages = [entry(1, "अ", "30"), entry(2, "ब", "31"), entry(3, "स", "32")];
    let config = builder(3, scripted(&[&pages[0], &pages[1], &pages[2]]))
        .pages(PageSelection::Set(vec![3, 1]))
        .build()
        .unwrap();
    let out = extract(PDF, &config).await.unwrap();
    assert_eq!(names(&out.records), vec!["अ", "स"]);
    assert_eq!(out.stats.selected_pages, 2);
    assert_eq!(out.stats.total_pages, 3);
}

#[tokio::test]
async fn selection_past_the_end_is_out_of_range() {
    let config = builder(2, scripted(&["", ""]))
        .pages(PageSelection::Single(9))
        .build()
        .unwrap();
    let err = extract(PDF, &config).await.unwrap_err();
    assert!(matches!(err, ExtractError::PageOutOfRange { page: 9, total: 2 }));
}

#[tokio::test]
async fn page_header_pairs_are_inherited() {
    let page = format!(
        "अनुभाग संख्या एवं नाम : 3-रामपुर उत्तर\n\
         निर्वाचन क्षेत्र की संख्या एवं नाम : 45 - लखनऊ पश्चिम\n{}{}",
        entry(1, "राम", "40"),
        entry(2, "सीता", "38")
    );

    let out = extract(PDF, &config_for(&[&page])).await.unwrap();
    for r in &out.records {
        assert_eq!(r.section_number.as_deref(), Some("3"));
        assert_eq!(r.section_name.as_deref(), Some("रामपुर उत्तर"));
        assert_eq!(r.polling_station_number.as_deref(), Some("45"));
        assert_eq!(r.polling_station_name.as_deref(), Some("लखनऊ पश्चिम"));
    }

    let config = builder(1, scripted(&[&page]))
        .inherit_page_header(false)
        .build()
        .unwrap();
    let out = extract(PDF, &config).await.unwrap();
    assert!(out.records.iter().all(|r| r.section_number.is_none()));
    assert_eq!(out.records.len(), 2);
}

#[tokio::test]
async fn surname_variants_stay_separate() {
    let page = format!(
        "{}निर्वाचक का उपनाम : शर्मा\n{}उपनाम : वर्मा\n",
        entry(1, "राम", "40"),
        entry(2, "सीता", "38")
    );
    let out = extract(PDF, &config_for(&[&page])).await.unwrap();
    assert_eq!(out.records[0].voter_surname.as_deref(), Some("शर्मा"));
    assert_eq!(out.records[0].surname, None);
    assert_eq!(out.records[1].surname.as_deref(), Some("वर्मा"));
    assert_eq!(out.records[1].voter_surname, None);
}

#[tokio::test]
async fn progress_events_cover_every_page() {
    let cb = Arc::new(RecordingCallback::default());
    let recognizer = ScriptedRecognizer {
        failing: vec![2],
        ..scripted(&[&entry(1, "राम", "40"), "", ""])
    };
    let config = builder(3, recognizer)
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    extract(PDF, &config).await.unwrap();

    let mut events = cb.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start 3"));
    assert_eq!(events.last().map(String::as_str), Some("done 1"));
    events.sort();
    assert!(events.contains(&"ok 1".to_string()));
    assert!(events.contains(&"err 2".to_string()));
    assert!(events.contains(&"ok 3".to_string()));
}

// ── Entry points ─────────────────────────────────────────────────────────────

#[test]
fn extract_records_returns_bare_records() {
    let config = config_for(&[&entry(1, "राम", "40")]);
    let records = tokio_test::block_on(extract_records(PDF, &config)).unwrap();
    assert_eq!(records, {
        let mut r = VoterRecord::new("राम", 40);
        r.spouse_or_parent_name = Some("रमेश चंद".into());
        r.house_number = Some("1".into());
        r.gender = Some("पुरुष".into());
        r.tag_number = Some("1 ABC0000001".into());
        vec![r]
    });
}

#[test]
fn extract_sync_matches_async() {
    let config = config_for(&[&entry(1, "राम", "40"), &entry(2, "सीता", "38")]);
    let out = extract_sync(PDF, &config).unwrap();
    assert_eq!(names(&out.records), vec!["राम", "सीता"]);
}

#[tokio::test]
async fn extract_to_file_writes_json_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("voters.json");
    let config = config_for(&[&entry(1, "राम", "40")]);

    let stats = extract_to_file(PDF, &path, &config).await.unwrap();
    assert_eq!(stats.accepted_records, 1);

    let written = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    let array = value.as_array().unwrap();
    assert_eq!(array.len(), 1);
    assert_eq!(array[0]["name"], "राम");
    assert_eq!(array[0]["age"], 40);
    assert!(array[0].get("surname").is_none());
    assert!(!path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn failed_rename_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voters.json");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "occupied").unwrap();
    let config = config_for(&[&entry(1, "राम", "40")]);

    let err = extract_to_file(PDF, &path, &config).await.unwrap_err();
    assert!(matches!(err, ExtractError::OutputWriteFailed { .. }), "got {err:?}");
    assert!(!path.with_extension("json.tmp").exists());
    assert!(path.join("keep").exists());
}
