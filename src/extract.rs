//! Extraction entry points.
//!
//! [`extract`] runs the whole pipeline over one document and returns every
//! accepted record plus diagnostics. The other functions are conveniences
//! around it: bare records, a local file, a JSON file on disk, or a
//! blocking call.
//!
//! Pages are rasterised in one blocking task and streamed to recognition
//! through a bounded channel. At most `concurrency` page bitmaps exist at a
//! time: the rasteriser waits for a free slot before rendering, and a slot
//! is returned once its page has been recognised. Results are sorted by
//! page number before segmentation, so block indices and record order never
//! depend on which page finished first.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError, UnreadableReason};
use crate::output::{ExtractionOutput, ExtractionStats, PageResult, Rejection, VoterRecord};
use crate::pipeline::input::{self, Document};
use crate::pipeline::recognize::{RecognizedPage, Recognizer, TesseractRecognizer};
use crate::pipeline::render::{PageImage, PageSink, PdfiumRasterizer, RasterOptions, Rasterizer};
use crate::pipeline::{fields, normalize, preprocess, segment};
use futures::stream::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Extract voter records from PDF bytes.
///
/// # Returns
/// `Ok(ExtractionOutput)` whenever at least one page could be rasterised,
/// even if some pages failed recognition or every block was rejected
/// (check `output.pages` and `output.rejections`).
///
/// # Errors
/// - [`ExtractError::DocumentUnreadable`]: not a PDF, corrupt, encrypted
///   without a (correct) password, zero pages, or no selected page renders
/// - [`ExtractError::PageOutOfRange`]: the page selection matched nothing
/// - [`ExtractError::RasterizerUnavailable`]: pdfium could not be loaded
pub async fn extract(
    bytes: impl Into<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();

    // ── Step 1: Validate input ───────────────────────────────────────────
    let document = Document::from_bytes(bytes)?;
    info!("Starting extraction: {} bytes", document.len());

    // ── Step 2: Open the document, start rasterising ─────────────────────
    let mut render = start_rasterizer(document, config);
    let (total_pages, selected_pages) = render.opened().await?;
    if total_pages == 0 {
        return Err(ExtractError::unreadable(UnreadableReason::NoPages));
    }
    if selected_pages == 0 {
        return Err(ExtractError::PageOutOfRange {
            page: config.pages.first_requested(),
            total: total_pages,
        });
    }
    info!("PDF opened: {} of {} pages selected", selected_pages, total_pages);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(selected_pages);
    }

    // ── Step 3: Recognise pages as they arrive (join point: sort by page) ─
    let recognition_start = Instant::now();
    let mut outcomes = recognize_pages(&mut render, selected_pages, config).await;
    outcomes.sort_by_key(|o| o.page_num);
    let recognition_duration_ms = recognition_start.elapsed().as_millis() as u64;

    let render_duration_ms = render.finish().await?.as_millis() as u64;
    if outcomes
        .iter()
        .all(|o| matches!(o.result, Err(PageError::RenderFailed { .. })))
    {
        return Err(ExtractError::unreadable(
            UnreadableReason::NoRenderablePages {
                total: selected_pages,
            },
        ));
    }
    info!(
        "Rasterised {} pages in {}ms, recognised in {}ms",
        outcomes.len(),
        render_duration_ms,
        recognition_duration_ms
    );

    let mut recognized: Vec<RecognizedPage> = Vec::with_capacity(outcomes.len());
    let mut pages: Vec<PageResult> = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let (line_count, error) = match outcome.result {
            Ok(page) => {
                let n = page.lines.len();
                recognized.push(page);
                (n, None)
            }
            Err(e) => (0, Some(e)),
        };
        pages.push(PageResult {
            page_num: outcome.page_num,
            line_count,
            block_count: 0,
            record_count: 0,
            duration_ms: outcome.duration_ms,
            error,
        });
    }
    if recognized.is_empty() {
        warn!("No page produced text; output will be empty");
    }

    // ── Step 4: Segment into voter blocks ────────────────────────────────
    let segmentation = segment::segment(&recognized);
    debug!(
        "Segmented {} blocks from {} pages",
        segmentation.blocks.len(),
        recognized.len()
    );

    // ── Step 5: Extract and validate each block ──────────────────────────
    let mut records: Vec<VoterRecord> = Vec::new();
    let mut rejections: Vec<Rejection> = Vec::new();
    let mut accepted_per_page: BTreeMap<usize, usize> = BTreeMap::new();

    for block in &segmentation.blocks {
        let header = if config.inherit_page_header {
            segmentation.header_for(block.page_num)
        } else {
            None
        };
        let fields = fields::extract_block(block, header);
        match normalize::normalize(&fields) {
            Ok(record) => {
                records.push(record);
                *accepted_per_page.entry(block.page_num).or_default() += 1;
            }
            Err(reason) => {
                debug!(
                    "Block {} (page {}) rejected: {}",
                    block.index, block.page_num, reason
                );
                rejections.push(Rejection {
                    block_index: block.index,
                    page_num: block.page_num,
                    reason,
                });
            }
        }
    }

    for page in &mut pages {
        page.block_count = segmentation.blocks_on_page(page.page_num);
        page.record_count = accepted_per_page.get(&page.page_num).copied().unwrap_or(0);
    }

    // ── Step 6: Stats ────────────────────────────────────────────────────
    let stats = ExtractionStats {
        total_pages,
        selected_pages,
        recognized_pages: recognized.len(),
        failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
        total_blocks: segmentation.blocks.len(),
        accepted_records: records.len(),
        rejected_blocks: rejections.len(),
        render_duration_ms,
        recognition_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {} records from {} blocks ({} rejected), {}ms total",
        stats.accepted_records, stats.total_blocks, stats.rejected_blocks, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(selected_pages, records.len());
    }

    Ok(ExtractionOutput {
        records,
        pages,
        rejections,
        stats,
    })
}

/// Extract voter records only, in document order.
pub async fn extract_records(
    bytes: impl Into<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<Vec<VoterRecord>, ExtractError> {
    Ok(extract(bytes, config).await?.records)
}

/// Extract voter records from a local PDF file.
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let bytes = input::read_local(path.as_ref()).await?;
    extract(bytes, config).await
}

/// Extract and write the record array as JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    bytes: impl Into<Vec<u8>>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionStats, ExtractError> {
    let output = extract(bytes, config).await?;
    let path = output_path.as_ref();
    let json = output
        .to_json()
        .map_err(|e| ExtractError::Internal(format!("JSON serialisation failed: {}", e)))?;

    let write_failed = |source| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let written = match tokio::fs::write(&tmp_path, json).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(write_failed(e));
    }

    Ok(output.stats)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn extract_sync(
    bytes: impl Into<Vec<u8>>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(bytes, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One page after recognition, before the join point.
struct PageOutcome {
    page_num: usize,
    result: Result<RecognizedPage, PageError>,
    duration_ms: u64,
}

enum RasterEvent {
    Opened { page_count: usize, selected: usize },
    Page(Result<PageImage, PageError>),
}

/// Sink side of the render channel, driven from the blocking task.
struct ChannelSink {
    tx: mpsc::Sender<RasterEvent>,
    slots: Arc<Semaphore>,
}

impl PageSink for ChannelSink {
    fn begin(&mut self, page_count: usize, selected: usize) {
        if self
            .tx
            .blocking_send(RasterEvent::Opened { page_count, selected })
            .is_err()
        {
            debug!("Render receiver dropped before the document opened");
        }
    }

    fn ready(&mut self) -> bool {
        match futures::executor::block_on(self.slots.acquire()) {
            Ok(permit) => {
                // Returned by the consumer once the page is recognised.
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    fn page(&mut self, page: Result<PageImage, PageError>) -> bool {
        self.tx.blocking_send(RasterEvent::Page(page)).is_ok()
    }
}

/// Consumer side of a running rasteriser.
struct RenderFeed {
    rx: Option<mpsc::Receiver<RasterEvent>>,
    slots: Arc<Semaphore>,
    task: Option<JoinHandle<(Result<(), ExtractError>, Duration)>>,
}

impl RenderFeed {
    /// Wait for the document to open: `(page_count, selected)`.
    async fn opened(&mut self) -> Result<(usize, usize), ExtractError> {
        let event = match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        };
        match event {
            Some(RasterEvent::Opened { page_count, selected }) => Ok((page_count, selected)),
            Some(RasterEvent::Page(_)) => Err(ExtractError::Internal(
                "rasteriser sent a page before opening the document".into(),
            )),
            None => {
                self.finish().await?;
                Err(ExtractError::Internal(
                    "rasteriser finished without opening the document".into(),
                ))
            }
        }
    }

    /// Wait for the render task; its error, or how long it ran.
    async fn finish(&mut self) -> Result<Duration, ExtractError> {
        let Some(task) = self.task.take() else {
            return Ok(Duration::ZERO);
        };
        let (result, elapsed) = task
            .await
            .map_err(|e| ExtractError::Internal(format!("Rasterisation task failed: {}", e)))?;
        result.map(|()| elapsed)
    }
}

impl Drop for RenderFeed {
    fn drop(&mut self) {
        // Unblocks a rasteriser still waiting for a slot.
        self.slots.close();
    }
}

fn start_rasterizer(document: Document, config: &ExtractionConfig) -> RenderFeed {
    let rasterizer: Arc<dyn Rasterizer> = match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::from_config(config)),
    };
    let options = RasterOptions::from_config(config);
    let (tx, rx) = mpsc::channel(config.concurrency);
    let slots = Arc::new(Semaphore::new(config.concurrency));
    let mut sink = ChannelSink {
        tx,
        slots: Arc::clone(&slots),
    };

    let task = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let result = rasterizer.rasterize(&document, &options, &mut sink);
        (result, start.elapsed())
    });

    RenderFeed {
        rx: Some(rx),
        slots,
        task: Some(task),
    }
}

/// Recognise pages as the rasteriser delivers them, `concurrency` at a
/// time. Output order is completion order.
async fn recognize_pages(
    render: &mut RenderFeed,
    total_pages: usize,
    config: &ExtractionConfig,
) -> Vec<PageOutcome> {
    let Some(rx) = render.rx.take() else {
        return Vec::new();
    };
    let recognizer: Arc<dyn Recognizer> = match config.recognizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(TesseractRecognizer::from_config(config)),
    };
    debug!("Recognising with {}", recognizer.name());
    let preprocess = config.preprocess;
    let slots = Arc::clone(&render.slots);

    ReceiverStream::new(rx)
        .filter_map(|event| async move {
            match event {
                RasterEvent::Page(page) => Some(page),
                RasterEvent::Opened { .. } => None,
            }
        })
        .map(|page| {
            let recognizer = Arc::clone(&recognizer);
            let callback = config.progress_callback.clone();
            let slots = Arc::clone(&slots);
            async move {
                let page_num = match &page {
                    Ok(image) => image.page_num,
                    Err(e) => e.page(),
                };
                if let Some(ref cb) = callback {
                    cb.on_page_start(page_num, total_pages);
                }
                let start = Instant::now();
                let result = match page {
                    Ok(image) => recognize_page(recognizer, image, preprocess).await,
                    Err(e) => Err(e),
                };
                slots.add_permits(1);
                match &result {
                    Ok(page) => {
                        if let Some(ref cb) = callback {
                            cb.on_page_complete(page_num, total_pages, page.lines.len());
                        }
                    }
                    Err(e) => {
                        warn!("{}", e);
                        if let Some(ref cb) = callback {
                            cb.on_page_error(page_num, total_pages, &e.to_string());
                        }
                    }
                }
                PageOutcome {
                    page_num,
                    result,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
        })
        .buffer_unordered(config.concurrency)
        .collect()
        .await
}

/// Preprocess and recognise one page on the blocking pool.
async fn recognize_page(
    recognizer: Arc<dyn Recognizer>,
    page: PageImage,
    preprocess: bool,
) -> Result<RecognizedPage, PageError> {
    let page_num = page.page_num;
    let failed = |detail: String| PageError::RecognitionFailed {
        page: page_num,
        detail,
    };

    tokio::task::spawn_blocking(move || {
        let page = if preprocess {
            PageImage {
                page_num: page.page_num,
                image: preprocess::prepare_for_recognition(&page.image),
            }
        } else {
            page
        };
        recognizer.recognize(&page)
    })
    .await
    .map_err(|e| failed(format!("recognition task failed: {}", e)))?
    .map_err(|e| failed(e.to_string()))
}
