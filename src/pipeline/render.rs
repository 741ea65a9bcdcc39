//! PDF rasterisation: render selected pages to `DynamicImage`.
//!
//! [`Rasterizer`] is the seam between the pipeline and the PDF engine. The
//! default [`PdfiumRasterizer`] wraps pdfium, which keeps thread-local state
//! and must not run on async worker threads; the orchestrator calls it from
//! `spawn_blocking`.
//!
//! Pages are pushed into a [`PageSink`] one at a time, so a consumer can
//! hold back rendering until earlier pages have been recognised.
//!
//! Resolution is driven by DPI (PDF user space is 72 units per inch), with
//! `max_rendered_pixels` as a hard cap on either edge.

use crate::config::{ExtractionConfig, PageSelection};
use crate::error::{ExtractError, PageError, UnreadableReason};
use crate::pipeline::input::Document;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A rasterised page, owned by one extraction until it is recognised.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: DynamicImage,
}

/// Every selected page of one document, held in memory.
#[derive(Debug, Default)]
pub struct RasterizedDocument {
    /// Pages in the document, selected or not.
    pub page_count: usize,
    /// One entry per selected page, in page order.
    pub pages: Vec<Result<PageImage, PageError>>,
}

/// Receives pages from a [`Rasterizer`] as they are rendered.
///
/// The rasteriser calls [`begin`](PageSink::begin) once, then for each
/// selected page [`ready`](PageSink::ready) before rendering it and
/// [`page`](PageSink::page) after. Either returning `false` ends rendering.
pub trait PageSink {
    /// The document is open: `page_count` pages, `selected` of them to come.
    fn begin(&mut self, page_count: usize, selected: usize);

    /// Block until another page may be rendered.
    fn ready(&mut self) -> bool {
        true
    }

    fn page(&mut self, page: Result<PageImage, PageError>) -> bool;
}

impl PageSink for RasterizedDocument {
    fn begin(&mut self, page_count: usize, selected: usize) {
        self.page_count = page_count;
        self.pages.reserve(selected);
    }

    fn page(&mut self, page: Result<PageImage, PageError>) -> bool {
        self.pages.push(page);
        true
    }
}

/// Rendering parameters taken from [`ExtractionConfig`].
#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
    pub pages: PageSelection,
}

impl RasterOptions {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            pages: config.pages.clone(),
        }
    }

    /// Scale from PDF points to pixels.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// Turns a PDF into page bitmaps.
///
/// Implementations return `Err` only when no page can be produced at all
/// (bad bytes, encryption, missing engine), and then before calling
/// [`PageSink::begin`]. A single page that fails to render is passed to the
/// sink in place as [`PageError::RenderFailed`].
pub trait Rasterizer: Send + Sync {
    /// Render the selected pages, in page order, into `sink`.
    fn rasterize(
        &self,
        document: &Document,
        options: &RasterOptions,
        sink: &mut dyn PageSink,
    ) -> Result<(), ExtractError>;

    /// Render every selected page into memory at once.
    fn rasterize_all(
        &self,
        document: &Document,
        options: &RasterOptions,
    ) -> Result<RasterizedDocument, ExtractError> {
        let mut rendered = RasterizedDocument::default();
        self.rasterize(document, options, &mut rendered)?;
        Ok(rendered)
    }
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to the system pdfium library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the pdfium library found in `dir`.
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            library_dir: config.pdfium_library_path.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let bindings = match self.library_dir.as_deref() {
            Some(dir) => bind_from_dir(dir),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExtractError::RasterizerUnavailable(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn bind_from_dir(dir: &Path) -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        document: &Document,
        options: &RasterOptions,
        sink: &mut dyn PageSink,
    ) -> Result<(), ExtractError> {
        let pdfium = self.bind()?;
        let password = options.password.as_deref();

        let pdf = pdfium
            .load_pdf_from_byte_slice(document.bytes(), password)
            .map_err(|e| ExtractError::unreadable(classify_load_error(&e, password.is_some())))?;

        let pages = pdf.pages();
        let page_count = pages.len() as usize;
        info!("PDF loaded: {} pages", page_count);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.scale())
            .set_maximum_width(options.max_rendered_pixels as i32)
            .set_maximum_height(options.max_rendered_pixels as i32);

        let indices = options.pages.to_indices(page_count);
        sink.begin(page_count, indices.len());

        for idx in indices {
            if !sink.ready() {
                debug!("Page consumer stopped; rendering ends before page {}", idx + 1);
                break;
            }
            let page_num = idx + 1;
            let page = match render_page(pages, idx, &render_config) {
                Ok(image) => {
                    debug!(
                        "Rendered page {} → {}x{} px",
                        page_num,
                        image.width(),
                        image.height()
                    );
                    Ok(PageImage { page_num, image })
                }
                Err(e) => {
                    warn!("Page {}: rasterisation failed: {:?}", page_num, e);
                    Err(PageError::RenderFailed {
                        page: page_num,
                        detail: format!("{:?}", e),
                    })
                }
            };
            if !sink.page(page) {
                break;
            }
        }

        Ok(())
    }
}

fn render_page(
    pages: &PdfPages<'_>,
    idx: usize,
    render_config: &PdfRenderConfig,
) -> Result<DynamicImage, PdfiumError> {
    let page = pages.get(idx as u16)?;
    let bitmap = page.render_with_config(render_config)?;
    Ok(bitmap.as_image())
}

/// Map a pdfium load failure to the reason reported to the caller.
fn classify_load_error(err: &PdfiumError, password_supplied: bool) -> UnreadableReason {
    let detail = format!("{:?}", err);
    if detail.contains("Password") || detail.contains("password") {
        if password_supplied {
            UnreadableReason::WrongPassword
        } else {
            UnreadableReason::PasswordRequired
        }
    } else {
        UnreadableReason::Corrupt { detail }
    }
}
