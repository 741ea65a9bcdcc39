//! CLI binary for voterroll-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the record array as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use voterroll_extract::{
    extract, extract_to_file, pipeline::input::read_local, ExtractionConfig,
    ExtractionProgressCallback, PageSelection, ProgressCallback,
};

// ── Terminal styling ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Tone {
    Good,
    Bad,
    Warn,
    Info,
    Muted,
    Strong,
}

impl Tone {
    fn sgr(self) -> &'static str {
        match self {
            Tone::Good => "32",
            Tone::Bad => "31",
            Tone::Warn => "33",
            Tone::Info => "36",
            Tone::Muted => "2",
            Tone::Strong => "1",
        }
    }
}

/// Status lines go to stderr; colour them only when it is a terminal and
/// `NO_COLOR` is unset.
static COLOR: Lazy<bool> =
    Lazy::new(|| io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none());

fn paint(tone: Tone, s: &str) -> String {
    if *COLOR {
        format!("\x1b[{}m{s}\x1b[0m", tone.sgr())
    } else {
        s.to_string()
    }
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per recognised page. Pages finish
/// out of order when recognised concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            paint(Tone::Info, "◆"),
            paint(Tone::Strong, &format!("Recognising {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, line_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            paint(Tone::Good, "✓"),
            page_num,
            total,
            paint(Tone::Muted, &format!("{line_count:>4} lines")),
            paint(Tone::Muted, &format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            paint(Tone::Bad, "✗"),
            page_num,
            total,
            paint(Tone::Bad, &msg),
            paint(Tone::Muted, &format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, record_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        let mark = if failed == 0 {
            paint(Tone::Good, "✔")
        } else if failed == total_pages {
            paint(Tone::Bad, "✘")
        } else {
            paint(Tone::Warn, "⚠")
        };
        eprintln!(
            "{} {} records from {}/{} pages",
            mark,
            paint(Tone::Strong, &record_count.to_string()),
            total_pages - failed.min(total_pages),
            total_pages,
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Records as a JSON array on stdout
  voterroll roll.pdf

  # Write to file
  voterroll roll.pdf -o voters.json

  # Pages 3 to 20 only, 300 DPI, 8 pages in parallel
  voterroll --pages 3-20 --dpi 300 --concurrency 8 roll.pdf

  # Full report: records, per-page results, rejected blocks, stats
  voterroll --report roll.pdf > report.json

ENVIRONMENT VARIABLES:
  VOTERROLL_DPI           Rendering DPI (default 400)
  VOTERROLL_LANGUAGES     Tesseract language hint (default hin+eng)
  VOTERROLL_TESSERACT     Path to the tesseract binary
  VOTERROLL_PDFIUM_LIB    Directory containing libpdfium
  RUST_LOG                Log filter, e.g. voterroll_extract=debug

SETUP:
  Install tesseract-ocr with the Hindi language pack (tesseract-ocr-hin)
  and a pdfium shared library for your platform.
"#;

/// Extract voter records from scanned Hindi electoral-roll PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "voterroll",
    version,
    about = "Extract voter records from scanned Hindi electoral-roll PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "VOTERROLL_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "VOTERROLL_DPI", default_value_t = 400,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract language hint.
    #[arg(long, env = "VOTERROLL_LANGUAGES", default_value = "hin+eng")]
    languages: String,

    /// Number of pages recognised in parallel.
    #[arg(short, long, env = "VOTERROLL_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, 1,3,5,7 or 1-3,7.
    #[arg(long, env = "VOTERROLL_PAGES", default_value = "all")]
    pages: PageSelection,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "VOTERROLL_PASSWORD")]
    password: Option<String>,

    /// Path to the tesseract binary.
    #[arg(long, env = "VOTERROLL_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Tesseract page segmentation mode (0–13).
    #[arg(long, env = "VOTERROLL_PSM",
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: Option<u8>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "VOTERROLL_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Skip binarisation before recognition.
    #[arg(long, env = "VOTERROLL_NO_PREPROCESS")]
    no_preprocess: bool,

    /// Do not fill section/polling-station pairs from the page header.
    #[arg(long, env = "VOTERROLL_NO_HEADER_INHERIT")]
    no_header_inherit: bool,

    /// Output the full report (records, pages, rejections, stats).
    #[arg(long, env = "VOTERROLL_REPORT")]
    report: bool,

    /// Disable progress bar.
    #[arg(long, env = "VOTERROLL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "VOTERROLL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "VOTERROLL_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let bytes = read_local(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    // ── Run extraction ───────────────────────────────────────────────────
    match (&cli.output, cli.report) {
        (Some(output_path), false) => {
            let stats = extract_to_file(bytes, output_path, &config)
                .await
                .context("Extraction failed")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} records  ({} blocks rejected)  {}ms  →  {}",
                    if stats.failed_pages == 0 {
                        paint(Tone::Good, "✔")
                    } else {
                        paint(Tone::Warn, "⚠")
                    },
                    stats.accepted_records,
                    stats.rejected_blocks,
                    stats.total_duration_ms,
                    paint(Tone::Strong, &output_path.display().to_string()),
                );
            }
        }
        (output_path, report) => {
            let output = extract(bytes, &config).await.context("Extraction failed")?;
            let json = if report {
                serde_json::to_string_pretty(&output)
            } else {
                output.to_json()
            }
            .context("Failed to serialise output")?;

            match output_path {
                Some(path) => tokio::fs::write(path, format!("{json}\n"))
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    writeln!(handle, "{json}").context("Failed to write to stdout")?;
                }
            }

            if !cli.quiet && !show_progress {
                eprintln!(
                    "Extracted {} records from {}/{} pages in {}ms",
                    output.stats.accepted_records,
                    output.stats.recognized_pages,
                    output.stats.selected_pages,
                    output.stats.total_duration_ms
                );
                if output.stats.rejected_blocks > 0 {
                    eprintln!(
                        "  {}",
                        paint(
                            Tone::Muted,
                            &format!("{} blocks rejected", output.stats.rejected_blocks)
                        )
                    );
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .languages(&cli.languages)
        .tesseract_path(&cli.tesseract)
        .pages(cli.pages.clone())
        .preprocess(!cli.no_preprocess)
        .inherit_page_header(!cli.no_header_inherit);

    if let Some(psm) = cli.psm {
        builder = builder.page_segmentation_mode(psm);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_maps_flags_to_config() {
        let cli = Cli::try_parse_from([
            "voterroll",
            "--pages",
            "2-4,9",
            "--dpi",
            "300",
            "--no-header-inherit",
            "--psm",
            "4",
            "roll.pdf",
        ])
        .unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.pages, PageSelection::Set(vec![2, 3, 4, 9]));
        assert_eq!(config.dpi, 300);
        assert!(!config.inherit_page_header);
        assert!(config.preprocess);
    }

    #[test]
    fn cli_rejects_bad_page_selection() {
        let err = Cli::try_parse_from(["voterroll", "--pages", "5-2", "roll.pdf"]).unwrap_err();
        assert!(err.to_string().contains("runs backwards"), "{err}");
    }
}
