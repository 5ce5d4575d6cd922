//! CLI binary for pagefuse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, wires up replay detectors, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagefuse::{
    extract_to_dir, DetectorSelection, Detectors, ExtractionConfig, ExtractionProgressCallback,
    PageStatus, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page,
/// correct even when pages complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
    }

    fn on_page_start(&self, page_index: usize, _total: usize) {
        self.bar.set_message(format!("page {}", page_index + 1));
    }

    fn on_page_complete(&self, page_index: usize, total: usize, blocks: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_index + 1,
            total,
            dim(&format!("{blocks} blocks")),
        ));
        self.bar.inc(1);
    }

    fn on_page_degraded(&self, page_index: usize, total: usize, blocks: usize, why: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            yellow("⚠"),
            page_index + 1,
            total,
            dim(&format!("{blocks} blocks")),
            yellow(why),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_index + 1,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} pages extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract blocks from an analysis directory
  pagefuse analysis/ -o extracted/

  # Geometric detections only, no overlay images
  pagefuse analysis/ -o extracted/ --detectors geometric --no-overlays

  # Tighter grounding, wider header band
  pagefuse analysis/ -o extracted/ --grounding-iou 0.6 --top-margin 0.25

  # Machine-readable summary on stdout
  pagefuse analysis/ -o extracted/ --json

INPUT LAYOUT:
  analysis/page_<n>.json       vector content (points, top-left origin)
  analysis/page_<n>.png        page raster at a fixed DPI
  analysis/regions_page_<n>.json    recorded geometric detections (optional)
  analysis/semantic_page_<n>.json   recorded semantic payload (optional)

OUTPUT LAYOUT:
  extracted/blocks.json        grounded blocks with provenance
  extracted/elements.json      flattened renderable elements
  extracted/page_<n>_overlay.png    QA overlay per page
"#;

/// Extract grounded layout blocks from rendered pages.
#[derive(Parser, Debug)]
#[command(
    name = "pagefuse",
    version,
    about = "Extract grounded layout blocks from rendered pages",
    long_about = "Fuse geometric and semantic detector output with vector page geometry to \
produce grounded layout blocks (grids, headers, checkbox lists, labeled inputs, text regions). \
Detector output is replayed from JSON recorded next to the page files.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Analysis directory with page_<n>.json / page_<n>.png pairs.
    input: PathBuf,

    /// Output directory for blocks.json, elements.json, and overlays.
    #[arg(short, long, env = "PAGEFUSE_OUTPUT", default_value = "extracted")]
    output: PathBuf,

    /// Which detectors to fuse: geometric, semantic, both.
    #[arg(long, env = "PAGEFUSE_DETECTORS", value_enum, default_value = "both")]
    detectors: DetectorsArg,

    /// Raster DPI the page PNGs were rendered at.
    #[arg(long, env = "PAGEFUSE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: u32,

    /// Tile edge length in pixels for the geometric pass.
    #[arg(long, env = "PAGEFUSE_TILE_SIZE", default_value_t = 640)]
    tile_size: u32,

    /// Overlap between adjacent tiles in pixels.
    #[arg(long, env = "PAGEFUSE_TILE_OVERLAP", default_value_t = 64)]
    tile_overlap: u32,

    /// Inference resize target in pixels.
    #[arg(long, env = "PAGEFUSE_INFERENCE_SIZE", default_value_t = 640)]
    inference_size: u32,

    /// IoU for merging duplicate detections across tiles.
    #[arg(long, env = "PAGEFUSE_MERGE_IOU", default_value_t = 0.5)]
    merge_iou: f32,

    /// IoU for cross-detector deduplication.
    #[arg(long, env = "PAGEFUSE_DEDUP_IOU", default_value_t = 0.6)]
    dedup_iou: f32,

    /// IoU a semantic claim needs against a primitive to be grounded.
    #[arg(long, env = "PAGEFUSE_GROUNDING_IOU", default_value_t = 0.5)]
    grounding_iou: f32,

    /// IoU above which two same-type blocks are duplicates.
    #[arg(long, env = "PAGEFUSE_DUPLICATE_IOU", default_value_t = 0.8)]
    duplicate_iou: f32,

    /// Top margin band as a fraction of page height.
    #[arg(long = "top-margin", env = "PAGEFUSE_TOP_MARGIN", default_value_t = 0.20)]
    top_margin_fraction: f32,

    /// Number of pages processed concurrently.
    #[arg(short, long, env = "PAGEFUSE_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Per-detector-call timeout in seconds.
    #[arg(long, env = "PAGEFUSE_DETECTOR_TIMEOUT", default_value_t = 45)]
    detector_timeout: u64,

    /// Skip rendering QA overlay images.
    #[arg(long, env = "PAGEFUSE_NO_OVERLAYS")]
    no_overlays: bool,

    /// Print the extraction summary as JSON on stdout.
    #[arg(long, env = "PAGEFUSE_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PAGEFUSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGEFUSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGEFUSE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum DetectorsArg {
    Geometric,
    Semantic,
    Both,
}

impl From<DetectorsArg> for DetectorSelection {
    fn from(v: DetectorsArg) -> Self {
        match v {
            DetectorsArg::Geometric => DetectorSelection::GeometricOnly,
            DetectorsArg::Semantic => DetectorSelection::SemanticOnly,
            DetectorsArg::Both => DetectorSelection::Both,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the per-page feedback; keep library logs
    // quiet unless asked.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .detectors(cli.detectors.clone().into())
        .tile_size(cli.tile_size)
        .tile_overlap(cli.tile_overlap)
        .inference_size(cli.inference_size)
        .merge_iou(cli.merge_iou)
        .dedup_iou(cli.dedup_iou)
        .grounding_iou(cli.grounding_iou)
        .duplicate_iou(cli.duplicate_iou)
        .top_margin_fraction(cli.top_margin_fraction)
        .workers(cli.workers)
        .detector_timeout_secs(cli.detector_timeout)
        .render_overlays(!cli.no_overlays);
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let detectors = Detectors::replay_from_dir(&cli.input);
    let output = extract_to_dir(&cli.input, &cli.output, &detectors, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
        return Ok(());
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        eprintln!(
            "{}  {} blocks, {} elements  {}ms  →  {}",
            if output.stats.failed_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.stats.total_blocks,
            output.stats.total_elements,
            output.stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        for page in output.pages.iter().filter(|p| p.status != PageStatus::Success) {
            match page.status {
                PageStatus::Degraded => eprintln!(
                    "   {} page {}: {}",
                    yellow("⚠"),
                    page.page_index + 1,
                    page.error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "degraded".into()),
                ),
                PageStatus::Failed => eprintln!(
                    "   {} page {}: {}",
                    red("✗"),
                    page.page_index + 1,
                    page.error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "failed".into()),
                ),
                PageStatus::Success => {}
            }
        }
        if output.stats.grounding_discards > 0 {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{} semantic claims discarded as ungrounded",
                    output.stats.grounding_discards
                )),
            );
        }
    }

    Ok(())
}
