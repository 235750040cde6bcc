//! CLI binary for doc2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, then either serves the upload endpoint or runs local
//! files through the same pipeline and prints the envelopes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc2json::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use doc2json::{DocumentExtractor, DocumentFormat, ExtractionConfig, ExtractionResult, UploadedDocument};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

/// Extract invoices, products and customers from PDFs, images and
/// spreadsheets into JSON.
#[derive(Parser, Debug)]
#[command(name = "doc2json", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API key for the completion endpoint.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Model identifier.
    #[arg(long, env = "DOC2JSON_MODEL", default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "DOC2JSON_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Sampling temperature (0.0-2.0).
    #[arg(long, default_value_t = 0.2, global = true)]
    temperature: f32,

    /// Output token ceiling per completion.
    #[arg(long, default_value_t = 4096, global = true)]
    max_tokens: usize,

    /// Per-call timeout for the completion request in seconds.
    #[arg(long, default_value_t = 60, global = true)]
    api_timeout: u64,

    /// Extra attempts on transient remote failures.
    #[arg(long, default_value_t = 3, global = true)]
    max_retries: u32,

    /// Text extraction jobs allowed to run at once.
    #[arg(long, default_value_t = 4, global = true)]
    workers: usize,

    /// Tesseract language pack used for images.
    #[arg(long, default_value = "eng", global = true)]
    ocr_lang: String,

    /// Tesseract executable name or path.
    #[arg(long, env = "TESSERACT_BIN", default_value = "tesseract", global = true)]
    tesseract_bin: String,

    /// Explicit pdfium shared library. Downloaded and cached when absent.
    #[arg(long, env = "PDFIUM_LIB_PATH", global = true)]
    pdfium_lib: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `POST /upload/` over HTTP.
    Serve {
        /// Interface to bind.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind.
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },

    /// Process local files and print one JSON envelope per file.
    Extract {
        /// Documents to process (.pdf, .png, .jpg, .jpeg, .xlsx, .xls).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Files processed concurrently.
        #[arg(short = 'j', long, default_value_t = 4)]
        concurrency: usize,

        /// Print the normalised text instead of calling the model.
        #[arg(long)]
        text_only: bool,

        /// Pretty-print JSON output.
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The extract spinner owns the terminal; only warnings interrupt it.
    let show_progress = !cli.quiet && matches!(cli.command, Command::Extract { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
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
    let config = build_config(&cli)?;

    // ── Ensure PDFium engine is available ────────────────────────────────
    if config.pdfium_lib_path.is_none() && needs_pdfium(&cli.command) {
        ensure_pdfium(cli.quiet)?;
    }

    match cli.command {
        Command::Serve { ref host, port } => serve(host, port, config).await,
        Command::Extract {
            ref files,
            concurrency,
            text_only,
            pretty,
        } => {
            let opts = ExtractOptions {
                concurrency,
                text_only,
                pretty,
                show_progress,
                quiet: cli.quiet,
            };
            extract(files, &opts, config).await
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(cli.model.as_str())
        .base_url(cli.base_url.as_str())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .extraction_workers(cli.workers)
        .ocr_language(cli.ocr_lang.as_str())
        .tesseract_bin(cli.tesseract_bin.as_str());

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path.clone());
    }

    builder.build().context("Invalid configuration")
}

/// The server may receive PDFs at any time; `extract` only when given one.
fn needs_pdfium(command: &Command) -> bool {
    match command {
        Command::Serve { .. } => true,
        Command::Extract { files, .. } => files.iter().any(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            DocumentFormat::detect(&name) == DocumentFormat::Pdf
        }),
    }
}

/// Download the pdfium library on first run, with a byte-level progress bar.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready");
    Ok(())
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn serve(host: &str, port: u16, config: ExtractionConfig) -> Result<()> {
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("Invalid --host '{host}'"))?;
    let addr = SocketAddr::new(ip, port);

    let extractor =
        DocumentExtractor::new(config).context("Failed to initialise extraction client")?;

    doc2json::server::serve(addr, Arc::new(extractor))
        .await
        .with_context(|| format!("Server on {addr} failed"))
}

// ── extract ──────────────────────────────────────────────────────────────────

struct ExtractOptions {
    concurrency: usize,
    text_only: bool,
    pretty: bool,
    show_progress: bool,
    quiet: bool,
}

enum Outcome {
    Envelope(ExtractionResult),
    Text(String),
    Failed(String),
}

impl Outcome {
    fn is_success(&self) -> bool {
        match self {
            Outcome::Envelope(result) => result.is_success(),
            Outcome::Text(_) => true,
            Outcome::Failed(_) => false,
        }
    }
}

async fn extract(files: &[PathBuf], opts: &ExtractOptions, config: ExtractionConfig) -> Result<()> {
    let extractor =
        DocumentExtractor::new(config).context("Failed to initialise extraction client")?;
    let start = Instant::now();

    let bar = opts.show_progress.then(|| progress_bar(files.len() as u64));

    let mut outcomes: Vec<(usize, &PathBuf, Outcome)> = stream::iter(files.iter().enumerate())
        .map(|(idx, path)| {
            let extractor = &extractor;
            let bar = bar.as_ref();
            async move {
                let outcome = run_one(extractor, path, opts.text_only).await;
                if let Some(bar) = bar {
                    bar.inc(1);
                    bar.set_message(path.display().to_string());
                }
                (idx, path, outcome)
            }
        })
        .buffer_unordered(opts.concurrency.max(1))
        .collect()
        .await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    // Completion order is arbitrary; print in argument order.
    outcomes.sort_by_key(|(idx, _, _)| *idx);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let single = files.len() == 1;
    let mut failures = 0usize;

    for (_, path, outcome) in &outcomes {
        if !outcome.is_success() {
            failures += 1;
        }
        match outcome {
            Outcome::Envelope(result) => {
                let value = serde_json::to_value(result).context("Failed to serialise envelope")?;
                let value = if single {
                    value
                } else {
                    serde_json::json!({ "file": path.display().to_string(), "result": value })
                };
                let json = if opts.pretty {
                    serde_json::to_string_pretty(&value)
                } else {
                    serde_json::to_string(&value)
                }
                .context("Failed to serialise envelope")?;
                writeln!(handle, "{json}").context("Failed to write to stdout")?;
            }
            Outcome::Text(text) => {
                if !single {
                    writeln!(handle, "==> {} <==", path.display())
                        .context("Failed to write to stdout")?;
                }
                writeln!(handle, "{text}").context("Failed to write to stdout")?;
            }
            Outcome::Failed(detail) => {
                eprintln!("{} {}: {}", red("✗"), bold(&path.display().to_string()), detail);
            }
        }
    }
    handle.flush().context("Failed to write to stdout")?;

    if !opts.quiet {
        let mark = if failures == 0 { green("✔") } else { red("✗") };
        eprintln!(
            "{}  {}/{} files  {}",
            mark,
            outcomes.len() - failures,
            outcomes.len(),
            dim(&format!("{}ms", start.elapsed().as_millis())),
        );
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, outcomes.len());
    }
    Ok(())
}

async fn run_one(extractor: &DocumentExtractor, path: &Path, text_only: bool) -> Outcome {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return Outcome::Failed(format!("read failed: {e}")),
    };
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if text_only {
        let doc = UploadedDocument::new(filename, bytes);
        match extractor.extract_text(&doc).await {
            Ok(text) => Outcome::Text(text.normalized),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    } else {
        Outcome::Envelope(extractor.process(filename, bytes).await)
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  {msg:.dim}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Extracting");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
