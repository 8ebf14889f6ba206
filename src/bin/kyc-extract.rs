//! CLI binary for kyc-ocr-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the merged record as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use kyc_ocr_extract::{
    process_file, DocumentType, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback,
    NamePolicy, ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    blanks: AtomicUsize,
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
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            blanks: AtomicUsize::new(0),
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
        self.bar.set_prefix("Extracting");
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
            cyan("◆"),
            bold(&format!("Reading {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, produced_fragment: bool) {
        let secs = self.elapsed_secs(page_num);
        let (mark, note) = if produced_fragment {
            (green("✓"), "data")
        } else {
            self.blanks.fetch_add(1, Ordering::SeqCst);
            (dim("·"), "blank")
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<6}  {}",
            mark,
            page_num,
            total,
            dim(note),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let blanks = self.blanks.load(Ordering::SeqCst);
        let failed = total_pages.saturating_sub(success_count + blanks);
        eprintln!(
            "{} {}/{} pages contributed  ({} blank, {} failed)",
            if success_count == 0 {
                red("✘")
            } else if failed > 0 {
                cyan("⚠")
            } else {
                green("✔")
            },
            bold(&success_count.to_string()),
            total_pages,
            blanks,
            failed,
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Acta constitutiva, JSON to stdout
  kyc-extract acta.pdf --type acta-constitutiva

  # Sanctions list to a file, with per-page diagnostics
  kyc-extract lpb.pdf --type lista-bloqueados -o lpb.json --stats

  # A single scanned page
  kyc-extract foto_acta.jpg --type acta-constitutiva

  # Another provider / model
  kyc-extract acta.pdf --type acta-constitutiva --provider anthropic --model claude-sonnet-4-20250514

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      OpenAI API key (default provider)
  KYC_LLM_PROVIDER    Provider override (openai, anthropic, gemini, ollama, …)
  KYC_MODEL           Model override (default: gpt-4o)
  PDFIUM_LIB_PATH     pdfium library file or directory (default: system library)
  RUST_LOG            Log filter, e.g. kyc_ocr_extract=debug
"#;

/// Extract KYC data from scanned Mexican legal documents using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "kyc-extract",
    version,
    about = "Extract KYC data from scanned actas constitutivas and sanctions lists",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF / PNG / JPEG path or HTTP/HTTPS URL.
    input: String,

    /// Document type: acta-constitutiva or lista-bloqueados.
    #[arg(short = 't', long = "type", env = "KYC_DOCUMENT_TYPE")]
    document_type: DocumentType,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "KYC_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID (default: gpt-4o).
    #[arg(long, env = "KYC_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "KYC_LLM_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "KYC_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "KYC_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Retries per page when no answer arrives.
    #[arg(long, env = "KYC_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-page model call timeout in seconds.
    #[arg(long, env = "KYC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Whole-document timeout in seconds.
    #[arg(long, env = "KYC_TIMEOUT")]
    timeout: Option<u64>,

    /// Fail the whole document if a page stays rate-limited.
    #[arg(long, env = "KYC_ABORT_ON_RATE_LIMIT")]
    abort_on_rate_limit: bool,

    /// Keep the first spelling of a partner's name instead of the longest.
    #[arg(long)]
    keep_first_name: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "KYC_PDF_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Emit the full output (record, per-page outcomes, stats) instead of the record.
    #[arg(long)]
    stats: bool,

    /// Disable progress bar.
    #[arg(long, env = "KYC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    let output = match process_file(&cli.input, cli.document_type, &config).await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("extraction failed: {e}");
            eprintln!("{} {}", red("✘"), e.user_message());
            if cli.verbose {
                eprintln!("  {}", dim(&e.to_string()));
            }
            std::process::exit(1);
        }
    };

    let json = if cli.stats {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string_pretty(&output.record)
    }
    .context("Failed to serialise output")?;

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &json).await?;
            if !cli.quiet {
                print_summary(&output, Some(path.as_path()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")?;
            if !cli.quiet && !show_progress {
                print_summary(&output, None);
            }
        }
    }

    Ok(())
}

fn print_summary(output: &ExtractionOutput, path: Option<&Path>) {
    let stats = &output.stats;
    let target = path
        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
        .unwrap_or_default();
    eprintln!(
        "{}  {}/{} pages  {}ms{}",
        if stats.failed_pages == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.extracted_pages,
        stats.total_pages,
        stats.total_duration_ms,
        target,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

/// Write via a temp file in the same directory, then rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move output into {}", path.display()))?;
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .abort_on_rate_limit(cli.abort_on_rate_limit)
        .name_policy(if cli.keep_first_name {
            NamePolicy::KeepFirst
        } else {
            NamePolicy::PreferLonger
        });

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.document_timeout_secs(secs);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
