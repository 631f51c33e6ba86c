//! CLI binary for pdf-scribe.
//!
//! A thin shim over the library crate: maps flags to `ConversionConfig`,
//! runs a local PDF through the pipeline or a `gs://` URI through the
//! extraction service, and prints the Markdown.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_scribe::convert::document_stem;
use pdf_scribe::storage::GsUri;
use pdf_scribe::{
    extract_text_from_uri, save_markdown, CleanupReport, ConversionConfig, DocumentPipeline,
    ExtractionProgress, GcsBucket, ProgressCallback,
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

/// Live progress bar plus one log line per page. Pages finish out of order,
/// so start times are keyed by page index.
struct CliProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
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
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgress for CliProgress {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting text from {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_index, Instant::now());
        }
        self.bar.set_message(format!("page {}", page_index + 1));
    }

    fn on_page_complete(&self, page_index: usize, total: usize, chars: usize) {
        let secs = self.elapsed_secs(page_index);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_index + 1,
            total,
            dim(&format!("{chars:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, succeeded: usize) {
        let failed = total_pages.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} empty)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }

    fn on_cleanup(&self, report: &CleanupReport) {
        if !report.is_clean() {
            eprintln!(
                "{} {} scratch path(s) could not be removed",
                cyan("⚠"),
                report.failures.len()
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local PDF, Markdown to stdout
  scribe document.pdf

  # Write <stem>.md into a directory
  scribe document.pdf -o out/

  # PDF stored in Google Cloud Storage
  GOOGLE_OAUTH_ACCESS_TOKEN=$(gcloud auth print-access-token) \
    scribe gs://my-bucket/reports/q3.pdf --json

  # Specific provider and model
  scribe --provider openai --model gpt-4.1-mini scan.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY             Google Gemini API key (default provider)
  OPENAI_API_KEY             OpenAI API key
  ANTHROPIC_API_KEY          Anthropic API key
  EDGEQUAKE_LLM_PROVIDER     Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL            Override model ID
  GOOGLE_CLOUD_BUCKET        Bucket to read gs:// objects from
  GOOGLE_OAUTH_ACCESS_TOKEN  Bearer token for Cloud Storage requests
  STORAGE_EMULATOR_HOST      Cloud Storage endpoint override
  PDFIUM_LIB_PATH            Path to libpdfium (else the system library)
"#;

/// Extract the text of PDF documents as Markdown using vision models.
#[derive(Parser, Debug)]
#[command(
    name = "scribe",
    version,
    about = "Extract the text of PDF documents as Markdown using vision models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path or gs://bucket/object URI.
    input: String,

    /// Directory to write `<stem>.md` into, instead of stdout.
    #[arg(short, long, env = "SCRIBE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Vision model ID (default depends on the provider).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Longest edge of a rendered page, in pixels.
    #[arg(long, env = "SCRIBE_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Number of concurrent OCR calls.
    #[arg(short, long, env = "SCRIBE_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Max output tokens per page.
    #[arg(long, env = "SCRIBE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "SCRIBE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Attempts per page, including the first.
    #[arg(long, env = "SCRIBE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[arg(long, env = "SCRIBE_INITIAL_BACKOFF_MS", default_value_t = 500)]
    initial_backoff_ms: u64,

    /// Disable random jitter on retry delays.
    #[arg(long, env = "SCRIBE_NO_JITTER")]
    no_jitter: bool,

    /// Per-call timeout in seconds (0 disables).
    #[arg(long, env = "SCRIBE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Whole-document extraction deadline in seconds.
    #[arg(long, env = "SCRIBE_DOCUMENT_TIMEOUT")]
    document_timeout: Option<u64>,

    /// Prompt template name.
    #[arg(long, env = "SCRIBE_PROMPT", default_value = "extract_text_from_image")]
    prompt: String,

    /// Directory holding `<name>.txt` prompt templates.
    #[arg(long, env = "SCRIBE_TEMPLATES_DIR")]
    templates_dir: Option<PathBuf>,

    /// Tidy extracted blocks: trim whitespace, repair tables, strip invisible characters.
    #[arg(long, env = "SCRIBE_TIDY")]
    tidy: bool,

    /// Root for scratch page images.
    #[arg(long, env = "SCRIBE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Bucket for gs:// inputs (defaults to the bucket named in the URI).
    #[arg(long, env = "GOOGLE_CLOUD_BUCKET")]
    bucket: Option<String>,

    /// Print JSON instead of Markdown.
    #[arg(long, env = "SCRIBE_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "SCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCRIBE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn ExtractionProgress>)
    } else {
        None
    };

    let config = build_config(&cli, progress)?;
    let pipeline = DocumentPipeline::from_config(config);

    if cli.input.starts_with(GsUri::SCHEME) {
        run_remote(&cli, &pipeline).await
    } else {
        run_local(&cli, &pipeline).await
    }
}

async fn run_local(cli: &Cli, pipeline: &DocumentPipeline) -> Result<()> {
    let output = pipeline
        .convert(Path::new(&cli.input), cli.output_dir.as_deref())
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if output.output_path.is_none() {
        print_markdown(&output.markdown)?;
    }

    if !cli.quiet && !cli.json {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} pages  {} retries  {}ms{}",
            if stats.failed_pages == 0 { green("✔") } else { cyan("⚠") },
            stats.succeeded_pages,
            stats.total_pages,
            stats.total_retries,
            stats.total_duration_ms,
            output
                .output_path
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn run_remote(cli: &Cli, pipeline: &DocumentPipeline) -> Result<()> {
    // The URI is validated again by the service; here it only names the bucket.
    let bucket_name = match (&cli.bucket, GsUri::parse(&cli.input)) {
        (Some(name), _) => name.clone(),
        (None, Ok(uri)) => uri.bucket,
        (None, Err(e)) => return Err(e).context("Invalid URI"),
    };
    let store = GcsBucket::from_env(bucket_name).context("Failed to configure Cloud Storage")?;

    let response = extract_text_from_uri(&cli.input, &store, pipeline)
        .await
        .map_err(|e| anyhow::anyhow!("{} (status {})", e, e.status_code()))?;

    if let Some(ref dir) = cli.output_dir {
        let stem = GsUri::parse(&response.uri)
            .map(|u| document_stem(Path::new(u.file_name())))
            .unwrap_or_else(|_| "document".to_string());
        let path = save_markdown(dir, &stem, &response.markdown)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&response).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output_dir.is_none() {
        print_markdown(&response.markdown)?;
    }
    Ok(())
}

fn print_markdown(markdown: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(markdown.as_bytes())
        .context("Failed to write to stdout")?;
    if !markdown.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_attempts(cli.max_attempts)
        .initial_backoff_ms(cli.initial_backoff_ms)
        .jitter(!cli.no_jitter)
        .api_timeout_secs((cli.api_timeout > 0).then_some(cli.api_timeout))
        .document_timeout_secs(cli.document_timeout)
        .prompt_template(cli.prompt.clone())
        .tidy(cli.tidy);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref dir) = cli.templates_dir {
        builder = builder.templates_dir(dir.clone());
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
