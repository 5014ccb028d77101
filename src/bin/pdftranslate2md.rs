//! CLI binary for pdftranslate2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TranslationConfig`, runs a batch and prints the per-document results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdftranslate2md::{
    discover_inputs, BatchCoordinator, BatchItem, BatchStatus, BatchSummary, CancelFlag,
    PageFailurePolicy, PageSeparator, PdfiumExtractor, ProgressCallback, ProgressEvent,
    ProgressSink, ProgressStatus, TranslationConfig,
};
use std::io;
use std::path::PathBuf;
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

/// Shorten `s` to at most `max` characters.
fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() > max {
        let cut: String = first_line.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}\u{2026}")
    } else {
        first_line.to_string()
    }
}

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: one bar over documents, one log line per finished
/// document, and the current page in the bar message. Documents may finish
/// out of order when `--concurrency` is above 1.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total_documents: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total_documents as u64);
        bar.set_style(style);
        bar.set_prefix("Translating");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ProgressSink for CliProgress {
    fn on_event(&self, event: &ProgressEvent) {
        let id = &event.document_id;
        match &event.status {
            ProgressStatus::Started => {
                self.bar.println(format!(
                    "{} {}  {}",
                    cyan("◆"),
                    bold(id),
                    dim(&format!("{} pages", event.total_pages.unwrap_or(0)))
                ));
            }
            ProgressStatus::PageTranslated => {
                self.bar.set_message(format!(
                    "{id} page {}/{}",
                    event.page_index.unwrap_or(0),
                    event.total_pages.unwrap_or(0)
                ));
            }
            ProgressStatus::PagePlaceholder { reason } => {
                self.bar.println(format!(
                    "  {} {} page {}  {}",
                    yellow("⚠"),
                    id,
                    event.page_index.unwrap_or(0),
                    yellow(&truncate(reason, 80))
                ));
            }
            ProgressStatus::Completed => {
                self.bar.println(format!("  {} {}", green("✓"), id));
                self.bar.inc(1);
            }
            ProgressStatus::Skipped => {
                self.bar
                    .println(format!("  {} {}", dim("↷"), dim(&format!("{id} (exists)"))));
                self.bar.inc(1);
            }
            ProgressStatus::Failed { message } => {
                self.bar.println(format!(
                    "  {} {}  {}",
                    red("✗"),
                    id,
                    red(&truncate(message, 80))
                ));
                self.bar.inc(1);
            }
            ProgressStatus::Cancelled => {
                self.bar
                    .println(format!("  {} {}", dim("⊘"), dim(&format!("{id} (cancelled)"))));
                self.bar.inc(1);
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate one PDF into Japanese (the default) next to the current directory
  pdftranslate2md paper.pdf

  # Every PDF in a folder, German, two documents at a time
  pdftranslate2md papers/ -o translated/ -l de --concurrency 2

  # Re-translate even if the Markdown already exists
  pdftranslate2md papers/ -o translated/ --force

  # Use Claude and keep going when a page cannot be translated
  pdftranslate2md paper.pdf -p claude --on-page-error placeholder

  # Machine-readable batch report
  pdftranslate2md papers/ --json > report.json

SUPPORTED PROVIDERS:
  Provider     Default model               API key variable
  ─────────    ─────────────────────────   ─────────────────
  gemini       gemini-2.5-flash            GEMINI_API_KEY
  openai       gpt-4.1                     OPENAI_API_KEY
  anthropic    claude-3-7-sonnet-latest    ANTHROPIC_API_KEY   (alias: claude)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  PDFTRANSLATE_PROVIDER   Provider when --provider is not given
  PDFTRANSLATE_MODEL      Model when --model is not given
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override the log filter

  A .env file in the working directory is loaded before arguments are parsed.

OUTPUT:
  <output-dir>/<name>.md                      translated Markdown
  <image-dir>/<name>/page<N>_img<K>.png       extracted images
  (image-dir defaults to <output-dir>/images)
"#;

/// Translate PDF documents into Markdown with LLM providers.
#[derive(Parser, Debug)]
#[command(
    name = "pdftranslate2md",
    version,
    about = "Translate PDF documents into Markdown with LLM providers",
    long_about = "Translate PDF documents page by page into Markdown in another language using \
Gemini, OpenAI or Anthropic models. Heading levels are kept consistent across pages, numeric \
citations are linked to the bibliography, and embedded images are extracted and linked.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files and/or directories containing PDFs (not searched recursively).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the translated Markdown files.
    #[arg(short, long, env = "PDFTRANSLATE_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Directory for extracted images [default: <output-dir>/images].
    #[arg(short, long, env = "PDFTRANSLATE_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// LLM provider: gemini, openai, anthropic (alias: claude).
    #[arg(
        short,
        long,
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini, openai, anthropic (alias claude)."
    )]
    provider: Option<String>,

    /// Model ID [default: the provider's default model].
    #[arg(short, long)]
    model: Option<String>,

    /// Target language as an ISO 639-1 or 639-3 code (ja, de, fra, …).
    #[arg(short = 'l', long, env = "PDFTRANSLATE_TARGET_LANG", default_value = "ja")]
    target_lang: String,

    /// Overwrite Markdown files that already exist.
    #[arg(short, long, env = "PDFTRANSLATE_FORCE")]
    force: bool,

    /// Documents translated concurrently.
    #[arg(long, env = "PDFTRANSLATE_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    concurrency: u16,

    /// Attempts per page, including the first.
    #[arg(long, env = "PDFTRANSLATE_MAX_ATTEMPTS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..=20))]
    max_attempts: u32,

    /// Backoff after the first failed attempt, in milliseconds (doubles each time).
    #[arg(long, env = "PDFTRANSLATE_RETRY_DELAY_MS", default_value_t = 10_000)]
    retry_delay_ms: u64,

    /// Upper bound for one backoff delay, in milliseconds.
    #[arg(long, env = "PDFTRANSLATE_RETRY_MAX_DELAY_MS", default_value_t = 180_000)]
    retry_max_delay_ms: u64,

    /// Per-call provider timeout in seconds.
    #[arg(long, env = "PDFTRANSLATE_API_TIMEOUT", default_value_t = 500)]
    api_timeout: u64,

    /// What to do when a page cannot be translated.
    #[arg(long, env = "PDFTRANSLATE_ON_PAGE_ERROR", value_enum, default_value = "abort")]
    on_page_error: OnPageErrorArg,

    /// Page separator: none, hr, comment, label, or a custom string.
    #[arg(long, env = "PDFTRANSLATE_SEPARATOR", default_value = "hr")]
    separator: String,

    /// Do not extract embedded images.
    #[arg(long, env = "PDFTRANSLATE_NO_IMAGES")]
    no_images: bool,

    /// Keep the model's heading levels instead of deriving them from section numbers.
    #[arg(long, env = "PDFTRANSLATE_NO_SECTION_LEVELS")]
    no_section_levels: bool,

    /// Path to a text file containing a custom system prompt ({language} is substituted).
    #[arg(long, env = "PDFTRANSLATE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFTRANSLATE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max output tokens per page.
    #[arg(long, env = "PDFTRANSLATE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFTRANSLATE_PASSWORD")]
    password: Option<String>,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "PDFTRANSLATE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFTRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTRANSLATE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OnPageErrorArg {
    /// Fail the document; nothing is written.
    Abort,
    /// Insert a placeholder with the source text and continue.
    Placeholder,
}

impl From<OnPageErrorArg> for PageFailurePolicy {
    fn from(v: OnPageErrorArg) -> Self {
        match v {
            OnPageErrorArg::Abort => PageFailurePolicy::Abort,
            OnPageErrorArg::Placeholder => PageFailurePolicy::Placeholder,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // API keys usually live in .env; load it before clap reads `env = ...`.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    // The current page finishes; nothing partial is written.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        let quiet = cli.quiet;
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                if !quiet {
                    eprintln!("\n{} cancelling after the current page…", yellow("⊘"));
                }
                cancel.cancel();
            }
        });
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(|| CliProgress::new(discover_inputs(&cli.inputs).len()));
    let progress_cb = cli_progress
        .clone()
        .map(|p| p as ProgressCallback);

    let config = build_config(&cli, progress_cb, cancel.clone()).await?;

    let mut extractor = PdfiumExtractor::new();
    if let Some(ref password) = cli.password {
        extractor = extractor.with_password(password);
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let coordinator = BatchCoordinator::new(config, Arc::new(extractor));
    let items = coordinator
        .run_batch(&cli.inputs, &cli.output_dir, cli.force)
        .await;
    if let Some(ref p) = cli_progress {
        p.bar.finish_and_clear();
    }

    let summary = BatchSummary::from_items(&items);

    if cli.json {
        let report = serde_json::json!({ "items": items, "summary": summary });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&items, &summary);
    }

    if summary.has_failures() {
        anyhow::bail!(
            "{} of {} document(s) failed",
            summary.failed,
            summary.total
        );
    }
    if cancel.is_cancelled() {
        std::process::exit(130);
    }
    Ok(())
}

/// Every input with its final status; failures with kind and message.
fn print_summary(items: &[BatchItem], summary: &BatchSummary) {
    eprintln!();
    for item in items {
        let name = item.input_path.display().to_string();
        match item.status {
            BatchStatus::Completed => eprintln!(
                "{}  {}  →  {}  {}",
                green("✔"),
                name,
                bold(&item.output_path.display().to_string()),
                dim(&format!("{} pages, {:.1}s", item.pages, item.duration_ms as f64 / 1000.0)),
            ),
            BatchStatus::SkippedExisting => eprintln!(
                "{}  {}  {}",
                dim("↷"),
                name,
                dim("skipped: output exists (use --force)")
            ),
            BatchStatus::Cancelled => eprintln!("{}  {}  {}", dim("⊘"), name, dim("cancelled")),
            BatchStatus::Failed => {
                let (kind, message) = item
                    .error
                    .as_ref()
                    .map(|e| (format!("{:?}", e.kind), e.message.clone()))
                    .unwrap_or_else(|| ("Unknown".to_string(), String::new()));
                eprintln!("{}  {}  {}  {}", red("✘"), name, red(&kind), message);
            }
            BatchStatus::Pending | BatchStatus::InProgress => {
                eprintln!("{}  {}", dim("?"), name)
            }
        }
    }
    eprintln!(
        "\n{} completed, {} skipped, {} failed, {} cancelled  ({} pages)",
        bold(&summary.completed.to_string()),
        summary.skipped,
        if summary.failed > 0 {
            red(&summary.failed.to_string())
        } else {
            summary.failed.to_string()
        },
        summary.cancelled,
        summary.pages,
    );
}

/// Map CLI args to `TranslationConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelFlag,
) -> Result<TranslationConfig> {
    let mut builder = TranslationConfig::builder()
        .target_language(&cli.target_lang)
        .batch_concurrency(cli.concurrency as usize)
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_delay_ms)
        .retry_max_delay_ms(cli.retry_max_delay_ms.max(cli.retry_delay_ms))
        .api_timeout_secs(cli.api_timeout)
        .page_failure_policy(cli.on_page_error.clone().into())
        .page_separator(parse_separator(&cli.separator))
        .extract_images(!cli.no_images)
        .section_number_levels(!cli.no_section_levels)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .cancel_flag(cancel);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref dir) = cli.image_dir {
        builder = builder.image_dir(dir);
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

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        "label" | "page" => PageSeparator::PageLabel,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
