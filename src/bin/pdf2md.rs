//! CLI binary for pdf2md-cascade.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ParseConfig`, runs one or many documents, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2md_cascade::convert::write_atomic;
use pdf2md_cascade::pipeline::input::output_stems;
use pdf2md_cascade::{
    convert_with_history, Backend, EnhanceTask, GuidanceVariant, LocalMethod, ParseConfig,
    ParseHistory, ParseOutput, ParsePolicy, ParseProgressCallback, Pdf2MdError, ProgressCallback,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per attempt. Shared across a batch run.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ParseProgressCallback for CliProgressCallback {
    fn on_parse_start(&self, document: &str) {
        self.bar.reset_elapsed();
        self.bar.set_prefix(document.to_string());
        self.bar.set_message("starting");
    }

    fn on_attempt_start(&self, backend: Backend, attempt: u32) {
        self.bar.set_message(format!("{backend} (attempt {attempt})"));
    }

    fn on_attempt_success(&self, backend: Backend, attempt: u32, content_len: usize) {
        self.bar.println(format!(
            "  {} {:<20} #{}  {}",
            green("✓"),
            backend.as_str(),
            attempt,
            dim(&format!("{content_len} chars")),
        ));
    }

    fn on_attempt_failure(&self, backend: Backend, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} {:<20} #{}  {}",
            red("✗"),
            backend.as_str(),
            attempt,
            red(&truncate(error, 80)),
        ));
    }

    fn on_fallback(&self, from: Backend, to: Backend, reason: &str) {
        self.bar.println(format!(
            "  {} {} → {}  {}",
            yellow("↪"),
            from,
            to,
            dim(reason)
        ));
    }

    fn on_parse_complete(&self, success: bool, method: &str) {
        let mark = if success { green("✔") } else { red("✘") };
        self.bar.println(format!("{mark} {}", bold(method)));
    }
}

fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() > max {
        let cut: String = first_line.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        first_line.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Remote parse with local fallback (stdout)
  LLAMA_CLOUD_API_KEY=llx-... pdf2md article.pdf

  # Local only, tables first, no converter
  pdf2md --policy local-only --methods text+tables,plain-text --no-converter article.pdf

  # Remote only, faithful guidance, 5-page chunks
  pdf2md --policy remote-only --guidance faithful --chunking --pages-per-chunk 5 paper.pdf

  # Batch: every PDF in a directory into out/
  pdf2md papers/ -o out/

  # Clean up local output with a model, YAML front matter
  pdf2md --policy local-only --enhance medical --metadata study.pdf -o study.md

  # Structured JSON (result, attempt log, stats)
  pdf2md --json article.pdf > article.json

POLICIES:
  adaptive     remote first; content-policy and quota failures fall back
               to local at once, transient failures retry first (default)
  remote-only  remote only; any terminal remote failure is an error
  local-only   never contacts the remote service

ENVIRONMENT VARIABLES:
  LLAMA_CLOUD_API_KEY     Remote parse service key (enables the remote stage)
  PDF2MD_REMOTE_BASE_URL  Remote service base URL
  EDGEQUAKE_LLM_PROVIDER  Provider for enhancement / OCR (openai, gemini, …)
  EDGEQUAKE_MODEL         Model for enhancement / OCR
  GEMINI_API_KEY          Selects gemini for enhancement / OCR when set
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Overrides the log filter
"#;

/// Convert PDF articles to Markdown through remote, local and OCR backends.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md",
    version,
    about = "Convert PDF articles to Markdown with classified remote/local fallback",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files, HTTP/HTTPS URLs, or directories of PDFs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (single input) or directory (batch).
    #[arg(short, long, env = "PDF2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Backend policy: adaptive, remote-only, local-only.
    #[arg(long, env = "PDF2MD_POLICY", default_value = "adaptive",
          value_parser = ParsePolicy::from_str)]
    policy: ParsePolicy,

    /// Remote parse service API key.
    #[arg(long, env = "LLAMA_CLOUD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Remote parse service base URL.
    #[arg(long, env = "PDF2MD_REMOTE_BASE_URL",
          default_value = "https://api.cloud.llamaindex.ai")]
    base_url: String,

    /// Multimodal model used by the remote service.
    #[arg(long, env = "PDF2MD_MODEL", default_value = "gemini-2.0-flash")]
    model: String,

    /// Guidance for the remote model: paraphrase, faithful.
    #[arg(long, env = "PDF2MD_GUIDANCE", default_value = "paraphrase",
          value_parser = GuidanceVariant::from_str, conflicts_with = "guidance_file")]
    guidance: GuidanceVariant,

    /// Read custom remote guidance from a text file.
    #[arg(long, env = "PDF2MD_GUIDANCE_FILE")]
    guidance_file: Option<PathBuf>,

    /// Retry budget for transient remote failures.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Fixed delay between remote retries, in milliseconds.
    #[arg(long, env = "PDF2MD_RETRY_BACKOFF_MS", default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// Submit the document to the remote service in page chunks.
    #[arg(long, env = "PDF2MD_CHUNKING")]
    chunking: bool,

    /// Pages per remote chunk.
    #[arg(long, env = "PDF2MD_PAGES_PER_CHUNK", default_value_t = 10)]
    pages_per_chunk: usize,

    /// Local methods in order: plain-text, text+tables, text+images.
    #[arg(long, env = "PDF2MD_METHODS", value_delimiter = ',',
          value_parser = LocalMethod::from_str,
          default_value = "text+tables,text+images,plain-text")]
    methods: Vec<LocalMethod>,

    /// Skip the external converter step.
    #[arg(long, env = "PDF2MD_NO_CONVERTER")]
    no_converter: bool,

    /// External converter program (reads PDF on stdin, writes Markdown).
    #[arg(long, env = "PDF2MD_CONVERTER", default_value = "markitdown")]
    converter: String,

    /// Rewrite local output with a model: format, summarize, medical.
    #[arg(long, env = "PDF2MD_ENHANCE", value_parser = EnhanceTask::from_str)]
    enhance: Option<EnhanceTask>,

    /// Characters of local text sent to the enhancer.
    #[arg(long, env = "PDF2MD_ENHANCE_MAX_CHARS", default_value_t = 10_000)]
    enhance_max_chars: usize,

    /// Local output shorter than this triggers the OCR fallback.
    #[arg(long, env = "PDF2MD_MIN_CHARS", default_value_t = 1000)]
    min_chars: usize,

    /// Disable the OCR fallback for scanned documents.
    #[arg(long, env = "PDF2MD_NO_OCR")]
    no_ocr: bool,

    /// Pages rendered for OCR.
    #[arg(long, env = "PDF2MD_OCR_MAX_PAGES", default_value_t = 3)]
    ocr_max_pages: usize,

    /// Longest side of a rendered OCR page, in pixels.
    #[arg(long, env = "PDF2MD_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Provider for enhancement and OCR: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Temperature for enhancement and OCR (0.0-2.0).
    #[arg(long, env = "PDF2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens for enhancement and OCR.
    #[arg(long, env = "PDF2MD_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Remote job poll interval in milliseconds.
    #[arg(long, env = "PDF2MD_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Remote job timeout in seconds.
    #[arg(long, env = "PDF2MD_REMOTE_TIMEOUT", default_value_t = 600)]
    remote_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2MD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Prepend YAML front matter (title, parsed_by, model, date, time).
    #[arg(long, env = "PDF2MD_METADATA")]
    metadata: bool,

    /// Title for the front matter (default: converter heading or file stem).
    #[arg(long)]
    title: Option<String>,

    /// Return a placeholder document instead of an error when every local
    /// method fails.
    #[arg(long, env = "PDF2MD_MASK_LOCAL_FAILURE")]
    mask_local_failure: bool,

    /// Output structured JSON (ParseOutput) instead of Markdown.
    #[arg(long, env = "PDF2MD_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Print the full error chain on failure.
    #[arg(long, env = "PDF2MD_DEBUG")]
    debug: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; --verbose always wins.
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

    let inputs = expand_inputs(&cli.inputs)?;
    if inputs.is_empty() {
        anyhow::bail!("No PDF files found in {:?}", cli.inputs);
    }
    let batch = inputs.len() > 1 || cli.inputs.iter().any(|i| Path::new(i).is_dir());

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback)).await?;

    let mut history = ParseHistory::default();
    let mut outputs: Vec<ParseOutput> = Vec::new();
    let mut failures = 0usize;

    let stems = output_stems(&inputs);
    for (input, stem) in inputs.iter().zip(&stems) {
        match convert_with_history(input, &config, &mut history).await {
            Ok(output) => {
                emit(&cli, stem, &output, batch).await?;
                if cli.json {
                    outputs.push(output);
                }
            }
            Err(e) => {
                failures += 1;
                report_error(input, &e, cli.debug, progress.as_deref());
            }
        }
    }

    if let Some(p) = &progress {
        p.finish();
    }

    if cli.json {
        let json = match (batch, outputs.first()) {
            (true, _) => serde_json::to_string_pretty(&outputs),
            (false, Some(o)) => serde_json::to_string_pretty(o),
            (false, None) => Ok(String::new()),
        }
        .context("Failed to serialise output")?;
        if !json.is_empty() {
            println!("{json}");
        }
    }

    if batch && !cli.quiet {
        print_history(&history);
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Write one document's Markdown to its destination.
async fn emit(cli: &Cli, stem: &str, output: &ParseOutput, batch: bool) -> Result<()> {
    let destination = match (&cli.output, batch) {
        (Some(dir), true) => Some(dir.join(format!("{stem}.md"))),
        (Some(file), false) => Some(file.clone()),
        (None, true) => Some(PathBuf::from(format!("{stem}.md"))),
        (None, false) => None,
    };

    match destination {
        Some(path) => {
            write_atomic(&path, &output.markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {}  {} words  {}ms  →  {}",
                    green("✔"),
                    output.method(),
                    output.stats.word_count,
                    output.stats.elapsed_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None if cli.json => {}
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            if !cli.quiet {
                eprintln!(
                    "{}  {}  {} words  {}ms",
                    dim("parsed by"),
                    output.method(),
                    output.stats.word_count,
                    output.stats.elapsed_ms
                );
            }
        }
    }
    Ok(())
}

/// One message line plus a remediation hint; the full chain with --debug.
fn report_error(input: &str, err: &Pdf2MdError, debug: bool, progress: Option<&CliProgressCallback>) {
    let text = if debug {
        let mut text = format!("{} {}: {}", red("✘"), input, err);
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            text.push_str(&format!("\n  caused by: {cause}"));
            source = cause.source();
        }
        text
    } else {
        let headline = err.to_string();
        let mut line = format!(
            "{} {}: {}",
            red("✘"),
            input,
            headline.lines().next().unwrap_or_default()
        );
        if let Pdf2MdError::ExtractionFailed { kind, .. } = err {
            line.push_str(&format!("\n  {} {}", yellow("hint:"), kind.remediation()));
        }
        line
    };
    match progress {
        Some(p) => p.bar.println(text),
        None => eprintln!("{text}"),
    }
}

fn print_history(history: &ParseHistory) {
    eprintln!("\n{}", bold("Recent parses"));
    for r in history.iter() {
        eprintln!(
            "  {} {:<40} {:<24} {:>6.2}s",
            if r.success { green("✓") } else { red("✗") },
            r.filename,
            r.method,
            r.elapsed_secs
        );
    }
}

/// Files and URLs pass through; directories expand to their PDFs, sorted.
fn expand_inputs(inputs: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let mut pdfs: Vec<String> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {input}"))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .map(|e| e.eq_ignore_ascii_case("pdf"))
                            .unwrap_or(false)
                })
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            pdfs.sort();
            out.extend(pdfs);
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}

/// Map CLI args to `ParseConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ParseConfig> {
    let guidance = match &cli.guidance_file {
        Some(path) => GuidanceVariant::Custom(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read guidance from {:?}", path))?,
        ),
        None => cli.guidance.clone(),
    };

    let mut builder = ParseConfig::builder()
        .policy(cli.policy)
        .model_id(&cli.model)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .chunking(cli.chunking)
        .pages_per_chunk(cli.pages_per_chunk)
        .guidance(guidance)
        .local_methods(cli.methods.clone())
        .use_converter(!cli.no_converter)
        .converter_program(&cli.converter)
        .enhance(cli.enhance)
        .enhance_max_chars(cli.enhance_max_chars)
        .min_plausible_chars(cli.min_chars)
        .ocr_fallback(!cli.no_ocr)
        .ocr_max_pages(cli.ocr_max_pages)
        .max_rendered_pixels(cli.max_pixels)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .remote_base_url(&cli.base_url)
        .remote_poll_interval_ms(cli.poll_interval_ms)
        .remote_timeout_secs(cli.remote_timeout)
        .download_timeout_secs(cli.download_timeout)
        .include_metadata(cli.metadata)
        .mask_local_failure(cli.mask_local_failure);

    if let Some(key) = &cli.api_key {
        builder = builder.remote_api_key(key);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(password) = &cli.password {
        builder = builder.password(password);
    }
    if let Some(title) = &cli.title {
        builder = builder.title(title);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
