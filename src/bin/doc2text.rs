//! CLI binary for edgequake-doc2text.
//!
//! A thin shim over the library crate: `serve` runs the HTTP API, `convert`
//! and `process` run one document through the same service from the shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use edgequake_doc2text::pipeline::input::is_url;
use edgequake_doc2text::server::{create_router, AppState, DEFAULT_UPLOAD_LIMIT};
use edgequake_doc2text::{
    DocumentService, PageRenderer, PdfiumRenderer, PdftoppmRenderer, PipelineConfig,
    PipelineProgress, ProgressCallback, SofficeConverter, SourceDocument, VisionConfig,
    VisionExtractor,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while pages are rendered, then a bar once the page count is known.
/// Pages may finish out of order.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Converting to PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgress for CliProgress {
    fn on_run_start(&self, name: &str) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message(name.to_string());
    }

    fn on_page_rendered(&self, page_num: usize) {
        self.bar.inc_length(1);
        self.bar.set_message(format!("page {page_num} rendered"));
    }

    fn on_extraction_start(&self, _concurrency: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
    }

    fn on_page_extracted(&self, page_num: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page_num,
            dim(&format!("{text_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages extracted",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API on port 8080
  doc2text serve --bind 0.0.0.0:8080

  # Convert a presentation to PDF
  doc2text convert slides.pptx -o slides.pdf

  # Extract page text (stdout), keep the PDF too
  doc2text process report.docx --pdf-out report.pdf

  # Full JSON output, as returned by POST /process
  doc2text process https://example.org/memo.odt --json

HTTP API:
  POST /convert           multipart field "file" → PDF
  POST /process           multipart field "file" → {jobId, originalName, markdown,
                                                     markdownBase64, downloadUrl}
  GET  /download/:job_id  PDF, once, within 15 minutes
  GET  /health            status and live job count

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (e.g. edgequake_doc2text=debug)

REQUIREMENTS:
  LibreOffice (`soffice`) for non-PDF input, and either libpdfium or
  poppler's `pdftoppm` for rendering.
"#;

/// Turn office documents into page-ordered text using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "doc2text",
    version,
    about = "Turn office documents into page-ordered text using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOC2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOC2TEXT_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOC2TEXT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "DOC2TEXT_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Prefix for download URLs (e.g. https://docs.example.com).
        #[arg(long, env = "DOC2TEXT_PUBLIC_URL")]
        public_url: Option<String>,

        /// Largest accepted upload in MiB.
        #[arg(long, env = "DOC2TEXT_UPLOAD_LIMIT_MB", default_value_t = DEFAULT_UPLOAD_LIMIT / (1024 * 1024))]
        upload_limit_mb: usize,
    },

    /// Convert a document to PDF.
    Convert {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Where to write the PDF. Default: <input stem>.pdf
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract page text from a document.
    Process {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Write the text to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the PDF the text was extracted from.
        #[arg(long)]
        pdf_out: Option<PathBuf>,

        /// Print the full JSON result instead of the text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
struct PipelineArgs {
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Pages beyond this are ignored.
    #[arg(long, global = true, env = "DOC2TEXT_MAX_PAGES", default_value_t = 10)]
    max_pages: usize,

    /// Number of concurrent extraction calls.
    #[arg(short, long, global = true, env = "DOC2TEXT_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Rendering DPI (72–600).
    #[arg(long, global = true, env = "DOC2TEXT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page rendering backend.
    #[arg(long, global = true, env = "DOC2TEXT_RENDERER", value_enum, default_value = "pdfium")]
    renderer: RendererArg,

    /// Directory containing libpdfium. Default: system library path.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// LibreOffice executable.
    #[arg(long, global = true, env = "DOC2TEXT_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Scratch and job storage directory. Default: <tmp>/doc2text
    #[arg(long, global = true, env = "DOC2TEXT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "DOC2TEXT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, global = true, env = "DOC2TEXT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "DOC2TEXT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, global = true, env = "DOC2TEXT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Document conversion timeout in seconds.
    #[arg(long, global = true, env = "DOC2TEXT_CONVERT_TIMEOUT", default_value_t = 120)]
    convert_timeout: u64,

    /// HTTP download timeout in seconds (URL input).
    #[arg(long, global = true, env = "DOC2TEXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RendererArg {
    Pdfium,
    Pdftoppm,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The server always logs at info; one-shot commands stay quiet while the
    // progress bar is up.
    let serving = matches!(cli.command, Command::Serve { .. });
    let json = matches!(cli.command, Command::Process { json: true, .. });
    let show_progress = !serving && !cli.quiet && !cli.no_progress && !json;
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

    match &cli.command {
        Command::Serve {
            bind,
            public_url,
            upload_limit_mb,
        } => serve(&cli, *bind, public_url.clone(), *upload_limit_mb).await,
        Command::Convert { input, output } => convert(&cli, input, output.as_deref()).await,
        Command::Process {
            input,
            output,
            pdf_out,
            json,
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgress::new() as Arc<dyn PipelineProgress>)
            } else {
                None
            };
            process(&cli, input, output.as_deref(), pdf_out.as_deref(), *json, progress).await
        }
    }
}

fn build_config(args: &PipelineArgs, public_url: Option<String>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_pages(args.max_pages)
        .concurrency(args.concurrency)
        .dpi(args.dpi)
        .convert_timeout_secs(args.convert_timeout);
    if let Some(ref dir) = args.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(url) = public_url {
        builder = builder.public_base_url(url);
    }
    builder.build().context("Invalid configuration")
}

fn build_vision(args: &PipelineArgs) -> Result<VisionExtractor> {
    let system_prompt = match args.system_prompt {
        Some(ref path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?,
        ),
        None => None,
    };
    let config = VisionConfig {
        model: args.model.clone(),
        provider_name: args.provider.clone(),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        system_prompt,
        api_timeout_secs: args.api_timeout,
        ..Default::default()
    };
    VisionExtractor::from_config(config).context("Failed to set up the vision provider")
}

fn build_service(
    args: &PipelineArgs,
    config: PipelineConfig,
    extractor: Option<VisionExtractor>,
    progress: Option<ProgressCallback>,
) -> Result<DocumentService> {
    let renderer: Arc<dyn PageRenderer> = match (args.renderer, &args.pdfium_lib) {
        (RendererArg::Pdftoppm, _) => Arc::new(PdftoppmRenderer::default()),
        (RendererArg::Pdfium, Some(dir)) => Arc::new(PdfiumRenderer::with_library_dir(dir)),
        (RendererArg::Pdfium, None) => Arc::new(PdfiumRenderer::new()),
    };
    let converter = SofficeConverter::new(Duration::from_secs(config.convert_timeout_secs))
        .with_program(&args.soffice);

    let mut builder = DocumentService::builder(config)
        .converter(Arc::new(converter))
        .renderer(renderer);
    if let Some(extractor) = extractor {
        builder = builder.extractor(Arc::new(extractor));
    }
    if let Some(progress) = progress {
        builder = builder.progress(progress);
    }
    builder.build().context("Failed to build document service")
}

async fn load_input(input: &str, download_timeout: u64) -> Result<SourceDocument> {
    let doc = if is_url(input) {
        SourceDocument::from_url(input, download_timeout).await
    } else {
        SourceDocument::from_path(input).await
    };
    doc.with_context(|| format!("Failed to load {input}"))
}

async fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(p) => tokio::fs::write(p, bytes)
            .await
            .with_context(|| format!("Failed to write {}", p.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

async fn convert(cli: &Cli, input: &str, output: Option<&Path>) -> Result<()> {
    let config = build_config(&cli.pipeline, None)?;
    let service = build_service(&cli.pipeline, config, None, None)?;
    let doc = load_input(input, cli.pipeline.download_timeout).await?;

    let pdf = service
        .convert_and_return(&doc)
        .await
        .context("Conversion failed")?;

    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&pdf.filename));
    write_output(Some(&dest), &pdf.bytes).await?;
    if !cli.quiet {
        eprintln!("{} Wrote {}", green("✔"), bold(&dest.display().to_string()));
    }
    Ok(())
}

async fn process(
    cli: &Cli,
    input: &str,
    output: Option<&Path>,
    pdf_out: Option<&Path>,
    json: bool,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let config = build_config(&cli.pipeline, None)?;
    let extractor = build_vision(&cli.pipeline)?;
    let service = build_service(&cli.pipeline, config, Some(extractor), progress)?;
    let doc = load_input(input, cli.pipeline.download_timeout).await?;

    let mut result = service
        .process_and_extract(&doc)
        .await
        .context("Processing failed")?;

    match pdf_out {
        Some(path) => {
            let pdf = service.download_job(&result.job_id).await?;
            write_output(Some(path), &pdf.bytes).await?;
        }
        // Nobody can download it once this process exits.
        None => {
            service.jobs().purge().await;
        }
    }
    // Either way the job is gone, so there is no URL to hand out.
    result.download_url.clear();

    if json {
        let body = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        write_output(output, format!("{body}\n").as_bytes()).await
    } else {
        write_output(output, result.markdown.as_bytes()).await
    }
}

async fn serve(cli: &Cli, bind: SocketAddr, public_url: Option<String>, upload_limit_mb: usize) -> Result<()> {
    let config = build_config(&cli.pipeline, public_url)?;
    let sweep_every = config.sweep_interval;
    let extractor = build_vision(&cli.pipeline)?;
    let service = Arc::new(build_service(&cli.pipeline, config, Some(extractor), None)?);

    let sweeper = service.jobs().spawn_sweeper(sweep_every);
    let app = create_router(AppState::new(Arc::clone(&service)), upload_limit_mb * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
        })
        .await?;

    sweeper.abort();
    let purged = service.jobs().purge().await;
    info!("Server stopped cleanly ({} pending job(s) removed)", purged);
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
