//! CLI binary for pdf2broll.
//!
//! A thin shim over the library crate: `serve` runs the HTTP upload service,
//! `generate` runs one PDF through the pipeline with a progress bar, and
//! `inspect` shows what would be sent to the image model without calling it.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2broll::{
    inspect, server, FailurePolicy, PipelineConfig, ProgressCallback, ServerConfig, StoryPipeline,
    StoryProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

/// Live progress bar plus one log line per segment. Segments complete out of
/// order, so start times are tracked per index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
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
             [{bar:42.green/238}] {pos:>2}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
    }

    fn elapsed_secs(&self, segment: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&segment)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl StoryProgressCallback for CliProgressCallback {
    fn on_story_start(&self, total_segments: usize) {
        self.activate_bar(total_segments);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Generating {total_segments} images…"))
        ));
    }

    fn on_asset_start(&self, segment: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(segment, Instant::now());
        self.bar.set_message(format!("segment {segment}"));
    }

    fn on_asset_complete(&self, segment: usize, total: usize, bytes: usize) {
        let secs = self.elapsed_secs(segment);
        self.bar.println(format!(
            "  {} Segment {}/{}  {:<10}  {}",
            green("✓"),
            segment,
            total,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_asset_error(&self, segment: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(segment);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Segment {}/{}  {}  {}",
            red("✗"),
            segment,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_story_complete(&self, total_segments: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images generated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images generated  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_segments,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the upload service on :8001 (CORS for http://localhost:3000)
  pdf2broll serve

  # Illustrate a local story
  pdf2broll generate story.pdf

  # See the segments without calling a provider
  pdf2broll inspect story.pdf

  curl -F file=@story.pdf http://localhost:8001/upload

ENVIRONMENT VARIABLES:
  HUGGING_FACE_TOKEN   Hugging Face token (Stable Diffusion XL, default provider)
  OPENAI_API_KEY       OpenAI key (used when no Hugging Face token is set)
  RUST_LOG             Overrides the log filter, e.g. pdf2broll=debug

  Every flag also reads a PDF2BROLL_* variable; a .env file is loaded first.
"#;

/// Turn PDF stories into b-roll images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2broll",
    version,
    about = "Turn PDF stories into b-roll images via an image-generation model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2BROLL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2BROLL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP upload service.
    Serve {
        /// Socket address to bind.
        #[arg(long, env = "PDF2BROLL_BIND", default_value = "0.0.0.0:8001")]
        bind: String,

        /// Allowed CORS origin; `*` allows any.
        #[arg(long, env = "PDF2BROLL_CORS_ORIGIN", default_value = "http://localhost:3000")]
        cors_origin: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Generate b-roll for a local PDF.
    Generate {
        /// Local PDF file path.
        input: PathBuf,

        /// Print the full story output as JSON.
        #[arg(long, env = "PDF2BROLL_JSON")]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "PDF2BROLL_NO_PROGRESS")]
        no_progress: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show page count, text size and segments; no provider call.
    Inspect {
        /// Local PDF file path.
        input: PathBuf,

        /// Print the inspection as JSON.
        #[arg(long, env = "PDF2BROLL_JSON")]
        json: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// Image provider: huggingface, openai.
    #[arg(
        long,
        env = "PDF2BROLL_PROVIDER",
        long_help = "Image provider. Auto-detected from HUGGING_FACE_TOKEN, then OPENAI_API_KEY, if not set."
    )]
    provider: Option<String>,

    /// Model ID: a Hugging Face model path or an OpenAI model (default dall-e-3).
    #[arg(long, env = "PDF2BROLL_MODEL")]
    model: Option<String>,

    /// Override the provider endpoint URL.
    #[arg(long, env = "PDF2BROLL_ENDPOINT")]
    endpoint: Option<String>,

    /// Number of concurrent image calls.
    #[arg(short, long, env = "PDF2BROLL_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Number of story segments.
    #[arg(long, env = "PDF2BROLL_SEGMENTS", default_value_t = 5)]
    segments: usize,

    /// Per-call timeout in seconds.
    #[arg(long, env = "PDF2BROLL_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Retries per segment on provider failure.
    #[arg(long, env = "PDF2BROLL_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Initial retry delay in milliseconds.
    #[arg(long, env = "PDF2BROLL_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Cancel the remaining segments as soon as one fails.
    #[arg(long, env = "PDF2BROLL_ABORT_ON_FAILURE")]
    abort_on_failure: bool,

    /// Prompt template; `{text}` is replaced by the segment.
    #[arg(long, env = "PDF2BROLL_PROMPT")]
    prompt: Option<String>,

    /// Root directory for story output.
    #[arg(long, env = "PDF2BROLL_STORIES_DIR", default_value = "stories")]
    stories_dir: PathBuf,

    /// Directory for upload temp files.
    #[arg(long, env = "PDF2BROLL_SCRATCH_DIR", default_value = "extracted_texts")]
    scratch_dir: PathBuf,

    /// Maximum upload size in MiB.
    #[arg(long, env = "PDF2BROLL_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `generate`.
    let show_progress = matches!(
        cli.command,
        Command::Generate { json: false, no_progress: false, .. }
    ) && !cli.quiet;
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

    match cli.command {
        Command::Serve {
            bind,
            cors_origin,
            pipeline,
        } => {
            let config = build_config(&pipeline, None)?;
            let pipeline = Arc::new(
                StoryPipeline::new(config).context("Failed to initialise the story pipeline")?,
            );
            let server_config = ServerConfig { bind, cors_origin };
            server::serve(pipeline, &server_config)
                .await
                .with_context(|| format!("Server on {} failed", server_config.bind))?;
        }

        Command::Generate {
            input,
            json,
            pipeline,
            ..
        } => {
            let progress_cb: Option<ProgressCallback> = if show_progress {
                let cb = CliProgressCallback::new_dynamic();
                Some(cb as Arc<dyn StoryProgressCallback>)
            } else {
                None
            };
            let config = build_config(&pipeline, progress_cb)?;
            let story_pipeline =
                StoryPipeline::new(config).context("Failed to initialise the story pipeline")?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let story = story_pipeline
                .run_file(&input, &cancel)
                .await
                .with_context(|| format!("Failed to generate b-roll for {}", input.display()))?;

            if json {
                let out =
                    serde_json::to_string_pretty(&story).context("Failed to serialise output")?;
                println!("{out}");
            } else {
                for path in story.generated_images() {
                    println!("{}", path.display());
                }
                if !cli.quiet {
                    eprintln!(
                        "{}  {}/{} images  {} pages  {}ms  →  {}",
                        if story.stats.failed == 0 {
                            green("✔")
                        } else {
                            cyan("⚠")
                        },
                        story.stats.generated,
                        story.stats.segments,
                        story.page_count,
                        story.stats.total_duration_ms,
                        bold(&story.story_dir.display().to_string()),
                    );
                }
            }
        }

        Command::Inspect {
            input,
            json,
            pipeline,
        } => {
            let config = build_config(&pipeline, None)?;
            let report = inspect(&input, &config)
                .await
                .context("Failed to inspect PDF")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                println!("File:      {}", input.display());
                println!("Pages:     {}", report.document.page_count);
                println!("Chars:     {}", report.document.text.chars().count());
                println!("Chunks:    {}", report.document.chunk_count);
                println!("Segments:  {}", report.segments.len());
                for (i, segment) in report.segments.iter().enumerate() {
                    let preview: String = segment.chars().take(60).collect();
                    println!(
                        "  {:>2}. {}",
                        i + 1,
                        dim(&preview.replace('\n', " "))
                    );
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(args.concurrency)
        .segment_count(args.segments)
        .api_timeout_secs(args.api_timeout)
        .max_retries(args.max_retries)
        .retry_backoff_ms(args.retry_backoff_ms)
        .stories_dir(&args.stories_dir)
        .scratch_dir(&args.scratch_dir)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));

    if args.abort_on_failure {
        builder = builder.failure_policy(FailurePolicy::AbortRemaining);
    }
    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref m) = args.model {
        builder = builder.model(m);
    }
    if let Some(ref e) = args.endpoint {
        builder = builder.endpoint(e);
    }
    if let Some(ref t) = args.prompt {
        builder = builder.prompt_template(t);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
