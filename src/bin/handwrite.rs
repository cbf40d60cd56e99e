//! CLI binary for handwrite.
//!
//! A thin shim over the library crate: loads settings, maps CLI flags onto
//! `ProcessConfig`, wires the VLM provider and prints the batch summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use handwrite::config::{default_config_path, load_env_file, DEFAULT_TEMPLATE_PATH};
use handwrite::{
    create_provider, process_path, BatchProgressCallback, BatchSummary, JobOutcome, LlmInference,
    ProgressCallback, Settings,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_TEMPLATE: &str = include_str!("../../templates/note_template.md");

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per finished file. Files complete
/// out of order, so start times are keyed by path.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<PathBuf, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, path: &Path) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(path))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.bar.set_length(total_jobs as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_jobs} file(s)…"))
        ));
    }

    fn on_job_start(&self, path: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(path.to_path_buf(), Instant::now());
        }
        if let Some(name) = path.file_name() {
            self.bar.set_message(name.to_string_lossy().into_owned());
        }
    }

    fn on_job_complete(&self, outcome: &JobOutcome) {
        let path = &outcome.job.path;
        let elapsed = self.elapsed_secs(path);
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );

        match &outcome.result {
            Ok(note) => self.bar.println(format!(
                "  {} {:<32}  → {}  {}",
                green("✓"),
                name,
                dim(&note.display().to_string()),
                dim(&format!("{elapsed:.1}s")),
            )),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                let msg = e.to_string();
                // Keep log lines to one terminal row.
                let msg = match msg.char_indices().nth(79) {
                    Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
                    None => msg,
                };
                self.bar.println(format!(
                    "  {} {:<32}  {}  {}",
                    red("✗"),
                    name,
                    red(&msg),
                    dim(&format!("{elapsed:.1}s")),
                ));
            }
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.bar.finish_and_clear();
        if summary.failed == 0 {
            eprintln!(
                "{} {} file(s) processed successfully",
                green("✔"),
                bold(&summary.successful.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) processed  ({} failed)",
                if summary.successful == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&summary.successful.to_string()),
                summary.total(),
                red(&self.errors.load(Ordering::SeqCst).to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every scan in a folder (recursively) into notes/
  handwrite process scans/ notes/

  # One file, eight workers
  handwrite process page.jpg notes/ --workers 8

  # Use a specific config file
  handwrite process scans/ notes/ --config ./handwrite.toml

  # Write the default config to ~/.config/handwrite/config.toml
  handwrite config setup

SUPPORTED INPUT:
  .pdf (sent whole)   .png  .jpg  .jpeg (one frame each)

CONFIG FILE (TOML, every key optional):
  [inference]   provider, model, prompt, structured_output, max_attempts,
                temperature, max_tokens
  [template]    path, variables.*
  [output]      format ("markdown"), encoding ("utf-8")
  [processing]  workers, job_timeout_secs

ENVIRONMENT VARIABLES (also read from a .env file):
  GEMINI_API_KEY      Google Gemini API key (default provider)
  OPENAI_API_KEY      OpenAI API key
  ANTHROPIC_API_KEY   Anthropic API key
  RUST_LOG            Override the log filter
"#;

/// Convert handwritten notes to Markdown using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "handwrite",
    version,
    about = "Convert handwritten notes (PDF, PNG, JPEG) to Markdown using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file or a directory tree of scans into Markdown notes.
    Process(ProcessArgs),

    /// Manage the configuration file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Input file or directory (searched recursively).
    input: PathBuf,

    /// Directory receiving one `<stem>.md` per input file.
    output_dir: PathBuf,

    /// Number of files processed concurrently.
    #[arg(short, long, env = "HANDWRITE_WORKERS",
          value_parser = clap::value_parser!(u32).range(1..))]
    workers: Option<u32>,

    /// Config file (default: ~/.config/handwrite/config.toml).
    #[arg(short, long, env = "HANDWRITE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HANDWRITE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HANDWRITE_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "HANDWRITE_NO_PROGRESS")]
    no_progress: bool,

    /// Read API keys from this file instead of searching for `.env`.
    #[arg(long, env = "HANDWRITE_ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config file and note template.
    Setup {
        /// Where to write the config (default: ~/.config/handwrite/config.toml).
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Process(args) => run_process(args).await,
        Command::Config(ConfigCommand::Setup { path }) => {
            init_logging("info");
            run_setup(path)
        }
    }
}

/// Logs go to stderr; `RUST_LOG` wins over the computed level.
fn init_logging(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

async fn run_process(args: ProcessArgs) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !args.quiet && !args.no_progress;
    let filter = if args.verbose {
        "debug"
    } else if args.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    init_logging(filter);

    // ── Build config ─────────────────────────────────────────────────────
    load_env_file(args.env_file.as_deref()).context("Failed to load environment file")?;
    let loaded = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    let provider_name = loaded.settings.inference.provider.clone();

    let mut builder = loaded.to_builder();
    if let Some(n) = args.workers {
        builder = builder.workers(n as usize);
    }
    if show_progress {
        let cb = CliProgressCallback::new();
        builder = builder.progress_callback(cb as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Provider ─────────────────────────────────────────────────────────
    let provider = create_provider(&provider_name, &config.model)
        .context("Failed to initialise the LLM provider")?;
    let inference = Arc::new(LlmInference::new(provider, &config));

    // ── Run batch ────────────────────────────────────────────────────────
    let start = Instant::now();
    let summary = process_path(&args.input, &args.output_dir, config, inference)
        .await
        .context("Batch processing failed")?;

    if !args.quiet {
        eprintln!();
        eprintln!("{}", bold("Processing complete"));
        eprintln!("  Successful: {}", green(&summary.successful.to_string()));
        eprintln!(
            "  Failed:     {}",
            if summary.failed == 0 {
                dim("0")
            } else {
                red(&summary.failed.to_string())
            }
        );
        eprintln!(
            "  {}",
            dim(&format!(
                "{:.1}s  →  {}",
                start.elapsed().as_secs_f64(),
                args.output_dir.display()
            ))
        );
    }

    if !summary.is_success() {
        anyhow::bail!("{} of {} file(s) failed", summary.failed, summary.total());
    }
    Ok(())
}

fn run_setup(path: Option<PathBuf>) -> Result<()> {
    let config_path = match path {
        Some(p) => p,
        None => default_config_path().context("Could not determine the home directory")?,
    };

    Settings::write_default(&config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    eprintln!("{} Wrote {}", green("✔"), bold(&config_path.display().to_string()));

    let template_path = config_path
        .parent()
        .map(|dir| dir.join(DEFAULT_TEMPLATE_PATH))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_PATH));
    if template_path.exists() {
        eprintln!(
            "{} Keeping existing template {}",
            dim("·"),
            template_path.display()
        );
        return Ok(());
    }
    if let Some(dir) = template_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&template_path, DEFAULT_TEMPLATE)
        .with_context(|| format!("Failed to write template to {}", template_path.display()))?;
    eprintln!("{} Wrote {}", green("✔"), bold(&template_path.display().to_string()));
    Ok(())
}
