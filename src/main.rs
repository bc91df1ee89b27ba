//! Web ticker - main entry point
//!
//! This binary provides three subcommands:
//! - run: Merge the state log, publish JSON + HTML and write the marker
//! - import: Seed the ledger from an account statement (HTML report or CSV)
//! - render: Rebuild the dashboard from a published JSON document

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webticker::config::RunOverrides;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "webticker")]
#[command(about = "Account ledger and live ticker for a trading terminal", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one ticker cycle
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// State log to read (overrides config file)
        #[arg(long)]
        state_log: Option<PathBuf>,

        /// JSON output path
        #[arg(long)]
        output: Option<PathBuf>,

        /// HTML output path
        #[arg(long)]
        html_output: Option<PathBuf>,

        /// Completion marker path
        #[arg(long)]
        marker_output: Option<PathBuf>,

        /// Ledger file path
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,

        /// Reference time (RFC 3339) instead of the wall clock
        #[arg(long)]
        now: Option<String>,
    },

    /// Import an account statement (HTML report or CSV) into the ledger
    Import {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Statement file (.htm report or .csv)
        #[arg(short, long)]
        statement: PathBuf,

        /// Also merge this state log
        #[arg(long)]
        state_log: Option<PathBuf>,
    },

    /// Regenerate the dashboard from a JSON document
    Render {
        /// Structured JSON document
        #[arg(short, long)]
        input: PathBuf,

        /// HTML output path
        #[arg(long)]
        html_output: PathBuf,
    },
}

fn setup_logging(verbose: bool, command_name: &str, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = log_dir.join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never(log_dir, &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format, no ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    // Optional .env with WEBTICKER_* overrides
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Import { .. } => "import",
        Commands::Render { .. } => "render",
    };

    setup_logging(cli.verbose, command_name, &cli.log_dir)?;

    match cli.command {
        Commands::Run {
            config,
            state_log,
            output,
            html_output,
            marker_output,
            ledger,
            pretty,
            now,
        } => commands::run::run(
            config,
            RunOverrides {
                state_log,
                output,
                html_output,
                marker_output,
                ledger,
                pretty,
            },
            now,
        ),

        Commands::Import {
            config,
            statement,
            state_log,
        } => commands::import::run(config, statement, state_log),

        Commands::Render { input, html_output } => commands::render::run(input, html_output),
    }
}
