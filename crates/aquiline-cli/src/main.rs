//! aquiline - air-quality measurement ingest pipeline
//!
//! Downloads sensor measurements from the OpenAQ API for an area and
//! period, stages them as parquet, and merges them idempotently into a
//! DuckDB store.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::{Parser, Subcommand};

use aquiline_core::shutdown::shutdown_flag;

mod cmd;
mod config;
mod periods;

use config::Config;

#[derive(Parser)]
#[command(name = "aquiline")]
#[command(about = "Air-quality measurement ingest pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./aquiline.toml or ~/.config/aquiline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Download measurements for an area and period
    Fetch(cmd::fetch::FetchArgs),
    /// Merge a previously staged run into the store
    Merge(cmd::merge::MergeArgs),
    /// Summarize saved run ledgers
    Ledger(cmd::ledger::LedgerArgs),
    /// Show current configuration
    Config,
}

fn setup_signal_handler() {
    // First signal: set graceful shutdown flag
    // Second signal: force exit
    // SAFETY: AtomicBool::store and process::exit are async-signal-safe
    unsafe {
        for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
            .expect("Failed to register signal handler");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(aquiline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug — progress bars show activity
    //   non-TTY: info unless --debug         — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    aquiline_core::init_logging(quiet, cli.debug, multi);

    setup_signal_handler();

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Merge(args) => cmd::merge::run(args, &config),
        Command::Ledger(args) => cmd::ledger::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["API base URL", &config.api.base_url]);
            table.add_row(vec![
                "API key",
                if config.api.api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec!["Page limit", &config.api.page_limit.to_string()]);
            table.add_row(vec!["Max pages", &config.api.max_pages.to_string()]);
            table.add_row(vec!["Max retries", &config.api.max_retries.to_string()]);
            table.add_row(vec![
                "Rate-limit cooldown",
                &format!("{}s", config.api.cooldown_secs),
            ]);
            table.add_row(vec![
                "Store",
                &config.store.db_path.display().to_string(),
            ]);
            table.add_row(vec!["Dataset", &config.store.dataset]);
            table.add_row(vec![
                "Staging directory",
                &config.store.staging_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Ledger directory",
                &config.output.ledger_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Compression level",
                &config.output.compression_level.to_string(),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
