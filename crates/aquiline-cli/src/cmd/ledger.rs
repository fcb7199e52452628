//! Ledger subcommand - summarize saved run logs.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use aquiline_core::ledger::{RunLog, RunStatus};
use aquiline_core::progress::fmt_duration;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Show only the most recent N runs
    #[arg(short, long)]
    pub limit: Option<usize>,
}

pub fn run(args: LedgerArgs, config: &Config) -> Result<()> {
    let pattern = config.output.ledger_dir.join("*.json");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(|e| e.ok())
        .collect();
    // Filenames end in the creation timestamp, so name order is time order
    files.sort();
    files.reverse();
    if let Some(limit) = args.limit {
        files.truncate(limit);
    }

    if files.is_empty() {
        log::warn!(
            "no run ledgers under {}",
            config.output.ledger_dir.display()
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Period").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Saved").fg(Color::Cyan),
            Cell::new("Failed").fg(Color::Cyan),
            Cell::new("Rounds").fg(Color::Cyan),
            Cell::new("Duration").fg(Color::Cyan),
        ]);

    for path in &files {
        let log = match RunLog::read_from(path) {
            Ok(log) => log,
            Err(e) => {
                log::warn!("skipping {}: {e}", path.display());
                continue;
            }
        };
        let Some(summary) = &log.summary else {
            continue;
        };
        let period = format!(
            "{} → {}",
            log.time_range.from.format("%Y-%m-%d"),
            log.time_range.to.format("%Y-%m-%d")
        );
        let status_cell = match summary.status {
            RunStatus::Completed => Cell::new("completed").fg(Color::Green),
            RunStatus::Aborted => Cell::new("aborted").fg(Color::Red),
            other => Cell::new(format!("{other:?}").to_lowercase()),
        };
        table.add_row(vec![
            Cell::new(&log.run_id),
            Cell::new(period),
            status_cell,
            Cell::new(summary.saved),
            Cell::new(summary.failed),
            Cell::new(summary.retry_rounds),
            Cell::new(fmt_duration(summary.duration_secs)),
        ]);
    }

    eprintln!("\n{table}");
    Ok(())
}
