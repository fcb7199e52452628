//! Fetch subcommand - download measurements for an area and period

use std::collections::HashMap;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Utc};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use aquiline_core::error::FetchError;
use aquiline_core::ledger::{RunLog, RunStatus, TimeRange};
use aquiline_core::progress::{SharedProgress, fmt_duration, fmt_num};
use aquiline_core::shutdown::is_shutdown_requested;
use aquiline_openaq::page::Measurement;
use aquiline_openaq::{
    Bbox, MeasurementBatch, PageQuery, PaginatedFetcher, RateLimitedClient, Sensor,
    discover_sensors, run_entities,
};
use aquiline_store::{StagingArea, Store, TableSpec};

use crate::config::Config;
use crate::periods;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Area label used in run ids (e.g. "seoul")
    #[arg(short, long)]
    pub area: String,

    /// Bounding box for sensor discovery: min_lon,min_lat,max_lon,max_lat
    #[arg(short, long, value_parser = parse_bbox)]
    pub bbox: Bbox,

    /// Period start (RFC 3339, e.g. 2025-01-01T00:00:00Z)
    #[arg(long, value_parser = parse_instant, requires = "to")]
    pub from: Option<DateTime<Utc>>,

    /// Period end (RFC 3339)
    #[arg(long, value_parser = parse_instant, requires = "from")]
    pub to: Option<DateTime<Utc>>,

    /// Download a whole year, one run per trimester
    #[arg(short, long, conflicts_with_all = ["from", "to"])]
    pub year: Option<i32>,

    /// Retry rounds for failed entities
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Stage only; skip the merge into the destination store
    #[arg(long)]
    pub no_merge: bool,
}

fn parse_bbox(s: &str) -> Result<Bbox, String> {
    s.parse()
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid instant {s:?}: {e}"))
}

/// Periods to download, each with its run id.
fn plan_runs(args: &FetchArgs) -> Result<Vec<(String, TimeRange)>> {
    if let Some(year) = args.year {
        return Ok(periods::trimestrial_periods(year)
            .into_iter()
            .enumerate()
            .map(|(i, range)| (format!("{}_{year}_T{}", args.area, i + 1), range))
            .collect());
    }

    let (from, to) = match (args.from, args.to) {
        (Some(from), Some(to)) => (from, to),
        _ => anyhow::bail!("either --year or both --from and --to are required"),
    };
    ensure!(from < to, "--from must precede --to");
    let run_id = format!(
        "{}_{}_{}",
        args.area,
        from.format("%Y%m%d"),
        to.format("%Y%m%d")
    );
    Ok(vec![(run_id, TimeRange::new(from, to))])
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let runs = plan_runs(&args)?;
    let max_retries = args.max_retries.unwrap_or(config.api.max_retries);

    let mut client = RateLimitedClient::new(config.client_config());
    let fetcher = PaginatedFetcher::new(config.api.max_pages);

    let sensors = discover_sensors(&mut client, &fetcher, &args.bbox)
        .with_context(|| format!("sensor discovery failed for {}", args.area))?;
    ensure!(
        !sensors.is_empty(),
        "no sensors found in bbox {}, nothing to download",
        args.bbox.to_param()
    );
    let sensor_map: HashMap<i64, &Sensor> = sensors.iter().map(|s| (s.id, s)).collect();
    let entity_ids: Vec<i64> = sensors.iter().map(|s| s.id).collect();

    let staging = StagingArea::new(&config.store.staging_dir)?;
    let store = Store::open(&config.store.db_path)
        .with_context(|| format!("cannot open store {}", config.store.db_path.display()))?;
    let table = TableSpec::measurements(&config.store.dataset);

    let mut finished: Vec<RunLog> = Vec::new();
    for (run_id, range) in runs {
        if is_shutdown_requested() {
            log::warn!("interrupted, skipping remaining periods");
            break;
        }

        // A crashed earlier attempt may have left half-written tmp files
        let run_dir = staging.run_dir(&run_id);
        if run_dir.exists() {
            aquiline_core::sink::cleanup_tmp_files(&run_dir)?;
        }

        let status_line = progress.run_line(&run_id);
        status_line.set_message(format!("{} sensors, {range}", entity_ids.len()));

        let run_log = run_entities(&entity_ids, range, &run_id, max_retries, |id| {
            let sensor = sensor_map[&id];
            let pb = progress.entity_line(&format!("sensor {id}"));
            pb.set_message(sensor.parameter.clone());

            let measurements: Vec<Measurement> =
                fetcher.fetch(&mut client, &PageQuery::measurements(id, &range))?;
            pb.set_message(format!("{} records", fmt_num(measurements.len())));

            let mut batch = MeasurementBatch::new(Utc::now());
            for m in &measurements {
                batch.push(sensor, m);
            }
            let record_batch = batch
                .finish()
                .map_err(|e| FetchError::Io(std::io::Error::other(e)))?;
            let artifact =
                staging.stage(&run_id, id, &record_batch, config.output.compression_level)?;

            pb.finish_and_clear();
            Ok(artifact)
        })?;

        let ledger_path = run_log.write_to(&config.output.ledger_dir)?;
        log::info!("{run_id}: ledger written to {}", ledger_path.display());

        // Merge whatever got staged, even for aborted runs: the merge is
        // idempotent and already-fetched data should not be lost.
        if !args.no_merge {
            let outcome = store.upsert(&table, &staging.parquet_glob(&run_id))?;
            staging.clear(&run_id)?;
            log::info!(
                "{run_id}: merged {} rows ({} inserted, {} updated, {} refreshed)",
                fmt_num(outcome.staged_rows as usize),
                outcome.inserted,
                outcome.updated,
                outcome.refreshed
            );
        }

        status_line.finish_and_clear();
        finished.push(run_log);
    }

    print_run_summaries(&finished, progress);
    Ok(())
}

/// Final per-period rollup table, printed after all runs.
fn print_run_summaries(logs: &[RunLog], progress: &SharedProgress) {
    if logs.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Saved").fg(Color::Cyan),
            Cell::new("Failed").fg(Color::Cyan),
            Cell::new("Rounds").fg(Color::Cyan),
            Cell::new("Duration").fg(Color::Cyan),
        ]);

    for log in logs {
        let Some(summary) = &log.summary else {
            continue;
        };
        let status_cell = match summary.status {
            RunStatus::Completed => Cell::new("completed").fg(Color::Green),
            RunStatus::Aborted => Cell::new("aborted").fg(Color::Red),
            other => Cell::new(format!("{other:?}").to_lowercase()),
        };
        table.add_row(vec![
            Cell::new(&log.run_id),
            status_cell,
            Cell::new(summary.saved),
            Cell::new(summary.failed),
            Cell::new(summary.retry_rounds),
            Cell::new(fmt_duration(summary.duration_secs)),
        ]);
    }

    progress.println(format!("\n{table}"));
}
