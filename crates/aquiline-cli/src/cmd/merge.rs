//! Merge subcommand - land a previously staged run into the store.
//!
//! Useful after a `fetch --no-merge`, or to replay a merge: replaying
//! the same staged data only touches the refreshed column.

use anyhow::{Context, Result};
use clap::Args;

use aquiline_core::progress::fmt_num;
use aquiline_store::{StagingArea, Store, TableSpec};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Run id whose staged files to merge
    pub run_id: String,

    /// Keep the staged files after a successful merge
    #[arg(long)]
    pub keep_staging: bool,
}

pub fn run(args: MergeArgs, config: &Config) -> Result<()> {
    let staging = StagingArea::new(&config.store.staging_dir)?;
    let staged = staging.staged_files(&args.run_id)?;
    log::info!(
        "{}: {} staged files under {}",
        args.run_id,
        staged.len(),
        staging.run_dir(&args.run_id).display()
    );

    let store = Store::open(&config.store.db_path)
        .with_context(|| format!("cannot open store {}", config.store.db_path.display()))?;
    let table = TableSpec::measurements(&config.store.dataset);

    let outcome = store.upsert(&table, &staging.parquet_glob(&args.run_id))?;
    log::info!(
        "{}: merged {} rows into {} ({} inserted, {} updated, {} refreshed)",
        args.run_id,
        fmt_num(outcome.staged_rows as usize),
        table.qualified(),
        outcome.inserted,
        outcome.updated,
        outcome.refreshed
    );

    if !args.keep_staging {
        staging.clear(&args.run_id)?;
    }
    Ok(())
}
