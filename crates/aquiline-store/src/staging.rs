//! Per-run parquet staging area.
//!
//! Layout:
//! ```text
//! {base}/
//! └── {run_id}/
//!     ├── sensor_0003917.parquet
//!     └── sensor_0003918.parquet
//! ```
//!
//! One file per entity per run, written tmp → rename via
//! [`ParquetSink`]. Runs are scoped by directory, so unrelated runs can
//! stage concurrently without touching each other.

use std::io;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;

use aquiline_core::sink::ParquetSink;

#[derive(Debug, Clone)]
pub struct StagingArea {
    base: PathBuf,
}

impl StagingArea {
    pub fn new(base: impl Into<PathBuf>) -> io::Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base.join(run_id)
    }

    /// Glob the merge layer hands to `read_parquet`.
    pub fn parquet_glob(&self, run_id: &str) -> String {
        self.run_dir(run_id)
            .join("sensor_*.parquet")
            .to_string_lossy()
            .into_owned()
    }

    /// Write one entity's batch. Returns the artifact id recorded in the
    /// run ledger.
    pub fn stage(
        &self,
        run_id: &str,
        entity_id: i64,
        batch: &RecordBatch,
        zstd_level: i32,
    ) -> io::Result<String> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;

        let filename = format!("sensor_{entity_id:07}.parquet");
        let mut sink = ParquetSink::new(&dir, &filename, &batch.schema(), zstd_level)?;
        sink.write_batch(batch)?;
        let rows = sink.finalize()?;
        log::debug!("{run_id}: staged {filename} ({rows} rows)");

        Ok(format!("{run_id}/{filename}"))
    }

    /// Completed staged files for a run, sorted by name.
    pub fn staged_files(&self, run_id: &str) -> io::Result<Vec<PathBuf>> {
        let pattern = self.parquet_glob(run_id);
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(io::Error::other)?
            .filter_map(|e| e.ok())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Remove a run's staging directory after a successful merge.
    pub fn clear(&self, run_id: &str) -> io::Result<()> {
        let dir = self.run_dir(run_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}
