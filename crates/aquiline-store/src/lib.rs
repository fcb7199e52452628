//! Staging and destination store for fetched measurements.
//!
//! Fetched entities land as parquet files in a per-run staging area,
//! then get merged into a DuckDB table with a key-based three-way
//! upsert that makes repeated loads of the same period safe.

pub mod merge;
pub mod staging;
pub mod store;
pub mod table;

pub use staging::StagingArea;
pub use store::{MergeError, MergeOutcome, Store};
pub use table::{AUDIT_COLUMNS, ColumnSpec, TableSpec};
