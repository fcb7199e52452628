//! DuckDB-backed destination store.
//!
//! The store loads a run's staged parquet files into a staging table,
//! applies the generated three-way merge against the destination table,
//! and drops the staging table. Merging the same staged data twice
//! changes nothing beyond the `refreshed_at` touch.

use std::path::Path;

use duckdb::Connection;

use crate::merge;
use crate::table::TableSpec;

/// Error from a merge call.
///
/// `SchemaMismatch` is fatal to that call; an empty staging area is NOT
/// an error — `upsert` logs it and returns a zero outcome.
#[derive(Debug)]
pub enum MergeError {
    /// Staged data (or the spec itself) lacks a column the merge needs.
    SchemaMismatch { column: String },
    Db(duckdb::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaMismatch { column } => {
                write!(f, "staged data is missing merge column {column}")
            }
            Self::Db(e) => write!(f, "store error: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<duckdb::Error> for MergeError {
    fn from(e: duckdb::Error) -> Self {
        Self::Db(e)
    }
}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Row counts from one merge call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub staged_rows: u64,
    pub inserted: u64,
    pub updated: u64,
    pub refreshed: u64,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file.
    pub fn open(path: &Path) -> Result<Self, MergeError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, MergeError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the schema and destination table if they do not exist.
    pub fn ensure_table(&self, spec: &TableSpec) -> Result<(), MergeError> {
        if let Some(column) = spec.missing_column() {
            return Err(MergeError::SchemaMismatch { column });
        }
        self.conn.execute_batch(&merge::create_schema(spec))?;
        self.conn.execute_batch(&merge::create_table(spec))?;
        Ok(())
    }

    /// Row count of the destination table.
    pub fn count(&self, spec: &TableSpec) -> Result<u64, MergeError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", spec.qualified()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Merge a run's staged parquet files into the destination table.
    pub fn upsert(&self, spec: &TableSpec, parquet_glob: &str) -> Result<MergeOutcome, MergeError> {
        self.ensure_table(spec)?;

        // Nothing staged is a normal outcome for a range with no data
        let has_files = glob::glob(parquet_glob)
            .ok()
            .and_then(|mut g| g.next())
            .is_some();
        if !has_files {
            log::warn!("merge skipped: nothing staged under {parquet_glob}");
            return Ok(MergeOutcome::default());
        }

        self.check_staged_columns(spec, parquet_glob)?;

        self.conn
            .execute_batch(&merge::load_staging(spec, parquet_glob))?;

        let staged_rows: i64 =
            self.conn
                .query_row(&merge::count_staging(spec), [], |row| row.get(0))?;
        if staged_rows == 0 {
            log::warn!("merge skipped: staged files under {parquet_glob} hold no rows");
            self.conn.execute_batch(&merge::drop_staging(spec))?;
            return Ok(MergeOutcome::default());
        }

        let updated = match merge::update_changed(spec) {
            Some(sql) => self.conn.execute(&sql, [])?,
            None => 0,
        };
        let refreshed = self.conn.execute(&merge::refresh_unchanged(spec), [])?;
        let inserted = self.conn.execute(&merge::insert_missing(spec), [])?;

        self.conn.execute_batch(&merge::drop_staging(spec))?;

        let outcome = MergeOutcome {
            staged_rows: staged_rows as u64,
            inserted: inserted as u64,
            updated: updated as u64,
            refreshed: refreshed as u64,
        };
        log::info!(
            "merged {} staged rows into {}: {} inserted, {} updated, {} refreshed",
            outcome.staged_rows,
            spec.qualified(),
            outcome.inserted,
            outcome.updated,
            outcome.refreshed
        );
        Ok(outcome)
    }

    /// Reject staged data that lacks a column the merge needs, before
    /// any statement touches the destination.
    fn check_staged_columns(&self, spec: &TableSpec, parquet_glob: &str) -> Result<(), MergeError> {
        let mut stmt = self.conn.prepare(&format!(
            "DESCRIBE SELECT * FROM read_parquet('{parquet_glob}')"
        ))?;
        let staged: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;

        let required = spec
            .key_columns
            .iter()
            .map(String::as_str)
            .chain(crate::table::AUDIT_COLUMNS);
        for column in required {
            if !staged.iter().any(|c| c == column) {
                return Err(MergeError::SchemaMismatch {
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagingArea;
    use crate::table::ColumnSpec;
    use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn spec() -> TableSpec {
        TableSpec {
            schema: "aq".into(),
            name: "readings".into(),
            columns: vec![
                ColumnSpec::new("id", "BIGINT"),
                ColumnSpec::new("value", "DOUBLE"),
                ColumnSpec::new("note", "VARCHAR"),
                ColumnSpec::new("ingested_at", "BIGINT"),
                ColumnSpec::new("updated_at", "BIGINT"),
                ColumnSpec::new("refreshed_at", "BIGINT"),
            ],
            key_columns: vec!["id".into()],
            partition_hint: None,
            cluster_hint: Vec::new(),
        }
    }

    fn batch(rows: &[(i64, f64, &str)], stamp: i64) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("value", DataType::Float64, false),
            Field::new("note", DataType::Utf8, false),
            Field::new("ingested_at", DataType::Int64, false),
            Field::new("updated_at", DataType::Int64, false),
            Field::new("refreshed_at", DataType::Int64, false),
        ]);
        let stamps = vec![stamp; rows.len()];
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(
                    rows.iter().map(|r| r.0).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(
                    rows.iter().map(|r| r.1).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r.2).collect::<Vec<_>>(),
                )),
                Arc::new(Int64Array::from(stamps.clone())),
                Arc::new(Int64Array::from(stamps.clone())),
                Arc::new(Int64Array::from(stamps)),
            ],
        )
        .unwrap()
    }

    /// All destination rows, ordered by key:
    /// (id, value, note, ingested_at, updated_at, refreshed_at)
    fn rows(store: &Store) -> Vec<(i64, f64, String, i64, i64, i64)> {
        let mut stmt = store
            .conn
            .prepare("SELECT id, value, note, ingested_at, updated_at, refreshed_at FROM aq.readings ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
    }

    struct Fixture {
        store: Store,
        staging: StagingArea,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            store: Store::open_in_memory().unwrap(),
            staging: StagingArea::new(dir.path()).unwrap(),
            _dir: dir,
        }
    }

    #[test]
    fn unmatched_keys_insert() {
        let f = fixture();
        f.staging
            .stage("r1", 1, &batch(&[(1, 9.2, "a"), (2, 11.0, "b")], 100), 3)
            .unwrap();

        let outcome = f.store.upsert(&spec(), &f.staging.parquet_glob("r1")).unwrap();
        assert_eq!(outcome.staged_rows, 2);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.refreshed, 0);
        assert_eq!(rows(&f.store).len(), 2);
    }

    #[test]
    fn changed_content_updates_all_mutable_columns() {
        let f = fixture();
        f.staging
            .stage("r1", 1, &batch(&[(1, 9.2, "a")], 100), 3)
            .unwrap();
        f.store.upsert(&spec(), &f.staging.parquet_glob("r1")).unwrap();

        // Same key, different value, later stamps
        f.staging
            .stage("r2", 1, &batch(&[(1, 10.5, "a")], 200), 3)
            .unwrap();
        let outcome = f.store.upsert(&spec(), &f.staging.parquet_glob("r2")).unwrap();

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.refreshed, 0);

        let all = rows(&f.store);
        // ingested_at is immutable; updated_at and refreshed_at moved
        assert_eq!(all, vec![(1, 10.5, "a".to_string(), 100, 200, 200)]);
    }

    #[test]
    fn unchanged_content_touches_only_refreshed_at() {
        let f = fixture();
        f.staging
            .stage("r1", 1, &batch(&[(1, 9.2, "a")], 100), 3)
            .unwrap();
        f.store.upsert(&spec(), &f.staging.parquet_glob("r1")).unwrap();

        // Identical content re-fetched later
        f.staging
            .stage("r2", 1, &batch(&[(1, 9.2, "a")], 200), 3)
            .unwrap();
        let outcome = f.store.upsert(&spec(), &f.staging.parquet_glob("r2")).unwrap();

        assert_eq!(outcome.refreshed, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.inserted, 0);

        let all = rows(&f.store);
        assert_eq!(all, vec![(1, 9.2, "a".to_string(), 100, 100, 200)]);
    }

    #[test]
    fn three_way_in_one_merge() {
        let f = fixture();
        f.staging
            .stage("r1", 1, &batch(&[(1, 9.2, "a"), (2, 5.0, "b")], 100), 3)
            .unwrap();
        f.store.upsert(&spec(), &f.staging.parquet_glob("r1")).unwrap();

        // 1 unchanged, 2 changed, 3 new
        f.staging
            .stage(
                "r2",
                1,
                &batch(&[(1, 9.2, "a"), (2, 6.0, "b"), (3, 1.0, "c")], 200),
                3,
            )
            .unwrap();
        let outcome = f.store.upsert(&spec(), &f.staging.parquet_glob("r2")).unwrap();

        assert_eq!(outcome.refreshed, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 1);

        let all = rows(&f.store);
        assert_eq!(
            all,
            vec![
                (1, 9.2, "a".to_string(), 100, 100, 200),
                (2, 6.0, "b".to_string(), 100, 200, 200),
                (3, 1.0, "c".to_string(), 200, 200, 200),
            ]
        );
    }

    #[test]
    fn merge_is_idempotent_under_replay() {
        let f = fixture();
        f.staging
            .stage("r1", 1, &batch(&[(1, 9.2, "a"), (2, 5.0, "b")], 100), 3)
            .unwrap();
        let glob_pattern = f.staging.parquet_glob("r1");

        f.store.upsert(&spec(), &glob_pattern).unwrap();
        let after_first = rows(&f.store);

        // Replay the exact same staged data
        let outcome = f.store.upsert(&spec(), &glob_pattern).unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.refreshed, 2);

        // Same stamps staged → byte-identical destination
        assert_eq!(rows(&f.store), after_first);
    }

    #[test]
    fn staged_duplicates_collapse_to_freshest() {
        let f = fixture();
        // Same key staged twice in one run (upstream repeated the row);
        // updated_at picks the winner
        f.staging
            .stage("r1", 1, &batch(&[(1, 9.2, "old")], 100), 3)
            .unwrap();
        f.staging
            .stage("r1", 2, &batch(&[(1, 9.9, "new")], 150), 3)
            .unwrap();

        let outcome = f.store.upsert(&spec(), &f.staging.parquet_glob("r1")).unwrap();
        assert_eq!(outcome.staged_rows, 1);

        let all = rows(&f.store);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].2, "new");
    }

    #[test]
    fn missing_key_column_is_schema_mismatch() {
        let f = fixture();

        // Staged parquet without the key column
        let schema = Schema::new(vec![Field::new("value", DataType::Float64, false)]);
        let bad = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Float64Array::from(vec![1.0]))],
        )
        .unwrap();
        f.staging.stage("r1", 1, &bad, 3).unwrap();

        let err = f
            .store
            .upsert(&spec(), &f.staging.parquet_glob("r1"))
            .unwrap_err();
        match err {
            MergeError::SchemaMismatch { column } => assert_eq!(column, "id"),
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn empty_staging_is_benign() {
        let f = fixture();
        let outcome = f
            .store
            .upsert(&spec(), &f.staging.parquet_glob("never_ran"))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::default());
    }

    #[test]
    fn zero_row_staged_files_are_benign() {
        let f = fixture();
        f.staging.stage("r1", 1, &batch(&[], 100), 3).unwrap();
        let outcome = f.store.upsert(&spec(), &f.staging.parquet_glob("r1")).unwrap();
        assert_eq!(outcome, MergeOutcome::default());
    }

    #[test]
    fn incoherent_spec_rejected_before_touching_db() {
        let f = fixture();
        let mut bad = spec();
        bad.key_columns = vec!["missing".into()];
        let err = f.store.ensure_table(&bad).unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch { .. }));
    }
}
