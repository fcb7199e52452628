//! SQL generation for the three-way key merge.
//!
//! Three statements replace the classic MERGE, evaluated in order
//! against the staged table:
//! 1. matched + content changed → full update of mutable columns
//! 2. matched + unchanged        → touch `refreshed_at` only
//! 3. unmatched                  → insert the full staged row
//!
//! Re-running the trio with the same staged data changes nothing beyond
//! the `refreshed_at` touch, which is what makes replays safe.

use crate::table::TableSpec;

/// `target.k = staged.k AND …` over the merge keys.
fn key_condition(spec: &TableSpec) -> String {
    spec.key_columns
        .iter()
        .map(|k| format!("target.{k} = staged.{k}"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `target.c IS DISTINCT FROM staged.c OR …` over the data columns.
/// `None` when the table has no data columns (keys + audit only).
fn change_condition(spec: &TableSpec) -> Option<String> {
    let data = spec.data_columns();
    if data.is_empty() {
        return None;
    }
    Some(
        data.iter()
            .map(|c| format!("target.{c} IS DISTINCT FROM staged.{c}"))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

pub fn create_schema(spec: &TableSpec) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", spec.schema)
}

pub fn create_table(spec: &TableSpec) -> String {
    let columns = spec
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        spec.qualified()
    )
}

/// Load the staged parquet glob into the staging table, keeping one row
/// per key (the freshest `updated_at` wins when the upstream repeats a
/// record across pages).
pub fn load_staging(spec: &TableSpec, parquet_glob: &str) -> String {
    let keys = spec.key_columns.join(", ");
    format!(
        "CREATE OR REPLACE TABLE {} AS \
         SELECT * FROM read_parquet('{parquet_glob}') \
         QUALIFY ROW_NUMBER() OVER (PARTITION BY {keys} ORDER BY updated_at DESC) = 1",
        spec.staging_qualified()
    )
}

pub fn count_staging(spec: &TableSpec) -> String {
    format!("SELECT COUNT(*) FROM {}", spec.staging_qualified())
}

/// Matched rows whose content changed: update every mutable column.
/// `None` when there are no data columns to compare.
pub fn update_changed(spec: &TableSpec) -> Option<String> {
    let change = change_condition(spec)?;
    let assignments = spec
        .mutable_columns()
        .iter()
        .map(|c| format!("{c} = staged.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "UPDATE {target} AS target \
         SET {assignments} \
         FROM {staging} AS staged \
         WHERE {keys} AND ({change})",
        target = spec.qualified(),
        staging = spec.staging_qualified(),
        keys = key_condition(spec),
    ))
}

/// Matched rows with identical content: touch only `refreshed_at`.
pub fn refresh_unchanged(spec: &TableSpec) -> String {
    let keys = key_condition(spec);
    match change_condition(spec) {
        Some(change) => format!(
            "UPDATE {target} AS target \
             SET refreshed_at = staged.refreshed_at \
             FROM {staging} AS staged \
             WHERE {keys} AND NOT ({change})",
            target = spec.qualified(),
            staging = spec.staging_qualified(),
        ),
        None => format!(
            "UPDATE {target} AS target \
             SET refreshed_at = staged.refreshed_at \
             FROM {staging} AS staged \
             WHERE {keys}",
            target = spec.qualified(),
            staging = spec.staging_qualified(),
        ),
    }
}

/// Staged rows with no destination match: insert in full.
pub fn insert_missing(spec: &TableSpec) -> String {
    let columns = spec.column_names().join(", ");
    let staged_columns = spec
        .column_names()
        .iter()
        .map(|c| format!("staged.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {target} ({columns}) \
         SELECT {staged_columns} FROM {staging} AS staged \
         WHERE NOT EXISTS (\
           SELECT 1 FROM {target} AS target WHERE {keys}\
         )",
        target = spec.qualified(),
        staging = spec.staging_qualified(),
        keys = key_condition(spec),
    )
}

pub fn drop_staging(spec: &TableSpec) -> String {
    format!("DROP TABLE IF EXISTS {}", spec.staging_qualified())
}
