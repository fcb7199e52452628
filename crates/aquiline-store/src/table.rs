//! Destination table definitions.
//!
//! A [`TableSpec`] is configuration, not logic: the merge layer consumes
//! the declared columns and key set, and carries the partition/cluster
//! hints through without interpreting them.

/// Audit columns stamped by the transform layer and maintained by the
/// merge. `ingested_at` is immutable after insert; `updated_at` moves on
/// content changes; `refreshed_at` moves on every merge touch.
pub const AUDIT_COLUMNS: [&str; 3] = ["ingested_at", "updated_at", "refreshed_at"];

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
}

impl ColumnSpec {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
        }
    }
}

/// One destination table: `(schema, name)` address, declared columns,
/// merge keys, and optional layout hints.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Column subset that uniquely identifies a destination row.
    pub key_columns: Vec<String>,
    /// Time-based partition hint; metadata only.
    pub partition_hint: Option<String>,
    /// Clustering hint; metadata only.
    pub cluster_hint: Vec<String>,
}

impl TableSpec {
    /// `schema.name` for SQL.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// The run-scoped staging table the merge reads from.
    pub fn staging_qualified(&self) -> String {
        format!("{}.{}_staged", self.schema, self.name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Non-key, non-audit columns — the set the change check compares.
    pub fn data_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| {
                !self.key_columns.iter().any(|k| k == name)
                    && !AUDIT_COLUMNS.contains(name)
            })
            .collect()
    }

    /// Columns a full update overwrites: everything except the keys and
    /// `ingested_at`.
    pub fn mutable_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| !self.key_columns.iter().any(|k| k == name) && *name != "ingested_at")
            .collect()
    }

    /// Check the spec is internally coherent: every key and audit column
    /// must be declared. Returns the first missing column.
    pub fn missing_column(&self) -> Option<String> {
        let names = self.column_names();
        self.key_columns
            .iter()
            .map(String::as_str)
            .chain(AUDIT_COLUMNS)
            .find(|c| !names.contains(c))
            .map(String::from)
    }

    /// The measurements table this pipeline lands into.
    pub fn measurements(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: "measurements".to_string(),
            columns: vec![
                ColumnSpec::new("sensor_id", "BIGINT"),
                ColumnSpec::new("location_id", "BIGINT"),
                ColumnSpec::new("parameter", "VARCHAR"),
                ColumnSpec::new("units", "VARCHAR"),
                ColumnSpec::new("value", "DOUBLE"),
                ColumnSpec::new("datetime_from_utc", "TIMESTAMPTZ"),
                ColumnSpec::new("datetime_to_utc", "TIMESTAMPTZ"),
                ColumnSpec::new("datetime_from_local", "VARCHAR"),
                ColumnSpec::new("datetime_to_local", "VARCHAR"),
                ColumnSpec::new("coverage_percent", "DOUBLE"),
                ColumnSpec::new("ingested_at", "TIMESTAMPTZ"),
                ColumnSpec::new("updated_at", "TIMESTAMPTZ"),
                ColumnSpec::new("refreshed_at", "TIMESTAMPTZ"),
            ],
            key_columns: vec!["sensor_id".to_string(), "datetime_to_utc".to_string()],
            partition_hint: Some("datetime_to_utc".to_string()),
            cluster_hint: vec!["sensor_id".to_string(), "parameter".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TableSpec {
        TableSpec::measurements("aq")
    }

    #[test]
    fn qualified_names() {
        assert_eq!(spec().qualified(), "aq.measurements");
        assert_eq!(spec().staging_qualified(), "aq.measurements_staged");
    }

    #[test]
    fn data_columns_exclude_keys_and_audit() {
        let binding = spec();
        let data = binding.data_columns();
        assert!(!data.contains(&"sensor_id"));
        assert!(!data.contains(&"datetime_to_utc"));
        assert!(!data.contains(&"ingested_at"));
        assert!(!data.contains(&"refreshed_at"));
        assert!(data.contains(&"value"));
        assert!(data.contains(&"parameter"));
    }

    #[test]
    fn mutable_columns_keep_audit_except_ingested() {
        let binding = spec();
        let mutable = binding.mutable_columns();
        assert!(!mutable.contains(&"sensor_id"));
        assert!(!mutable.contains(&"ingested_at"));
        assert!(mutable.contains(&"updated_at"));
        assert!(mutable.contains(&"refreshed_at"));
        assert!(mutable.contains(&"value"));
    }

    #[test]
    fn measurements_spec_is_coherent() {
        assert_eq!(spec().missing_column(), None);
    }

    #[test]
    fn missing_key_column_detected() {
        let mut bad = spec();
        bad.key_columns.push("nonexistent".to_string());
        assert_eq!(bad.missing_column(), Some("nonexistent".to_string()));
    }

    #[test]
    fn missing_audit_column_detected() {
        let mut bad = spec();
        bad.columns.retain(|c| c.name != "refreshed_at");
        assert_eq!(bad.missing_column(), Some("refreshed_at".to_string()));
    }
}
