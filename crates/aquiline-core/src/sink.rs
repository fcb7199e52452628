//! Parquet output sink with atomic tmp→rename commit.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

/// Buffered parquet writer. Data goes to `{name}.tmp` and is renamed to
/// its final name only on `finalize`, so a crash mid-write never leaves
/// a truncated file that looks complete.
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a new sink writing `filename` under `output_dir`.
    pub fn new(
        output_dir: &Path,
        filename: &str,
        schema: &Schema,
        zstd_level: i32,
    ) -> Result<Self, std::io::Error> {
        let final_path = output_dir.join(filename);
        let tmp_path = output_dir.join(format!("{filename}.tmp"));

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))
            .map_err(std::io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    /// Write a record batch
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), std::io::Error> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(std::io::Error::other)
    }

    /// Finalize: flush footer and atomically rename tmp → final
    pub fn finalize(self) -> Result<usize, std::io::Error> {
        let row_count = self.row_count;
        self.writer.close().map_err(std::io::Error::other)?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field};
    use tempfile::TempDir;

    fn test_batch() -> (Schema, RecordBatch) {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema.clone()),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        (schema, batch)
    }

    #[test]
    fn sink_writes_and_renames() {
        let dir = TempDir::new().unwrap();
        let (schema, batch) = test_batch();

        let mut sink = ParquetSink::new(dir.path(), "sensor_0000042.parquet", &schema, 3).unwrap();
        sink.write_batch(&batch).unwrap();
        let rows = sink.finalize().unwrap();

        assert_eq!(rows, 3);
        let final_path = dir.path().join("sensor_0000042.parquet");
        assert!(final_path.exists());
        assert!(!dir.path().join("sensor_0000042.parquet.tmp").exists());
        assert!(is_valid_parquet(&final_path));
    }

    #[test]
    fn unfinalized_sink_leaves_only_tmp() {
        let dir = TempDir::new().unwrap();
        let (schema, batch) = test_batch();

        let mut sink = ParquetSink::new(dir.path(), "partial.parquet", &schema, 3).unwrap();
        sink.write_batch(&batch).unwrap();
        drop(sink);

        assert!(!dir.path().join("partial.parquet").exists());
        assert!(dir.path().join("partial.parquet.tmp").exists());
    }

    #[test]
    fn stale_tmp_is_replaced() {
        let dir = TempDir::new().unwrap();
        let (schema, batch) = test_batch();
        std::fs::write(dir.path().join("data.parquet.tmp"), b"stale").unwrap();

        let mut sink = ParquetSink::new(dir.path(), "data.parquet", &schema, 3).unwrap();
        sink.write_batch(&batch).unwrap();
        sink.finalize().unwrap();

        assert!(is_valid_parquet(&dir.path().join("data.parquet")));
    }

    #[test]
    fn is_valid_parquet_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(!is_valid_parquet(&dir.path().join("nope.parquet")));
    }

    #[test]
    fn is_valid_parquet_not_parquet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.parquet");
        std::fs::write(&path, b"this is not parquet").unwrap();
        assert!(!is_valid_parquet(&path));
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.tmp"), b"stale").unwrap();
        std::fs::write(dir.path().join("b.parquet"), b"keep").unwrap();

        cleanup_tmp_files(dir.path()).unwrap();

        assert!(!dir.path().join("a.tmp").exists());
        assert!(dir.path().join("b.parquet").exists());
    }
}
