//! Per-slide parquet index files
//!
//! Each file lists the pre-cut patches of one slide in a `patch_file`
//! string column, relative to the index directory.

use arrow_array::{Array, LargeStringArray, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;

use super::descriptor::PatchDescriptor;
use crate::error::{PatchkitError, Result};

pub const PATCH_FILE_COLUMN: &str = "patch_file";

/// Read one parquet index file into on-disk descriptors, in row order.
pub fn read_parquet_index(path: &Path, patches_dir: &Path) -> Result<Vec<PatchDescriptor>> {
    let file = File::open(path)
        .map_err(|e| PatchkitError::config(path, format!("unreadable: {e}")))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|e| PatchkitError::config(path, format!("malformed parquet: {e}")))?;

    let mut patches = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| PatchkitError::config(path, format!("read failed: {e}")))?;
        let column = batch.column_by_name(PATCH_FILE_COLUMN).ok_or_else(|| {
            PatchkitError::config(path, format!("missing `{PATCH_FILE_COLUMN}` column"))
        })?;

        let any = column.as_any();
        let values: Vec<Option<&str>> = if let Some(a) = any.downcast_ref::<StringArray>() {
            a.iter().collect()
        } else if let Some(a) = any.downcast_ref::<LargeStringArray>() {
            a.iter().collect()
        } else {
            let found = column.data_type();
            return Err(PatchkitError::config(
                path,
                format!("`{PATCH_FILE_COLUMN}` must be a string column, found {found}"),
            ));
        };

        for (row, value) in values.into_iter().enumerate() {
            let rel = value.ok_or_else(|| {
                PatchkitError::config(path, format!("null `{PATCH_FILE_COLUMN}` in row {row}"))
            })?;
            patches.push(PatchDescriptor::on_disk(patches_dir.join(rel)));
        }
    }

    Ok(patches)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use arrow_array::{ArrayRef, RecordBatch, UInt64Array};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::tempdir;

    pub(crate) fn write_parquet_index(path: &Path, files: &[Option<&str>]) {
        let schema = Arc::new(Schema::new(vec![Field::new(
            PATCH_FILE_COLUMN,
            DataType::Utf8,
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(files.to_vec())) as ArrayRef],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_reads_rows_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slide.parquet");
        write_parquet_index(&path, &[Some("a/1.png"), Some("a/2.png")]);

        let patches = read_parquet_index(&path, dir.path()).unwrap();
        assert_eq!(
            patches,
            vec![
                PatchDescriptor::on_disk(dir.path().join("a/1.png")),
                PatchDescriptor::on_disk(dir.path().join("a/2.png")),
            ]
        );
    }

    #[test]
    fn test_null_path_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slide.parquet");
        write_parquet_index(&path, &[Some("a.png"), None]);

        let err = read_parquet_index(&path, dir.path()).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_wrong_column_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slide.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::UInt64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(UInt64Array::from(vec![1u64, 2])) as ArrayRef],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = read_parquet_index(&path, dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing `patch_file` column"));
    }

    #[test]
    fn test_not_parquet_is_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slide.parquet");
        std::fs::write(&path, b"not parquet").unwrap();
        assert!(matches!(
            read_parquet_index(&path, dir.path()),
            Err(PatchkitError::Configuration { .. })
        ));
    }
}
