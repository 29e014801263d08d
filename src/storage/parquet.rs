//! Parquet files as chunked tables
//!
//! Reads one file or a directory of `.parquet` files into a [`Table`]. Row
//! groups are re-sliced into chunks of the requested size.

use crate::error::{QueryError, Result};
use crate::storage::Table;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One or more Parquet files sharing a schema
#[derive(Debug)]
pub struct ParquetTable {
    schema: SchemaRef,
    files: Vec<PathBuf>,
}

impl ParquetTable {
    /// Open a single file, or all `.parquet` files of a directory
    pub fn try_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let files = if path.is_dir() {
            Self::find_parquet_files(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(QueryError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Path does not exist: {}", path.display()),
            )));
        };

        if files.is_empty() {
            return Err(QueryError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No Parquet files found in: {}", path.display()),
            )));
        }

        let schema = Self::read_schema(&files[0])?;
        Ok(Self { schema, files })
    }

    fn find_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_schema(path: &Path) -> Result<SchemaRef> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        Ok(builder.schema().clone())
    }

    fn read_file(
        path: &Path,
        projection: Option<&[usize]>,
        batch_size: usize,
    ) -> Result<Vec<RecordBatch>> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(batch_size);

        let reader = match projection {
            Some(indices) => {
                let mask = ProjectionMask::roots(builder.parquet_schema(), indices.iter().copied());
                builder.with_projection(mask).build()?
            }
            None => builder.build()?,
        };

        Ok(reader.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read every file into a table with chunks of at most `chunk_size` rows
    pub fn load(&self, chunk_size: usize) -> Result<Table> {
        self.load_projected(None, chunk_size)
    }

    /// Like [`load`](Self::load) but only the given columns
    pub fn load_projected(&self, projection: Option<&[usize]>, chunk_size: usize) -> Result<Table> {
        if chunk_size == 0 {
            return Err(QueryError::Config("Chunk size must be positive".into()));
        }
        let mut batches = Vec::new();
        for path in &self.files {
            let file_batches = Self::read_file(path, projection, chunk_size)?;
            debug!(
                file = %path.display(),
                batches = file_batches.len(),
                "Read parquet file"
            );
            batches.extend(file_batches);
        }

        let schema = match projection {
            Some(indices) => std::sync::Arc::new(self.schema.project(indices)?),
            None => self.schema.clone(),
        };
        Table::from_batches_with_chunk_size(schema, batches, chunk_size)
    }
}

/// Write batches to a Snappy-compressed Parquet file
pub fn write_parquet(path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        QueryError::Execution(format!(
            "Failed to create parquet file {}: {}",
            path.display(),
            e
        ))
    })?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}
