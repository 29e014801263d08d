//! Chunked tables

use crate::error::{QueryError, Result};
use crate::storage::{Chunk, ChunkId, ColumnId, RowId, ScalarValue};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Rows per chunk when none is requested
pub const DEFAULT_CHUNK_SIZE: usize = 65_535;

/// A schema plus an ordered list of chunks
#[derive(Debug)]
pub struct Table {
    schema: SchemaRef,
    chunks: Vec<Arc<Chunk>>,
}

impl Table {
    pub fn new(schema: SchemaRef, chunks: Vec<Arc<Chunk>>) -> Result<Self> {
        for (chunk_id, chunk) in chunks.iter().enumerate() {
            if chunk.column_count() != schema.fields().len() {
                return Err(QueryError::Execution(format!(
                    "Chunk {} has {} columns, schema has {}",
                    chunk_id,
                    chunk.column_count(),
                    schema.fields().len()
                )));
            }
            for (segment, field) in chunk.segments().iter().zip(schema.fields()) {
                if &segment.data_type() != field.data_type() {
                    return Err(QueryError::Execution(format!(
                        "Chunk {} column '{}' is {:?}, schema says {:?}",
                        chunk_id,
                        field.name(),
                        segment.data_type(),
                        field.data_type()
                    )));
                }
            }
        }
        Ok(Self { schema, chunks })
    }

    /// One chunk per batch
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        let chunks = batches
            .iter()
            .filter(|batch| batch.num_rows() > 0)
            .map(|batch| Arc::new(Chunk::from_record_batch(batch)))
            .collect();
        Self::new(schema, chunks)
    }

    /// Split batches into chunks of at most `chunk_size` rows
    pub fn from_batches_with_chunk_size(
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        chunk_size: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(QueryError::Config("Chunk size must be positive".into()));
        }
        let mut chunks = Vec::new();
        for batch in &batches {
            let mut offset = 0;
            while offset < batch.num_rows() {
                let len = chunk_size.min(batch.num_rows() - offset);
                chunks.push(Arc::new(Chunk::from_record_batch(&batch.slice(offset, len))));
                offset += len;
            }
        }
        Self::new(schema, chunks)
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn chunks(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> ChunkId {
        self.chunks.len() as ChunkId
    }

    pub fn get_chunk(&self, chunk_id: ChunkId) -> &Arc<Chunk> {
        &self.chunks[chunk_id as usize]
    }

    pub fn row_count(&self) -> usize {
        self.chunks.iter().map(|c| c.size()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_id(&self, name: &str) -> Result<ColumnId> {
        self.schema
            .index_of(name)
            .map(|index| index as ColumnId)
            .map_err(|_| QueryError::ColumnNotFound(name.to_string()))
    }

    pub fn column_name(&self, column_id: ColumnId) -> &str {
        self.schema.field(column_id as usize).name()
    }

    pub fn column_data_type(&self, column_id: ColumnId) -> &DataType {
        self.schema.field(column_id as usize).data_type()
    }

    /// Value of one cell; the null row id reads as null
    pub fn get_value(&self, column_id: ColumnId, row_id: RowId) -> Result<ScalarValue> {
        if row_id.is_null() {
            return Ok(ScalarValue::Null);
        }
        let chunk = self.chunks.get(row_id.chunk_id as usize).ok_or_else(|| {
            QueryError::Internal(format!("{} points past the last chunk", row_id))
        })?;
        chunk
            .get_segment(column_id)
            .value(row_id.chunk_offset as usize)
    }

    /// One record batch per chunk, with reference segments resolved
    pub fn to_record_batches(&self) -> Result<Vec<RecordBatch>> {
        self.chunks
            .iter()
            .map(|chunk| {
                let columns = chunk
                    .segments()
                    .iter()
                    .map(|segment| segment.materialize())
                    .collect::<Result<Vec<_>>>()?;
                Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
            })
            .collect()
    }

    pub fn estimate_memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .chunks
                .iter()
                .map(|c| c.estimate_memory_usage())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("v", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b", "c", "d", "e"])),
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_chunking() {
        let batch = batch();
        let table =
            Table::from_batches_with_chunk_size(batch.schema(), vec![batch], 2).unwrap();
        assert_eq!(table.chunk_count(), 3);
        assert_eq!(table.row_count(), 5);
        assert_eq!(table.get_chunk(2).size(), 1);
        assert_eq!(
            table.get_value(1, RowId::new(1, 1)).unwrap(),
            ScalarValue::Int64(4)
        );
        assert!(table.get_value(1, crate::storage::NULL_ROW_ID).unwrap().is_null());
    }

    #[test]
    fn test_column_lookup() {
        let batch = batch();
        let table = Table::from_batches(batch.schema(), vec![batch]).unwrap();
        assert_eq!(table.column_id("v").unwrap(), 1);
        assert!(matches!(
            table.column_id("missing"),
            Err(QueryError::ColumnNotFound(_))
        ));
        assert_eq!(table.column_data_type(0), &DataType::Utf8);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let batch = batch();
        assert!(Table::from_batches_with_chunk_size(batch.schema(), vec![batch], 0).is_err());
    }

    #[test]
    fn test_round_trip_to_batches() {
        let batch = batch();
        let table =
            Table::from_batches_with_chunk_size(batch.schema(), vec![batch.clone()], 3).unwrap();
        let batches = table.to_record_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].num_rows() + batches[1].num_rows(), 5);
    }
}
