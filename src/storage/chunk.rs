//! Horizontal partition of a table

use crate::error::{QueryError, Result};
use crate::storage::{ColumnId, Segment};
use arrow::record_batch::RecordBatch;

/// A horizontal slice of a table: one equal-length segment per column.
///
/// Chunks are immutable once built and shared behind `Arc` by tables,
/// entire-chunk position lists and reference segments alike.
#[derive(Debug, Clone)]
pub struct Chunk {
    segments: Vec<Segment>,
    size: usize,
}

impl Chunk {
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        let size = segments.first().map_or(0, |s| s.len());
        if let Some((column_id, segment)) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != size)
        {
            return Err(QueryError::Execution(format!(
                "Segment {} has {} rows, expected {}",
                column_id,
                segment.len(),
                size
            )));
        }
        Ok(Self { segments, size })
    }

    /// Wrap the columns of a record batch as value segments (no copy)
    pub fn from_record_batch(batch: &RecordBatch) -> Self {
        Self {
            segments: batch.columns().iter().cloned().map(Segment::Value).collect(),
            size: batch.num_rows(),
        }
    }

    /// Number of rows
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn column_count(&self) -> usize {
        self.segments.len()
    }

    pub fn get_segment(&self, column_id: ColumnId) -> &Segment {
        &self.segments[column_id as usize]
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn estimate_memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .segments
                .iter()
                .map(Segment::estimate_memory_usage)
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;

    #[test]
    fn test_chunk_size_from_segments() {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let b: ArrayRef = Arc::new(Int64Array::from(vec![4, 5, 6]));
        let chunk = Chunk::new(vec![Segment::Value(a), Segment::Value(b)]).unwrap();
        assert_eq!(chunk.size(), 3);
        assert_eq!(chunk.column_count(), 2);
    }

    #[test]
    fn test_chunk_rejects_ragged_segments() {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let b: ArrayRef = Arc::new(Int64Array::from(vec![4]));
        assert!(Chunk::new(vec![Segment::Value(a), Segment::Value(b)]).is_err());
    }
}
