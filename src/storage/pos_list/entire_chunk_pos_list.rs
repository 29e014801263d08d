use super::{PositionList, RowIdPosList};
use crate::storage::{
    Chunk, ChunkId, ChunkOffset, MemoryUsageCalculationMode, RowId, INVALID_CHUNK_ID,
};
use std::sync::Arc;
use tracing::warn;

/// Position list selecting every row of one chunk.
///
/// Nothing is stored per row: the length is read from the chunk when asked,
/// and row `n` is `(chunk_id, n)`.
#[derive(Debug, Clone)]
pub struct EntireChunkPosList {
    common_chunk: Arc<Chunk>,
    common_chunk_id: ChunkId,
}

impl EntireChunkPosList {
    pub fn new(common_chunk: Arc<Chunk>, common_chunk_id: ChunkId) -> Self {
        assert!(
            common_chunk_id != INVALID_CHUNK_ID,
            "Entire chunk position list needs a valid chunk id"
        );
        Self {
            common_chunk,
            common_chunk_id,
        }
    }

    pub fn chunk(&self) -> &Arc<Chunk> {
        &self.common_chunk
    }

    pub fn chunk_id(&self) -> ChunkId {
        self.common_chunk_id
    }

    /// Explicit row ids for every row of the chunk
    pub fn materialize(&self) -> RowIdPosList {
        let len = self.len();
        warn!(
            chunk_id = self.common_chunk_id,
            rows = len,
            "Materializing entire-chunk position list"
        );
        let mut list = RowIdPosList::with_capacity(len);
        list.extend((0..len).map(|offset| RowId::new(self.common_chunk_id, offset as ChunkOffset)));
        list.guarantee_single_chunk();
        list
    }
}

impl PositionList for EntireChunkPosList {
    #[inline]
    fn len(&self) -> usize {
        self.common_chunk.size()
    }

    #[inline]
    fn get(&self, n: usize) -> RowId {
        debug_assert!(n < self.len(), "Position {} out of bounds", n);
        RowId::new(self.common_chunk_id, n as ChunkOffset)
    }

    fn references_single_chunk(&self) -> bool {
        true
    }

    fn common_chunk_id(&self) -> ChunkId {
        assert!(!self.is_empty(), "Empty position list has no common chunk");
        self.common_chunk_id
    }

    fn memory_usage(&self, _mode: MemoryUsageCalculationMode) -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Segment;
    use arrow::array::Int32Array;

    fn chunk(rows: i32) -> Arc<Chunk> {
        let values: Vec<i32> = (0..rows).collect();
        Arc::new(Chunk::new(vec![Segment::Value(Arc::new(Int32Array::from(values)))]).unwrap())
    }

    #[test]
    fn test_rows_are_chunk_offsets() {
        let list = EntireChunkPosList::new(chunk(3), 4);
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(2), RowId::new(4, 2));
        assert!(list.references_single_chunk());
        assert_eq!(list.common_chunk_id(), 4);
    }

    #[test]
    fn test_materialize() {
        let list = EntireChunkPosList::new(chunk(2), 1);
        let materialized = list.materialize();
        assert_eq!(materialized.as_slice(), &[RowId::new(1, 0), RowId::new(1, 1)]);
        assert!(materialized.references_single_chunk());
    }

    #[test]
    fn test_memory_usage_is_constant() {
        let small = EntireChunkPosList::new(chunk(1), 0);
        let large = EntireChunkPosList::new(chunk(1000), 0);
        assert_eq!(
            small.memory_usage(MemoryUsageCalculationMode::Full),
            large.memory_usage(MemoryUsageCalculationMode::Full)
        );
    }

    #[test]
    #[should_panic(expected = "valid chunk id")]
    fn test_invalid_chunk_id() {
        EntireChunkPosList::new(chunk(1), INVALID_CHUNK_ID);
    }
}
