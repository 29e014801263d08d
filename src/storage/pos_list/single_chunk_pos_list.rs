use super::PositionList;
use crate::storage::{ChunkId, IndexIterator, MemoryUsageCalculationMode, RowId, INVALID_CHUNK_ID};

/// Position list over a contiguous range of a chunk index.
///
/// Row `n` is `(chunk_id, offset found n steps after range_begin)`. The list is
/// read-only; callers needing to modify it go through
/// [`PosList`](super::PosList), which refuses to.
#[derive(Debug, Clone)]
pub struct SingleChunkPosList {
    chunk_id: ChunkId,
    range_begin: IndexIterator,
    range_end: IndexIterator,
}

impl SingleChunkPosList {
    pub fn new(chunk_id: ChunkId, range_begin: IndexIterator, range_end: IndexIterator) -> Self {
        assert!(
            chunk_id != INVALID_CHUNK_ID,
            "Single chunk position list needs a valid chunk id"
        );
        assert!(
            range_begin.is_same_index(&range_end),
            "Range bounds belong to different indexes"
        );
        assert!(
            range_begin.position() <= range_end.position(),
            "Range end precedes range begin"
        );
        Self {
            chunk_id,
            range_begin,
            range_end,
        }
    }

    pub fn range_begin(&self) -> &IndexIterator {
        &self.range_begin
    }

    pub fn range_end(&self) -> &IndexIterator {
        &self.range_end
    }
}

impl PositionList for SingleChunkPosList {
    #[inline]
    fn len(&self) -> usize {
        self.range_begin.distance_to(&self.range_end)
    }

    #[inline]
    fn get(&self, n: usize) -> RowId {
        debug_assert!(n < self.len(), "Position {} out of bounds", n);
        RowId::new(self.chunk_id, self.range_begin.offset_at(n))
    }

    fn references_single_chunk(&self) -> bool {
        true
    }

    fn common_chunk_id(&self) -> ChunkId {
        assert!(!self.is_empty(), "Empty position list has no common chunk");
        self.chunk_id
    }

    fn memory_usage(&self, _mode: MemoryUsageCalculationMode) -> usize {
        std::mem::size_of::<Self>()
    }
}
