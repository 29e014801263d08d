//! Identifiers shared by the storage layer

use std::fmt;

/// Position of a chunk within its table
pub type ChunkId = u32;

/// Position of a row within its chunk
pub type ChunkOffset = u32;

/// Position of a column within a table schema
pub type ColumnId = u16;

pub const INVALID_CHUNK_ID: ChunkId = ChunkId::MAX;
pub const INVALID_CHUNK_OFFSET: ChunkOffset = ChunkOffset::MAX;

/// Identifies one row of a table as (chunk, offset within chunk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub chunk_id: ChunkId,
    pub chunk_offset: ChunkOffset,
}

/// Points nowhere. Resolves to a null value through a reference segment.
pub const NULL_ROW_ID: RowId = RowId {
    chunk_id: INVALID_CHUNK_ID,
    chunk_offset: INVALID_CHUNK_OFFSET,
};

impl RowId {
    pub const fn new(chunk_id: ChunkId, chunk_offset: ChunkOffset) -> Self {
        Self {
            chunk_id,
            chunk_offset,
        }
    }

    pub fn is_null(&self) -> bool {
        self.chunk_id == INVALID_CHUNK_ID
    }
}

impl Default for RowId {
    fn default() -> Self {
        NULL_ROW_ID
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "RowId(NULL)")
        } else {
            write!(f, "RowId({}, {})", self.chunk_id, self.chunk_offset)
        }
    }
}

/// How thoroughly memory usage should be computed.
///
/// `Sampled` may extrapolate from a subset of the data, `Full` walks everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryUsageCalculationMode {
    #[default]
    Sampled,
    Full,
}
