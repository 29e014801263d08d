//! Chunked columnar storage
//!
//! Tables are split into chunks; each chunk holds one segment per column. A
//! segment either owns its values as an Arrow array or references another
//! table's values through a position list.

mod chunk;
pub(crate) mod column_type;
mod index;
mod parquet;
pub mod pos_list;
mod reference_segment;
mod scalar;
mod segment;
mod table;
mod types;

pub use chunk::Chunk;
pub use column_type::{is_numeric_type, is_supported_type, ColumnType, NumericType};
pub use index::{ChunkIndex, IndexIterator};
pub use parquet::{write_parquet, ParquetTable};
pub use pos_list::{
    EntireChunkPosList, PosList, PosListIter, PositionList, RowIdPosList, SingleChunkPosList,
};
pub use reference_segment::ReferenceSegment;
pub use scalar::ScalarValue;
pub use segment::Segment;
pub use table::{Table, DEFAULT_CHUNK_SIZE};
pub use types::{
    ChunkId, ChunkOffset, ColumnId, MemoryUsageCalculationMode, RowId, INVALID_CHUNK_ID,
    INVALID_CHUNK_OFFSET, NULL_ROW_ID,
};
