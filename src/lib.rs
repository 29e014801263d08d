//! Columnar query core
//!
//! Position lists, reference segments and grouped hash aggregation over
//! chunked, Arrow-backed tables. Tables are loaded from Parquet, filtered or
//! index-scanned into reference tables, and aggregated in parallel per chunk.

pub mod cli;
pub mod datagen;
pub mod error;
pub mod execution;
pub mod physical;
pub mod storage;

// Re-export main types
pub use error::{QueryError, Result};
pub use execution::{ExecutionContext, MemoryPool};
pub use physical::{
    AggregateColumnDefinition, AggregateFunction, CompareOp, FilterExec, HashAggregateExec,
    IndexScanExec, PhysicalOperator, Predicate, TableScanExec,
};
pub use storage::{ParquetTable, PosList, PositionList, RowId, Segment, Table};
