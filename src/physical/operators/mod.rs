//! Physical operators

mod filter;
mod hash_agg;
mod index_scan;
mod reference;
mod scan;

pub use filter::{CompareOp, FilterExec, Predicate};
pub use hash_agg::HashAggregateExec;
pub use index_scan::IndexScanExec;
pub use reference::reference_segments;
pub use scan::TableScanExec;
