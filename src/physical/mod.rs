//! Physical execution module
//!
//! Operators producing chunked tables, and the aggregation they feed

pub mod aggregate;
pub mod operators;
mod plan;

pub use aggregate::{AggregateColumnDefinition, AggregateFunction};
pub use operators::*;
pub use plan::*;
