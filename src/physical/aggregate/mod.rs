//! Grouped aggregation machinery
//!
//! [`KeyEncoder`] turns grouping columns into per-row keys, [`AggregationState`]
//! folds rows into per-group accumulators, and [`build_output`] produces the
//! result table. The operator driving these is
//! [`HashAggregateExec`](crate::physical::HashAggregateExec).

pub mod accumulator;
mod definition;
mod grouping;
pub mod keys;
mod output;

pub use accumulator::{
    accumulator_factory, AccumulatorFactory, AggregateFunctor, AggregateResult,
    CountRowsAccumulator, GroupsAccumulator, TypedAccumulator,
};
pub use definition::{AggregateColumnDefinition, AggregateFunction};
pub use grouping::{AggregationState, GroupingMap};
pub use keys::{
    AggregateKey, AggregateKeyEntry, AggregateKeys, EmptyAggregateKey, KeyEncoder, KeyShape,
    KeysPerChunk,
};
pub use output::build_output;
