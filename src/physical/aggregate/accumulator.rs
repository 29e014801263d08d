//! Per-group running aggregates
//!
//! An accumulator holds one [`AggregateResult`] per group for one output
//! aggregate. Rows are folded in with [`GroupsAccumulator::update`], partial
//! accumulators from other chunks are combined with
//! [`GroupsAccumulator::merge`], and the final column is produced by
//! [`GroupsAccumulator::evaluate`].

use crate::error::{QueryError, Result};
use crate::physical::aggregate::AggregateFunction;
use crate::storage::column_type::{with_column_type, with_numeric_type};
use crate::storage::{ColumnType, NumericType, Segment};
use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::DataType;
use ordered_float::OrderedFloat;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Running state of one aggregate for one group
#[derive(Debug, Clone)]
pub struct AggregateResult<A, V: Ord> {
    pub current_aggregate: Option<A>,
    pub aggregate_count: u64,
    pub distinct_values: BTreeSet<V>,
}

impl<A, V: Ord> Default for AggregateResult<A, V> {
    fn default() -> Self {
        Self {
            current_aggregate: None,
            aggregate_count: 0,
            distinct_values: BTreeSet::new(),
        }
    }
}

/// Folding rules of one aggregate function over values of type `V`
pub trait AggregateFunctor<V: ColumnType>: fmt::Debug + Send + 'static {
    type Aggregate: Clone + fmt::Debug + Send + 'static;
    type Output: ColumnType;

    fn fold(result: &mut AggregateResult<Self::Aggregate, V>, value: V);

    fn combine(
        into: &mut AggregateResult<Self::Aggregate, V>,
        from: AggregateResult<Self::Aggregate, V>,
    );

    fn finalize(result: &AggregateResult<Self::Aggregate, V>) -> Option<Self::Output>;
}

#[derive(Debug)]
pub struct Min;

#[derive(Debug)]
pub struct Max;

#[derive(Debug)]
pub struct Sum;

#[derive(Debug)]
pub struct Avg;

#[derive(Debug)]
pub struct Count;

#[derive(Debug)]
pub struct CountDistinct;

fn keep_if<V>(current: &mut Option<V>, candidate: V, better: impl Fn(&V, &V) -> bool) {
    let replace = match current.as_ref() {
        Some(existing) => better(&candidate, existing),
        None => true,
    };
    if replace {
        *current = Some(candidate);
    }
}

impl<V: ColumnType> AggregateFunctor<V> for Min {
    type Aggregate = V;
    type Output = V;

    fn fold(result: &mut AggregateResult<V, V>, value: V) {
        keep_if(&mut result.current_aggregate, value, |new, old| new < old);
        result.aggregate_count += 1;
    }

    fn combine(into: &mut AggregateResult<V, V>, from: AggregateResult<V, V>) {
        if let Some(value) = from.current_aggregate {
            keep_if(&mut into.current_aggregate, value, |new, old| new < old);
        }
        into.aggregate_count += from.aggregate_count;
    }

    fn finalize(result: &AggregateResult<V, V>) -> Option<V> {
        result.current_aggregate.clone()
    }
}

impl<V: ColumnType> AggregateFunctor<V> for Max {
    type Aggregate = V;
    type Output = V;

    fn fold(result: &mut AggregateResult<V, V>, value: V) {
        keep_if(&mut result.current_aggregate, value, |new, old| new > old);
        result.aggregate_count += 1;
    }

    fn combine(into: &mut AggregateResult<V, V>, from: AggregateResult<V, V>) {
        if let Some(value) = from.current_aggregate {
            keep_if(&mut into.current_aggregate, value, |new, old| new > old);
        }
        into.aggregate_count += from.aggregate_count;
    }

    fn finalize(result: &AggregateResult<V, V>) -> Option<V> {
        result.current_aggregate.clone()
    }
}

fn accumulate_sum<V: NumericType>(into: &mut Option<V::Sum>, from: Option<V::Sum>) {
    if let Some(from) = from {
        *into = Some(V::add_sums(into.unwrap_or_default(), from));
    }
}

impl<V: NumericType> AggregateFunctor<V> for Sum {
    type Aggregate = V::Sum;
    type Output = V::Sum;

    fn fold(result: &mut AggregateResult<V::Sum, V>, value: V) {
        accumulate_sum::<V>(&mut result.current_aggregate, Some(value.widen()));
        result.aggregate_count += 1;
    }

    fn combine(into: &mut AggregateResult<V::Sum, V>, from: AggregateResult<V::Sum, V>) {
        accumulate_sum::<V>(&mut into.current_aggregate, from.current_aggregate);
        into.aggregate_count += from.aggregate_count;
    }

    fn finalize(result: &AggregateResult<V::Sum, V>) -> Option<V::Sum> {
        result.current_aggregate
    }
}

impl<V: NumericType> AggregateFunctor<V> for Avg {
    type Aggregate = V::Sum;
    type Output = OrderedFloat<f64>;

    fn fold(result: &mut AggregateResult<V::Sum, V>, value: V) {
        accumulate_sum::<V>(&mut result.current_aggregate, Some(value.widen()));
        result.aggregate_count += 1;
    }

    fn combine(into: &mut AggregateResult<V::Sum, V>, from: AggregateResult<V::Sum, V>) {
        accumulate_sum::<V>(&mut into.current_aggregate, from.current_aggregate);
        into.aggregate_count += from.aggregate_count;
    }

    fn finalize(result: &AggregateResult<V::Sum, V>) -> Option<OrderedFloat<f64>> {
        // a sum exists only once a row was counted
        result
            .current_aggregate
            .map(|sum| OrderedFloat(V::sum_to_f64(sum) / result.aggregate_count as f64))
    }
}

impl<V: ColumnType> AggregateFunctor<V> for Count {
    type Aggregate = ();
    type Output = i64;

    fn fold(result: &mut AggregateResult<(), V>, _value: V) {
        result.aggregate_count += 1;
    }

    fn combine(into: &mut AggregateResult<(), V>, from: AggregateResult<(), V>) {
        into.aggregate_count += from.aggregate_count;
    }

    fn finalize(result: &AggregateResult<(), V>) -> Option<i64> {
        Some(result.aggregate_count as i64)
    }
}

impl<V: ColumnType> AggregateFunctor<V> for CountDistinct {
    type Aggregate = ();
    type Output = i64;

    fn fold(result: &mut AggregateResult<(), V>, value: V) {
        result.distinct_values.insert(value);
    }

    fn combine(into: &mut AggregateResult<(), V>, mut from: AggregateResult<(), V>) {
        if into.distinct_values.len() < from.distinct_values.len() {
            std::mem::swap(&mut into.distinct_values, &mut from.distinct_values);
        }
        into.distinct_values.append(&mut from.distinct_values);
    }

    fn finalize(result: &AggregateResult<(), V>) -> Option<i64> {
        Some(result.distinct_values.len() as i64)
    }
}

/// Running aggregates of one output column for every group
pub trait GroupsAccumulator: fmt::Debug + Send {
    /// Fold row `i` of `segment` into group `group_indices[i]`.
    ///
    /// `segment` is `None` for COUNT(*).
    fn update(
        &mut self,
        segment: Option<&Segment>,
        group_indices: &[usize],
        total_groups: usize,
    ) -> Result<()>;

    /// Combine a partial accumulator of the same kind; its group `i` is group `mapping[i]` here
    fn merge(
        &mut self,
        other: Box<dyn GroupsAccumulator>,
        mapping: &[usize],
        total_groups: usize,
    ) -> Result<()>;

    /// Final values for groups `0..total_groups`
    fn evaluate(self: Box<Self>, total_groups: usize) -> Result<ArrayRef>;

    /// Approximate heap bytes held
    fn size(&self) -> usize;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

fn merge_mismatch() -> QueryError {
    QueryError::Internal("Cannot merge accumulators of different kinds".into())
}

/// Accumulator applying functor `F` to column values of type `V`
#[derive(Debug)]
pub struct TypedAccumulator<V: ColumnType, F: AggregateFunctor<V>> {
    results: Vec<AggregateResult<F::Aggregate, V>>,
    /// Values held in all distinct sets, kept current by `update` and `merge`
    distinct_count: usize,
    _functor: PhantomData<F>,
}

impl<V: ColumnType, F: AggregateFunctor<V>> TypedAccumulator<V, F> {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            distinct_count: 0,
            _functor: PhantomData,
        }
    }

    fn ensure_groups(&mut self, total_groups: usize) -> Result<()> {
        if total_groups > self.results.len() {
            self.results.try_reserve(total_groups - self.results.len())?;
            self.results.resize_with(total_groups, AggregateResult::default);
        }
        Ok(())
    }
}

impl<V: ColumnType, F: AggregateFunctor<V>> Default for TypedAccumulator<V, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ColumnType, F: AggregateFunctor<V>> GroupsAccumulator for TypedAccumulator<V, F> {
    fn update(
        &mut self,
        segment: Option<&Segment>,
        group_indices: &[usize],
        total_groups: usize,
    ) -> Result<()> {
        self.ensure_groups(total_groups)?;
        let segment = segment.ok_or_else(|| {
            QueryError::Internal("Column aggregate called without its input column".into())
        })?;
        let results = &mut self.results;
        let distinct_count = &mut self.distinct_count;
        segment.for_each_value::<V>(|offset, value| {
            let result = &mut results[group_indices[offset as usize]];
            let before = result.distinct_values.len();
            F::fold(result, value);
            *distinct_count += result.distinct_values.len() - before;
        })
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupsAccumulator>,
        mapping: &[usize],
        total_groups: usize,
    ) -> Result<()> {
        self.ensure_groups(total_groups)?;
        let other = other.into_any().downcast::<Self>().map_err(|_| merge_mismatch())?;
        for (partial, &group) in other.results.into_iter().zip(mapping) {
            let result = &mut self.results[group];
            let before = result.distinct_values.len();
            F::combine(result, partial);
            self.distinct_count += result.distinct_values.len() - before;
        }
        Ok(())
    }

    fn evaluate(self: Box<Self>, total_groups: usize) -> Result<ArrayRef> {
        let mut values = Vec::new();
        values.try_reserve_exact(total_groups)?;
        values.extend(self.results.iter().take(total_groups).map(F::finalize));
        // groups that never saw a row, only the single group of an empty global aggregate
        let untouched = F::finalize(&AggregateResult::default());
        values.resize(total_groups, untouched);
        Ok(<F::Output as ColumnType>::build_array(values))
    }

    fn size(&self) -> usize {
        self.results.capacity() * std::mem::size_of::<AggregateResult<F::Aggregate, V>>()
            + self.distinct_count * std::mem::size_of::<V>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// COUNT(*): counts rows per group without reading any column
#[derive(Debug, Default)]
pub struct CountRowsAccumulator {
    counts: Vec<u64>,
}

impl CountRowsAccumulator {
    fn ensure_groups(&mut self, total_groups: usize) -> Result<()> {
        if total_groups > self.counts.len() {
            self.counts.try_reserve(total_groups - self.counts.len())?;
            self.counts.resize(total_groups, 0);
        }
        Ok(())
    }
}

impl GroupsAccumulator for CountRowsAccumulator {
    fn update(
        &mut self,
        _segment: Option<&Segment>,
        group_indices: &[usize],
        total_groups: usize,
    ) -> Result<()> {
        self.ensure_groups(total_groups)?;
        for &group in group_indices {
            self.counts[group] += 1;
        }
        Ok(())
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupsAccumulator>,
        mapping: &[usize],
        total_groups: usize,
    ) -> Result<()> {
        self.ensure_groups(total_groups)?;
        let other = other.into_any().downcast::<Self>().map_err(|_| merge_mismatch())?;
        for (count, &group) in other.counts.iter().zip(mapping) {
            self.counts[group] += count;
        }
        Ok(())
    }

    fn evaluate(mut self: Box<Self>, total_groups: usize) -> Result<ArrayRef> {
        self.counts.resize(total_groups, 0);
        Ok(Arc::new(Int64Array::from_iter_values(
            self.counts.iter().map(|&c| c as i64),
        )))
    }

    fn size(&self) -> usize {
        self.counts.capacity() * std::mem::size_of::<u64>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Creates empty accumulators for one output aggregate
pub type AccumulatorFactory = fn() -> Box<dyn GroupsAccumulator>;

fn typed<V: ColumnType, F: AggregateFunctor<V>>() -> Box<dyn GroupsAccumulator> {
    Box::new(TypedAccumulator::<V, F>::new())
}

fn count_rows() -> Box<dyn GroupsAccumulator> {
    Box::new(CountRowsAccumulator::default())
}

/// Pick the accumulator for `function` over an input column of type `input_type`.
///
/// Fails with a configuration error for unsupported combinations.
pub fn accumulator_factory(
    function: AggregateFunction,
    input_type: Option<&DataType>,
) -> Result<AccumulatorFactory> {
    let unsupported = |data_type: &DataType| {
        QueryError::Config(format!("{} is not supported on {:?}", function, data_type))
    };

    let Some(data_type) = input_type else {
        return match function {
            AggregateFunction::Count => Ok(count_rows as AccumulatorFactory),
            other => Err(QueryError::Config(format!(
                "{} requires an input column",
                other
            ))),
        };
    };

    match function {
        AggregateFunction::Min => with_column_type!(data_type, T => {
            Ok(typed::<T, Min> as AccumulatorFactory)
        }, _ => Err(unsupported(data_type))),
        AggregateFunction::Max => with_column_type!(data_type, T => {
            Ok(typed::<T, Max> as AccumulatorFactory)
        }, _ => Err(unsupported(data_type))),
        AggregateFunction::Count => with_column_type!(data_type, T => {
            Ok(typed::<T, Count> as AccumulatorFactory)
        }, _ => Err(unsupported(data_type))),
        AggregateFunction::CountDistinct => with_column_type!(data_type, T => {
            Ok(typed::<T, CountDistinct> as AccumulatorFactory)
        }, _ => Err(unsupported(data_type))),
        AggregateFunction::Sum => with_numeric_type!(data_type, T => {
            Ok(typed::<T, Sum> as AccumulatorFactory)
        }, _ => Err(unsupported(data_type))),
        AggregateFunction::Avg => with_numeric_type!(data_type, T => {
            Ok(typed::<T, Avg> as AccumulatorFactory)
        }, _ => Err(unsupported(data_type))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray};

    fn segment(values: Vec<i64>) -> Segment {
        Segment::Value(Arc::new(Int64Array::from(values)))
    }

    fn int64_values(array: &ArrayRef) -> Vec<Option<i64>> {
        let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
        (0..array.len())
            .map(|i| array.is_valid(i).then(|| array.value(i)))
            .collect()
    }

    #[test]
    fn test_sum_per_group() {
        let mut acc = accumulator_factory(AggregateFunction::Sum, Some(&DataType::Int64)).unwrap()();
        acc.update(Some(&segment(vec![1, 2, 3, 3])), &[0, 1, 0, 0], 2).unwrap();
        let result = acc.evaluate(2).unwrap();
        assert_eq!(int64_values(&result), vec![Some(7), Some(2)]);
    }

    #[test]
    fn test_merge_remaps_groups() {
        let factory = accumulator_factory(AggregateFunction::Max, Some(&DataType::Int64)).unwrap();
        let mut left = factory();
        left.update(Some(&segment(vec![5, 1])), &[0, 1], 2).unwrap();
        let mut right = factory();
        right.update(Some(&segment(vec![9, 0, 4])), &[0, 1, 0], 2).unwrap();
        // right's group 0 is left's group 1, right's group 1 is new
        left.merge(right, &[1, 2], 3).unwrap();
        assert_eq!(
            int64_values(&left.evaluate(3).unwrap()),
            vec![Some(5), Some(9), Some(0)]
        );
    }

    #[test]
    fn test_count_distinct_merges_sets() {
        let factory =
            accumulator_factory(AggregateFunction::CountDistinct, Some(&DataType::Int64)).unwrap();
        let mut left = factory();
        left.update(Some(&segment(vec![1, 1, 2])), &[0, 0, 0], 1).unwrap();
        let mut right = factory();
        right.update(Some(&segment(vec![2, 3])), &[0, 0], 1).unwrap();
        left.merge(right, &[0], 1).unwrap();
        assert_eq!(int64_values(&left.evaluate(1).unwrap()), vec![Some(3)]);
    }

    #[test]
    fn test_size_tracks_distinct_values_across_merges() {
        let mut left = TypedAccumulator::<i64, CountDistinct>::new();
        left.update(Some(&segment(vec![1, 1, 2])), &[0, 0, 1], 2).unwrap();
        assert_eq!(left.distinct_count, 2);

        let mut right = TypedAccumulator::<i64, CountDistinct>::new();
        right.update(Some(&segment(vec![1, 3, 2])), &[0, 0, 0], 1).unwrap();
        left.merge(Box::new(right), &[0], 2).unwrap();
        // group 0 now holds {1, 2, 3}, group 1 holds {2}
        assert_eq!(left.distinct_count, 4);
        assert!(left.size() >= 4 * std::mem::size_of::<i64>());
    }

    #[test]
    fn test_avg_recombines_sum_and_count() {
        let factory = accumulator_factory(AggregateFunction::Avg, Some(&DataType::Int64)).unwrap();
        let mut left = factory();
        left.update(Some(&segment(vec![1, 2])), &[0, 0], 1).unwrap();
        let mut right = factory();
        right.update(Some(&segment(vec![6])), &[0], 1).unwrap();
        left.merge(right, &[0], 1).unwrap();
        let result = left.evaluate(1).unwrap();
        let result = result.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(result.value(0), 3.0);
    }

    #[test]
    fn test_sum_saturates_instead_of_overflowing() {
        let factory = accumulator_factory(AggregateFunction::Sum, Some(&DataType::Int64)).unwrap();
        let mut left = factory();
        left.update(Some(&segment(vec![i64::MAX, 1])), &[0, 0], 1).unwrap();
        let mut right = factory();
        right.update(Some(&segment(vec![i64::MAX])), &[0], 1).unwrap();
        left.merge(right, &[0], 1).unwrap();
        assert_eq!(int64_values(&left.evaluate(1).unwrap()), vec![Some(i64::MAX)]);
    }

    #[test]
    fn test_untouched_groups() {
        let count = count_rows();
        assert_eq!(int64_values(&count.evaluate(1).unwrap()), vec![Some(0)]);

        let min = accumulator_factory(AggregateFunction::Min, Some(&DataType::Int64)).unwrap()();
        assert_eq!(int64_values(&min.evaluate(1).unwrap()), vec![None]);
    }

    #[test]
    fn test_min_over_strings() {
        let mut acc = accumulator_factory(AggregateFunction::Min, Some(&DataType::Utf8)).unwrap()();
        let values = Segment::Value(Arc::new(StringArray::from(vec!["pear", "apple", "fig"])));
        acc.update(Some(&values), &[0, 0, 0], 1).unwrap();
        let result = acc.evaluate(1).unwrap();
        let result = result.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(result.value(0), "apple");
    }

    #[test]
    fn test_unsupported_combinations() {
        assert!(accumulator_factory(AggregateFunction::Sum, Some(&DataType::Utf8)).is_err());
        assert!(accumulator_factory(AggregateFunction::Min, Some(&DataType::Boolean)).is_err());
        assert!(accumulator_factory(AggregateFunction::Avg, None).is_err());
        assert!(accumulator_factory(AggregateFunction::Count, None).is_ok());
    }

    #[test]
    fn test_merge_rejects_other_kind() {
        let mut sum = accumulator_factory(AggregateFunction::Sum, Some(&DataType::Int64)).unwrap()();
        assert!(sum.merge(count_rows(), &[], 0).is_err());
    }
}
