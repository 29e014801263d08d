//! Hash aggregate operator

use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::aggregate::{
    accumulator_factory, build_output, AccumulatorFactory, AggregateColumnDefinition,
    AggregateKey, AggregateKeyEntry, AggregationState, EmptyAggregateKey, KeyEncoder, KeyShape,
    KeysPerChunk,
};
use crate::physical::PhysicalOperator;
use crate::storage::{is_supported_type, ChunkId, ColumnId, Table};
use arrow::datatypes::{Field, Schema, SchemaRef};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Hash aggregate execution operator
///
/// Folds every chunk of its input into a chunk-local state in parallel, then
/// merges the states in chunk order. Groups come out in first-seen order.
#[derive(Debug)]
pub struct HashAggregateExec {
    input: Arc<dyn PhysicalOperator>,
    groupby_column_ids: Vec<ColumnId>,
    aggregates: Vec<AggregateColumnDefinition>,
    factories: Vec<AccumulatorFactory>,
    schema: SchemaRef,
}

impl HashAggregateExec {
    pub fn try_new(
        input: Arc<dyn PhysicalOperator>,
        groupby_column_ids: Vec<ColumnId>,
        aggregates: Vec<AggregateColumnDefinition>,
    ) -> Result<Self> {
        if groupby_column_ids.is_empty() && aggregates.is_empty() {
            return Err(QueryError::Config(
                "Aggregation needs a grouping column or an aggregate".into(),
            ));
        }

        let input_schema = input.schema();
        let field_of = |column_id: ColumnId| {
            input_schema
                .fields()
                .get(column_id as usize)
                .cloned()
                .ok_or_else(|| {
                    QueryError::Config(format!(
                        "Column {} out of range for {} input columns",
                        column_id,
                        input_schema.fields().len()
                    ))
                })
        };

        let mut fields = Vec::with_capacity(groupby_column_ids.len() + aggregates.len());

        // Group by columns
        for &column_id in &groupby_column_ids {
            let field = field_of(column_id)?;
            if !is_supported_type(field.data_type()) {
                return Err(QueryError::Config(format!(
                    "Cannot group by column '{}' of type {:?}",
                    field.name(),
                    field.data_type()
                )));
            }
            fields.push(field.as_ref().clone());
        }

        // Aggregate columns
        let mut factories = Vec::with_capacity(aggregates.len());
        for aggregate in &aggregates {
            let input_type = match aggregate.column {
                Some(column_id) => Some(field_of(column_id)?.data_type().clone()),
                None => None,
            };
            factories.push(accumulator_factory(aggregate.function, input_type.as_ref())?);
            fields.push(Field::new(
                aggregate.output_name(&input_schema),
                aggregate.function.output_type(input_type.as_ref()),
                true,
            ));
        }

        Ok(Self {
            input,
            groupby_column_ids,
            aggregates,
            factories,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    pub fn groupby_column_ids(&self) -> &[ColumnId] {
        &self.groupby_column_ids
    }

    pub fn aggregates(&self) -> &[AggregateColumnDefinition] {
        &self.aggregates
    }

    fn aggregate<K: AggregateKey>(&self, ctx: &ExecutionContext, input: &Arc<Table>) -> Result<Table> {
        let pool = ctx.memory_pool();
        let columns = self.groupby_column_ids.len();
        let shape = KeyShape::for_columns(columns);

        let mut key_reservation =
            pool.try_reserve("HashAggregate keys", input.row_count() * shape.key_size(columns))?;
        let encoder = KeyEncoder::new(&self.groupby_column_ids);
        let keys: KeysPerChunk<K> = ctx.install(|| encoder.encode(input))?;

        let partials: Vec<AggregationState<K>> = ctx.install(|| {
            input
                .chunks()
                .par_iter()
                .zip(keys.par_iter())
                .enumerate()
                .map(|(chunk_id, (chunk, keys))| {
                    let mut state = AggregationState::new(&self.factories);
                    state.process_chunk(chunk_id as ChunkId, chunk, keys, &self.aggregates)?;
                    Ok(state)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        drop(keys);
        key_reservation.try_resize(0)?;

        let mut state_reservation = pool.try_reserve("HashAggregate state", 0)?;
        let mut partials = partials.into_iter();
        let mut merged = partials
            .next()
            .unwrap_or_else(|| AggregationState::new(&self.factories));
        state_reservation.try_resize(merged.size())?;
        for partial in partials {
            merged.merge(partial)?;
            state_reservation.try_resize(merged.size())?;
        }

        let (representative_rows, accumulators) = merged.into_parts();
        build_output(
            input,
            self.schema.clone(),
            &self.groupby_column_ids,
            representative_rows,
            accumulators,
            pool,
        )
    }
}

impl PhysicalOperator for HashAggregateExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>> {
        let input = self.input.execute(ctx)?;
        let start = Instant::now();
        let shape = KeyShape::for_columns(self.groupby_column_ids.len());

        let output = match shape {
            KeyShape::Empty => self.aggregate::<EmptyAggregateKey>(ctx, &input)?,
            KeyShape::Single => self.aggregate::<AggregateKeyEntry>(ctx, &input)?,
            KeyShape::Pair => self.aggregate::<[AggregateKeyEntry; 2]>(ctx, &input)?,
            KeyShape::Dynamic => self.aggregate::<Vec<AggregateKeyEntry>>(ctx, &input)?,
        };

        debug!(
            key_shape = ?shape,
            input_rows = input.row_count(),
            input_chunks = input.chunk_count(),
            groups = output.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Aggregation complete"
        );
        Ok(Arc::new(output))
    }

    fn name(&self) -> &str {
        "HashAggregate"
    }
}

impl fmt::Display for HashAggregateExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input_schema = self.input.schema();
        let group_by: Vec<&str> = self
            .groupby_column_ids
            .iter()
            .map(|&c| input_schema.field(c as usize).name().as_str())
            .collect();
        let aggregates: Vec<String> = self
            .aggregates
            .iter()
            .map(|a| a.output_name(&input_schema))
            .collect();
        write!(
            f,
            "HashAggregate: group_by=[{}], aggr=[{}]",
            group_by.join(", "),
            aggregates.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::aggregate::AggregateFunction;
    use crate::physical::operators::TableScanExec;
    use crate::storage::{RowId, ScalarValue};
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::DataType;
    use arrow::record_batch::RecordBatch;

    fn scan(chunk_size: usize) -> Arc<dyn PhysicalOperator> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("v", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["A", "B", "A", "A"])),
                Arc::new(Int64Array::from(vec![1, 2, 3, 3])),
            ],
        )
        .unwrap();
        let table = Table::from_batches_with_chunk_size(schema, vec![batch], chunk_size).unwrap();
        Arc::new(TableScanExec::new(Arc::new(table)))
    }

    #[test]
    fn test_sum_group_by() {
        let agg = HashAggregateExec::try_new(
            scan(3),
            vec![0],
            vec![AggregateColumnDefinition::new(1, AggregateFunction::Sum)],
        )
        .unwrap();
        assert_eq!(agg.schema().field(1).name(), "SUM(v)");

        let output = agg.execute(&ExecutionContext::new()).unwrap();
        assert_eq!(output.chunk_count(), 1);
        assert_eq!(output.row_count(), 2);
        assert_eq!(output.get_value(0, RowId::new(0, 0)).unwrap(), ScalarValue::from("A"));
        assert_eq!(output.get_value(1, RowId::new(0, 0)).unwrap(), ScalarValue::Int64(7));
        assert_eq!(output.get_value(0, RowId::new(0, 1)).unwrap(), ScalarValue::from("B"));
        assert_eq!(output.get_value(1, RowId::new(0, 1)).unwrap(), ScalarValue::Int64(2));
    }

    #[test]
    fn test_grouping_column_references_input() {
        let agg = HashAggregateExec::try_new(scan(2), vec![0], vec![]).unwrap();
        let output = agg.execute(&ExecutionContext::new()).unwrap();
        let chunk = output.get_chunk(0);
        assert!(chunk.get_segment(0).as_reference().is_some());
        assert_eq!(chunk.column_count(), 1);
    }

    #[test]
    fn test_global_aggregate_has_one_row() {
        let agg = HashAggregateExec::try_new(
            scan(4),
            vec![],
            vec![
                AggregateColumnDefinition::count_star(),
                AggregateColumnDefinition::new(1, AggregateFunction::Max),
            ],
        )
        .unwrap();
        let output = agg.execute(&ExecutionContext::new()).unwrap();
        let batch = &output.to_record_batches().unwrap()[0];
        assert_eq!(batch.num_rows(), 1);
        let count = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(count.value(0), 4);
        let max = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(max.value(0), 3);
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(matches!(
            HashAggregateExec::try_new(scan(4), vec![], vec![]),
            Err(QueryError::Config(_))
        ));
        assert!(matches!(
            HashAggregateExec::try_new(scan(4), vec![7], vec![]),
            Err(QueryError::Config(_))
        ));
        assert!(matches!(
            HashAggregateExec::try_new(
                scan(4),
                vec![1],
                vec![AggregateColumnDefinition::new(0, AggregateFunction::Avg)]
            ),
            Err(QueryError::Config(_))
        ));
        let missing_column = AggregateColumnDefinition {
            column: None,
            function: AggregateFunction::Sum,
            alias: None,
        };
        assert!(matches!(
            HashAggregateExec::try_new(scan(4), vec![0], vec![missing_column]),
            Err(QueryError::Config(_))
        ));
    }

    #[test]
    fn test_display() {
        let agg = HashAggregateExec::try_new(
            scan(4),
            vec![0],
            vec![AggregateColumnDefinition::new(1, AggregateFunction::Min).with_alias("low")],
        )
        .unwrap();
        assert_eq!(agg.to_string(), "HashAggregate: group_by=[k], aggr=[low]");
    }
}
