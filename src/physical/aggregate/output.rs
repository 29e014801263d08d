//! Materializing the aggregation result

use crate::error::Result;
use crate::execution::MemoryPool;
use crate::physical::aggregate::accumulator::GroupsAccumulator;
use crate::physical::operators::reference_segments;
use crate::storage::{Chunk, ColumnId, PosList, RowId, RowIdPosList, Segment, Table};
use arrow::datatypes::SchemaRef;
use std::mem::size_of;
use std::sync::Arc;
use tracing::trace;

/// Build the single-chunk result table.
///
/// Grouping columns are reference segments over one shared list of
/// representative rows. Aggregate columns are new arrays, one value per group.
/// Without grouping columns there is exactly one group, even on empty input.
pub fn build_output(
    input: &Arc<Table>,
    schema: SchemaRef,
    groupby_column_ids: &[ColumnId],
    representative_rows: Vec<RowId>,
    accumulators: Vec<Box<dyn GroupsAccumulator>>,
    memory_pool: &MemoryPool,
) -> Result<Table> {
    let total_groups = if groupby_column_ids.is_empty() {
        representative_rows.len().max(1)
    } else {
        representative_rows.len()
    };

    if total_groups == 0 {
        return Table::new(schema, vec![]);
    }

    let _reservation = memory_pool.try_reserve(
        "HashAggregate output",
        representative_rows.len() * size_of::<RowId>(),
    )?;

    let mut segments = Vec::with_capacity(groupby_column_ids.len() + accumulators.len());
    if !groupby_column_ids.is_empty() {
        let pos_list = Arc::new(PosList::Materialized(RowIdPosList::from(representative_rows)));
        segments.extend(reference_segments(input, &pos_list, groupby_column_ids)?);
    }
    for accumulator in accumulators {
        segments.push(Segment::Value(accumulator.evaluate(total_groups)?));
    }

    trace!(groups = total_groups, columns = segments.len(), "Built aggregate output");
    Table::new(schema, vec![Arc::new(Chunk::new(segments)?)])
}
