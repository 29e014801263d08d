//! Index range scan

use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::operators::reference::reference_segments;
use crate::physical::PhysicalOperator;
use crate::storage::{
    Chunk, ChunkId, ChunkIndex, ColumnId, PosList, ScalarValue, SingleChunkPosList, Table,
};
use arrow::datatypes::SchemaRef;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, trace};

/// Selects rows with `lower <= column <= upper` through per-chunk sorted indexes.
///
/// Each output chunk's rows come out in index order and are addressed by a
/// single chunk range list.
#[derive(Debug)]
pub struct IndexScanExec {
    input: Arc<dyn PhysicalOperator>,
    column_id: ColumnId,
    lower: ScalarValue,
    upper: ScalarValue,
    schema: SchemaRef,
}

impl IndexScanExec {
    pub fn try_new(
        input: Arc<dyn PhysicalOperator>,
        column_id: ColumnId,
        lower: ScalarValue,
        upper: ScalarValue,
    ) -> Result<Self> {
        let schema = input.schema();
        let field = schema.fields().get(column_id as usize).ok_or_else(|| {
            QueryError::Config(format!("Index column {} out of range", column_id))
        })?;
        for bound in [&lower, &upper] {
            if &bound.data_type() != field.data_type() {
                return Err(QueryError::Config(format!(
                    "Bound {} does not match column '{}' of type {:?}",
                    bound,
                    field.name(),
                    field.data_type()
                )));
            }
        }
        if lower > upper {
            return Err(QueryError::Config(format!(
                "Empty index range [{}, {}]",
                lower, upper
            )));
        }
        Ok(Self {
            input,
            column_id,
            lower,
            upper,
            schema,
        })
    }

    fn scan_chunk(
        &self,
        input: &Arc<Table>,
        chunk_id: ChunkId,
        chunk: &Chunk,
    ) -> Result<Option<Chunk>> {
        let index = ChunkIndex::build(chunk.get_segment(self.column_id))?;
        let begin = index.lower_bound(&self.lower);
        let end = index.upper_bound(&self.upper);
        let matches = begin.distance_to(&end);
        trace!(chunk_id, matches, "Index range scanned");
        if matches == 0 {
            return Ok(None);
        }

        let pos_list = Arc::new(PosList::SingleChunkRange(SingleChunkPosList::new(
            chunk_id, begin, end,
        )));
        let column_ids: Vec<ColumnId> = (0..input.column_count() as ColumnId).collect();
        let segments = reference_segments(input, &pos_list, &column_ids)?;
        Ok(Some(Chunk::new(segments)?))
    }
}

impl PhysicalOperator for IndexScanExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>> {
        let input = self.input.execute(ctx)?;

        let chunks: Vec<Option<Chunk>> = ctx.install(|| {
            input
                .chunks()
                .par_iter()
                .enumerate()
                .map(|(chunk_id, chunk)| self.scan_chunk(&input, chunk_id as ChunkId, chunk))
                .collect::<Result<Vec<_>>>()
        })?;

        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().flatten().map(Arc::new).collect();
        debug!(
            input_chunks = input.chunk_count(),
            output_chunks = chunks.len(),
            "Index scan complete"
        );
        Ok(Arc::new(Table::new(self.schema.clone(), chunks)?))
    }

    fn name(&self) -> &str {
        "IndexScan"
    }
}
