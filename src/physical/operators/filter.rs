//! Filter operator

use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::operators::reference::reference_segments;
use crate::physical::PhysicalOperator;
use crate::storage::column_type::with_column_type;
use crate::storage::{
    Chunk, ChunkId, ChunkOffset, ColumnId, ColumnType, PosList, RowId, RowIdPosList, ScalarValue,
    Table,
};
use arrow::array::{Array, ArrayRef, BooleanArray, Datum, Scalar};
use arrow::compute::kernels::cmp;
use arrow::datatypes::SchemaRef;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Comparison operator of a filter predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for CompareOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" | "eq" => Ok(CompareOp::Eq),
            "!=" | "<>" | "ne" => Ok(CompareOp::NotEq),
            "<" | "lt" => Ok(CompareOp::Lt),
            "<=" | "le" => Ok(CompareOp::LtEq),
            ">" | "gt" => Ok(CompareOp::Gt),
            ">=" | "ge" => Ok(CompareOp::GtEq),
            other => Err(QueryError::Config(format!(
                "Unknown comparison operator: {}",
                other
            ))),
        }
    }
}

/// `column <op> value`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column_id: ColumnId,
    pub op: CompareOp,
    pub value: ScalarValue,
}

impl Predicate {
    pub fn new(column_id: ColumnId, op: CompareOp, value: impl Into<ScalarValue>) -> Self {
        Self {
            column_id,
            op,
            value: value.into(),
        }
    }
}

/// Filter execution operator
///
/// Emits a reference table over its input. Chunks where every row matches are
/// passed as entire-chunk position lists, chunks where nothing matches are
/// dropped.
#[derive(Debug)]
pub struct FilterExec {
    input: Arc<dyn PhysicalOperator>,
    predicate: Predicate,
    schema: SchemaRef,
}

impl FilterExec {
    pub fn try_new(input: Arc<dyn PhysicalOperator>, predicate: Predicate) -> Result<Self> {
        let schema = input.schema();
        let field = schema
            .fields()
            .get(predicate.column_id as usize)
            .ok_or_else(|| {
                QueryError::Config(format!(
                    "Filter column {} out of range",
                    predicate.column_id
                ))
            })?;
        if &predicate.value.data_type() != field.data_type() {
            return Err(QueryError::Config(format!(
                "Cannot compare column '{}' of type {:?} with {}",
                field.name(),
                field.data_type(),
                predicate.value
            )));
        }
        Ok(Self {
            input,
            predicate,
            schema,
        })
    }

    fn compare(&self, values: &dyn Datum, scalar: &dyn Datum) -> Result<BooleanArray> {
        let mask = match self.predicate.op {
            CompareOp::Eq => cmp::eq(values, scalar),
            CompareOp::NotEq => cmp::neq(values, scalar),
            CompareOp::Lt => cmp::lt(values, scalar),
            CompareOp::LtEq => cmp::lt_eq(values, scalar),
            CompareOp::Gt => cmp::gt(values, scalar),
            CompareOp::GtEq => cmp::gt_eq(values, scalar),
        }?;
        Ok(mask)
    }

    /// Positions of matching rows in one chunk; `None` if nothing matches
    fn filter_chunk(
        &self,
        input: &Arc<Table>,
        chunk_id: ChunkId,
        chunk: &Arc<Chunk>,
        scalar: &Scalar<ArrayRef>,
    ) -> Result<Option<Chunk>> {
        let values = chunk.get_segment(self.predicate.column_id).materialize()?;
        let mask = self.compare(&values, scalar)?;
        let matches = mask.true_count();

        let pos_list = if matches == 0 {
            return Ok(None);
        } else if matches == chunk.size() {
            PosList::entire_chunk(chunk.clone(), chunk_id)
        } else {
            let mut list = RowIdPosList::with_capacity(matches);
            list.extend(
                (0..mask.len())
                    .filter(|&i| mask.is_valid(i) && mask.value(i))
                    .map(|i| RowId::new(chunk_id, i as ChunkOffset)),
            );
            list.guarantee_single_chunk();
            PosList::Materialized(list)
        };

        let column_ids: Vec<ColumnId> = (0..input.column_count() as ColumnId).collect();
        let segments = reference_segments(input, &Arc::new(pos_list), &column_ids)?;
        Ok(Some(Chunk::new(segments)?))
    }
}

fn scalar_array(value: &ScalarValue) -> Result<Scalar<ArrayRef>> {
    let data_type = value.data_type();
    let array = with_column_type!(&data_type, T => T::build_array(vec![T::from_scalar(value)]), _ => {
        return Err(QueryError::Config(format!("Cannot filter on {}", value)))
    });
    Ok(Scalar::new(array))
}

impl PhysicalOperator for FilterExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>> {
        let input = self.input.execute(ctx)?;
        let scalar = scalar_array(&self.predicate.value)?;

        let chunks: Vec<Option<Chunk>> = ctx.install(|| {
            input
                .chunks()
                .par_iter()
                .enumerate()
                .map(|(chunk_id, chunk)| {
                    self.filter_chunk(&input, chunk_id as ChunkId, chunk, &scalar)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().flatten().map(Arc::new).collect();
        debug!(
            input_chunks = input.chunk_count(),
            output_chunks = chunks.len(),
            predicate = %self,
            "Filter complete"
        );
        Ok(Arc::new(Table::new(self.schema.clone(), chunks)?))
    }

    fn name(&self) -> &str {
        "Filter"
    }
}

impl fmt::Display for FilterExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Filter: {} {} {}",
            self.schema.field(self.predicate.column_id as usize).name(),
            self.predicate.op,
            self.predicate.value
        )
    }
}
