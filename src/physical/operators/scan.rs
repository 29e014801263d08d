//! Table scan operator

use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::PhysicalOperator;
use crate::storage::{Chunk, ColumnId, Table};
use arrow::datatypes::SchemaRef;
use std::sync::Arc;

/// Leaf operator producing an in-memory table, optionally projected
#[derive(Debug)]
pub struct TableScanExec {
    table: Arc<Table>,
    schema: SchemaRef,
    projection: Option<Vec<ColumnId>>,
}

impl TableScanExec {
    pub fn new(table: Arc<Table>) -> Self {
        let schema = table.schema();
        Self {
            table,
            schema,
            projection: None,
        }
    }

    pub fn try_with_projection(table: Arc<Table>, projection: Vec<ColumnId>) -> Result<Self> {
        let indices: Vec<usize> = projection.iter().map(|&c| c as usize).collect();
        if let Some(&bad) = indices.iter().find(|&&i| i >= table.column_count()) {
            return Err(QueryError::Config(format!(
                "Projection column {} out of range for {} columns",
                bad,
                table.column_count()
            )));
        }
        let schema = Arc::new(table.schema().project(&indices)?);
        Ok(Self {
            table,
            schema,
            projection: Some(projection),
        })
    }
}

impl PhysicalOperator for TableScanExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![]
    }

    fn execute(&self, _ctx: &ExecutionContext) -> Result<Arc<Table>> {
        let Some(projection) = &self.projection else {
            return Ok(self.table.clone());
        };

        // Segments are cheap handles; projecting shares the underlying data
        let chunks = self
            .table
            .chunks()
            .iter()
            .map(|chunk| {
                let segments = projection
                    .iter()
                    .map(|&column_id| chunk.get_segment(column_id).clone())
                    .collect();
                Chunk::new(segments).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Table::new(self.schema.clone(), chunks)?))
    }

    fn name(&self) -> &str {
        "TableScan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn table() -> Arc<Table> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("v", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Int64Array::from(vec![1, 2])),
            ],
        )
        .unwrap();
        Arc::new(Table::from_batches(schema, vec![batch]).unwrap())
    }

    #[test]
    fn test_scan_returns_table() {
        let table = table();
        let scan = TableScanExec::new(table.clone());
        let output = scan.execute(&ExecutionContext::new()).unwrap();
        assert!(Arc::ptr_eq(&table, &output));
    }

    #[test]
    fn test_projection() {
        let scan = TableScanExec::try_with_projection(table(), vec![1]).unwrap();
        assert_eq!(scan.schema().field(0).name(), "v");
        let output = scan.execute(&ExecutionContext::new()).unwrap();
        assert_eq!(output.column_count(), 1);
        assert_eq!(output.row_count(), 2);
    }

    #[test]
    fn test_projection_out_of_range() {
        assert!(TableScanExec::try_with_projection(table(), vec![5]).is_err());
    }
}
