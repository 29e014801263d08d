//! Segments that read another table's column through a position list

use crate::error::{QueryError, Result};
use crate::storage::pos_list::{PosList, PositionList};
use crate::storage::segment::{downcast_column, null_input_error};
use crate::storage::{
    ChunkId, ChunkOffset, ColumnId, ColumnType, MemoryUsageCalculationMode, ScalarValue, Segment,
    Table,
};
use arrow::array::{new_empty_array, new_null_array, Array, ArrayRef, UInt32Array};
use arrow::compute::{concat, take};
use arrow::datatypes::DataType;
use std::sync::Arc;

/// Column `referenced_column_id` of `referenced_table`, restricted to and
/// ordered by `pos_list`.
///
/// Offset `i` of the segment is the row at `pos_list[i]`. The null row id
/// reads as null. The referenced table always holds values, never further
/// references.
#[derive(Debug, Clone)]
pub struct ReferenceSegment {
    referenced_table: Arc<Table>,
    referenced_column_id: ColumnId,
    pos_list: Arc<PosList>,
}

impl ReferenceSegment {
    pub fn new(
        referenced_table: Arc<Table>,
        referenced_column_id: ColumnId,
        pos_list: Arc<PosList>,
    ) -> Self {
        assert!(
            (referenced_column_id as usize) < referenced_table.column_count(),
            "Column {} does not exist in referenced table",
            referenced_column_id
        );
        Self {
            referenced_table,
            referenced_column_id,
            pos_list,
        }
    }

    pub fn referenced_table(&self) -> &Arc<Table> {
        &self.referenced_table
    }

    pub fn referenced_column_id(&self) -> ColumnId {
        self.referenced_column_id
    }

    pub fn pos_list(&self) -> &Arc<PosList> {
        &self.pos_list
    }

    pub fn len(&self) -> usize {
        self.pos_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos_list.is_empty()
    }

    pub fn data_type(&self) -> DataType {
        self.referenced_table
            .column_data_type(self.referenced_column_id)
            .clone()
    }

    pub fn value(&self, offset: usize) -> Result<ScalarValue> {
        let row_id = self.pos_list.get(offset);
        self.referenced_table
            .get_value(self.referenced_column_id, row_id)
    }

    fn referenced_array(&self, chunk_id: ChunkId) -> Result<&ArrayRef> {
        match self
            .referenced_table
            .get_chunk(chunk_id)
            .get_segment(self.referenced_column_id)
        {
            Segment::Value(array) => Ok(array),
            Segment::Reference(_) => Err(QueryError::Internal(
                "Reference segments must not point at reference segments".into(),
            )),
        }
    }

    /// Visit every referenced value in position-list order.
    ///
    /// Fails with a precondition error on a null row id or a null value.
    pub fn for_each_value<T: ColumnType>(&self, mut f: impl FnMut(ChunkOffset, T)) -> Result<()> {
        self.for_each_row::<T>(|offset, array, index| f(offset, T::value(array, index)))
    }

    /// Visit every referenced row as (offset, backing array, index into that array)
    pub(crate) fn for_each_row<T: ColumnType>(
        &self,
        mut f: impl FnMut(ChunkOffset, &T::Array, usize),
    ) -> Result<()> {
        let mut cached: Option<(ChunkId, &T::Array)> = None;
        for (offset, row_id) in self.pos_list.iter().enumerate() {
            if row_id.is_null() {
                return Err(null_input_error());
            }
            let array = match cached {
                Some((chunk_id, array)) if chunk_id == row_id.chunk_id => array,
                _ => {
                    let array =
                        downcast_column::<T>(self.referenced_array(row_id.chunk_id)?.as_ref())?;
                    cached = Some((row_id.chunk_id, array));
                    array
                }
            };
            let index = row_id.chunk_offset as usize;
            if array.is_null(index) {
                return Err(null_input_error());
            }
            f(offset as ChunkOffset, array, index);
        }
        Ok(())
    }

    /// Gather the referenced values into one contiguous array
    pub fn materialize(&self) -> Result<ArrayRef> {
        let data_type = self.data_type();
        if self.pos_list.is_empty() {
            return Ok(new_empty_array(&data_type));
        }

        let mut pieces: Vec<ArrayRef> = Vec::new();
        let mut rows = self.pos_list.iter().peekable();
        while let Some(first) = rows.next() {
            let mut offsets = vec![first.chunk_offset];
            while let Some(row_id) = rows.next_if(|r| r.chunk_id == first.chunk_id) {
                offsets.push(row_id.chunk_offset);
            }

            if first.is_null() {
                pieces.push(new_null_array(&data_type, offsets.len()));
            } else {
                let array = self.referenced_array(first.chunk_id)?;
                pieces.push(take(array.as_ref(), &UInt32Array::from(offsets), None)?);
            }
        }

        if pieces.len() == 1 {
            return Ok(pieces.swap_remove(0));
        }
        let pieces: Vec<&dyn Array> = pieces.iter().map(|a| a.as_ref()).collect();
        Ok(concat(&pieces)?)
    }

    /// Copy with a position list of its own
    pub fn deep_copy(&self) -> Self {
        Self {
            referenced_table: self.referenced_table.clone(),
            referenced_column_id: self.referenced_column_id,
            pos_list: Arc::new(self.pos_list.as_ref().clone()),
        }
    }

    pub fn estimate_memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.pos_list.memory_usage(MemoryUsageCalculationMode::Full)
    }
}
