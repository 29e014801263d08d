//! Column data of one chunk

use crate::error::{QueryError, Result};
use crate::storage::{ChunkOffset, ColumnType, ReferenceSegment, ScalarValue};
use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;

/// The data of one column within one chunk.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Values owned by this segment
    Value(ArrayRef),
    /// Values read through a position list from another table
    Reference(ReferenceSegment),
}

pub(crate) fn null_input_error() -> QueryError {
    QueryError::Precondition("null values are not supported as aggregation or index input".into())
}

pub(crate) fn downcast_column<T: ColumnType>(array: &dyn Array) -> Result<&T::Array> {
    T::downcast(array).ok_or_else(|| {
        QueryError::Internal(format!(
            "Expected {:?} column, found {:?}",
            T::data_type(),
            array.data_type()
        ))
    })
}

impl Segment {
    pub fn len(&self) -> usize {
        match self {
            Segment::Value(array) => array.len(),
            Segment::Reference(segment) => segment.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Segment::Value(array) => array.data_type().clone(),
            Segment::Reference(segment) => segment.data_type(),
        }
    }

    pub fn value(&self, offset: usize) -> Result<ScalarValue> {
        match self {
            Segment::Value(array) => ScalarValue::try_from_array(array.as_ref(), offset),
            Segment::Reference(segment) => segment.value(offset),
        }
    }

    /// Visit every row as a typed value, in offset order.
    ///
    /// Fails with a precondition error if any row is null.
    pub fn for_each_value<T: ColumnType>(&self, mut f: impl FnMut(ChunkOffset, T)) -> Result<()> {
        self.for_each_row::<T>(|offset, array, index| f(offset, T::value(array, index)))
    }

    /// Visit every row's grouping key entry without materializing its value
    pub fn for_each_key_entry<T: ColumnType>(
        &self,
        mut f: impl FnMut(ChunkOffset, u64),
    ) -> Result<()> {
        self.for_each_row::<T>(|offset, array, index| f(offset, T::key_entry_at(array, index)))
    }

    /// Visit every row as (offset, backing array, index into that array)
    fn for_each_row<T: ColumnType>(
        &self,
        mut f: impl FnMut(ChunkOffset, &T::Array, usize),
    ) -> Result<()> {
        match self {
            Segment::Value(array) => {
                let typed = downcast_column::<T>(array.as_ref())?;
                if array.null_count() > 0 {
                    return Err(null_input_error());
                }
                for index in 0..array.len() {
                    f(index as ChunkOffset, typed, index);
                }
                Ok(())
            }
            Segment::Reference(segment) => segment.for_each_row::<T>(f),
        }
    }

    /// Values of this segment as an Arrow array, copying only for references
    pub fn materialize(&self) -> Result<ArrayRef> {
        match self {
            Segment::Value(array) => Ok(array.clone()),
            Segment::Reference(segment) => segment.materialize(),
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceSegment> {
        match self {
            Segment::Reference(segment) => Some(segment),
            Segment::Value(_) => None,
        }
    }

    pub fn estimate_memory_usage(&self) -> usize {
        match self {
            Segment::Value(array) => array.get_array_memory_size(),
            Segment::Reference(segment) => segment.estimate_memory_usage(),
        }
    }
}
