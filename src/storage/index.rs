//! Sorted per-chunk index over one column

use crate::error::{QueryError, Result};
use crate::storage::column_type::with_column_type;
use crate::storage::{ChunkOffset, ColumnType, ScalarValue, Segment};
use std::sync::Arc;

/// Cursor into the sorted offsets of a [`ChunkIndex`].
///
/// Two cursors into the same index delimit a range of chunk offsets; single
/// chunk position lists are built from such a pair.
#[derive(Debug, Clone)]
pub struct IndexIterator {
    offsets: Arc<[ChunkOffset]>,
    position: usize,
}

impl IndexIterator {
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether both cursors walk the same index
    pub fn is_same_index(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.offsets, &other.offsets)
    }

    /// Number of steps from `self` to `other`
    pub fn distance_to(&self, other: &Self) -> usize {
        debug_assert!(self.is_same_index(other), "Iterators belong to different indexes");
        debug_assert!(self.position <= other.position, "Iterator range is reversed");
        other.position - self.position
    }

    /// Offset `n` steps ahead of the cursor
    #[inline]
    pub fn offset_at(&self, n: usize) -> ChunkOffset {
        self.offsets[self.position + n]
    }
}

impl Iterator for IndexIterator {
    type Item = ChunkOffset;

    fn next(&mut self) -> Option<ChunkOffset> {
        let offset = self.offsets.get(self.position).copied()?;
        self.position += 1;
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.offsets.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

/// Chunk offsets of one segment sorted by value.
///
/// Ties are kept in offset order.
#[derive(Debug)]
pub struct ChunkIndex {
    values: Vec<ScalarValue>,
    offsets: Arc<[ChunkOffset]>,
}

impl ChunkIndex {
    pub fn build(segment: &Segment) -> Result<Self> {
        let data_type = segment.data_type();
        with_column_type!(&data_type, T => Self::build_typed::<T>(segment), _ => Err(
            QueryError::Config(format!("Cannot index column of type {:?}", data_type))
        ))
    }

    fn build_typed<T: ColumnType>(segment: &Segment) -> Result<Self> {
        let mut entries: Vec<(T, ChunkOffset)> = Vec::new();
        entries.try_reserve(segment.len())?;
        segment.for_each_value::<T>(|offset, value| entries.push((value, offset)))?;
        entries.sort();

        let offsets: Arc<[ChunkOffset]> = entries.iter().map(|(_, offset)| *offset).collect();
        let values = entries
            .into_iter()
            .map(|(value, _)| value.into_scalar())
            .collect();
        Ok(Self { values, offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn iterator_at(&self, position: usize) -> IndexIterator {
        IndexIterator {
            offsets: self.offsets.clone(),
            position,
        }
    }

    pub fn cbegin(&self) -> IndexIterator {
        self.iterator_at(0)
    }

    pub fn cend(&self) -> IndexIterator {
        self.iterator_at(self.offsets.len())
    }

    /// First entry not less than `value`
    pub fn lower_bound(&self, value: &ScalarValue) -> IndexIterator {
        self.iterator_at(self.values.partition_point(|v| v < value))
    }

    /// First entry greater than `value`
    pub fn upper_bound(&self, value: &ScalarValue) -> IndexIterator {
        self.iterator_at(self.values.partition_point(|v| v <= value))
    }

    pub fn equal_range(&self, value: &ScalarValue) -> (IndexIterator, IndexIterator) {
        (self.lower_bound(value), self.upper_bound(value))
    }
}
