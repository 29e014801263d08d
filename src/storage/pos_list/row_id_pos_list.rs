use super::PositionList;
use crate::error::Result;
use crate::storage::{ChunkId, MemoryUsageCalculationMode, RowId};
use std::ops::{Index, IndexMut};

/// Position list that stores every row id.
///
/// Rows may come from any number of chunks. A producer that knows all rows
/// share one chunk records that with [`guarantee_single_chunk`], which later
/// consumers use to skip per-row chunk lookups. The named mutators drop that
/// promise as soon as they admit a row from another chunk. Writes through
/// `IndexMut` do not check it.
///
/// [`guarantee_single_chunk`]: RowIdPosList::guarantee_single_chunk
#[derive(Debug, Clone, Default)]
pub struct RowIdPosList {
    row_ids: Vec<RowId>,
    references_single_chunk: bool,
}

impl RowIdPosList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            row_ids: Vec::with_capacity(capacity),
            references_single_chunk: false,
        }
    }

    /// Promise that all current rows share one chunk
    pub fn guarantee_single_chunk(&mut self) {
        self.references_single_chunk = true;
    }

    /// Drop the single-chunk promise if `row_id` lives outside the chunk of `existing`
    fn admit(&mut self, row_id: RowId, existing: Option<RowId>) {
        if let Some(existing) = existing {
            if existing.chunk_id != row_id.chunk_id {
                self.references_single_chunk = false;
            }
        }
    }

    fn spans_single_chunk(&self) -> bool {
        match self.row_ids.first() {
            Some(first) => self.row_ids.iter().all(|r| r.chunk_id == first.chunk_id),
            None => true,
        }
    }

    pub fn as_slice(&self) -> &[RowId] {
        &self.row_ids
    }

    pub fn into_vec(self) -> Vec<RowId> {
        self.row_ids
    }

    pub fn capacity(&self) -> usize {
        self.row_ids.capacity()
    }

    pub fn push(&mut self, row_id: RowId) {
        self.admit(row_id, self.row_ids.first().copied());
        self.row_ids.push(row_id);
    }

    pub fn insert(&mut self, index: usize, row_id: RowId) {
        self.admit(row_id, self.row_ids.first().copied());
        self.row_ids.insert(index, row_id);
    }

    pub fn set(&mut self, index: usize, row_id: RowId) {
        self.row_ids[index] = row_id;
        let other = self
            .row_ids
            .iter()
            .enumerate()
            .find(|&(i, _)| i != index)
            .map(|(_, &r)| r);
        self.admit(row_id, other);
    }

    pub fn resize(&mut self, new_len: usize, value: RowId) {
        if new_len > self.row_ids.len() {
            self.admit(value, self.row_ids.first().copied());
        }
        self.row_ids.resize(new_len, value);
    }

    pub fn clear(&mut self) {
        self.row_ids.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.row_ids.reserve(additional);
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.row_ids.try_reserve(additional)?;
        Ok(())
    }
}

impl PositionList for RowIdPosList {
    #[inline]
    fn len(&self) -> usize {
        self.row_ids.len()
    }

    #[inline]
    fn get(&self, n: usize) -> RowId {
        self.row_ids[n]
    }

    fn references_single_chunk(&self) -> bool {
        if self.references_single_chunk {
            debug_assert!(
                self.spans_single_chunk(),
                "Position list was flagged single-chunk but spans several chunks"
            );
        }
        self.references_single_chunk
    }

    fn common_chunk_id(&self) -> ChunkId {
        assert!(
            self.references_single_chunk(),
            "Position list does not reference a single chunk"
        );
        assert!(!self.row_ids.is_empty(), "Empty position list has no common chunk");
        self.row_ids[0].chunk_id
    }

    fn memory_usage(&self, _mode: MemoryUsageCalculationMode) -> usize {
        std::mem::size_of::<Self>() + self.row_ids.capacity() * std::mem::size_of::<RowId>()
    }
}

impl Index<usize> for RowIdPosList {
    type Output = RowId;

    fn index(&self, index: usize) -> &RowId {
        &self.row_ids[index]
    }
}

impl IndexMut<usize> for RowIdPosList {
    fn index_mut(&mut self, index: usize) -> &mut RowId {
        &mut self.row_ids[index]
    }
}

impl From<Vec<RowId>> for RowIdPosList {
    fn from(row_ids: Vec<RowId>) -> Self {
        Self {
            row_ids,
            references_single_chunk: false,
        }
    }
}

impl FromIterator<RowId> for RowIdPosList {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl Extend<RowId> for RowIdPosList {
    fn extend<I: IntoIterator<Item = RowId>>(&mut self, iter: I) {
        for row_id in iter {
            self.push(row_id);
        }
    }
}
