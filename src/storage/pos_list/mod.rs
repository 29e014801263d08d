//! Position lists: ordered sequences of row ids
//!
//! Reference segments read their values through a position list. Three
//! representations exist and are interchangeable through [`PositionList`]:
//!
//! - [`RowIdPosList`]: explicit row ids, possibly spanning chunks
//! - [`EntireChunkPosList`]: every row of one chunk, stored as nothing but the chunk
//! - [`SingleChunkPosList`]: a contiguous range of a chunk index
//!
//! [`PosList`] is the owned, shareable form operators pass around. Mutating it
//! turns an entire-chunk list into an explicit one first.

mod entire_chunk_pos_list;
mod row_id_pos_list;
mod single_chunk_pos_list;

pub use entire_chunk_pos_list::EntireChunkPosList;
pub use row_id_pos_list::RowIdPosList;
pub use single_chunk_pos_list::SingleChunkPosList;

use crate::error::Result;
use crate::storage::{Chunk, ChunkId, MemoryUsageCalculationMode, RowId};
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Read access shared by every position list representation.
pub trait PositionList: fmt::Debug + Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row id at position `n`. Panics in debug builds if `n >= len()`.
    fn get(&self, n: usize) -> RowId;

    /// True if every row is known to live in the same chunk.
    ///
    /// May be false even when all rows happen to share a chunk.
    fn references_single_chunk(&self) -> bool;

    /// The chunk all rows share. Panics unless
    /// [`references_single_chunk`](Self::references_single_chunk) holds and the
    /// list is non-empty.
    fn common_chunk_id(&self) -> ChunkId;

    fn memory_usage(&self, mode: MemoryUsageCalculationMode) -> usize;

    fn iter(&self) -> PosListIter<'_, Self>
    where
        Self: Sized,
    {
        PosListIter::new(self)
    }
}

/// Iterator over the row ids of any position list
pub struct PosListIter<'a, L: PositionList + ?Sized> {
    list: &'a L,
    front: usize,
    back: usize,
}

impl<'a, L: PositionList + ?Sized> PosListIter<'a, L> {
    pub fn new(list: &'a L) -> Self {
        Self {
            list,
            front: 0,
            back: list.len(),
        }
    }
}

impl<L: PositionList + ?Sized> Clone for PosListIter<'_, L> {
    fn clone(&self) -> Self {
        Self {
            list: self.list,
            front: self.front,
            back: self.back,
        }
    }
}

impl<L: PositionList + ?Sized> Iterator for PosListIter<'_, L> {
    type Item = RowId;

    #[inline]
    fn next(&mut self) -> Option<RowId> {
        if self.front >= self.back {
            return None;
        }
        let row_id = self.list.get(self.front);
        self.front += 1;
        Some(row_id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<RowId> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl<L: PositionList + ?Sized> DoubleEndedIterator for PosListIter<'_, L> {
    fn next_back(&mut self) -> Option<RowId> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.list.get(self.back))
    }
}

impl<L: PositionList + ?Sized> ExactSizeIterator for PosListIter<'_, L> {}

impl<L: PositionList + ?Sized> FusedIterator for PosListIter<'_, L> {}

/// An owned position list in any of its representations.
#[derive(Debug, Clone)]
pub enum PosList {
    Materialized(RowIdPosList),
    EntireChunk(EntireChunkPosList),
    SingleChunkRange(SingleChunkPosList),
}

impl Default for PosList {
    fn default() -> Self {
        PosList::Materialized(RowIdPosList::new())
    }
}

impl PosList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entire_chunk(chunk: Arc<Chunk>, chunk_id: ChunkId) -> Self {
        PosList::EntireChunk(EntireChunkPosList::new(chunk, chunk_id))
    }

    pub fn as_materialized(&self) -> Option<&RowIdPosList> {
        match self {
            PosList::Materialized(list) => Some(list),
            _ => None,
        }
    }

    pub fn is_entire_chunk(&self) -> bool {
        matches!(self, PosList::EntireChunk(_))
    }

    /// Mutable access to an explicit list, materializing an entire-chunk list in place
    fn make_mutable(&mut self) -> &mut RowIdPosList {
        if let PosList::EntireChunk(list) = self {
            let materialized = list.materialize();
            *self = PosList::Materialized(materialized);
        }
        match self {
            PosList::Materialized(list) => list,
            PosList::SingleChunkRange(_) => {
                panic!("Single chunk range position lists cannot be modified")
            }
            PosList::EntireChunk(_) => unreachable!("entire chunk list was just materialized"),
        }
    }

    pub fn push(&mut self, row_id: RowId) {
        self.make_mutable().push(row_id);
    }

    pub fn insert(&mut self, index: usize, row_id: RowId) {
        self.make_mutable().insert(index, row_id);
    }

    pub fn set(&mut self, index: usize, row_id: RowId) {
        self.make_mutable().set(index, row_id);
    }

    pub fn resize(&mut self, new_len: usize, value: RowId) {
        self.make_mutable().resize(new_len, value);
    }

    pub fn clear(&mut self) {
        self.make_mutable().clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.make_mutable().reserve(additional);
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.make_mutable().try_reserve(additional)
    }

    pub fn guarantee_single_chunk(&mut self) {
        self.make_mutable().guarantee_single_chunk();
    }
}

impl PositionList for PosList {
    #[inline]
    fn len(&self) -> usize {
        match self {
            PosList::Materialized(list) => list.len(),
            PosList::EntireChunk(list) => list.len(),
            PosList::SingleChunkRange(list) => list.len(),
        }
    }

    #[inline]
    fn get(&self, n: usize) -> RowId {
        match self {
            PosList::Materialized(list) => list.get(n),
            PosList::EntireChunk(list) => list.get(n),
            PosList::SingleChunkRange(list) => list.get(n),
        }
    }

    fn references_single_chunk(&self) -> bool {
        match self {
            PosList::Materialized(list) => list.references_single_chunk(),
            PosList::EntireChunk(list) => list.references_single_chunk(),
            PosList::SingleChunkRange(list) => list.references_single_chunk(),
        }
    }

    fn common_chunk_id(&self) -> ChunkId {
        match self {
            PosList::Materialized(list) => list.common_chunk_id(),
            PosList::EntireChunk(list) => list.common_chunk_id(),
            PosList::SingleChunkRange(list) => list.common_chunk_id(),
        }
    }

    fn memory_usage(&self, mode: MemoryUsageCalculationMode) -> usize {
        match self {
            PosList::Materialized(list) => list.memory_usage(mode),
            PosList::EntireChunk(list) => list.memory_usage(mode),
            PosList::SingleChunkRange(list) => list.memory_usage(mode),
        }
    }
}

/// Two lists are equal when they enumerate the same row ids, whatever their representation
impl PartialEq for PosList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for PosList {}

impl PartialEq<[RowId]> for PosList {
    fn eq(&self, other: &[RowId]) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter().copied())
    }
}

impl PartialEq<Vec<RowId>> for PosList {
    fn eq(&self, other: &Vec<RowId>) -> bool {
        self == other.as_slice()
    }
}

impl<'a> IntoIterator for &'a PosList {
    type Item = RowId;
    type IntoIter = PosListIter<'a, PosList>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<RowIdPosList> for PosList {
    fn from(list: RowIdPosList) -> Self {
        PosList::Materialized(list)
    }
}

impl From<EntireChunkPosList> for PosList {
    fn from(list: EntireChunkPosList) -> Self {
        PosList::EntireChunk(list)
    }
}

impl From<SingleChunkPosList> for PosList {
    fn from(list: SingleChunkPosList) -> Self {
        PosList::SingleChunkRange(list)
    }
}

impl From<Vec<RowId>> for PosList {
    fn from(row_ids: Vec<RowId>) -> Self {
        PosList::Materialized(row_ids.into())
    }
}

impl FromIterator<RowId> for PosList {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        PosList::Materialized(iter.into_iter().collect())
    }
}
