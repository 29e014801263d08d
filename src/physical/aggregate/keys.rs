//! Grouping keys
//!
//! Every row's grouping values are folded into a fixed-shape key of 64-bit
//! entries before aggregation starts. The shape is chosen once per
//! aggregation from the number of grouping columns, so the per-row loops are
//! monomorphized over the key type instead of branching on it.
//!
//! Integer and float entries are exact. String entries are FNV-1a hashes:
//! two different strings with the same hash land in the same group.

use crate::error::{QueryError, Result};
use crate::storage::column_type::with_column_type;
use crate::storage::{Chunk, ColumnId, Table};
use rayon::prelude::*;
use std::fmt;
use std::hash::Hash;
use tracing::trace;

/// One grouping column's contribution to a key
pub type AggregateKeyEntry = u64;

/// Keys of one chunk, indexed by chunk offset
pub type AggregateKeys<K> = Vec<K>;

/// Keys of every chunk, indexed by chunk id
pub type KeysPerChunk<K> = Vec<AggregateKeys<K>>;

pub trait AggregateKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Zeroed key for `columns` grouping columns
    fn with_columns(columns: usize) -> Self;

    fn set_entry(&mut self, index: usize, entry: AggregateKeyEntry);
}

/// Key of an aggregation without grouping columns: every row is in one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EmptyAggregateKey;

impl AggregateKey for EmptyAggregateKey {
    fn with_columns(columns: usize) -> Self {
        debug_assert_eq!(columns, 0);
        EmptyAggregateKey
    }

    fn set_entry(&mut self, _index: usize, _entry: AggregateKeyEntry) {
        unreachable!("empty keys have no entries")
    }
}

impl AggregateKey for AggregateKeyEntry {
    fn with_columns(columns: usize) -> Self {
        debug_assert_eq!(columns, 1);
        0
    }

    #[inline]
    fn set_entry(&mut self, index: usize, entry: AggregateKeyEntry) {
        debug_assert_eq!(index, 0);
        *self = entry;
    }
}

impl AggregateKey for [AggregateKeyEntry; 2] {
    fn with_columns(columns: usize) -> Self {
        debug_assert_eq!(columns, 2);
        [0; 2]
    }

    #[inline]
    fn set_entry(&mut self, index: usize, entry: AggregateKeyEntry) {
        self[index] = entry;
    }
}

impl AggregateKey for Vec<AggregateKeyEntry> {
    fn with_columns(columns: usize) -> Self {
        vec![0; columns]
    }

    #[inline]
    fn set_entry(&mut self, index: usize, entry: AggregateKeyEntry) {
        self[index] = entry;
    }
}

/// Key representation picked from the grouping column count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    Empty,
    Single,
    Pair,
    Dynamic,
}

impl KeyShape {
    pub fn for_columns(columns: usize) -> Self {
        match columns {
            0 => KeyShape::Empty,
            1 => KeyShape::Single,
            2 => KeyShape::Pair,
            _ => KeyShape::Dynamic,
        }
    }

    /// Approximate bytes per row for keys of this shape
    pub fn key_size(&self, columns: usize) -> usize {
        match self {
            KeyShape::Empty => 0,
            KeyShape::Single => std::mem::size_of::<AggregateKeyEntry>(),
            KeyShape::Pair => std::mem::size_of::<[AggregateKeyEntry; 2]>(),
            KeyShape::Dynamic => {
                std::mem::size_of::<Vec<AggregateKeyEntry>>()
                    + columns * std::mem::size_of::<AggregateKeyEntry>()
            }
        }
    }
}

/// Builds the keys of every row from the grouping columns
#[derive(Debug, Clone)]
pub struct KeyEncoder<'a> {
    groupby_column_ids: &'a [ColumnId],
}

impl<'a> KeyEncoder<'a> {
    pub fn new(groupby_column_ids: &'a [ColumnId]) -> Self {
        Self { groupby_column_ids }
    }

    pub fn shape(&self) -> KeyShape {
        KeyShape::for_columns(self.groupby_column_ids.len())
    }

    /// Keys for every chunk of `table`, encoded in parallel
    pub fn encode<K: AggregateKey>(&self, table: &Table) -> Result<KeysPerChunk<K>> {
        table
            .chunks()
            .par_iter()
            .map(|chunk| self.encode_chunk(chunk))
            .collect()
    }

    /// Keys for one chunk, filled one grouping column at a time
    pub fn encode_chunk<K: AggregateKey>(&self, chunk: &Chunk) -> Result<AggregateKeys<K>> {
        let mut keys: AggregateKeys<K> = Vec::new();
        keys.try_reserve_exact(chunk.size())?;
        keys.resize(chunk.size(), K::with_columns(self.groupby_column_ids.len()));

        for (index, &column_id) in self.groupby_column_ids.iter().enumerate() {
            let segment = chunk.get_segment(column_id);
            let data_type = segment.data_type();
            with_column_type!(&data_type, T => {
                segment.for_each_key_entry::<T>(|offset, entry| {
                    keys[offset as usize].set_entry(index, entry)
                })?
            }, _ => {
                return Err(QueryError::Config(format!(
                    "Cannot group by column of type {:?}",
                    data_type
                )))
            });
        }

        trace!(rows = keys.len(), "Encoded chunk keys");
        Ok(keys)
    }
}
