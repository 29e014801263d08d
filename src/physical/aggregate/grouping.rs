//! Group assignment and the fold over chunks

use crate::error::Result;
use crate::physical::aggregate::accumulator::{AccumulatorFactory, GroupsAccumulator};
use crate::physical::aggregate::keys::AggregateKey;
use crate::physical::aggregate::AggregateColumnDefinition;
use crate::storage::{Chunk, ChunkId, ChunkOffset, RowId};
use hashbrown::HashMap;
use std::mem::size_of;

/// Assigns dense group indices to keys in first-seen order.
///
/// Each group remembers the first row it was seen at. That row is never
/// replaced, so grouping columns in the output show the first row's values.
#[derive(Debug)]
pub struct GroupingMap<K> {
    groups: HashMap<K, usize>,
    representative_rows: Vec<RowId>,
}

impl<K: AggregateKey> Default for GroupingMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: AggregateKey> GroupingMap<K> {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
            representative_rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.representative_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.representative_rows.is_empty()
    }

    /// Index of the group for `key`, created with `row_id` as representative if new
    #[inline]
    pub fn group_index(&mut self, key: &K, row_id: RowId) -> usize {
        if let Some(&index) = self.groups.get(key) {
            return index;
        }
        let index = self.representative_rows.len();
        self.groups.insert(key.clone(), index);
        self.representative_rows.push(row_id);
        index
    }

    /// Group index of every row of chunk `chunk_id`
    pub fn group_indices(&mut self, keys: &[K], chunk_id: ChunkId) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        indices.try_reserve_exact(keys.len())?;
        for (offset, key) in keys.iter().enumerate() {
            indices.push(self.group_index(key, RowId::new(chunk_id, offset as ChunkOffset)));
        }
        Ok(indices)
    }

    pub fn representative_rows(&self) -> &[RowId] {
        &self.representative_rows
    }

    /// Keys and representative rows in group index order
    pub fn into_entries(self) -> Vec<(K, RowId)> {
        let mut keys: Vec<Option<K>> = vec![None; self.representative_rows.len()];
        for (key, index) in self.groups {
            keys[index] = Some(key);
        }
        keys.into_iter()
            .zip(self.representative_rows)
            .filter_map(|(key, row_id)| key.map(|key| (key, row_id)))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.groups.capacity() * (size_of::<K>() + size_of::<usize>())
            + self.representative_rows.capacity() * size_of::<RowId>()
    }
}

/// Groups plus one accumulator per output aggregate.
///
/// One state is built per chunk; states are then merged in chunk order, which
/// yields the same groups, group order and representative rows as a single
/// sequential pass.
#[derive(Debug)]
pub struct AggregationState<K> {
    groups: GroupingMap<K>,
    accumulators: Vec<Box<dyn GroupsAccumulator>>,
}

impl<K: AggregateKey> AggregationState<K> {
    pub fn new(factories: &[AccumulatorFactory]) -> Self {
        Self {
            groups: GroupingMap::new(),
            accumulators: factories.iter().map(|factory| factory()).collect(),
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Fold every row of one chunk
    pub fn process_chunk(
        &mut self,
        chunk_id: ChunkId,
        chunk: &Chunk,
        keys: &[K],
        aggregates: &[AggregateColumnDefinition],
    ) -> Result<()> {
        let group_indices = self.groups.group_indices(keys, chunk_id)?;
        let total_groups = self.groups.len();

        for (accumulator, definition) in self.accumulators.iter_mut().zip(aggregates) {
            let segment = definition.column.map(|column_id| chunk.get_segment(column_id));
            accumulator.update(segment, &group_indices, total_groups)?;
        }
        Ok(())
    }

    /// Merge a state built from later rows into this one
    pub fn merge(&mut self, other: AggregationState<K>) -> Result<()> {
        let mapping: Vec<usize> = other
            .groups
            .into_entries()
            .iter()
            .map(|(key, row_id)| self.groups.group_index(key, *row_id))
            .collect();
        let total_groups = self.groups.len();

        for (accumulator, partial) in self.accumulators.iter_mut().zip(other.accumulators) {
            accumulator.merge(partial, &mapping, total_groups)?;
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.groups.size() + self.accumulators.iter().map(|a| a.size()).sum::<usize>()
    }

    pub fn into_parts(self) -> (Vec<RowId>, Vec<Box<dyn GroupsAccumulator>>) {
        (self.groups.representative_rows, self.accumulators)
    }
}
