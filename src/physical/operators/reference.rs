//! Reference segments for operator outputs
//!
//! Operators that select rows (filters, index scans, aggregation output) never
//! copy values. They emit reference segments over a position list. When the
//! selected columns are themselves references, positions are translated
//! through the input's position lists so that every reference segment points
//! directly at value data.

use crate::error::{QueryError, Result};
use crate::storage::{
    ColumnId, PosList, PositionList, ReferenceSegment, RowIdPosList, Segment, Table, NULL_ROW_ID,
};
use hashbrown::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Segments selecting the rows of `pos_list` from `column_ids` of `input`.
///
/// Row ids in `pos_list` address `input`. Columns backed by the same input
/// position lists share one translated list in the output.
pub fn reference_segments(
    input: &Arc<Table>,
    pos_list: &Arc<PosList>,
    column_ids: &[ColumnId],
) -> Result<Vec<Segment>> {
    let mut translated: HashMap<Vec<*const PosList>, Arc<PosList>> = HashMap::new();
    let mut segments = Vec::with_capacity(column_ids.len());

    for &column_id in column_ids {
        let first_reference = input
            .chunks()
            .first()
            .and_then(|chunk| chunk.get_segment(column_id).as_reference());

        let Some(first_reference) = first_reference else {
            segments.push(Segment::Reference(ReferenceSegment::new(
                input.clone(),
                column_id,
                pos_list.clone(),
            )));
            continue;
        };

        if let PosList::EntireChunk(entire) = pos_list.as_ref() {
            segments.push(input.get_chunk(entire.chunk_id()).get_segment(column_id).clone());
            continue;
        }

        let referenced_table = first_reference.referenced_table().clone();
        let input_lists = input
            .chunks()
            .iter()
            .map(|chunk| match chunk.get_segment(column_id) {
                Segment::Reference(segment)
                    if Arc::ptr_eq(segment.referenced_table(), &referenced_table) =>
                {
                    Ok(segment.pos_list())
                }
                _ => Err(QueryError::Internal(format!(
                    "Column {} mixes value and reference segments",
                    column_id
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let key: Vec<*const PosList> = input_lists.iter().map(|l| Arc::as_ptr(l)).collect();
        let resolved = match translated.get(&key) {
            Some(list) => list.clone(),
            None => {
                let list = Arc::new(translate(pos_list, &input_lists)?);
                translated.insert(key, list.clone());
                list
            }
        };

        segments.push(Segment::Reference(ReferenceSegment::new(
            referenced_table,
            first_reference.referenced_column_id(),
            resolved,
        )));
    }

    Ok(segments)
}

/// Map positions into a reference table to positions into its data table
fn translate(pos_list: &PosList, input_lists: &[&Arc<PosList>]) -> Result<PosList> {
    trace!(rows = pos_list.len(), "Translating positions through reference input");
    let mut resolved = RowIdPosList::new();
    resolved.try_reserve(pos_list.len())?;

    for row_id in pos_list.iter() {
        if row_id.is_null() {
            resolved.push(NULL_ROW_ID);
        } else {
            let input_list = input_lists[row_id.chunk_id as usize];
            resolved.push(input_list.get(row_id.chunk_offset as usize));
        }
    }

    if pos_list.references_single_chunk()
        && !pos_list.is_empty()
        && input_lists[pos_list.common_chunk_id() as usize].references_single_chunk()
    {
        resolved.guarantee_single_chunk();
    }
    Ok(PosList::Materialized(resolved))
}
