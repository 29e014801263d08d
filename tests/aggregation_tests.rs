//! Integration tests for grouped aggregation
//!
//! Tables are built from Arrow record batches, split into chunks of varying
//! sizes, and aggregated through the public operator API.

use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use query_core::datagen::SalesGenerator;
use query_core::physical::{
    AggregateColumnDefinition, AggregateFunction, CompareOp, FilterExec, HashAggregateExec,
    IndexScanExec, PhysicalOperator, Predicate, TableScanExec,
};
use query_core::storage::{ColumnId, PositionList, RowId, ScalarValue, Table};
use query_core::{ExecutionContext, QueryError};
use rand::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn kv_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("k", DataType::Utf8, false),
        Field::new("v", DataType::Int64, false),
    ]))
}

fn kv_batch(keys: &[&str], values: &[i64]) -> RecordBatch {
    RecordBatch::try_new(
        kv_schema(),
        vec![
            Arc::new(StringArray::from(keys.to_vec())),
            Arc::new(Int64Array::from(values.to_vec())),
        ],
    )
    .unwrap()
}

/// Split `batch` into consecutive chunks of the given sizes
fn chunked(batch: &RecordBatch, sizes: &[usize]) -> Arc<dyn PhysicalOperator> {
    let mut offset = 0;
    let mut pieces = Vec::new();
    for &size in sizes {
        pieces.push(batch.slice(offset, size));
        offset += size;
    }
    assert_eq!(offset, batch.num_rows());
    let table = Table::from_batches(batch.schema(), pieces).unwrap();
    Arc::new(TableScanExec::new(Arc::new(table)))
}

fn aggregate(
    input: Arc<dyn PhysicalOperator>,
    groupby: Vec<ColumnId>,
    aggregates: Vec<AggregateColumnDefinition>,
) -> Arc<Table> {
    HashAggregateExec::try_new(input, groupby, aggregates)
        .unwrap()
        .execute(&ExecutionContext::new())
        .unwrap()
}

/// Every output row as scalars, in output order
fn rows(table: &Table) -> Vec<Vec<ScalarValue>> {
    let mut rows = Vec::new();
    for chunk_id in 0..table.chunk_count() {
        for offset in 0..table.get_chunk(chunk_id).size() {
            rows.push(
                (0..table.column_count() as ColumnId)
                    .map(|column| {
                        table
                            .get_value(column, RowId::new(chunk_id, offset as u32))
                            .unwrap()
                    })
                    .collect(),
            );
        }
    }
    rows
}

/// Output rows keyed by their first column
fn by_key(table: &Table) -> BTreeMap<ScalarValue, Vec<ScalarValue>> {
    rows(table)
        .into_iter()
        .map(|mut row| {
            let key = row.remove(0);
            (key, row)
        })
        .collect()
}

fn all_functions() -> Vec<AggregateColumnDefinition> {
    vec![
        AggregateColumnDefinition::new(1, AggregateFunction::Sum),
        AggregateColumnDefinition::new(1, AggregateFunction::Count),
        AggregateColumnDefinition::new(1, AggregateFunction::Min),
        AggregateColumnDefinition::new(1, AggregateFunction::Max),
        AggregateColumnDefinition::new(1, AggregateFunction::Avg),
        AggregateColumnDefinition::new(1, AggregateFunction::CountDistinct),
        AggregateColumnDefinition::count_star(),
    ]
}

#[test]
fn test_sum_independent_of_chunking() {
    let batch = kv_batch(&["A", "B", "A", "A"], &[1, 2, 3, 3]);
    for sizes in [vec![4], vec![1, 3], vec![2, 2], vec![1, 1, 2], vec![1, 1, 1, 1]] {
        let output = aggregate(
            chunked(&batch, &sizes),
            vec![0],
            vec![AggregateColumnDefinition::new(1, AggregateFunction::Sum)],
        );
        let expected = BTreeMap::from([
            (ScalarValue::from("A"), vec![ScalarValue::Int64(7)]),
            (ScalarValue::from("B"), vec![ScalarValue::Int64(2)]),
        ]);
        assert_eq!(by_key(&output), expected, "chunk sizes {:?}", sizes);
    }
}

#[test]
fn test_every_function_independent_of_random_chunking() {
    let mut rng = StdRng::seed_from_u64(7);
    let keys: Vec<&str> = (0..500).map(|_| ["x", "y", "z", "w"][rng.gen_range(0..4)]).collect();
    let values: Vec<i64> = (0..500).map(|_| rng.gen_range(-20..20)).collect();
    let batch = kv_batch(&keys, &values);

    let reference = aggregate(chunked(&batch, &[500]), vec![0], all_functions());
    let expected_rows = rows(&reference);

    for _ in 0..20 {
        let mut sizes = Vec::new();
        let mut remaining = 500;
        while remaining > 0 {
            let size = rng.gen_range(1..=remaining.min(120));
            sizes.push(size);
            remaining -= size;
        }
        let output = aggregate(chunked(&batch, &sizes), vec![0], all_functions());
        // same groups, same values and the same first-seen order
        assert_eq!(rows(&output), expected_rows, "chunk sizes {:?}", sizes);
    }
}

#[test]
fn test_thread_count_does_not_change_results() {
    let batch = kv_batch(&["a", "b", "c", "a", "b", "a"], &[1, 2, 3, 4, 5, 6]);
    let expected = rows(&aggregate(chunked(&batch, &[6]), vec![0], all_functions()));
    for threads in [1, 2, 4] {
        let ctx = ExecutionContext::new().with_threads(threads).unwrap();
        let output = HashAggregateExec::try_new(chunked(&batch, &[1, 2, 3]), vec![0], all_functions())
            .unwrap()
            .execute(&ctx)
            .unwrap();
        assert_eq!(rows(&output), expected);
    }
}

#[test]
fn test_count_distinct() {
    let batch = kv_batch(&["A", "A", "A"], &[1, 1, 2]);
    let output = aggregate(
        chunked(&batch, &[2, 1]),
        vec![0],
        vec![AggregateColumnDefinition::new(1, AggregateFunction::CountDistinct)],
    );
    assert_eq!(output.schema().field(1).name(), "COUNT(DISTINCT v)");
    assert_eq!(
        rows(&output),
        vec![vec![ScalarValue::from("A"), ScalarValue::Int64(2)]]
    );
}

#[test]
fn test_count_star_matches_count_column() {
    let batch = kv_batch(&["A", "B", "A", "A"], &[5, 5, 5, 6]);
    let output = aggregate(
        chunked(&batch, &[3, 1]),
        vec![0],
        vec![
            AggregateColumnDefinition::count_star(),
            AggregateColumnDefinition::new(1, AggregateFunction::Count),
        ],
    );
    assert_eq!(output.schema().field(1).name(), "COUNT(*)");
    assert_eq!(
        by_key(&output),
        BTreeMap::from([
            (
                ScalarValue::from("A"),
                vec![ScalarValue::Int64(3), ScalarValue::Int64(3)]
            ),
            (
                ScalarValue::from("B"),
                vec![ScalarValue::Int64(1), ScalarValue::Int64(1)]
            ),
        ])
    );
}

#[test]
fn test_sum_and_avg_saturate_at_int64_bounds() {
    let batch = kv_batch(&["a", "a"], &[i64::MAX, 1]);
    for sizes in [vec![2], vec![1, 1]] {
        let output = aggregate(
            chunked(&batch, &sizes),
            vec![0],
            vec![
                AggregateColumnDefinition::new(1, AggregateFunction::Sum),
                AggregateColumnDefinition::new(1, AggregateFunction::Avg),
            ],
        );
        let expected = BTreeMap::from([(
            ScalarValue::from("a"),
            vec![
                ScalarValue::Int64(i64::MAX),
                ScalarValue::Float64((i64::MAX as f64 / 2.0).into()),
            ],
        )]);
        assert_eq!(by_key(&output), expected, "chunk sizes {:?}", sizes);
    }
}

#[test]
fn test_avg_min_max_types() {
    let batch = kv_batch(&["A", "A", "B"], &[1, 2, 10]);
    let output = aggregate(
        chunked(&batch, &[1, 2]),
        vec![0],
        vec![
            AggregateColumnDefinition::new(1, AggregateFunction::Avg).with_alias("mean"),
            AggregateColumnDefinition::new(1, AggregateFunction::Min),
            AggregateColumnDefinition::new(1, AggregateFunction::Max),
        ],
    );
    let schema = output.schema();
    assert_eq!(schema.field(1).name(), "mean");
    assert_eq!(schema.field(1).data_type(), &DataType::Float64);
    assert_eq!(schema.field(2).data_type(), &DataType::Int64);

    let batches = output.to_record_batches().unwrap();
    let mean = batches[0]
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(mean.value(0), 1.5);
    assert_eq!(mean.value(1), 10.0);
}

#[test]
fn test_representative_row_is_first_seen() {
    let batch = kv_batch(&["B", "A", "B", "A", "C"], &[1, 2, 3, 4, 5]);
    let output = aggregate(
        chunked(&batch, &[2, 3]),
        vec![0],
        vec![AggregateColumnDefinition::new(1, AggregateFunction::Max)],
    );

    assert_eq!(
        rows(&output),
        vec![
            vec![ScalarValue::from("B"), ScalarValue::Int64(3)],
            vec![ScalarValue::from("A"), ScalarValue::Int64(4)],
            vec![ScalarValue::from("C"), ScalarValue::Int64(5)],
        ]
    );

    let reference = output.get_chunk(0).get_segment(0).as_reference().unwrap().clone();
    assert_eq!(
        reference.pos_list().as_ref(),
        &vec![RowId::new(0, 0), RowId::new(0, 1), RowId::new(1, 2)]
    );
}

#[test]
fn test_key_shapes_group_identically() {
    let keys = ["p", "q", "p", "r", "q", "p"];
    let values = [1i64, 2, 3, 4, 5, 6];
    let key_array: ArrayRef = Arc::new(StringArray::from(keys.to_vec()));
    let schema = Arc::new(Schema::new(vec![
        Field::new("k1", DataType::Utf8, false),
        Field::new("k2", DataType::Utf8, false),
        Field::new("k3", DataType::Utf8, false),
        Field::new("k4", DataType::Utf8, false),
        Field::new("v", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            key_array.clone(),
            key_array.clone(),
            key_array.clone(),
            key_array,
            Arc::new(Int64Array::from(values.to_vec())),
        ],
    )
    .unwrap();

    let sum = || vec![AggregateColumnDefinition::new(4, AggregateFunction::Sum)];
    let sums = |groupby: Vec<ColumnId>| -> Vec<ScalarValue> {
        let columns = groupby.len();
        let output = aggregate(chunked(&batch, &[4, 2]), groupby, sum());
        rows(&output).into_iter().map(|row| row[columns].clone()).collect()
    };

    let single = sums(vec![0]);
    assert_eq!(
        single,
        vec![ScalarValue::Int64(10), ScalarValue::Int64(7), ScalarValue::Int64(4)]
    );
    assert_eq!(sums(vec![0, 1]), single);
    assert_eq!(sums(vec![0, 1, 2, 3]), single);
}

#[test]
fn test_multi_type_grouping() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("i", DataType::Int32, false),
        Field::new("f", DataType::Float64, false),
        Field::new("v", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(vec![1, 1, 2, 1])),
            Arc::new(Float64Array::from(vec![0.5, 0.5, 0.5, -0.0])),
            Arc::new(Int64Array::from(vec![1, 1, 1, 1])),
        ],
    )
    .unwrap();
    let output = aggregate(
        chunked(&batch, &[2, 2]),
        vec![0, 1],
        vec![AggregateColumnDefinition::count_star()],
    );
    let counts: Vec<ScalarValue> = rows(&output).into_iter().map(|row| row[2].clone()).collect();
    assert_eq!(
        counts,
        vec![ScalarValue::Int64(2), ScalarValue::Int64(1), ScalarValue::Int64(1)]
    );
}

#[test]
fn test_global_aggregate_on_empty_input() {
    let table = Table::new(kv_schema(), vec![]).unwrap();
    let input: Arc<dyn PhysicalOperator> = Arc::new(TableScanExec::new(Arc::new(table)));

    let global = aggregate(input.clone(), vec![], all_functions());
    assert_eq!(
        rows(&global),
        vec![vec![
            ScalarValue::Null,
            ScalarValue::Int64(0),
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Int64(0),
            ScalarValue::Int64(0),
        ]]
    );

    let grouped = aggregate(input, vec![0], all_functions());
    assert_eq!(grouped.row_count(), 0);
    assert_eq!(grouped.column_count(), 8);
}

#[test]
fn test_grouping_only_yields_distinct_groups() {
    let batch = kv_batch(&["A", "B", "A"], &[1, 2, 3]);
    let output = aggregate(chunked(&batch, &[1, 2]), vec![0], vec![]);
    assert_eq!(
        rows(&output),
        vec![vec![ScalarValue::from("A")], vec![ScalarValue::from("B")]]
    );
}

#[test]
fn test_configuration_errors() {
    let batch = kv_batch(&["A"], &[1]);
    let try_new = |groupby: Vec<ColumnId>, aggregates: Vec<AggregateColumnDefinition>| {
        HashAggregateExec::try_new(chunked(&batch, &[1]), groupby, aggregates)
    };

    let sum_without_column = AggregateColumnDefinition {
        column: None,
        function: AggregateFunction::Sum,
        alias: None,
    };
    assert!(matches!(
        try_new(vec![0], vec![sum_without_column]),
        Err(QueryError::Config(_))
    ));
    assert!(matches!(
        try_new(vec![0], vec![AggregateColumnDefinition::new(0, AggregateFunction::Sum)]),
        Err(QueryError::Config(_))
    ));
    assert!(matches!(
        try_new(vec![], vec![AggregateColumnDefinition::new(9, AggregateFunction::Min)]),
        Err(QueryError::Config(_))
    ));
    assert!(matches!(try_new(vec![], vec![]), Err(QueryError::Config(_))));
}

#[test]
fn test_null_input_is_precondition_error() {
    let batch = RecordBatch::try_new(
        kv_schema(),
        vec![
            Arc::new(StringArray::from(vec!["A", "B"])),
            Arc::new(Int64Array::from(vec![Some(1), None])),
        ],
    )
    .unwrap();
    let err = HashAggregateExec::try_new(
        chunked(&batch, &[2]),
        vec![0],
        vec![AggregateColumnDefinition::new(1, AggregateFunction::Sum)],
    )
    .unwrap()
    .execute(&ExecutionContext::new())
    .unwrap_err();
    assert!(matches!(err, QueryError::Precondition(_)));
}

#[test]
fn test_memory_limit_fails_aggregation() {
    let keys: Vec<&str> = (0..1000).map(|i| if i % 2 == 0 { "a" } else { "b" }).collect();
    let values: Vec<i64> = (0..1000).collect();
    let batch = kv_batch(&keys, &values);
    let ctx = ExecutionContext::new().with_memory_limit(64);

    let err = HashAggregateExec::try_new(
        chunked(&batch, &[500, 500]),
        vec![0],
        vec![AggregateColumnDefinition::new(1, AggregateFunction::Sum)],
    )
    .unwrap()
    .execute(&ctx)
    .unwrap_err();
    assert!(matches!(err, QueryError::ResourcesExhausted(_)));
    assert_eq!(ctx.memory_pool().used(), 0);
}

#[test]
fn test_memory_is_released_after_aggregation() {
    let batch = kv_batch(&["a", "b", "a"], &[1, 2, 3]);
    let ctx = ExecutionContext::new().with_memory_limit(1 << 20);
    HashAggregateExec::try_new(chunked(&batch, &[2, 1]), vec![0], all_functions())
        .unwrap()
        .execute(&ctx)
        .unwrap();
    assert_eq!(ctx.memory_pool().used(), 0);
}

#[test]
fn test_filter_then_aggregate() {
    let batch = kv_batch(&["A", "B", "A", "B", "C", "A"], &[1, 2, 3, 4, 5, 6]);
    let filter: Arc<dyn PhysicalOperator> = Arc::new(
        FilterExec::try_new(chunked(&batch, &[3, 3]), Predicate::new(1, CompareOp::Gt, 2i64))
            .unwrap(),
    );
    let output = aggregate(
        filter,
        vec![0],
        vec![
            AggregateColumnDefinition::new(1, AggregateFunction::Sum),
            AggregateColumnDefinition::count_star(),
        ],
    );
    assert_eq!(
        rows(&output),
        vec![
            vec![ScalarValue::from("A"), ScalarValue::Int64(9), ScalarValue::Int64(2)],
            vec![ScalarValue::from("B"), ScalarValue::Int64(4), ScalarValue::Int64(1)],
            vec![ScalarValue::from("C"), ScalarValue::Int64(5), ScalarValue::Int64(1)],
        ]
    );

    // grouping column resolves straight to the scanned data
    let reference = output.get_chunk(0).get_segment(0).as_reference().unwrap().clone();
    let data = reference.referenced_table();
    assert!(data.get_chunk(0).get_segment(0).as_reference().is_none());
    assert_eq!(
        reference.pos_list().as_ref(),
        &vec![RowId::new(0, 2), RowId::new(1, 0), RowId::new(1, 1)]
    );
}

#[test]
fn test_index_scan_then_aggregate() {
    let batch = kv_batch(&["A", "B", "A", "B", "C", "A"], &[7, 2, 3, 4, 5, 6]);
    let scan: Arc<dyn PhysicalOperator> = Arc::new(
        IndexScanExec::try_new(
            chunked(&batch, &[3, 3]),
            1,
            ScalarValue::Int64(3),
            ScalarValue::Int64(5),
        )
        .unwrap(),
    );
    let output = aggregate(
        scan,
        vec![0],
        vec![AggregateColumnDefinition::new(1, AggregateFunction::Sum)],
    );
    assert_eq!(
        by_key(&output),
        BTreeMap::from([
            (ScalarValue::from("A"), vec![ScalarValue::Int64(3)]),
            (ScalarValue::from("B"), vec![ScalarValue::Int64(4)]),
            (ScalarValue::from("C"), vec![ScalarValue::Int64(5)]),
        ])
    );
}

#[test]
fn test_parquet_round_trip_aggregation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.parquet");
    SalesGenerator::with_seed(5_000, 7, 3)
        .generate_to_parquet(&path)
        .unwrap();

    let ctx = ExecutionContext::new().with_chunk_size(1_000);
    let table = ctx.read_parquet(&path).unwrap();
    assert_eq!(table.chunk_count(), 5);

    let input: Arc<dyn PhysicalOperator> = Arc::new(TableScanExec::new(table.clone()));
    let category = table.column_id("category").unwrap();
    let output = HashAggregateExec::try_new(
        input,
        vec![category],
        vec![AggregateColumnDefinition::count_star()],
    )
    .unwrap()
    .execute(&ctx)
    .unwrap();

    assert!(output.row_count() <= 7);
    let total: i64 = rows(&output)
        .iter()
        .map(|row| match row[1] {
            ScalarValue::Int64(count) => count,
            ref other => panic!("unexpected count {:?}", other),
        })
        .sum();
    assert_eq!(total, 5_000);

    let reference = output.get_chunk(0).get_segment(0).as_reference().unwrap().clone();
    assert_eq!(reference.pos_list().len(), output.row_count());
}
