//! Query core CLI

use clap::{Parser, Subcommand};
use query_core::cli::{OutputFormat, OutputFormatter};
use query_core::datagen::SalesGenerator;
use query_core::physical::display_plan;
use query_core::storage::{ColumnId, ScalarValue, DEFAULT_CHUNK_SIZE};
use query_core::{
    AggregateColumnDefinition, ExecutionContext, FilterExec, HashAggregateExec, IndexScanExec,
    PhysicalOperator, Predicate, Result, TableScanExec,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "query_core")]
#[command(about = "Chunked columnar aggregation over Parquet files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic sales table and write it to a Parquet file
    Generate {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of rows
        #[arg(short, long, default_value = "1000000")]
        rows: usize,

        /// Number of distinct categories
        #[arg(short, long, default_value = "100")]
        groups: usize,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },

    /// Load a Parquet file and run a grouped aggregation over it
    Aggregate {
        /// Path to Parquet file or directory
        #[arg(short, long)]
        path: PathBuf,

        /// Rows per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Grouping column (repeatable)
        #[arg(short, long = "group-by")]
        group_by: Vec<String>,

        /// Aggregate as FUNC:COLUMN[=ALIAS], COUNT(*) as count:* (repeatable)
        #[arg(short, long = "agg")]
        aggregates: Vec<String>,

        /// Keep rows where COLUMN OP VALUE holds
        #[arg(long, num_args = 3, value_names = ["COLUMN", "OP", "VALUE"])]
        filter: Option<Vec<String>>,

        /// Keep rows where LOW <= COLUMN <= HIGH, using a per-chunk index
        #[arg(long, num_args = 3, value_names = ["COLUMN", "LOW", "HIGH"])]
        between: Option<Vec<String>>,

        /// Worker threads (defaults to all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Memory limit in bytes for operator state
        #[arg(long)]
        memory_limit: Option<usize>,

        /// Output format: table, csv or vertical
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Show the operator plan
        #[arg(long)]
        plan: bool,
    },
}

fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            output,
            rows,
            groups,
            seed,
        } => SalesGenerator::with_seed(rows, groups, seed).generate_to_parquet(&output),

        Commands::Aggregate {
            path,
            chunk_size,
            group_by,
            aggregates,
            filter,
            between,
            threads,
            memory_limit,
            format,
            plan,
        } => run_aggregate(AggregateArgs {
            path,
            chunk_size,
            group_by,
            aggregates,
            filter,
            between,
            threads,
            memory_limit,
            format,
            plan,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct AggregateArgs {
    path: PathBuf,
    chunk_size: usize,
    group_by: Vec<String>,
    aggregates: Vec<String>,
    filter: Option<Vec<String>>,
    between: Option<Vec<String>>,
    threads: Option<usize>,
    memory_limit: Option<usize>,
    format: String,
    plan: bool,
}

fn run_aggregate(args: AggregateArgs) -> Result<()> {
    let format: OutputFormat = args.format.parse()?;

    let mut ctx = ExecutionContext::new().with_chunk_size(args.chunk_size);
    if let Some(threads) = args.threads {
        ctx = ctx.with_threads(threads)?;
    }
    if let Some(limit) = args.memory_limit {
        ctx = ctx.with_memory_limit(limit);
    }

    let table = ctx.read_parquet(&args.path)?;
    let mut input: Arc<dyn PhysicalOperator> = Arc::new(TableScanExec::new(table.clone()));

    if let Some(between) = &args.between {
        let (column_id, data_type) = lookup(&table, &between[0])?;
        let lower = ScalarValue::parse_as(&between[1], &data_type)?;
        let upper = ScalarValue::parse_as(&between[2], &data_type)?;
        input = Arc::new(IndexScanExec::try_new(input, column_id, lower, upper)?);
    }

    if let Some(filter) = &args.filter {
        let (column_id, data_type) = lookup(&table, &filter[0])?;
        let op = filter[1].parse()?;
        let value = ScalarValue::parse_as(&filter[2], &data_type)?;
        input = Arc::new(FilterExec::try_new(input, Predicate::new(column_id, op, value))?);
    }

    let schema = table.schema();
    let groupby_column_ids = args
        .group_by
        .iter()
        .map(|name| table.column_id(name))
        .collect::<Result<Vec<_>>>()?;
    let aggregates = args
        .aggregates
        .iter()
        .map(|text| AggregateColumnDefinition::parse(text, &schema))
        .collect::<Result<Vec<_>>>()?;

    let aggregate = HashAggregateExec::try_new(input, groupby_column_ids, aggregates)?;
    if args.plan {
        println!("{}", display_plan(&aggregate, 0));
    }

    let start = Instant::now();
    let result = aggregate.execute(&ctx)?;
    info!(
        groups = result.row_count(),
        threads = ctx.threads(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Aggregated"
    );

    OutputFormatter::new(format).print(&result.to_record_batches()?)
}

fn lookup(
    table: &query_core::Table,
    name: &str,
) -> Result<(ColumnId, arrow::datatypes::DataType)> {
    let column_id = table.column_id(name)?;
    Ok((column_id, table.column_data_type(column_id).clone()))
}
