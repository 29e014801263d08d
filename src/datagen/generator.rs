//! Sales data generator

use crate::datagen::schema::{sales_schema, REGIONS};
use crate::error::{QueryError, Result};
use crate::storage::write_parquet;
use arrow::array::{Float64Array, Int32Array, Int64Array, StringBuilder};
use arrow::record_batch::RecordBatch;
use rand::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const BATCH_SIZE: usize = 65_536;

/// Generates the SALES table: `rows` rows over `groups` categories
pub struct SalesGenerator {
    rows: usize,
    groups: usize,
    rng: StdRng,
}

impl SalesGenerator {
    pub fn new(rows: usize, groups: usize) -> Self {
        Self::with_seed(rows, groups, 42)
    }

    pub fn with_seed(rows: usize, groups: usize, seed: u64) -> Self {
        Self {
            rows,
            groups: groups.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate all rows as record batches
    pub fn generate(&mut self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::with_capacity(self.rows.div_ceil(BATCH_SIZE));
        let mut remaining = self.rows;
        while remaining > 0 {
            let count = remaining.min(BATCH_SIZE);
            batches.push(self.generate_batch(count)?);
            remaining -= count;
        }
        Ok(batches)
    }

    /// Generate all rows and write them to one Parquet file
    pub fn generate_to_parquet(&mut self, path: &Path) -> Result<()> {
        let batches = self.generate()?;
        write_parquet(path, sales_schema(), &batches)?;
        info!(
            path = %path.display(),
            rows = self.rows,
            groups = self.groups,
            "Generated sales data"
        );
        Ok(())
    }

    fn generate_batch(&mut self, count: usize) -> Result<RecordBatch> {
        let groups = i32::try_from(self.groups)
            .map_err(|_| QueryError::Config(format!("Too many groups: {}", self.groups)))?;

        let mut region = StringBuilder::new();
        let mut category = Vec::with_capacity(count);
        let mut quantity = Vec::with_capacity(count);
        let mut price = Vec::with_capacity(count);

        for _ in 0..count {
            let group = self.rng.gen_range(0..groups);
            region.append_value(REGIONS[group as usize % REGIONS.len()]);
            category.push(group);
            quantity.push(self.rng.gen_range(1..=50i64));
            price.push((self.rng.gen_range(100..100_000) as f64) / 100.0);
        }

        let batch = RecordBatch::try_new(
            sales_schema(),
            vec![
                Arc::new(region.finish()),
                Arc::new(Int32Array::from(category)),
                Arc::new(Int64Array::from(quantity)),
                Arc::new(Float64Array::from(price)),
            ],
        )?;
        Ok(batch)
    }
}
