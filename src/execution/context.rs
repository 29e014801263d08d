//! Execution context: threads, memory and chunking shared by operators

use crate::error::{QueryError, Result};
use crate::execution::{MemoryPool, SharedMemoryPool};
use crate::storage::{ParquetTable, Table, DEFAULT_CHUNK_SIZE};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Resources available to one query
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Dedicated worker pool; the global rayon pool when unset
    thread_pool: Option<Arc<rayon::ThreadPool>>,
    memory_pool: SharedMemoryPool,
    chunk_size: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            thread_pool: None,
            memory_pool: Arc::new(MemoryPool::unbounded()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Run parallel work on a dedicated pool of `threads` workers
    pub fn with_threads(mut self, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("query-worker-{}", i))
            .build()
            .map_err(|e| QueryError::Config(format!("Failed to build thread pool: {}", e)))?;
        self.thread_pool = Some(Arc::new(pool));
        Ok(self)
    }

    /// Cap the bytes operators may reserve
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_pool = Arc::new(MemoryPool::new(bytes));
        self
    }

    /// Rows per chunk for tables loaded through this context
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn threads(&self) -> usize {
        match &self.thread_pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    pub fn memory_pool(&self) -> &MemoryPool {
        &self.memory_pool
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run `op` so that rayon work inside it uses this context's workers
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.thread_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Load a Parquet file or directory as a chunked table
    pub fn read_parquet(&self, path: impl AsRef<Path>) -> Result<Arc<Table>> {
        let path = path.as_ref();
        let table = ParquetTable::try_new(path)?.load(self.chunk_size)?;
        info!(
            path = %path.display(),
            rows = table.row_count(),
            chunks = table.chunk_count(),
            "Loaded table"
        );
        Ok(Arc::new(table))
    }
}
