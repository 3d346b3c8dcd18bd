//! Data-parallel "for each row" used by every engine.
//!
//! All per-frame work inside one timestep touches disjoint rows, so the engines
//! express it as a closure over `(row_index, row)` and let the executor decide
//! whether to run it inline or fan it out over a bounded rayon pool. Each call
//! joins before returning. The per-element arithmetic does not depend on the
//! executor, so sequential and pooled runs are bit-identical.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{Error, Result};

/// Row count below which the pooled executor stays on the calling thread.
pub const DEFAULT_MIN_ROWS: usize = 32;

#[derive(Debug, Clone, Default)]
pub enum RowExecutor {
    /// Run every row on the calling thread, in order.
    #[default]
    Sequential,
    /// Fan rows out over a dedicated worker pool.
    Pool {
        pool: Arc<ThreadPool>,
        min_rows: usize,
    },
}

impl RowExecutor {
    /// Build a pooled executor with `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(Error::InvalidConfig(
                "executor thread count must be > 0".to_owned(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("packed-rnn-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        Ok(Self::Pool {
            pool: Arc::new(pool),
            min_rows: DEFAULT_MIN_ROWS,
        })
    }

    /// Share an existing pool.
    pub fn from_pool(pool: Arc<ThreadPool>) -> Self {
        Self::Pool {
            pool,
            min_rows: DEFAULT_MIN_ROWS,
        }
    }

    /// Change the parallel threshold. No-op for [`RowExecutor::Sequential`].
    pub fn with_min_rows(self, rows: usize) -> Self {
        match self {
            Self::Sequential => Self::Sequential,
            Self::Pool { pool, .. } => Self::Pool {
                pool,
                min_rows: rows.max(1),
            },
        }
    }

    pub fn num_threads(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Pool { pool, .. } => pool.current_num_threads(),
        }
    }

    /// Calls `f(i, row_i)` for `i in 0..rows`.
    ///
    /// Row `i` is `buf[offset + i * stride..][..cols]`. Requires `cols <= stride`.
    pub fn for_each_row<F>(
        &self,
        buf: &mut [f32],
        offset: usize,
        rows: usize,
        cols: usize,
        stride: usize,
        f: F,
    ) where
        F: Fn(usize, &mut [f32]) + Send + Sync,
    {
        if rows == 0 || cols == 0 {
            return;
        }
        debug_assert!(cols <= stride, "row width {cols} exceeds stride {stride}");

        let end = offset + (rows - 1) * stride + cols;
        let region = &mut buf[offset..end];

        match self {
            Self::Pool { pool, min_rows } if rows >= *min_rows => {
                let min_len = (*min_rows).max(1);
                pool.install(|| {
                    region
                        .par_chunks_mut(stride)
                        .enumerate()
                        .with_min_len(min_len)
                        .for_each(|(i, row)| f(i, &mut row[..cols]));
                });
            }
            _ => {
                for (i, row) in region.chunks_mut(stride).enumerate() {
                    f(i, &mut row[..cols]);
                }
            }
        }
    }
}
