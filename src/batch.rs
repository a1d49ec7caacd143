// src/batch.rs - Chunked parallel execution with index-preserving results

use std::panic::{catch_unwind, AssertUnwindSafe};

use log::error;
use rayon::prelude::*;

use crate::errors::{OrganoidError, Result};

/// Outcome counts for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results<R>(results: &[Option<R>]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_some()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    /// A run only counts as failed outright when nothing succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }
}

/// Fans work items out across a bounded worker pool.
///
/// Items are chunked into groups of `batch_size` and each group runs as one
/// parallel task. Results come back in a slot-per-item vector, so a result
/// can never be attributed to the wrong input even when tasks finish out of
/// submission order; failed items hold `None` at their own position.
pub struct BatchExecutor {
    pool: rayon::ThreadPool,
    num_workers: usize,
}

impl BatchExecutor {
    /// Build an executor with the given worker count, defaulting to the
    /// available hardware concurrency.
    pub fn new(num_workers: Option<usize>) -> Result<Self> {
        let num_workers = num_workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| OrganoidError::Other(format!("failed to build worker pool: {}", e)))?;
        Ok(Self { pool, num_workers })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Apply `func` to every item, `batch_size` items per parallel task.
    ///
    /// A failing or panicking item is logged with its index and contributes
    /// `None`; the rest of the run proceeds. The output always has one slot
    /// per input item, in input order.
    pub fn map_batch<T, R, F>(&self, func: F, items: &[T], batch_size: usize) -> Vec<Option<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let batch_size = batch_size.max(1);
        let chunks: Vec<Vec<Option<R>>> = self.pool.install(|| {
            items
                .par_chunks(batch_size)
                .enumerate()
                .map(|(chunk_idx, chunk)| {
                    chunk
                        .iter()
                        .enumerate()
                        .map(|(offset, item)| {
                            let index = chunk_idx * batch_size + offset;
                            match catch_unwind(AssertUnwindSafe(|| func(item))) {
                                Ok(Ok(result)) => Some(result),
                                Ok(Err(e)) => {
                                    error!("batch item {} failed: {}", index, e);
                                    None
                                }
                                Err(_) => {
                                    error!("batch item {} panicked", index);
                                    None
                                }
                            }
                        })
                        .collect()
                })
                .collect()
        });
        chunks.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> BatchExecutor {
        BatchExecutor::new(Some(4)).unwrap()
    }

    #[test]
    fn results_stay_aligned_with_inputs() {
        // Tag each item with its own index as payload; a misattributed
        // result would return the wrong tag.
        let items: Vec<usize> = (0..103).collect();
        let results = executor().map_batch(|&i| Ok(i * 10), &items, 7);

        assert_eq!(results.len(), items.len());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(*result, Some(i * 10));
        }
    }

    #[test]
    fn failures_leave_none_at_their_own_slot() {
        let items: Vec<usize> = (0..20).collect();
        let results = executor().map_batch(
            |&i| {
                if i % 3 == 0 {
                    Err(OrganoidError::Analysis(format!("item {}", i)))
                } else {
                    Ok(i)
                }
            },
            &items,
            4,
        );

        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 20);
        assert_eq!(summary.succeeded + summary.failed, 20);
        for (i, result) in results.iter().enumerate() {
            if i % 3 == 0 {
                assert!(result.is_none());
            } else {
                assert_eq!(*result, Some(i));
            }
        }
    }

    #[test]
    fn panicking_item_does_not_abort_the_run() {
        let items: Vec<usize> = (0..10).collect();
        let results = executor().map_batch(
            |&i| {
                if i == 4 {
                    panic!("boom");
                }
                Ok(i)
            },
            &items,
            3,
        );
        assert_eq!(results.len(), 10);
        assert!(results[4].is_none());
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 9);
    }

    #[test]
    fn short_final_chunk_is_processed() {
        let items: Vec<usize> = (0..10).collect();
        let results = executor().map_batch(|&i| Ok(i), &items, 4);
        assert_eq!(results.len(), 10);
        assert_eq!(results[9], Some(9));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let items: Vec<usize> = Vec::new();
        let results = executor().map_batch(|&i| Ok(i), &items, 4);
        assert!(results.is_empty());
        assert!(!BatchSummary::from_results(&results).is_total_failure());
    }

    #[test]
    fn total_failure_is_detectable() {
        let items = vec![1, 2, 3];
        let results = executor().map_batch(
            |_: &i32| -> Result<i32> { Err(OrganoidError::Analysis("bad".to_string())) },
            &items,
            2,
        );
        assert!(BatchSummary::from_results(&results).is_total_failure());
    }

    #[test]
    fn default_worker_count_uses_hardware_concurrency() {
        let executor = BatchExecutor::new(None).unwrap();
        assert!(executor.num_workers() >= 1);
    }
}
