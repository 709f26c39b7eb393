//! Batch partitioning

use crate::error::{Result, WriteError};

/// Split `records` into contiguous slices of at most `batch_size` items
///
/// Order is preserved and nothing is dropped or duplicated; the last slice
/// may be shorter. An empty input yields no batches.
pub fn partition<T>(records: &[T], batch_size: usize) -> Result<Vec<&[T]>> {
    if batch_size == 0 {
        return Err(WriteError::validation("batch_size must be at least 1"));
    }
    Ok(records.chunks(batch_size).collect())
}
