//! Parallel batch dispatch
//!
//! Sends every batch of a pre-opened transaction concurrently. Each task
//! opens its own session (cookie jars are never shared between tasks) and
//! reuses the transaction id and token obtained up front. Tasks report a
//! [`BatchOutcome`]; failures are only evaluated once all of them finished.

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::payload::TransactionPayload;
use crate::session::SessionProvider;
use crate::transaction::TransactionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failure,
}

/// Result of sending one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// 1-based position in partition order
    pub batch_index: usize,
    pub record_count: usize,
    pub status: BatchStatus,
    pub error_detail: Option<String>,
}

impl BatchOutcome {
    pub fn success(batch_index: usize, record_count: usize) -> Self {
        Self {
            batch_index,
            record_count,
            status: BatchStatus::Success,
            error_detail: None,
        }
    }

    pub fn failure(batch_index: usize, record_count: usize, detail: impl Into<String>) -> Self {
        Self {
            batch_index,
            record_count,
            status: BatchStatus::Failure,
            error_detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }
}

/// Sorted indices of failed batches
pub fn failed_batches(outcomes: &[BatchOutcome]) -> Vec<usize> {
    let mut failed: Vec<usize> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.batch_index)
        .collect();
    failed.sort_unstable();
    failed
}

pub struct ParallelDispatcher {
    provider: SessionProvider,
    max_workers: usize,
}

impl ParallelDispatcher {
    pub fn new(provider: SessionProvider, max_workers: usize) -> Self {
        Self {
            provider,
            max_workers: max_workers.max(1),
        }
    }

    /// Send all payloads, at most `max_workers` at a time, and wait for every one
    pub async fn dispatch(&self, payloads: Vec<TransactionPayload>, token: Arc<str>) -> Vec<BatchOutcome> {
        let total = payloads.len();
        info!(
            "Dispatching {} batches with up to {} parallel workers",
            total, self.max_workers
        );

        let progress_bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches - {msg}")
        {
            progress_bar.set_style(style.progress_chars("█▓▒░  "));
        }
        let progress_bar = Arc::new(progress_bar);
        let semaphore = Arc::new(Semaphore::new(self.max_workers));

        let mut handles = Vec::with_capacity(total);
        let mut sizes = Vec::with_capacity(total);

        for (idx, payload) in payloads.into_iter().enumerate() {
            let batch_index = idx + 1;
            let record_count = payload.record_count();
            let provider = self.provider.clone();
            let token = Arc::clone(&token);
            let semaphore = Arc::clone(&semaphore);
            let progress_bar = Arc::clone(&progress_bar);
            sizes.push(record_count);

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return BatchOutcome::failure(batch_index, record_count, format!("worker pool closed: {}", e));
                    }
                };

                let outcome = match provider.open().await {
                    Ok(session) => {
                        let sent = TransactionManager::send_batch(session.as_ref(), &token, &payload).await;
                        drop(session);
                        match sent {
                            Ok(()) => BatchOutcome::success(batch_index, record_count),
                            Err(e) => BatchOutcome::failure(batch_index, record_count, e.to_string()),
                        }
                    }
                    Err(e) => BatchOutcome::failure(batch_index, record_count, e.to_string()),
                };

                if outcome.is_success() {
                    info!("Batch {}/{} completed successfully", batch_index, total);
                } else {
                    error!(
                        "Batch {}/{} failed: {}",
                        batch_index,
                        total,
                        outcome.error_detail.as_deref().unwrap_or("unknown error")
                    );
                }
                progress_bar.set_message(format!("batch {} ({} records)", batch_index, record_count));
                progress_bar.inc(1);
                outcome
            });
            handles.push(handle);
        }

        let outcomes: Vec<BatchOutcome> = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(idx, joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Batch {} task failed: {}", idx + 1, e);
                    BatchOutcome::failure(idx + 1, sizes[idx], format!("batch task failed: {}", e))
                }
            })
            .collect();

        let failed = failed_batches(&outcomes);
        if failed.is_empty() {
            progress_bar.finish_with_message(format!("Completed: {} batches", total));
        } else {
            progress_bar.finish_with_message(format!("{} batches failed", failed.len()));
        }
        outcomes
    }
}
