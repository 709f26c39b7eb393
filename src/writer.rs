//! Segment write-back strategies
//!
//! Three mutually exclusive ways of getting segment records into the
//! planning platform:
//! - Simple: one request with `DoCommit`, client-generated transaction id
//! - Batched: server-issued id, sequential batches, explicit commit
//! - Parallel: parallel-process transaction, concurrent batches, explicit commit
//!
//! All of them return the same [`TransactionResult`] shape. Any batch that
//! was not sent, or a transaction that was not committed, is an error.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::WriteConfig;
use crate::dispatcher::{ParallelDispatcher, failed_batches};
use crate::error::{Result, WriteError};
use crate::partition::partition;
use crate::payload::TransactionPayload;
use crate::record::{RawSegmentRow, SegmentRecord, segment_counts, validate_records, validate_rows};
use crate::session::SessionProvider;
use crate::target::WriteTarget;
use crate::transaction::{TransactionManager, TransactionState, WriteStatus, committed_status};
use crate::transport::{PlanningTransport, ReqwestTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Simple,
    Batched,
    Parallel,
}

impl WriteMode {
    /// Simple up to the threshold, batched above it
    pub fn recommend(record_count: usize, simple_threshold: usize) -> Self {
        if record_count <= simple_threshold {
            WriteMode::Simple
        } else {
            WriteMode::Batched
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteMode::Simple => "simple",
            WriteMode::Batched => "batched",
            WriteMode::Parallel => "parallel",
        };
        f.write_str(name)
    }
}

impl FromStr for WriteMode {
    type Err = WriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(WriteMode::Simple),
            "batched" => Ok(WriteMode::Batched),
            "parallel" => Ok(WriteMode::Parallel),
            other => Err(WriteError::validation(format!(
                "unknown write mode '{}', expected simple, batched or parallel",
                other
            ))),
        }
    }
}

/// Batch size and worker count for one write call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub batch_size: usize,
    pub max_workers: usize,
}

impl WriteOptions {
    pub fn from_config(config: &WriteConfig) -> Self {
        Self {
            batch_size: config.default_batch_size,
            max_workers: config.default_max_workers,
        }
    }

    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        if let Some(size) = batch_size {
            self.batch_size = size;
        }
        self
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        if let Some(workers) = max_workers {
            self.max_workers = workers;
        }
        self
    }
}

/// Outcome of a successful write
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub status: String,
    pub mode: WriteMode,
    pub transaction_id: String,
    pub records_sent: usize,
    pub batch_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_workers: Option<usize>,
    pub commit_status: Value,
    pub export_result: Value,
    pub failed_batches: Vec<usize>,
    pub segment_counts: BTreeMap<String, usize>,
    pub message: String,
}

/// Entry point for writing segment records back to the planning platform
pub struct SegmentWriter {
    provider: SessionProvider,
    manager: TransactionManager,
    config: WriteConfig,
}

impl SegmentWriter {
    pub fn new(config: &WriteConfig, transport: Arc<dyn PlanningTransport>) -> Self {
        let provider = SessionProvider::new(transport);
        Self {
            manager: TransactionManager::new(provider.clone()),
            provider,
            config: config.clone(),
        }
    }

    /// Writer talking HTTP to the configured endpoint
    pub fn from_config(config: &WriteConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        info!("Initialized write service with URL: {}", transport.base_url());
        info!("Planning area: {}", config.planning_area);
        info!("Key figure: {}", config.key_figure);
        info!("NULL handling enabled: {}", config.enable_null_handling);
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Write with the given strategy
    pub async fn write(
        &self,
        mode: WriteMode,
        records: &[SegmentRecord],
        target: &WriteTarget,
        options: &WriteOptions,
    ) -> Result<TransactionResult> {
        match mode {
            WriteMode::Simple => self.write_simple(records, target).await,
            WriteMode::Batched => self.write_batched(records, target, options.batch_size).await,
            WriteMode::Parallel => {
                self.write_parallel(records, target, options.batch_size, options.max_workers)
                    .await
            }
        }
    }

    /// Validate raw rows against the target's period field, then write
    pub async fn write_rows(
        &self,
        mode: WriteMode,
        rows: Vec<RawSegmentRow>,
        target: &WriteTarget,
        options: &WriteOptions,
    ) -> Result<TransactionResult> {
        let records = validate_rows(rows, &target.period_field_name)?;
        self.write(mode, &records, target, options).await
    }

    /// Single request carrying `DoCommit`
    pub async fn write_simple(&self, records: &[SegmentRecord], target: &WriteTarget) -> Result<TransactionResult> {
        validate_records(records)?;
        let record_count = records.len();
        info!("Starting simple write for {} segments", record_count);

        if record_count > self.config.simple_record_threshold {
            warn!(
                "Record count {} exceeds recommended limit of {}",
                record_count, self.config.simple_record_threshold
            );
        }

        let transaction_id = TransactionManager::generate_transaction_id();
        info!("Generated transaction ID: {}", transaction_id);

        let payload = TransactionPayload::build(records, target, &transaction_id, true)?;

        let authorized = self.provider.acquire().await?;
        TransactionManager::send_batch(authorized.session(), authorized.token(), &payload)
            .await
            .inspect_err(|e| error!("Write request failed: {}", e))?;
        drop(authorized);

        info!("Write successful - Transaction ID: {}", transaction_id);
        Ok(TransactionResult {
            status: "success".to_string(),
            mode: WriteMode::Simple,
            records_sent: record_count,
            batch_count: 1,
            batch_size: None,
            parallel_workers: None,
            commit_status: committed_status(&transaction_id),
            export_result: json!({ "status": "not_requested" }),
            failed_batches: Vec::new(),
            segment_counts: segment_counts(records),
            message: "Data written and committed successfully".to_string(),
            transaction_id,
        })
    }

    /// Sequential batches on one session, then an explicit commit
    pub async fn write_batched(
        &self,
        records: &[SegmentRecord],
        target: &WriteTarget,
        batch_size: usize,
    ) -> Result<TransactionResult> {
        validate_records(records)?;
        let batches = partition(records, batch_size)?;
        let batch_count = batches.len();
        info!("Starting batched write for {} segments", records.len());

        let mut state = TransactionState::Unstarted;
        let outcome = async {
            let authorized = self.provider.acquire().await?;
            state = TransactionState::TokenAcquired;

            let transaction_id = self.manager.request_transaction_id(&authorized).await?;
            state = TransactionState::TransactionOpened;
            info!("Split into {} batches of max {} records", batch_count, batch_size);

            for (idx, batch) in batches.iter().enumerate() {
                let batch_index = idx + 1;
                info!("Sending batch {}/{} ({} records)", batch_index, batch_count, batch.len());

                let payload = TransactionPayload::build(batch, target, &transaction_id, false)?;
                TransactionManager::send_batch(authorized.session(), authorized.token(), &payload)
                    .await
                    .map_err(|e| annotate_batch(e, batch_index))?;
                info!("Batch {}/{} sent successfully", batch_index, batch_count);
            }
            state = TransactionState::BatchesSent;

            info!("All batches sent, committing transaction");
            let commit_status = self.manager.commit(&authorized, &transaction_id).await?;
            state = TransactionState::Committed;

            let export_result = self.manager.get_export_result(&authorized, &transaction_id).await;
            state = TransactionState::ResultRetrieved;

            Ok::<_, WriteError>((transaction_id, commit_status, export_result))
        }
        .await;

        let (transaction_id, commit_status, export_result) = outcome.inspect_err(|e| {
            error!("Batched write {} -> {}: {}", state, TransactionState::Failed, e);
        })?;
        info!("Batched write finished in state {}", state);

        Ok(TransactionResult {
            status: "success".to_string(),
            mode: WriteMode::Batched,
            transaction_id,
            records_sent: records.len(),
            batch_count,
            batch_size: Some(batch_size),
            parallel_workers: None,
            commit_status,
            export_result,
            failed_batches: Vec::new(),
            segment_counts: segment_counts(records),
            message: "Data written and committed in batches".to_string(),
        })
    }

    /// Concurrent batches against a parallel-process transaction
    pub async fn write_parallel(
        &self,
        records: &[SegmentRecord],
        target: &WriteTarget,
        batch_size: usize,
        max_workers: usize,
    ) -> Result<TransactionResult> {
        validate_records(records)?;
        let batches = partition(records, batch_size)?;
        let batch_count = batches.len();
        let workers = self.config.clamp_workers(max_workers);
        info!("Starting parallel write for {} segments", records.len());

        let mut state = TransactionState::Unstarted;
        let outcome = async {
            let authorized = self.provider.acquire().await?;
            state = TransactionState::TokenAcquired;

            let transaction_id = self.manager.initiate_parallel_process(&authorized, target).await?;
            state = TransactionState::TransactionOpened;
            info!("Split into {} batches for parallel processing", batch_count);

            let batch_target = target.without_plan_coordinates();
            let payloads = batches
                .iter()
                .map(|batch| TransactionPayload::build(batch, &batch_target, &transaction_id, false))
                .collect::<Result<Vec<_>>>()?;

            let dispatcher = ParallelDispatcher::new(self.provider.clone(), workers);
            let outcomes = dispatcher.dispatch(payloads, authorized.shared_token()).await;

            let failed = failed_batches(&outcomes);
            if !failed.is_empty() {
                error!("Failed batches: {:?}", failed);
                let details = outcomes
                    .iter()
                    .filter_map(|o| {
                        o.error_detail
                            .as_ref()
                            .map(|detail| format!("batch {}: {}", o.batch_index, detail))
                    })
                    .collect();
                return Err(WriteError::PartialBatchFailure {
                    failed_batches: failed,
                    total_batches: batch_count,
                    details,
                });
            }
            state = TransactionState::BatchesSent;

            info!("All batches sent, committing transaction");
            let commit_status = self.manager.commit(&authorized, &transaction_id).await?;
            state = TransactionState::Committed;

            let export_result = self.manager.get_export_result(&authorized, &transaction_id).await;
            state = TransactionState::ResultRetrieved;

            Ok::<_, WriteError>((transaction_id, commit_status, export_result))
        }
        .await;

        let (transaction_id, commit_status, export_result) = outcome.inspect_err(|e| {
            error!("Parallel write {} -> {}: {}", state, TransactionState::Failed, e);
        })?;
        info!("Parallel write finished in state {}", state);

        Ok(TransactionResult {
            status: "success".to_string(),
            mode: WriteMode::Parallel,
            transaction_id,
            records_sent: records.len(),
            batch_count,
            batch_size: Some(batch_size),
            parallel_workers: Some(workers),
            commit_status,
            export_result,
            failed_batches: Vec::new(),
            segment_counts: segment_counts(records),
            message: "Data written in parallel and committed".to_string(),
        })
    }

    pub async fn get_messages(&self, transaction_id: &str) -> Vec<Value> {
        self.manager.get_messages(transaction_id).await
    }

    pub async fn get_status(&self, transaction_id: &str) -> Result<WriteStatus> {
        self.manager.get_status(transaction_id).await
    }
}

fn annotate_batch(err: WriteError, batch_index: usize) -> WriteError {
    match err {
        WriteError::Transport { detail, status, body } => WriteError::Transport {
            detail: format!("batch {}: {}", batch_index, detail),
            status,
            body,
        },
        other => other,
    }
}
