//! Transaction lifecycle against the planning data write API
//!
//! Covers transaction id issuance (client-generated or server-issued),
//! batch posts, commit, and the best-effort diagnostic reads
//! (`GetExportResult`, `Message`).

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, WriteError};
use crate::payload::TransactionPayload;
use crate::session::{AuthorizedSession, CSRF_HEADER, SessionProvider};
use crate::target::WriteTarget;
use crate::transport::PlanningSession;

/// Maximum transaction id length accepted by the platform
pub const MAX_TRANSACTION_ID_LEN: usize = 32;

/// Where a write call currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Unstarted,
    TokenAcquired,
    TransactionOpened,
    BatchesSent,
    Committed,
    ResultRetrieved,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Unstarted => "unstarted",
            TransactionState::TokenAcquired => "token-acquired",
            TransactionState::TransactionOpened => "transaction-opened",
            TransactionState::BatchesSent => "batches-sent",
            TransactionState::Committed => "committed",
            TransactionState::ResultRetrieved => "result-retrieved",
            TransactionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Export result and messages for a transaction
#[derive(Debug, Clone, Serialize)]
pub struct WriteStatus {
    pub transaction_id: String,
    pub status: String,
    pub export_result: Value,
    pub messages: Vec<Value>,
    pub checked_at: String,
}

#[derive(Clone)]
pub struct TransactionManager {
    provider: SessionProvider,
}

impl TransactionManager {
    pub fn new(provider: SessionProvider) -> Self {
        Self { provider }
    }

    /// Random 32 character uppercase id, used when the platform commits in one call
    pub fn generate_transaction_id() -> String {
        let mut id = Uuid::new_v4().simple().to_string().to_uppercase();
        id.truncate(MAX_TRANSACTION_ID_LEN);
        id
    }

    /// Ask the platform for a transaction id (`GET getTransactionID`)
    pub async fn request_transaction_id(&self, authorized: &AuthorizedSession) -> Result<String> {
        debug!("Requesting transaction ID");
        let reply = authorized
            .session()
            .get("getTransactionID", &[], &[(CSRF_HEADER, authorized.token())])
            .await?
            .error_for_status("Transaction ID request")
            .inspect_err(|e| error!("Failed to get transaction ID: {}", e))?;

        let transaction_id = parse_transaction_id(&reply.json()?)?;
        info!("Transaction ID obtained: {}", transaction_id);
        Ok(transaction_id)
    }

    /// Open a parallel-process transaction (`POST InitiateParallelProcess`)
    pub async fn initiate_parallel_process(
        &self,
        authorized: &AuthorizedSession,
        target: &WriteTarget,
    ) -> Result<String> {
        let mut body = Map::new();
        body.insert("PlanningArea".to_string(), Value::String(target.planning_area.clone()));
        if let Some(version) = &target.version_id {
            body.insert("VersionID".to_string(), Value::String(version.clone()));
        }
        if let Some(scenario) = &target.scenario_id {
            body.insert("ScenarioID".to_string(), Value::String(scenario.clone()));
        }

        info!("Initiating parallel process");
        let reply = authorized
            .session()
            .post_json(
                "InitiateParallelProcess",
                &Value::Object(body),
                &json_headers(authorized.token()),
            )
            .await?
            .error_for_status("InitiateParallelProcess")
            .inspect_err(|e| error!("Failed to initiate parallel process: {}", e))?;

        let transaction_id = parse_transaction_id(&reply.json()?)?;
        info!("Parallel process initiated with transaction ID: {}", transaction_id);
        Ok(transaction_id)
    }

    /// Post one shaped payload to `<PlanningArea>Trans`
    pub async fn send_batch(
        session: &dyn PlanningSession,
        token: &str,
        payload: &TransactionPayload,
    ) -> Result<()> {
        debug!(
            "Sending {} records to {} (commit: {})",
            payload.record_count(),
            payload.entity_set,
            payload.commit_flag
        );
        session
            .post_json(&payload.entity_set, &payload.to_json(), &json_headers(token))
            .await?
            .error_for_status("Batch write")?;
        Ok(())
    }

    /// Commit all staged batches of a transaction
    pub async fn commit(&self, authorized: &AuthorizedSession, transaction_id: &str) -> Result<Value> {
        info!("Committing transaction: {}", transaction_id);
        authorized
            .session()
            .post_json(
                "commit",
                &json!({ "Transactionid": transaction_id }),
                &json_headers(authorized.token()),
            )
            .await
            .and_then(|reply| reply.error_for_status("Commit"))
            .inspect_err(|e| error!("Commit failed: {}", e))?;

        info!("Transaction committed successfully");
        Ok(committed_status(transaction_id))
    }

    /// Fetch the export result; failures degrade to `{status: "unknown", error}`
    pub async fn get_export_result(&self, authorized: &AuthorizedSession, transaction_id: &str) -> Value {
        debug!("Getting export result for transaction: {}", transaction_id);
        let outcome = async {
            authorized
                .session()
                .get(
                    "GetExportResult",
                    &[("Transactionid", transaction_id)],
                    &[(CSRF_HEADER, authorized.token())],
                )
                .await?
                .error_for_status("GetExportResult")?
                .json()
        }
        .await;

        match outcome {
            Ok(result) => {
                info!("Export result retrieved successfully");
                result
            }
            Err(e) => {
                warn!("Failed to get export result: {}", e);
                unknown_export_result(&e.to_string())
            }
        }
    }

    /// Fetch platform messages on a dedicated session; failures yield an empty list
    pub async fn get_messages(&self, transaction_id: &str) -> Vec<Value> {
        debug!("Getting messages for transaction: {}", transaction_id);
        let outcome = async {
            let authorized = self.provider.acquire().await?;
            let reply = authorized
                .session()
                .get(
                    "Message",
                    &[("Transactionid", transaction_id)],
                    &[(CSRF_HEADER, authorized.token())],
                )
                .await?
                .error_for_status("Message")?;
            Ok::<_, WriteError>(extract_messages(reply.json()?))
        }
        .await;

        match outcome {
            Ok(messages) => {
                info!("Retrieved {} messages", messages.len());
                messages
            }
            Err(e) => {
                warn!("Failed to get messages: {}", e);
                Vec::new()
            }
        }
    }

    /// Export result plus messages for a transaction, on fresh sessions
    pub async fn get_status(&self, transaction_id: &str) -> Result<WriteStatus> {
        info!("Status check requested for transaction: {}", transaction_id);
        let export_result = {
            let authorized = self.provider.acquire().await?;
            self.get_export_result(&authorized, transaction_id).await
        };
        let messages = self.get_messages(transaction_id).await;

        let status = if is_degraded(&export_result) { "unknown" } else { "completed" };

        Ok(WriteStatus {
            transaction_id: transaction_id.to_string(),
            status: status.to_string(),
            export_result,
            messages,
            checked_at: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        })
    }
}

fn json_headers(token: &str) -> [(&str, &str); 2] {
    [("Content-Type", "application/json"), (CSRF_HEADER, token)]
}

/// `{status: "committed", transaction_id}`
pub fn committed_status(transaction_id: &str) -> Value {
    json!({ "status": "committed", "transaction_id": transaction_id })
}

pub fn unknown_export_result(detail: &str) -> Value {
    json!({ "status": "unknown", "error": detail })
}

fn is_degraded(export_result: &Value) -> bool {
    export_result.get("status").and_then(Value::as_str) == Some("unknown")
        && export_result.get("error").is_some()
}

/// Read `d.TransactionID` from an OData response
fn parse_transaction_id(body: &Value) -> Result<String> {
    let id = body
        .get("d")
        .and_then(|d| d.get("TransactionID"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WriteError::Protocol("Transaction ID not found in response".to_string()))?;

    if id.len() > MAX_TRANSACTION_ID_LEN {
        return Err(WriteError::Protocol(format!(
            "Transaction ID '{}' exceeds {} characters",
            id, MAX_TRANSACTION_ID_LEN
        )));
    }
    Ok(id.to_string())
}

/// Accept either a bare array or an OData `{"d": {"results": [...]}}` envelope
fn extract_messages(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("d") {
            Some(Value::Object(mut d)) => match d.remove("results") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
