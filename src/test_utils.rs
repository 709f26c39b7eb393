//! Scripted in-memory planning platform for tests
//!
//! Implements [`PlanningTransport`], records every call, and tracks how many
//! sessions are open so tests can assert nothing leaks.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, WriteError};
use crate::transport::{HttpReply, PlanningSession, PlanningTransport};

pub const TOKEN: &str = "TOKEN-123";
pub const SERVER_TX: &str = "SRVTX00000000000000000000000001";
pub const PARALLEL_TX: &str = "PARTX00000000000000000000000001";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub token: Option<String>,
    pub body: Option<Value>,
}

/// Behaviour knobs for the fake platform
#[derive(Debug, Clone)]
pub struct Script {
    /// Status returned by the token fetch
    pub token_status: u16,
    /// Token header returned by the fetch, None omits the header
    pub token: Option<String>,
    pub transaction_id: Option<String>,
    pub parallel_transaction_id: Option<String>,
    /// A Trans POST containing any of these products is rejected
    pub fail_products: HashSet<String>,
    pub commit_status: u16,
    pub export_status: u16,
    pub export_timeout: bool,
    pub messages_status: u16,
    pub messages_body: Value,
    /// Delay applied to every Trans POST
    pub trans_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            token_status: 200,
            token: Some(TOKEN.to_string()),
            transaction_id: Some(SERVER_TX.to_string()),
            parallel_transaction_id: Some(PARALLEL_TX.to_string()),
            fail_products: HashSet::new(),
            commit_status: 200,
            export_status: 200,
            export_timeout: false,
            messages_status: 200,
            messages_body: json!([{"Transactionid": SERVER_TX, "MsgType": "I", "Message": "ok"}]),
            trans_delay: None,
        }
    }
}

#[derive(Default)]
struct State {
    calls: Mutex<Vec<RecordedCall>>,
    open: AtomicUsize,
    opened_total: AtomicUsize,
    max_open: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Clone)]
pub struct MockPlatform {
    script: Arc<Script>,
    state: Arc<State>,
}

impl MockPlatform {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            state: Arc::new(State::default()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    /// Bodies of every Trans POST in arrival order
    pub fn trans_bodies(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.path.ends_with("Trans"))
            .filter_map(|c| c.body)
            .collect()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.opened_total.load(Ordering::SeqCst)
    }

    pub fn max_open_sessions(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> Arc<dyn PlanningTransport> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl PlanningTransport for MockPlatform {
    async fn open_session(&self) -> Result<Box<dyn PlanningSession>> {
        let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);
        self.state.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            script: Arc::clone(&self.script),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    script: Arc<Script>,
    state: Arc<State>,
}

impl MockSession {
    fn record(&self, method: &'static str, path: &str, query: &[(&str, &str)], headers: &[(&str, &str)], body: Option<&Value>) {
        let token = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("X-CSRF-Token"))
            .map(|(_, value)| value.to_string());
        self.state.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            token,
            body: body.cloned(),
        });
    }

    fn transaction_reply(id: &Option<String>) -> HttpReply {
        match id {
            Some(id) => HttpReply::new(200, json!({"d": {"TransactionID": id}}).to_string()),
            None => HttpReply::new(200, json!({"d": {}}).to_string()),
        }
    }

    async fn accept_batch(&self, body: &Value) -> HttpReply {
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.script.trans_delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = body
            .as_object()
            .and_then(|obj| obj.iter().find(|(k, _)| k.starts_with("Nav")))
            .and_then(|(_, rows)| rows.as_array())
            .map(|rows| {
                rows.iter().any(|row| {
                    row["PRDID"]
                        .as_str()
                        .map(|p| self.script.fail_products.contains(p))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if rejected {
            HttpReply::new(500, "batch rejected by platform")
        } else {
            HttpReply::new(201, "")
        }
    }
}

#[async_trait]
impl PlanningSession for MockSession {
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpReply> {
        self.record("GET", path, query, headers, None);

        match path {
            "" => {
                let mut reply = HttpReply::new(self.script.token_status, "");
                if let Some(token) = &self.script.token {
                    reply = reply.with_header("X-CSRF-Token", token);
                }
                Ok(reply)
            }
            "getTransactionID" => Ok(Self::transaction_reply(&self.script.transaction_id)),
            "GetExportResult" => {
                if self.script.export_timeout {
                    return Err(WriteError::transport("request to GetExportResult timed out"));
                }
                Ok(HttpReply::new(
                    self.script.export_status,
                    json!({"d": {"ImportedRecords": 42, "RejectedRecords": 0}}).to_string(),
                ))
            }
            "Message" => Ok(HttpReply::new(
                self.script.messages_status,
                self.script.messages_body.to_string(),
            )),
            _ => Ok(HttpReply::new(404, "not found")),
        }
    }

    async fn post_json(&self, path: &str, body: &Value, headers: &[(&str, &str)]) -> Result<HttpReply> {
        self.record("POST", path, &[], headers, Some(body));

        match path {
            "InitiateParallelProcess" => Ok(Self::transaction_reply(&self.script.parallel_transaction_id)),
            "commit" => Ok(HttpReply::new(self.script.commit_status, "")),
            p if p.ends_with("Trans") => Ok(self.accept_batch(body).await),
            _ => Ok(HttpReply::new(404, "not found")),
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}
