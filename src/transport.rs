//! HTTP transport for the planning platform write API
//!
//! The write path talks to the platform through two small traits:
//! [`PlanningTransport`] opens sessions, and a [`PlanningSession`] performs
//! GET/POST calls relative to the service root. [`ReqwestTransport`] is the
//! production implementation, one cookie-bearing `reqwest::Client` per
//! session so the anti-forgery token stays bound to its cookies.
//!
//! A session is released when it is dropped.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::WriteConfig;
use crate::error::{Result, WriteError};

/// Status, headers and body of a platform response
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Turn a non-2xx reply into a transport error carrying the body
    pub fn error_for_status(self, context: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(WriteError::http_status(context, self.status, self.body))
        }
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| WriteError::Protocol(format!("response is not valid JSON: {}", e)))
    }
}

/// One authenticated conversation with the platform
#[async_trait]
pub trait PlanningSession: Send + Sync {
    /// GET `path` relative to the service root (empty path = root)
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpReply>;

    /// POST a JSON body to `path` relative to the service root
    async fn post_json(&self, path: &str, body: &Value, headers: &[(&str, &str)]) -> Result<HttpReply>;
}

/// Factory for fresh sessions
#[async_trait]
pub trait PlanningTransport: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn PlanningSession>>;
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// reqwest-backed transport
pub struct ReqwestTransport {
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
    proxy: Option<String>,
}

impl ReqwestTransport {
    pub fn new(config: &WriteConfig) -> Result<Self> {
        if let Some(proxy_url) = &config.proxy {
            reqwest::Proxy::all(proxy_url).map_err(|e| {
                WriteError::Configuration(format!("invalid proxy {}: {}", proxy_url, e))
            })?;
            info!("HTTP sessions configured with proxy: {}", proxy_url);
        }

        Ok(Self {
            base_url: config.base_url().to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            proxy: config.proxy.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PlanningTransport for ReqwestTransport {
    async fn open_session(&self) -> Result<Box<dyn PlanningSession>> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.timeout);

        if let Some(proxy_url) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                WriteError::Configuration(format!("invalid proxy {}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| WriteError::transport(format!("failed to create HTTP client: {}", e)))?;

        let id = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!("Opened session #{}", id);

        Ok(Box::new(ReqwestSession {
            id,
            client,
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }))
    }
}

struct ReqwestSession {
    id: u64,
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ReqwestSession {
    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn apply_headers(
        mut request: reqwest::RequestBuilder,
        headers: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request
    }

    async fn execute(&self, request: reqwest::RequestBuilder, url: &str) -> Result<HttpReply> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, url))?;

        debug!("Session #{} {} -> {}", self.id, url, status);
        Ok(HttpReply { status, headers, body })
    }
}

fn map_reqwest_error(e: reqwest::Error, url: &str) -> WriteError {
    if e.is_timeout() {
        WriteError::transport(format!("request to {} timed out", url))
    } else {
        WriteError::transport(format!("request to {} failed: {}", url, e))
    }
}

#[async_trait]
impl PlanningSession for ReqwestSession {
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpReply> {
        let url = self.url(path);
        let request = Self::apply_headers(self.client.get(&url).query(query), headers);
        self.execute(request, &url).await
    }

    async fn post_json(&self, path: &str, body: &Value, headers: &[(&str, &str)]) -> Result<HttpReply> {
        let url = self.url(path);
        let request = Self::apply_headers(self.client.post(&url).json(body), headers);
        self.execute(request, &url).await
    }
}

impl Drop for ReqwestSession {
    fn drop(&mut self) {
        debug!("Closed session #{}", self.id);
    }
}
