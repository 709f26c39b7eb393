//! Configuration module for the write-back service
//!
//! This module defines the settings for the planning platform write API
//! (endpoint, credentials, planning area, key figure) and the defaults used
//! by the batched and parallel write strategies.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::WriteError;

/// Write-back configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Base URL of the planning data write service
    /// (e.g., "https://tenant.example.com/sap/opu/odata/IBP/PLANNING_DATA_API_SRV")
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Planning area identifier (e.g., "SAP1", "YSAPIBP1")
    #[serde(default)]
    pub planning_area: String,
    /// Key figure receiving the segment letter
    #[serde(default = "default_key_figure")]
    pub key_figure: String,
    /// Set when the planning area has null-info handling switched on
    #[serde(default)]
    pub enable_null_handling: bool,
    #[serde(default = "default_period_field")]
    pub default_period_field: String,
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    #[serde(default = "default_max_workers")]
    pub default_max_workers: usize,
    #[serde(default = "default_max_workers_cap")]
    pub max_workers_cap: usize,
    /// Record count above which simple mode only warns
    #[serde(default = "default_simple_record_threshold")]
    pub simple_record_threshold: usize,
    /// Safety switch, writes are refused unless explicitly enabled
    #[serde(default)]
    pub enable_write_operations: bool,
    /// Optional proxy URL for HTTP requests (e.g., "http://proxy.example.com:8080")
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_key_figure() -> String {
    "XYZID".to_string()
}

fn default_period_field() -> String {
    "PERIODID3_TSTAMP".to_string()
}

fn default_batch_size() -> usize {
    5000
}

fn default_max_workers() -> usize {
    4
}

fn default_max_workers_cap() -> usize {
    10
}

fn default_simple_record_threshold() -> usize {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
            planning_area: String::new(),
            key_figure: default_key_figure(),
            enable_null_handling: false,
            default_period_field: default_period_field(),
            default_batch_size: default_batch_size(),
            default_max_workers: default_max_workers(),
            max_workers_cap: default_max_workers_cap(),
            simple_record_threshold: default_simple_record_threshold(),
            enable_write_operations: false,
            proxy: None,
            log_level: default_log_level(),
        }
    }
}

/// Which required settings are present
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfigStatus {
    pub configured: bool,
    pub api_url: bool,
    pub planning_area: bool,
    pub key_figure: bool,
    pub credentials: bool,
    pub write_operations_enabled: bool,
    pub message: String,
}

impl WriteConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: WriteConfig = serde_yaml::from_str(&content)
            .context("Failed to parse config YAML")?;

        Ok(config)
    }

    /// Service URL without trailing slash
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Report which required settings are configured
    pub fn validate(&self) -> ConfigStatus {
        let api_url = !self.api_url.trim().is_empty();
        let planning_area = !self.planning_area.trim().is_empty();
        let key_figure = !self.key_figure.trim().is_empty();
        let credentials = !self.username.is_empty() && !self.password.is_empty();
        let configured = api_url && planning_area && key_figure && credentials;

        ConfigStatus {
            configured,
            api_url,
            planning_area,
            key_figure,
            credentials,
            write_operations_enabled: self.enable_write_operations,
            message: if configured {
                "All settings configured".to_string()
            } else {
                "Missing required settings".to_string()
            },
        }
    }

    /// Refuse to write unless writes are enabled and the endpoint is fully configured
    pub fn ensure_writable(&self) -> Result<(), WriteError> {
        if !self.enable_write_operations {
            return Err(WriteError::Configuration(
                "write operations are disabled, set enable_write_operations: true".to_string(),
            ));
        }

        let status = self.validate();
        let missing: Vec<&str> = [
            (status.api_url, "api_url"),
            (status.planning_area, "planning_area"),
            (status.key_figure, "key_figure"),
            (status.credentials, "username/password"),
        ]
        .into_iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name)
        .collect();

        if !missing.is_empty() {
            return Err(WriteError::Configuration(format!(
                "missing settings: {}",
                missing.join(", ")
            )));
        }

        if self.default_batch_size == 0 {
            return Err(WriteError::Configuration(
                "default_batch_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Clamp a requested worker count to 1..=max_workers_cap
    pub fn clamp_workers(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_workers_cap.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writable_config() -> WriteConfig {
        WriteConfig {
            api_url: "https://ibp.example.com/api/".to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
            planning_area: "SAP1".to_string(),
            enable_write_operations: true,
            ..WriteConfig::default()
        }
    }

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
api_url: "https://ibp.example.com/sap/opu/odata/IBP/PLANNING_DATA_API_SRV/"
username: "user1"
password: "pass1"
planning_area: "YSAPIBP1"
enable_null_handling: true
enable_write_operations: true
default_batch_size: 2000
"#;

        let config: WriteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.planning_area, "YSAPIBP1");
        assert_eq!(config.key_figure, "XYZID");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.default_batch_size, 2000);
        assert_eq!(config.default_max_workers, 4);
        assert!(config.enable_null_handling);
        assert_eq!(
            config.base_url(),
            "https://ibp.example.com/sap/opu/odata/IBP/PLANNING_DATA_API_SRV"
        );
    }

    #[test]
    fn test_config_parsing_defaults() {
        let config: WriteConfig = serde_yaml::from_str("api_url: \"http://localhost\"").unwrap();
        assert!(!config.enable_write_operations);
        assert_eq!(config.default_period_field, "PERIODID3_TSTAMP");
        assert_eq!(config.simple_record_threshold, 5000);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_validate_reports_missing() {
        let config = WriteConfig {
            api_url: "http://localhost".to_string(),
            ..WriteConfig::default()
        };
        let status = config.validate();
        assert!(!status.configured);
        assert!(status.api_url);
        assert!(!status.planning_area);
        assert!(status.key_figure);
        assert!(!status.credentials);
        assert_eq!(status.message, "Missing required settings");
    }

    #[test]
    fn test_ensure_writable() {
        assert!(writable_config().ensure_writable().is_ok());

        let disabled = WriteConfig {
            enable_write_operations: false,
            ..writable_config()
        };
        let err = disabled.ensure_writable().unwrap_err();
        assert!(err.to_string().contains("disabled"));

        let no_area = WriteConfig {
            planning_area: String::new(),
            ..writable_config()
        };
        let err = no_area.ensure_writable().unwrap_err();
        assert!(err.to_string().contains("planning_area"));
    }

    #[test]
    fn test_clamp_workers() {
        let config = writable_config();
        assert_eq!(config.clamp_workers(0), 1);
        assert_eq!(config.clamp_workers(4), 4);
        assert_eq!(config.clamp_workers(64), 10);
    }
}
