//! Transaction payload construction
//!
//! Shapes segment records into the nested payload accepted by the
//! `<PlanningArea>Trans` entity set:
//!
//! ```text
//! {
//!   "Transactionid": "...",
//!   "AggregationLevelFieldsString": "LOCID,PRDID,XYZID,PERIODID3_TSTAMP",
//!   "NavSAP1": [ { "PRDID": "...", "XYZID": "X", ... } ],
//!   "VersionID": "...",     (optional)
//!   "ScenarioID": "...",    (optional)
//!   "DoCommit": true        (only when committing in the same call)
//! }
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, WriteError};
use crate::record::SegmentRecord;
use crate::target::WriteTarget;

pub const PRODUCT_FIELD: &str = "PRDID";
pub const LOCATION_FIELD: &str = "LOCID";

/// Format used when a period has to be filled in
pub const PERIOD_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One platform-shaped detail record
pub type PayloadRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPayload {
    pub transaction_id: String,
    pub aggregation_fields: Vec<String>,
    pub records: Vec<PayloadRow>,
    pub version_id: Option<String>,
    pub scenario_id: Option<String>,
    pub commit_flag: bool,
    /// Key the records are nested under, e.g. `NavSAP1`
    pub navigation_property: String,
    /// Entity set the payload is posted to, e.g. `SAP1Trans`
    pub entity_set: String,
}

impl TransactionPayload {
    /// Build a payload, filling missing periods with the current UTC time
    pub fn build(
        records: &[SegmentRecord],
        target: &WriteTarget,
        transaction_id: &str,
        commit_flag: bool,
    ) -> Result<Self> {
        Self::build_at(records, target, transaction_id, commit_flag, Utc::now())
    }

    /// Build a payload with an explicit fill-in time for missing periods
    pub fn build_at(
        records: &[SegmentRecord],
        target: &WriteTarget,
        transaction_id: &str,
        commit_flag: bool,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(WriteError::validation("cannot build a payload without records"));
        }

        debug!("Preparing payload for {} records", records.len());

        let has_location = records.iter().any(|r| r.location_id.is_some());
        let null_flag = target.null_flag_field();
        let fill_period = now.format(PERIOD_FORMAT).to_string();

        let mut aggregation_fields = Vec::with_capacity(5);
        if has_location {
            aggregation_fields.push(LOCATION_FIELD.to_string());
        }
        aggregation_fields.push(PRODUCT_FIELD.to_string());
        aggregation_fields.push(target.key_figure_name.clone());
        if target.null_handling_enabled {
            aggregation_fields.push(null_flag.clone());
        }
        aggregation_fields.push(target.period_field_name.clone());

        let rows = records
            .iter()
            .map(|record| {
                let mut row = PayloadRow::new();
                row.insert(PRODUCT_FIELD.to_string(), Value::String(record.product_id.clone()));
                row.insert(
                    target.key_figure_name.clone(),
                    Value::String(record.segment.as_str().to_string()),
                );
                if target.null_handling_enabled {
                    row.insert(null_flag.clone(), Value::Bool(false));
                }
                if let Some(location) = &record.location_id {
                    row.insert(LOCATION_FIELD.to_string(), Value::String(location.clone()));
                }
                let period = match record.period_timestamp.as_deref() {
                    Some(p) if is_well_formed_period(p) => p.to_string(),
                    _ => fill_period.clone(),
                };
                row.insert(target.period_field_name.clone(), Value::String(period));
                row
            })
            .collect::<Vec<_>>();

        let payload = Self {
            transaction_id: transaction_id.to_string(),
            aggregation_fields,
            records: rows,
            version_id: target.version_id.clone(),
            scenario_id: target.scenario_id.clone(),
            commit_flag,
            navigation_property: target.navigation_property(),
            entity_set: target.transaction_entity_set(),
        };

        debug!(
            "Payload prepared with {} records using {}",
            payload.records.len(),
            payload.navigation_property
        );
        Ok(payload)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Comma-joined aggregation level descriptor
    pub fn aggregation_fields_string(&self) -> String {
        self.aggregation_fields.join(",")
    }

    /// Wire representation posted to the entity set
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("Transactionid".to_string(), Value::String(self.transaction_id.clone()));
        body.insert(
            "AggregationLevelFieldsString".to_string(),
            Value::String(self.aggregation_fields_string()),
        );
        body.insert(
            self.navigation_property.clone(),
            Value::Array(self.records.iter().cloned().map(Value::Object).collect()),
        );
        if let Some(version) = &self.version_id {
            body.insert("VersionID".to_string(), Value::String(version.clone()));
        }
        if let Some(scenario) = &self.scenario_id {
            body.insert("ScenarioID".to_string(), Value::String(scenario.clone()));
        }
        if self.commit_flag {
            body.insert("DoCommit".to_string(), Value::Bool(true));
        }
        Value::Object(body)
    }
}

/// `YYYY-MM-DDTHH:MM:SS`, with optional fractional seconds or RFC 3339 offset
pub fn is_well_formed_period(value: &str) -> bool {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}
