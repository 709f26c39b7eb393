//! Segment records handed to the write path
//!
//! Input rows arrive loosely typed (`PRDID`, `XYZ_Segment`, optional `LOCID`
//! and period columns). They are converted once into [`SegmentRecord`]s and
//! every malformed row is reported in a single validation error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WriteError};

/// Volatility segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    X,
    Y,
    Z,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::X => "X",
            Segment::Y => "Y",
            Segment::Z => "Z",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = WriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "X" => Ok(Segment::X),
            "Y" => Ok(Segment::Y),
            "Z" => Ok(Segment::Z),
            other => Err(WriteError::validation(format!(
                "invalid segment value '{}', must be X, Y or Z",
                other
            ))),
        }
    }
}

/// One product's segment assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub product_id: String,
    pub segment: Segment,
    pub location_id: Option<String>,
    pub period_timestamp: Option<String>,
}

impl SegmentRecord {
    pub fn new(product_id: impl Into<String>, segment: Segment) -> Self {
        Self {
            product_id: product_id.into(),
            segment,
            location_id: None,
            period_timestamp: None,
        }
    }

    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period_timestamp = Some(period.into());
        self
    }
}

/// Input row as produced by the analysis step or supplied by hand
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSegmentRow {
    #[serde(rename = "PRDID", default)]
    pub product_id: Option<Value>,
    #[serde(rename = "XYZ_Segment", default)]
    pub segment: Option<Value>,
    #[serde(rename = "LOCID", default)]
    pub location_id: Option<Value>,
    /// Remaining columns, one of which may be the period field
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Convert raw rows into typed records, collecting every problem found
pub fn validate_rows(rows: Vec<RawSegmentRow>, period_field: &str) -> Result<Vec<SegmentRecord>> {
    if rows.is_empty() {
        return Err(WriteError::validation("no segment records supplied"));
    }

    let mut records = Vec::with_capacity(rows.len());
    let mut problems = Vec::new();

    for (idx, row) in rows.into_iter().enumerate() {
        let row_no = idx + 1;

        let product_id = match row.product_id.as_ref().map(identifier_text) {
            Some(Ok(id)) if !id.is_empty() => Some(id),
            Some(Err(other)) => {
                problems.push(format!(
                    "row {}: PRDID must be a string or number, got {}",
                    row_no, other
                ));
                None
            }
            _ => {
                problems.push(format!("row {}: missing PRDID", row_no));
                None
            }
        };

        let segment = match &row.segment {
            Some(Value::String(raw)) => match raw.parse::<Segment>() {
                Ok(segment) => Some(segment),
                Err(_) => {
                    problems.push(format!(
                        "row {}: invalid segment '{}', must be X, Y or Z",
                        row_no, raw
                    ));
                    None
                }
            },
            None | Some(Value::Null) => {
                problems.push(format!("row {}: missing XYZ_Segment", row_no));
                None
            }
            Some(other) => {
                problems.push(format!(
                    "row {}: XYZ_Segment must be a string, got {}",
                    row_no, other
                ));
                None
            }
        };

        let period_timestamp = match row.extra.get(period_field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                problems.push(format!(
                    "row {}: {} must be a string, got {}",
                    row_no, period_field, other
                ));
                None
            }
        };

        let location_id = match row.location_id.as_ref().map(identifier_text) {
            Some(Ok(loc)) if !loc.is_empty() => Some(loc),
            Some(Err(other)) => {
                problems.push(format!(
                    "row {}: LOCID must be a string or number, got {}",
                    row_no, other
                ));
                None
            }
            _ => None,
        };

        if let (Some(product_id), Some(segment)) = (product_id, segment) {
            records.push(SegmentRecord {
                product_id,
                segment,
                location_id,
                period_timestamp,
            });
        }
    }

    if !problems.is_empty() {
        return Err(WriteError::Validation(problems));
    }

    Ok(records)
}

/// Trimmed text of an id column; numbers are accepted as their decimal form
fn identifier_text(value: &Value) -> std::result::Result<String, &Value> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(other),
    }
}

/// Check already-typed records before anything is sent
pub fn validate_records(records: &[SegmentRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(WriteError::validation("no segment records supplied"));
    }

    let problems: Vec<String> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.product_id.trim().is_empty())
        .map(|(idx, _)| format!("row {}: missing PRDID", idx + 1))
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(WriteError::Validation(problems))
    }
}

/// Number of records per segment
pub fn segment_counts(records: &[SegmentRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.segment.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}
