//! Core types: field values, source records, and delivery outcome reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A typed field value as retrieved from the data source
///
/// This is a closed set of the value kinds the encoder knows how to render.
/// Lookups against a [`SourceRecord`] are total: a missing key behaves like
/// an absent value and is rendered as padding, never raised as an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Free-form text
    Text(String),
    /// Signed integer
    Integer(i64),
    /// Floating-point / decimal number
    Float(f64),
    /// Boolean flag
    Bool(bool),
    /// Timestamp with timezone (rendered in UTC)
    Timestamp(DateTime<Utc>),
    /// Explicit null from the backing store
    Null,
}

impl FieldValue {
    /// Returns true if the value is of a numeric type
    ///
    /// Numeric values are right-aligned when padded to a fixed width.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Float(_))
    }

    /// Coerce the value to a number, if it has one
    ///
    /// Integers and floats convert directly; text is parsed (this is how
    /// decimal-typed columns arriving as strings are handled). Booleans,
    /// timestamps, and null have no numeric form.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            FieldValue::Bool(_) | FieldValue::Timestamp(_) | FieldValue::Null => None,
        }
    }

    /// The value's natural text representation
    ///
    /// Null renders as the empty string; timestamps render as
    /// `YYYY-MM-DD HH:MM:SS` in UTC.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    /// Convert a JSON value handed over by an arbitrary backing store
    ///
    /// Integral JSON numbers become `Integer`, other numbers `Float`.
    /// Arrays and objects have no field-level text form and map to their
    /// compact JSON rendering so a misconfigured source degrades visibly
    /// instead of panicking.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// One pending record retrieved from the data source
///
/// Immutable once retrieved; the coordinator encodes it, delivers the
/// resulting file, and then asks the source to mark `record_id` processed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable identifier used for mark-processed bookkeeping
    pub record_id: String,

    /// Field name to typed value mapping
    pub fields: HashMap<String, FieldValue>,
}

impl SourceRecord {
    /// Total field lookup: a missing key yields `None`, never an error
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Aggregate statistics reported by the data source
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceStatistics {
    /// Total number of records known to the source
    pub total: u64,
    /// Records not yet delivered
    pub unsent: u64,
    /// Records already delivered
    pub sent: u64,
    /// Timestamp of the oldest undelivered record, if any
    pub oldest_unsent: Option<DateTime<Utc>>,
    /// Timestamp of the newest record, if any
    pub newest: Option<DateTime<Utc>>,
}

/// Result of one file's upload-with-retry run
#[must_use]
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    /// The staged local file
    pub local_path: PathBuf,
    /// The remote destination name
    pub remote_name: String,
    /// Whether the upload was confirmed on the remote endpoint
    pub success: bool,
    /// Number of attempts made (1 = succeeded first try)
    pub attempts: u32,
    /// Last error message when the upload failed
    pub error: Option<String>,
}

/// Summary of one delivery cycle (tick)
#[must_use]
#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    /// Records fetched from the data source this cycle
    pub fetched: usize,
    /// Records that failed to encode and were skipped
    pub encode_failures: usize,
    /// Files confirmed uploaded
    pub uploaded: usize,
    /// Files whose upload attempts were exhausted
    pub upload_failures: usize,
    /// Records successfully marked processed
    pub marked: usize,
    /// Files archived out of staging
    pub archived: usize,
    /// Archived files deleted by retention cleanup (0 outside the hourly run)
    pub cleaned_up: usize,
}
