use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

/// Intake priority. Lower rank is claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
pub enum Priority {
    High,
    Medium,
    Normal,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Normal => 3,
        }
    }

    /// Unknown or missing labels rank as `Normal`.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("High") => Priority::High,
            Some("Medium") => Priority::Medium,
            _ => Priority::Normal,
        }
    }
}

/// One inbound intake unit (`intake.submissions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub request_id: i64,
    pub priority: Priority,
    pub received_at: DateTime<Utc>,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
}

impl Submission {
    pub fn new(id: i64, request_id: i64, priority: Priority, received_at: DateTime<Utc>) -> Self {
        Self {
            id,
            request_id,
            priority,
            received_at,
            claimed: false,
            claimed_at: None,
            claimed_by: None,
        }
    }
}

/// Raw input file belonging to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub container: String,
    pub path: String,
    pub content_type: Option<String>,
}

/// Location of an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub url: String,
    pub container: String,
    pub path: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

/// Value written into a customer column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

/// Customer column -> value, where `None` writes NULL.
pub type CustomerFieldUpdate = BTreeMap<String, Option<FieldValue>>;

/// Final OCR status written onto the customer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerStatus {
    Success,
    Failed,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Success => "SUCCESS",
            CustomerStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid customer status: {0} (expected SUCCESS or FAILED)")]
pub struct InvalidStatus(pub String);

impl std::str::FromStr for CustomerStatus {
    type Err = InvalidStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SUCCESS" => Ok(CustomerStatus::Success),
            "FAILED" => Ok(CustomerStatus::Failed),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

/// One row of `intake.processed_documents`, keyed by (request_id, document_type_code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub submission_id: i64,
    pub request_id: i64,
    pub document_type_code: String,
    pub blob_url: String,
    pub blob_container: String,
    pub blob_path: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: String,
    pub uploaded_at: DateTime<Utc>,
    pub retention_until: Option<DateTime<Utc>>,
}

/// Whether an upsert touched an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A rule failure recorded by the customer validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub rule: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ranks_high_first() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Normal.rank());
    }

    #[test]
    fn unknown_priority_labels_rank_as_normal() {
        assert_eq!(Priority::from_label(Some("High")), Priority::High);
        assert_eq!(Priority::from_label(Some(" Medium ")), Priority::Medium);
        assert_eq!(Priority::from_label(Some("urgent")), Priority::Normal);
        assert_eq!(Priority::from_label(None), Priority::Normal);
    }

    #[test]
    fn status_parse_rejects_other_values() {
        assert_eq!("SUCCESS".parse::<CustomerStatus>(), Ok(CustomerStatus::Success));
        assert_eq!("FAILED".parse::<CustomerStatus>(), Ok(CustomerStatus::Failed));
        let err = "PENDING".parse::<CustomerStatus>().unwrap_err();
        assert!(err.to_string().contains("PENDING"));
        assert!("success".parse::<CustomerStatus>().is_err());
    }

    #[test]
    fn field_value_deserializes_untagged() {
        let text: FieldValue = serde_json::from_str("\"UAE\"").unwrap();
        assert_eq!(text, FieldValue::Text("UAE".into()));
        let flag: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(flag, FieldValue::Bool(true));
    }
}
