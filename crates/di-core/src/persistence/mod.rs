//! Document and customer writes on top of a [`RelationalStore`].

mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::collaborators::{ClientError, RelationalStore};
use crate::config::{DocumentType, IntakeConfig};
use crate::date::parse_date;
use crate::model::{
    BlobRef, CustomerFieldUpdate, CustomerStatus, FieldValue, InvalidStatus, PersistedDocument,
    Submission, UpsertOutcome, ValidationFailure,
};

pub use memory::InMemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),
    #[error("relational store error: {0}")]
    Store(#[source] ClientError),
}

/// Build the `processed_documents` row for an uploaded final document.
pub fn build_document_row(
    submission: &Submission,
    document_type: &DocumentType,
    blob: &BlobRef,
    config: &IntakeConfig,
    uploaded_at: DateTime<Utc>,
) -> PersistedDocument {
    let retention_until = config
        .retention_days
        .filter(|days| *days > 0)
        .map(|days| uploaded_at + Duration::days(i64::from(days)));

    PersistedDocument {
        submission_id: submission.id,
        request_id: submission.request_id,
        document_type_code: document_type.code.clone(),
        blob_url: blob.url.clone(),
        blob_container: blob.container.clone(),
        blob_path: blob.path.clone(),
        file_name: blob.file_name.clone(),
        content_type: blob.content_type.clone(),
        size_bytes: i64::try_from(blob.size).unwrap_or(i64::MAX),
        status: config.document_status.clone(),
        uploaded_at,
        retention_until,
    }
}

/// Map resolved values onto columns. Configured date columns are parsed into
/// dates; anything unparseable becomes NULL.
pub fn normalize_updates(
    updates: &BTreeMap<String, FieldValue>,
    config: &IntakeConfig,
) -> CustomerFieldUpdate {
    updates
        .iter()
        .map(|(column, value)| {
            let normalized = if config.is_date_field(column) {
                match value {
                    FieldValue::Date(date) => Some(FieldValue::Date(*date)),
                    FieldValue::Text(raw) => parse_date(raw).map(FieldValue::Date),
                    FieldValue::Bool(_) => None,
                }
            } else {
                Some(value.clone())
            };
            if normalized.is_none() {
                warn!(column = %column, value = %value, "unparseable date value; writing NULL");
            }
            (column.clone(), normalized)
        })
        .collect()
}

#[derive(Clone)]
pub struct DocumentPersistence {
    store: Arc<dyn RelationalStore>,
}

impl DocumentPersistence {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, row), fields(request_id = row.request_id, document_type = %row.document_type_code))]
    pub async fn upsert_document(
        &self,
        row: &PersistedDocument,
    ) -> Result<UpsertOutcome, PersistenceError> {
        let outcome = self
            .store
            .upsert_document(row)
            .await
            .map_err(PersistenceError::Store)?;
        info!(?outcome, "persisted document row");
        Ok(outcome)
    }

    #[instrument(skip(self, updates, config))]
    pub async fn update_customer_fields(
        &self,
        request_id: i64,
        updates: &BTreeMap<String, FieldValue>,
        config: &IntakeConfig,
    ) -> Result<u64, PersistenceError> {
        if updates.is_empty() {
            info!("no customer fields to update");
            return Ok(0);
        }
        let normalized = normalize_updates(updates, config);
        self.store
            .update_customer_fields(request_id, &normalized)
            .await
            .map_err(PersistenceError::Store)
    }

    /// Accepts only `SUCCESS` or `FAILED`.
    pub async fn set_status_str(&self, request_id: i64, status: &str) -> Result<(), PersistenceError> {
        let status = status.parse::<CustomerStatus>()?;
        self.set_status(request_id, status).await
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        request_id: i64,
        status: CustomerStatus,
    ) -> Result<(), PersistenceError> {
        self.store
            .set_status(request_id, status)
            .await
            .map_err(PersistenceError::Store)?;
        info!(status = status.as_str(), "customer status updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_customer_validations(
        &self,
        request_id: i64,
    ) -> Result<Vec<ValidationFailure>, PersistenceError> {
        self.store
            .run_customer_validations(request_id)
            .await
            .map_err(PersistenceError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::config::tests::SAMPLE_CONFIG;
    use crate::model::Priority;

    fn config() -> IntakeConfig {
        IntakeConfig::from_json_str(SAMPLE_CONFIG).unwrap()
    }

    fn blob(path: &str, size: u64) -> BlobRef {
        BlobRef {
            url: format!("https://blobs.example/intake/{path}"),
            container: "intake".into(),
            path: path.into(),
            file_name: "emirates_id.pdf".into(),
            content_type: "application/pdf".into(),
            size,
        }
    }

    #[test]
    fn document_row_carries_retention_and_status() {
        let uploaded = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let submission = Submission::new(7, 70, Priority::High, uploaded);
        let config = config();
        let doc_type = config.document_type("Emirates ID").unwrap();

        let row = build_document_row(&submission, doc_type, &blob("p/processed_document/e.pdf", 42), &config, uploaded);
        assert_eq!(row.document_type_code, "EID");
        assert_eq!(row.size_bytes, 42);
        assert_eq!(row.status, "PENDING");
        assert_eq!(row.retention_until, Some(uploaded + Duration::days(30)));

        let mut no_retention = config.clone();
        no_retention.retention_days = None;
        let row = build_document_row(&submission, doc_type, &blob("x", 1), &no_retention, uploaded);
        assert!(row.retention_until.is_none());
    }

    #[test]
    fn normalizes_only_configured_date_columns() {
        let mut updates = BTreeMap::new();
        updates.insert("EmiratesIDExpiryDate".to_string(), FieldValue::from("25/12/2024"));
        updates.insert("FirstName".to_string(), FieldValue::from("25/12/2024"));

        let normalized = normalize_updates(&updates, &config());
        assert_eq!(
            normalized.get("EmiratesIDExpiryDate"),
            Some(&Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 12, 25).unwrap())))
        );
        assert_eq!(normalized.get("FirstName"), Some(&Some(FieldValue::from("25/12/2024"))));
    }

    #[test]
    fn unparseable_dates_become_null() {
        let mut updates = BTreeMap::new();
        updates.insert("EmiratesIDExpiryDate".to_string(), FieldValue::from("N/A"));
        let normalized = normalize_updates(&updates, &config());
        assert_eq!(normalized.get("EmiratesIDExpiryDate"), Some(&None));
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row_with_latest_values() {
        let store = Arc::new(InMemoryStore::default());
        let persistence = DocumentPersistence::new(store.clone());
        let config = config();
        let uploaded = Utc::now();
        let submission = Submission::new(1, 500, Priority::Normal, uploaded);
        let doc_type = config.document_type("Driving License").unwrap();

        let first = build_document_row(&submission, doc_type, &blob("a.pdf", 10), &config, uploaded);
        let second = build_document_row(&submission, doc_type, &blob("b.pdf", 20), &config, uploaded);

        assert_eq!(persistence.upsert_document(&first).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(persistence.upsert_document(&second).await.unwrap(), UpsertOutcome::Updated);

        let rows = store.documents();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].blob_path, "b.pdf");
        assert_eq!(rows[0].size_bytes, 20);
    }

    #[tokio::test]
    async fn status_strings_other_than_success_or_failed_are_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let persistence = DocumentPersistence::new(store.clone());

        persistence.set_status_str(9, "SUCCESS").await.unwrap();
        assert_eq!(store.status(9), Some(CustomerStatus::Success));

        let err = persistence.set_status_str(9, "DONE").await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidStatus(_)));
        assert_eq!(store.status(9), Some(CustomerStatus::Success));
    }

    #[tokio::test]
    async fn partial_update_touches_only_given_columns() {
        let store = Arc::new(InMemoryStore::default());
        let persistence = DocumentPersistence::new(store.clone());
        let config = config();

        let mut first = BTreeMap::new();
        first.insert("FirstName".to_string(), FieldValue::from("Aisha"));
        first.insert("LicenseNumber".to_string(), FieldValue::from("123"));
        persistence.update_customer_fields(3, &first, &config).await.unwrap();

        let mut second = BTreeMap::new();
        second.insert("LicenseNumber".to_string(), FieldValue::from("456"));
        persistence.update_customer_fields(3, &second, &config).await.unwrap();

        let customer = store.customer(3);
        assert_eq!(customer.get("FirstName"), Some(&Some(FieldValue::from("Aisha"))));
        assert_eq!(customer.get("LicenseNumber"), Some(&Some(FieldValue::from("456"))));
        assert_eq!(persistence.update_customer_fields(3, &BTreeMap::new(), &config).await.unwrap(), 0);
    }
}
