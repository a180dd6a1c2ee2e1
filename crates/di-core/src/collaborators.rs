//! Contracts for the external systems the pipeline drives.
//!
//! Each stage of the coordinator talks to exactly one of these. Implementations
//! report failures as [`ClientError`]; the coordinator turns them into stage
//! failures for the submission at hand.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{
    BlobRef, CustomerFieldUpdate, CustomerStatus, PersistedDocument, SourceRef, Submission,
    UpsertOutcome, ValidationFailure,
};
use crate::notify::{FailureNotification, ValidationNotification};

pub type ClientError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where an uploaded artifact should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDestination {
    pub container: String,
    pub path: String,
    pub file_name: String,
    pub content_type: String,
}

/// A source file downloaded into the scratch area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSource {
    pub path: PathBuf,
    pub content_type: Option<String>,
}

/// The merged, paginated document every later stage works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[async_trait]
pub trait JobSource: Send + Sync {
    /// Atomically claim the next pending submission for `worker_id`.
    async fn claim_next_submission(&self, worker_id: &str)
    -> Result<Option<Submission>, ClientError>;

    /// Source files of a submission in upload order.
    async fn list_pending_sources(
        &self,
        submission_id: i64,
        request_id: i64,
    ) -> Result<Vec<SourceRef>, ClientError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, container: &str, path: &str) -> Result<Vec<u8>, ClientError>;

    async fn store(&self, bytes: Vec<u8>, destination: &BlobDestination)
    -> Result<BlobRef, ClientError>;
}

#[async_trait]
pub trait DocumentAssembler: Send + Sync {
    /// Merge the downloaded sources, in order, into one paginated document.
    async fn merge(&self, sources: &[LocalSource]) -> Result<MergedDocument, ClientError>;

    /// Build a new document from the given 0-based pages, in the given order.
    async fn extract_pages(
        &self,
        merged: &MergedDocument,
        indices: &[usize],
    ) -> Result<Vec<u8>, ClientError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Page text keyed by 1-based page number.
    async fn analyze(&self, document: &[u8]) -> Result<BTreeMap<u32, String>, ClientError>;
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Raw classifier response; parsed by [`crate::classification::parse_classified_pages`].
    async fn classify(&self, page_text: &BTreeMap<u32, String>) -> Result<Value, ClientError>;
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Insert or overwrite the row keyed by (request_id, document_type_code).
    async fn upsert_document(&self, row: &PersistedDocument) -> Result<UpsertOutcome, ClientError>;

    /// Partial update of the customer record; `None` writes NULL.
    async fn update_customer_fields(
        &self,
        request_id: i64,
        updates: &CustomerFieldUpdate,
    ) -> Result<u64, ClientError>;

    async fn set_status(&self, request_id: i64, status: CustomerStatus) -> Result<(), ClientError>;

    /// Run the customer checks and return the failures recorded for the request.
    async fn run_customer_validations(
        &self,
        request_id: i64,
    ) -> Result<Vec<ValidationFailure>, ClientError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_failure(&self, notification: &FailureNotification) -> Result<(), ClientError>;

    async fn notify_validation(
        &self,
        notification: &ValidationNotification,
    ) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_object_safe() {
        fn _assert_jobs(_: &dyn JobSource) {}
        fn _assert_blobs(_: &dyn BlobStore) {}
        fn _assert_assembler(_: &dyn DocumentAssembler) {}
        fn _assert_text(_: &dyn TextExtractor) {}
        fn _assert_classifier(_: &dyn Classifier) {}
        fn _assert_store(_: &dyn RelationalStore) {}
        fn _assert_sink(_: &dyn NotificationSink) {}
    }
}
