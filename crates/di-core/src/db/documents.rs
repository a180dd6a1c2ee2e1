use tracing::{debug, instrument};

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::model::{PersistedDocument, UpsertOutcome};

db_error!(DocumentStorageError {});

const UPSERT_SQL: &str = "INSERT INTO intake.processed_documents (
    submission_id,
    request_id,
    document_type_code,
    blob_url,
    blob_container,
    blob_path,
    file_name,
    content_type,
    size_bytes,
    status,
    uploaded_at,
    retention_until
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (request_id, document_type_code) DO UPDATE SET
    submission_id = EXCLUDED.submission_id,
    blob_url = EXCLUDED.blob_url,
    blob_container = EXCLUDED.blob_container,
    blob_path = EXCLUDED.blob_path,
    file_name = EXCLUDED.file_name,
    content_type = EXCLUDED.content_type,
    size_bytes = EXCLUDED.size_bytes,
    status = EXCLUDED.status,
    uploaded_at = EXCLUDED.uploaded_at,
    retention_until = EXCLUDED.retention_until,
    updated_at = NOW()
RETURNING (xmax = 0) AS inserted;";

/// Insert or overwrite the processed-document row for (request_id, document_type_code).
#[instrument(skip(pool, row), fields(request_id = row.request_id, code = %row.document_type_code))]
pub async fn upsert_processed_document(
    pool: &PgPool,
    row: &PersistedDocument,
) -> Result<UpsertOutcome, DocumentStorageError> {
    let client = pool.get().await?;
    let result = client
        .timed_query_one(
            UPSERT_SQL,
            &[
                &row.submission_id,
                &row.request_id,
                &row.document_type_code,
                &row.blob_url,
                &row.blob_container,
                &row.blob_path,
                &row.file_name,
                &row.content_type,
                &row.size_bytes,
                &row.status,
                &row.uploaded_at,
                &row.retention_until,
            ],
            "upsert_processed_document",
        )
        .await?;

    let inserted: bool = result.try_get("inserted")?;
    let outcome = if inserted {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::Updated
    };
    debug!(?outcome, "processed document stored");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keys_on_request_and_type() {
        assert!(UPSERT_SQL.contains("ON CONFLICT (request_id, document_type_code) DO UPDATE"));
        let placeholders = (1..=12).filter(|i| UPSERT_SQL.contains(&format!("${i}"))).count();
        assert_eq!(placeholders, 12);
    }
}
