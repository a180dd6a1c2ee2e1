use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::model::{Priority, SourceRef, Submission};

db_error!(SubmissionStorageError {
    #[error("failed to map submission row: {0}")]
    Mapping(String),
});

/// `ORDER BY` expression ranking `priority_level` the same way as [`Priority::rank`].
fn priority_rank_sql() -> String {
    let arms: String = [Priority::High, Priority::Medium]
        .iter()
        .map(|p| {
            let label: &str = p.as_ref();
            format!(" WHEN '{label}' THEN {}", p.rank())
        })
        .collect();
    format!(
        "CASE priority_level{arms} ELSE {} END",
        Priority::Normal.rank()
    )
}

fn claim_sql() -> String {
    format!(
        "UPDATE intake.submissions
SET
    is_processed = TRUE,
    processed_at = $2,
    claimed_by = $1
WHERE id = (
    SELECT id
    FROM intake.submissions
    WHERE is_processed = FALSE
      AND is_deleted = FALSE
    ORDER BY {}, received_at, id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
RETURNING id, request_id, priority_level, received_at, is_processed, processed_at, claimed_by;",
        priority_rank_sql()
    )
}

fn row_to_submission(row: &Row) -> Result<Submission, SubmissionStorageError> {
    let priority: Option<String> = row.try_get("priority_level")?;
    Ok(Submission {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        priority: Priority::from_label(priority.as_deref()),
        received_at: row.try_get("received_at")?,
        claimed: row.try_get("is_processed")?,
        claimed_at: row.try_get("processed_at")?,
        claimed_by: row.try_get("claimed_by")?,
    })
}

/// Mark the highest-ranked unprocessed submission as claimed by `worker_id`
/// and return it. Concurrent workers skip rows another transaction holds.
#[instrument(skip(pool))]
pub async fn claim_next_submission(
    pool: &PgPool,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Submission>, SubmissionStorageError> {
    let client = pool.get().await?;
    let sql = claim_sql();
    let row = client
        .timed_query_opt(&sql, &[&worker_id, &now], "claim_next_submission")
        .await?;
    row.map(|r| row_to_submission(&r)).transpose()
}

/// Pending source files of a submission, oldest upload first.
#[instrument(skip(pool))]
pub async fn list_pending_sources(
    pool: &PgPool,
    submission_id: i64,
    request_id: i64,
) -> Result<Vec<SourceRef>, SubmissionStorageError> {
    let client = pool.get().await?;
    let rows = client
        .timed_query(
            "SELECT blob_container, blob_path, content_type
             FROM intake.source_documents
             WHERE submission_id = $1
               AND request_id = $2
               AND ocr_status = 'PENDING'
               AND is_deleted = FALSE
             ORDER BY uploaded_at, id",
            &[&submission_id, &request_id],
            "list_pending_sources",
        )
        .await?;

    let sources = rows
        .iter()
        .map(|row| {
            let path: String = row.try_get("blob_path")?;
            if path.trim().is_empty() {
                return Err(SubmissionStorageError::Mapping(format!(
                    "empty blob path for submission {submission_id}"
                )));
            }
            Ok(SourceRef {
                container: row.try_get("blob_container")?,
                path,
                content_type: row.try_get("content_type")?,
            })
        })
        .collect::<Result<Vec<_>, SubmissionStorageError>>()?;

    debug!(count = sources.len(), "listed pending sources");
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_expression_matches_priority_rank() {
        assert_eq!(
            priority_rank_sql(),
            "CASE priority_level WHEN 'High' THEN 1 WHEN 'Medium' THEN 2 ELSE 3 END"
        );
    }

    #[test]
    fn claim_is_a_single_locked_update() {
        let sql = claim_sql();
        assert!(sql.starts_with("UPDATE intake.submissions"));
        assert!(sql.contains("FOR UPDATE SKIP LOCKED"));
        assert!(sql.contains("received_at, id"));
        assert!(sql.contains("RETURNING"));
    }
}
