use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const BOOTSTRAP: &str = "CREATE SCHEMA IF NOT EXISTS intake;
CREATE TABLE IF NOT EXISTS intake.schema_migrations (
    id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);";

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "submissions, source documents and processed documents",
        sql: r#"
CREATE TABLE IF NOT EXISTS intake.submissions (
    id BIGSERIAL PRIMARY KEY,
    request_id BIGINT NOT NULL,
    priority_level TEXT,
    received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_processed BOOLEAN NOT NULL DEFAULT FALSE,
    processed_at TIMESTAMPTZ,
    claimed_by TEXT,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_submissions_pending
    ON intake.submissions(received_at, id)
    WHERE is_processed = FALSE AND is_deleted = FALSE;

CREATE TABLE IF NOT EXISTS intake.source_documents (
    id BIGSERIAL PRIMARY KEY,
    submission_id BIGINT NOT NULL REFERENCES intake.submissions(id),
    request_id BIGINT NOT NULL,
    blob_container TEXT NOT NULL,
    blob_path TEXT NOT NULL,
    content_type TEXT,
    ocr_status TEXT NOT NULL DEFAULT 'PENDING',
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_source_documents_submission
    ON intake.source_documents(submission_id, request_id, uploaded_at, id);

CREATE TABLE IF NOT EXISTS intake.processed_documents (
    id BIGSERIAL PRIMARY KEY,
    submission_id BIGINT NOT NULL,
    request_id BIGINT NOT NULL,
    document_type_code TEXT NOT NULL,
    blob_url TEXT NOT NULL,
    blob_container TEXT NOT NULL,
    blob_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes BIGINT NOT NULL CHECK (size_bytes >= 0),
    status TEXT NOT NULL,
    uploaded_at TIMESTAMPTZ NOT NULL,
    retention_until TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_processed_documents_type UNIQUE (request_id, document_type_code)
);
"#,
    },
    Migration {
        id: 2,
        description: "customer records and validation failures",
        sql: r#"
CREATE TABLE IF NOT EXISTS intake.customers (
    id BIGSERIAL PRIMARY KEY,
    request_id BIGINT NOT NULL UNIQUE,
    ocr_status TEXT CHECK (ocr_status IS NULL OR ocr_status IN ('SUCCESS', 'FAILED')),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    "IDNumber" TEXT,
    "FirstName" TEXT,
    "LastName" TEXT,
    "Nationality" TEXT,
    "Gender" TEXT,
    "DateOfBirth" DATE,
    "EmiratesIDExpiryDate" DATE,
    "LicenseNumber" TEXT,
    "LicenseExpiryDate" DATE,
    "PlaceOfIssue" TEXT,
    "IsNonGcc" BOOLEAN,
    "Country" TEXT
);

CREATE TABLE IF NOT EXISTS intake.validation_failures (
    id BIGSERIAL PRIMARY KEY,
    request_id BIGINT NOT NULL,
    validation_rule TEXT NOT NULL,
    validation_error TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_validation_failures_request
    ON intake.validation_failures(request_id, id);

CREATE OR REPLACE FUNCTION intake.run_customer_validations(p_request_id BIGINT)
RETURNS VOID AS $$
BEGIN
    DELETE FROM intake.validation_failures WHERE request_id = p_request_id;

    INSERT INTO intake.validation_failures (request_id, validation_rule, validation_error)
    SELECT p_request_id, 'customer_exists', 'no customer record for request'
    WHERE NOT EXISTS (SELECT 1 FROM intake.customers WHERE request_id = p_request_id);

    INSERT INTO intake.validation_failures (request_id, validation_rule, validation_error)
    SELECT request_id, 'first_name_required', 'first name is missing'
    FROM intake.customers
    WHERE request_id = p_request_id AND COALESCE(TRIM("FirstName"), '') = '';

    INSERT INTO intake.validation_failures (request_id, validation_rule, validation_error)
    SELECT request_id, 'emirates_id_valid', 'identity card has expired'
    FROM intake.customers
    WHERE request_id = p_request_id AND "EmiratesIDExpiryDate" < CURRENT_DATE;

    INSERT INTO intake.validation_failures (request_id, validation_rule, validation_error)
    SELECT request_id, 'license_valid', 'driving licence has expired'
    FROM intake.customers
    WHERE request_id = p_request_id AND "LicenseExpiryDate" < CURRENT_DATE;
END;
$$ LANGUAGE plpgsql;
"#,
    },
];

/// Create the `intake` schema and apply every migration not yet recorded.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client.batch_execute(BOOTSTRAP).await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM intake.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO intake.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
