//! Postgres-backed [`JobSource`] and [`RelationalStore`].
//!
//! Every table lives in the `intake` schema created by [`run_migrations`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::collaborators::{ClientError, JobSource, RelationalStore};
use crate::model::{
    CustomerFieldUpdate, CustomerStatus, PersistedDocument, SourceRef, Submission, UpsertOutcome,
    ValidationFailure,
};

/// Storage error enum with the shared pool and postgres variants plus the
/// variants listed in the body.
macro_rules! db_error {
    ($name:ident { $($variants:tt)* }) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("failed to get postgres connection: {0}")]
            Pool(#[from] deadpool_postgres::PoolError),
            #[error("postgres error: {0}")]
            Postgres(#[from] tokio_postgres::Error),
            $($variants)*
        }
    };
}

pub mod customers;
pub mod documents;
pub mod migrations;
pub mod pool;
pub mod submissions;
pub mod util;

pub use customers::{
    CustomerStorageError, run_customer_validations, set_ocr_status, update_customer_fields,
};
pub use documents::{DocumentStorageError, upsert_processed_document};
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url};
pub use submissions::{SubmissionStorageError, claim_next_submission, list_pending_sources};

/// Pool handle implementing the storage collaborator traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the pool and bring the schema up to date.
    pub async fn connect(db_url: &str) -> Result<Arc<Self>, MigrationError> {
        let pool = create_pool_from_url(db_url)?;
        run_migrations(&pool).await?;
        Ok(Arc::new(Self::new(pool)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobSource for PgStore {
    async fn claim_next_submission(
        &self,
        worker_id: &str,
    ) -> Result<Option<Submission>, ClientError> {
        Ok(claim_next_submission(&self.pool, worker_id, Utc::now()).await?)
    }

    async fn list_pending_sources(
        &self,
        submission_id: i64,
        request_id: i64,
    ) -> Result<Vec<SourceRef>, ClientError> {
        Ok(list_pending_sources(&self.pool, submission_id, request_id).await?)
    }
}

#[async_trait]
impl RelationalStore for PgStore {
    async fn upsert_document(&self, row: &PersistedDocument) -> Result<UpsertOutcome, ClientError> {
        Ok(upsert_processed_document(&self.pool, row).await?)
    }

    async fn update_customer_fields(
        &self,
        request_id: i64,
        updates: &CustomerFieldUpdate,
    ) -> Result<u64, ClientError> {
        Ok(update_customer_fields(&self.pool, request_id, updates).await?)
    }

    async fn set_status(&self, request_id: i64, status: CustomerStatus) -> Result<(), ClientError> {
        set_ocr_status(&self.pool, request_id, status).await?;
        Ok(())
    }

    async fn run_customer_validations(
        &self,
        request_id: i64,
    ) -> Result<Vec<ValidationFailure>, ClientError> {
        Ok(run_customer_validations(&self.pool, request_id).await?)
    }
}
