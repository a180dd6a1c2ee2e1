//! Claiming submissions.
//!
//! The claim itself is a single conditional write in the job source, which is
//! the only guard between concurrent workers.

mod memory;

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::collaborators::{ClientError, JobSource};
use crate::model::Submission;

pub use memory::SubmissionQueue;

#[derive(Debug, thiserror::Error)]
pub enum TransientInfrastructureError {
    #[error("job source unavailable: {0}")]
    JobSource(#[source] ClientError),
}

pub struct Scheduler {
    source: Arc<dyn JobSource>,
    worker_id: String,
}

impl Scheduler {
    pub fn new(source: Arc<dyn JobSource>, worker_id: impl Into<String>) -> Self {
        Self {
            source,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Highest priority first, then earliest received, then lowest id.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn claim_next(&self) -> Result<Option<Submission>, TransientInfrastructureError> {
        let claimed = self
            .source
            .claim_next_submission(&self.worker_id)
            .await
            .map_err(TransientInfrastructureError::JobSource)?;

        match &claimed {
            Some(submission) => info!(
                submission_id = submission.id,
                request_id = submission.request_id,
                priority = submission.priority.as_ref(),
                "claimed submission"
            ),
            None => debug!("no pending submissions"),
        }
        Ok(claimed)
    }
}
