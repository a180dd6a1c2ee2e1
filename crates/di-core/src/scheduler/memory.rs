use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::collaborators::{ClientError, JobSource};
use crate::model::{SourceRef, Submission};

#[derive(Default)]
struct QueueState {
    submissions: Vec<Submission>,
    sources: HashMap<i64, Vec<SourceRef>>,
}

/// In-process job source. The claim is a compare-and-set under one lock.
#[derive(Default)]
pub struct SubmissionQueue {
    state: Mutex<QueueState>,
    unavailable: AtomicBool,
}

impl SubmissionQueue {
    /// Add a pending submission; ids already present are ignored.
    pub fn enqueue(&self, submission: Submission) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.submissions.iter().any(|existing| existing.id == submission.id) {
            return;
        }
        state.submissions.push(submission);
    }

    pub fn add_source(&self, submission_id: i64, source: SourceRef) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sources.entry(submission_id).or_default().push(source);
    }

    pub fn submission(&self, id: i64) -> Option<Submission> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.submissions.iter().find(|s| s.id == id).cloned()
    }

    /// Simulate an unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ClientError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("submission store unreachable: connection refused".into());
        }
        Ok(())
    }
}

#[async_trait]
impl JobSource for SubmissionQueue {
    async fn claim_next_submission(
        &self,
        worker_id: &str,
    ) -> Result<Option<Submission>, ClientError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let next = state
            .submissions
            .iter_mut()
            .filter(|submission| !submission.claimed)
            .min_by_key(|submission| {
                (submission.priority.rank(), submission.received_at, submission.id)
            });

        Ok(next.map(|submission| {
            submission.claimed = true;
            submission.claimed_at = Some(Utc::now());
            submission.claimed_by = Some(worker_id.to_string());
            submission.clone()
        }))
    }

    async fn list_pending_sources(
        &self,
        submission_id: i64,
        _request_id: i64,
    ) -> Result<Vec<SourceRef>, ClientError> {
        self.check_available()?;
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.sources.get(&submission_id).cloned().unwrap_or_default())
    }
}
