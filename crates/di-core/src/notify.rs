//! Failure and validation notifications.
//!
//! The coordinator never waits on the notification transport: messages go into
//! a bounded channel drained by a background task, and a full channel drops the
//! message with a warning. [`NotificationDispatcher::shutdown`] closes the
//! channel and waits for everything already queued to be delivered.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::AsRefStr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collaborators::{ClientError, NotificationSink};
use crate::model::ValidationFailure;
use crate::pipeline::PipelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Authentication,
    Network,
    FileSystem,
    DataProcessing,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    /// Best-effort bucket derived from the error text.
    pub fn classify(error: &str) -> Self {
        let text = error.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));

        if has(&["unauthorized", "authentication", "forbidden", "access denied"]) {
            ErrorCategory::Authentication
        } else if has(&["timeout", "timed out", "connection", "network", "dns"]) {
            ErrorCategory::Network
        } else if has(&["no such file", "file not found", "permission denied", "directory", "no space"]) {
            ErrorCategory::FileSystem
        } else if has(&["json", "decode", "parse", "classification", "malformed"]) {
            ErrorCategory::DataProcessing
        } else if has(&["config"]) {
            ErrorCategory::Configuration
        } else {
            ErrorCategory::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureNotification {
    pub stage: PipelineState,
    pub error: String,
    pub category: ErrorCategory,
    pub submission_id: i64,
    pub request_id: i64,
    pub context: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl FailureNotification {
    pub fn new(stage: PipelineState, error: &str, submission_id: i64, request_id: i64) -> Self {
        Self {
            stage,
            error: error.to_string(),
            category: ErrorCategory::classify(error),
            submission_id,
            request_id,
            context: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationNotification {
    pub submission_id: i64,
    pub request_id: i64,
    pub failures: Vec<ValidationFailure>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
enum Notification {
    Failure(FailureNotification),
    Validation(ValidationNotification),
}

pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<Notification>>,
    worker: Option<JoinHandle<()>>,
}

impl NotificationDispatcher {
    /// Start the drain task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(drain(sink, rx));
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Queue a failure notification. Returns `false` if it was dropped.
    pub fn notify_failure(&self, notification: FailureNotification) -> bool {
        self.enqueue(Notification::Failure(notification))
    }

    pub fn notify_validation(&self, notification: ValidationNotification) -> bool {
        self.enqueue(Notification::Validation(notification))
    }

    fn enqueue(&self, notification: Notification) -> bool {
        let Some(tx) = &self.tx else {
            warn!("notification dispatcher already shut down; dropping notification");
            return false;
        };

        match tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!(notification = ?dropped, "notification queue full; dropping notification");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("notification worker stopped; dropping notification");
                false
            }
        }
    }

    /// Close the queue and wait until every queued notification was handed to the sink.
    pub async fn shutdown(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(error = %err, "notification worker ended abnormally");
            }
        }
    }
}

async fn drain(sink: Arc<dyn NotificationSink>, mut rx: mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        let result = match &notification {
            Notification::Failure(failure) => sink.notify_failure(failure).await,
            Notification::Validation(validation) => sink.notify_validation(validation).await,
        };
        match result {
            Ok(()) => debug!("notification delivered"),
            Err(err) => warn!(error = %err, "failed to deliver notification"),
        }
    }
}

/// Sink that keeps every notification in memory.
#[derive(Default)]
pub struct RecordingSink {
    failures: Mutex<Vec<FailureNotification>>,
    validations: Mutex<Vec<ValidationNotification>>,
    unavailable: AtomicBool,
}

impl RecordingSink {
    pub fn failures(&self) -> Vec<FailureNotification> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn validations(&self) -> Vec<ValidationNotification> {
        self.validations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every delivery fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ClientError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("notification transport unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify_failure(&self, notification: &FailureNotification) -> Result<(), ClientError> {
        self.check_available()?;
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }

    async fn notify_validation(
        &self,
        notification: &ValidationNotification,
    ) -> Result<(), ClientError> {
        self.check_available()?;
        self.validations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_text() {
        assert_eq!(ErrorCategory::classify("401 Unauthorized"), ErrorCategory::Authentication);
        assert_eq!(ErrorCategory::classify("connection reset by peer"), ErrorCategory::Network);
        assert_eq!(
            ErrorCategory::classify("No such file or directory (os error 2)"),
            ErrorCategory::FileSystem
        );
        assert_eq!(
            ErrorCategory::classify("classification output is not a page collection"),
            ErrorCategory::DataProcessing
        );
        assert_eq!(ErrorCategory::classify("bad config value"), ErrorCategory::Configuration);
        assert_eq!(ErrorCategory::classify("boom"), ErrorCategory::Unknown);
        assert_eq!(ErrorCategory::FileSystem.as_ref(), "FILE_SYSTEM");
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_notifications() {
        let sink = Arc::new(RecordingSink::default());
        let mut dispatcher = NotificationDispatcher::spawn(sink.clone(), 8);

        for id in 0..3 {
            let queued = dispatcher.notify_failure(
                FailureNotification::new(PipelineState::Merging, "merge failed", id, 100 + id)
                    .with_context("artifact", "raw_sources"),
            );
            assert!(queued);
        }
        dispatcher.shutdown().await;

        let failures = sink.failures();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[2].request_id, 102);
        assert_eq!(failures[0].context.get("artifact").map(String::as_str), Some("raw_sources"));

        assert!(!dispatcher.notify_failure(FailureNotification::new(
            PipelineState::Merging,
            "late",
            9,
            9
        )));
    }

    #[tokio::test]
    async fn delivery_errors_do_not_stop_the_worker() {
        let sink = Arc::new(RecordingSink::default());
        sink.set_unavailable(true);
        let mut dispatcher = NotificationDispatcher::spawn(sink.clone(), 4);

        dispatcher.notify_validation(ValidationNotification {
            submission_id: 1,
            request_id: 2,
            failures: vec![],
            occurred_at: Utc::now(),
        });
        dispatcher.shutdown().await;

        assert!(sink.validations().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_queue_drops_instead_of_blocking() {
        let sink = Arc::new(RecordingSink::default());
        let mut dispatcher = NotificationDispatcher::spawn(sink.clone(), 1);

        // The drain task cannot run until this task yields.
        let first = dispatcher.notify_failure(FailureNotification::new(PipelineState::Uploading, "a", 1, 1));
        let second = dispatcher.notify_failure(FailureNotification::new(PipelineState::Uploading, "b", 2, 2));
        assert!(first);
        assert!(!second);

        dispatcher.shutdown().await;
        assert_eq!(sink.failures().len(), 1);
    }
}
