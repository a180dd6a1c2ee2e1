use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};

use crate::aggregate::{aggregate_pages, required_field_gaps};
use crate::classification::{ClassificationFormatError, parse_classified_pages};
use crate::collaborators::{
    BlobDestination, BlobStore, Classifier, ClientError, DocumentAssembler, JobSource,
    LocalSource, NotificationSink, RelationalStore, TextExtractor,
};
use crate::config::{IntakeConfig, WorkerSettings};
use crate::final_docs::build_final_documents;
use crate::logging::panic_message;
use crate::model::{CustomerStatus, Submission};
use crate::notify::{FailureNotification, NotificationDispatcher, ValidationNotification};
use crate::persistence::{DocumentPersistence, PersistenceError, build_document_row};
use crate::resolve::resolve_fields;
use crate::run_id;
use crate::scheduler::{Scheduler, TransientInfrastructureError};

use super::naming::{local_file_name, parent_prefix, processed_blob_path};
use super::state::{Artifact, ArtifactTrail, PipelineState};
use super::workspace::{SOURCES_DIR, Workspace};

const MERGED_FILE: &str = "merged.pdf";
const PAGE_TEXT_FILE: &str = "page_text.json";
const CLASSIFIED_FILE: &str = "classified.json";
const FINAL_DIR: &str = "final";
const FINAL_CONTENT_TYPE: &str = "application/pdf";

/// External clients the coordinator drives, constructed once by the caller.
#[derive(Clone)]
pub struct PipelineContext {
    pub jobs: Arc<dyn JobSource>,
    pub blobs: Arc<dyn BlobStore>,
    pub assembler: Arc<dyn DocumentAssembler>,
    pub text: Arc<dyn TextExtractor>,
    pub classifier: Arc<dyn Classifier>,
    pub store: Arc<dyn RelationalStore>,
    pub notifications: Arc<dyn NotificationSink>,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("submission has no pending source documents")]
    NoSources,
    #[error("{stage} failed: {source}")]
    Collaborator {
        stage: PipelineState,
        #[source]
        source: ClientError,
    },
    #[error(transparent)]
    Classification(#[from] ClassificationFormatError),
    #[error("scratch workspace error: {0}")]
    Workspace(#[from] std::io::Error),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("stage panicked: {0}")]
    Panicked(String),
}

fn at(stage: PipelineState) -> impl FnOnce(ClientError) -> StageError {
    move |source| StageError::Collaborator { stage, source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Done,
    Failed,
    Idle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub pages: usize,
    pub groups: usize,
    pub final_documents: usize,
    pub resolved_fields: usize,
    pub conflicts: usize,
    pub missing_essential: usize,
    pub elapsed: Duration,
    pub failed_stage: Option<PipelineState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub submission_id: Option<i64>,
    pub request_id: Option<i64>,
    pub stats: RunStats,
}

impl Outcome {
    fn idle(elapsed: Duration) -> Self {
        Self {
            status: OutcomeStatus::Idle,
            submission_id: None,
            request_id: None,
            stats: RunStats {
                elapsed,
                ..RunStats::default()
            },
        }
    }
}

#[derive(Default)]
struct SubmissionRun {
    stats: RunStats,
    trail: ArtifactTrail,
}

pub struct Coordinator {
    context: PipelineContext,
    config: Arc<IntakeConfig>,
    settings: WorkerSettings,
    scheduler: Scheduler,
    persistence: DocumentPersistence,
    workspace: Workspace,
    notifier: NotificationDispatcher,
}

impl Coordinator {
    /// Claims under this process's run id. Must be called inside a tokio
    /// runtime; the notification drain task is spawned here.
    pub fn new(
        context: PipelineContext,
        config: Arc<IntakeConfig>,
        settings: WorkerSettings,
    ) -> Self {
        Self::with_worker_id(context, config, settings, run_id::get())
    }

    pub fn with_worker_id(
        context: PipelineContext,
        config: Arc<IntakeConfig>,
        settings: WorkerSettings,
        worker_id: impl Into<String>,
    ) -> Self {
        let scheduler = Scheduler::new(context.jobs.clone(), worker_id);
        let persistence = DocumentPersistence::new(context.store.clone());
        let workspace = Workspace::new(settings.scratch_dir.clone());
        let notifier =
            NotificationDispatcher::spawn(context.notifications.clone(), settings.notification_capacity);

        Self {
            context,
            config,
            settings,
            scheduler,
            persistence,
            workspace,
            notifier,
        }
    }

    /// Claim and fully process at most one submission.
    ///
    /// Only a failure to claim is returned as an error; anything that goes
    /// wrong after the claim ends as a `Failed` outcome.
    pub async fn process_one(&self) -> Result<Outcome, TransientInfrastructureError> {
        let started = Instant::now();
        let Some(submission) = self.scheduler.claim_next().await? else {
            return Ok(Outcome::idle(started.elapsed()));
        };

        let span = info_span!(
            "submission",
            submission_id = submission.id,
            request_id = submission.request_id
        );
        let outcome = self.process_claimed(&submission, started).instrument(span).await;
        Ok(outcome)
    }

    async fn process_claimed(&self, submission: &Submission, started: Instant) -> Outcome {
        let mut run = SubmissionRun::default();

        let result = AssertUnwindSafe(self.run_main_chain(submission, &mut run))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::Panicked(panic_message(panic.as_ref()))));

        let status = match result {
            Ok(()) => {
                info!(
                    final_documents = run.stats.final_documents,
                    resolved_fields = run.stats.resolved_fields,
                    "submission processed"
                );
                OutcomeStatus::Done
            }
            Err(err) => {
                let stage = run.trail.failed_stage();
                run.stats.failed_stage = Some(stage);
                self.handle_failure(submission, &run.trail, stage, &err).await;
                OutcomeStatus::Failed
            }
        };

        self.run_validations(submission).await;

        run.stats.elapsed = started.elapsed();
        Outcome {
            status,
            submission_id: Some(submission.id),
            request_id: Some(submission.request_id),
            stats: run.stats,
        }
    }

    async fn run_main_chain(
        &self,
        submission: &Submission,
        run: &mut SubmissionRun,
    ) -> Result<(), StageError> {
        let request_id = submission.request_id;

        // DOWNLOADING
        self.workspace.reset().await?;
        let sources = self
            .context
            .jobs
            .list_pending_sources(submission.id, request_id)
            .await
            .map_err(at(PipelineState::Downloading))?;
        let Some(first_source) = sources.first() else {
            return Err(StageError::NoSources);
        };
        let upload_prefix = parent_prefix(&first_source.path).to_string();

        let mut local_sources = Vec::with_capacity(sources.len());
        for (position, source) in sources.iter().enumerate() {
            let bytes = self
                .context
                .blobs
                .fetch(&source.container, &source.path)
                .await
                .map_err(at(PipelineState::Downloading))?;
            let relative = Path::new(SOURCES_DIR).join(local_file_name(position, source));
            let path = self.workspace.write_bytes(relative, &bytes).await?;
            local_sources.push(LocalSource {
                path,
                content_type: source.content_type.clone(),
            });
        }
        info!(sources = local_sources.len(), "downloaded sources");
        run.trail.record(Artifact::RawSources);

        // MERGING
        let merged = self
            .context
            .assembler
            .merge(&local_sources)
            .await
            .map_err(at(PipelineState::Merging))?;
        self.workspace.write_bytes(MERGED_FILE, &merged.bytes).await?;
        info!(pages = merged.page_count, "merged sources");
        run.trail.record(Artifact::MergedDocument);

        // EXTRACTING_TEXT
        let page_text = self
            .context
            .text
            .analyze(&merged.bytes)
            .await
            .map_err(at(PipelineState::ExtractingText))?;
        self.workspace.write_json(PAGE_TEXT_FILE, &page_text).await?;
        run.trail.record(Artifact::PageText);

        // CLASSIFYING
        let raw_classification = self
            .context
            .classifier
            .classify(&page_text)
            .await
            .map_err(at(PipelineState::Classifying))?;
        self.workspace
            .write_json(CLASSIFIED_FILE, &raw_classification)
            .await?;
        let pages = parse_classified_pages(&raw_classification)?;
        run.stats.pages = pages.len();
        run.trail.record(Artifact::ClassifiedPages);

        let groups = aggregate_pages(&pages, &self.config);
        required_field_gaps(&groups, &self.config);
        let resolution = resolve_fields(&groups, &self.config);
        run.stats.groups = groups.resolvable_count();
        run.stats.resolved_fields = resolution.updates.len();
        run.stats.conflicts = resolution.conflicts.len();
        run.stats.missing_essential = resolution.missing_essential.len();
        run.trail.record(Artifact::FieldResolution);

        // BUILDING_FINAL_DOCS
        let documents = build_final_documents(
            self.context.assembler.as_ref(),
            &merged,
            &pages,
            &self.config.document_types,
        )
        .await
        .map_err(at(PipelineState::BuildingFinalDocs))?;
        for document in &documents {
            let relative = Path::new(FINAL_DIR).join(&document.document_type.output_filename);
            self.workspace.write_bytes(relative, &document.bytes).await?;
        }
        run.stats.final_documents = documents.len();
        run.trail.record(Artifact::FinalDocuments);

        // UPLOADING
        let mut uploaded = Vec::with_capacity(documents.len());
        for document in documents {
            let file_name = document.document_type.output_filename.clone();
            let destination = BlobDestination {
                container: self.settings.blob_container.clone(),
                path: processed_blob_path(&upload_prefix, &file_name),
                file_name,
                content_type: FINAL_CONTENT_TYPE.to_string(),
            };
            let blob = self
                .context
                .blobs
                .store(document.bytes, &destination)
                .await
                .map_err(at(PipelineState::Uploading))?;
            info!(path = %blob.path, size = blob.size, "uploaded final document");
            uploaded.push((document.document_type, blob));
        }
        run.trail.record(Artifact::UploadedDocuments);

        // PERSISTING
        let uploaded_at = Utc::now();
        for (document_type, blob) in &uploaded {
            let row = build_document_row(submission, document_type, blob, &self.config, uploaded_at);
            self.persistence.upsert_document(&row).await?;
        }
        self.persistence
            .update_customer_fields(request_id, &resolution.updates, &self.config)
            .await?;
        run.trail.record(Artifact::PersistedRecords);

        self.persistence
            .set_status(request_id, CustomerStatus::Success)
            .await?;
        Ok(())
    }

    async fn handle_failure(
        &self,
        submission: &Submission,
        trail: &ArtifactTrail,
        stage: PipelineState,
        err: &StageError,
    ) {
        let last_artifact = trail.last().map(|artifact| artifact.as_ref().to_string());
        error!(
            stage = %stage,
            last_artifact = last_artifact.as_deref().unwrap_or("none"),
            error = %err,
            "submission failed"
        );

        if let Err(status_err) = self
            .persistence
            .set_status(submission.request_id, CustomerStatus::Failed)
            .await
        {
            error!(error = %status_err, "could not mark customer status FAILED");
        }

        let notification =
            FailureNotification::new(stage, &err.to_string(), submission.id, submission.request_id)
                .with_context("last_artifact", last_artifact.as_deref().unwrap_or("none"))
                .with_context("worker_id", self.scheduler.worker_id())
                .with_context("priority", submission.priority.as_ref());
        self.notifier.notify_failure(notification);
    }

    /// Best-effort customer checks; never changes the committed status.
    async fn run_validations(&self, submission: &Submission) {
        match self
            .persistence
            .run_customer_validations(submission.request_id)
            .await
        {
            Ok(failures) if failures.is_empty() => info!("customer validations passed"),
            Ok(failures) => {
                warn!(failures = failures.len(), "customer validations reported failures");
                self.notifier.notify_validation(ValidationNotification {
                    submission_id: submission.id,
                    request_id: submission.request_id,
                    failures,
                    occurred_at: Utc::now(),
                });
            }
            Err(err) => warn!(error = %err, "customer validations could not run"),
        }
    }

    /// Poll until `shutdown` flips to `true` (or its sender goes away), then
    /// flush pending notifications. Shutdown is only observed between submissions.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = self.scheduler.worker_id(), "coordinator started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let attempt = AssertUnwindSafe(self.process_one()).catch_unwind().await;
            let pause = match attempt {
                Ok(Ok(outcome)) if outcome.status == OutcomeStatus::Idle => {
                    Some(self.settings.idle_poll_interval)
                }
                Ok(Ok(_)) => None,
                Ok(Err(err)) => {
                    error!(error = %err, "infrastructure error; backing off");
                    Some(self.settings.error_backoff)
                }
                Err(panic) => {
                    error!(
                        panic_message = %panic_message(panic.as_ref()),
                        "submission processing panicked; backing off"
                    );
                    Some(self.settings.error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("coordinator stopping; flushing notifications");
        self.shutdown().await;
    }

    /// Flush queued notifications. Call when driving `process_one` directly.
    pub async fn shutdown(mut self) {
        self.notifier.shutdown().await;
    }
}
