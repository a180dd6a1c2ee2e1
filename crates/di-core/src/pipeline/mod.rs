//! Per-submission state machine.
//!
//! `READY -> DOWNLOADING -> MERGING -> EXTRACTING_TEXT -> CLASSIFYING ->
//! BUILDING_FINAL_DOCS -> UPLOADING -> PERSISTING -> VALIDATING -> DONE | FAILED`
//!
//! Any stage error stops the main chain, marks the customer FAILED and queues a
//! failure notification. Validation runs afterwards in both cases.

mod coordinator;
mod naming;
mod state;
mod workspace;

pub use coordinator::{
    Coordinator, Outcome, OutcomeStatus, PipelineContext, RunStats, StageError,
};
pub use naming::{PROCESSED_SUBFOLDER, local_file_name, parent_prefix, processed_blob_path};
pub use state::{Artifact, ArtifactTrail, PipelineState};
pub use workspace::Workspace;
