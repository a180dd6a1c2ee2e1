pub mod aggregate;
pub mod classification;
pub mod collaborators;
pub mod config;
pub mod date;
pub mod db;
pub mod fields;
pub mod final_docs;
pub mod logging;
pub mod model;
pub mod notify;
pub mod persistence;
pub mod pipeline;
pub mod resolve;
pub mod run_id;
pub mod scheduler;

// Entry points used by binaries and integration tests.
pub use collaborators::{
    BlobDestination, BlobStore, Classifier, ClientError, DocumentAssembler, JobSource,
    LocalSource, MergedDocument, NotificationSink, RelationalStore, TextExtractor,
};
pub use config::{ConfigError, IntakeConfig, WorkerSettings};
pub use model::{BlobRef, CustomerStatus, FieldValue, Priority, SourceRef, Submission};
pub use pipeline::{Coordinator, Outcome, OutcomeStatus, PipelineContext, PipelineState};
