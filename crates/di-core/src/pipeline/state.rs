use serde::Serialize;
use strum::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Ready,
    Downloading,
    Merging,
    ExtractingText,
    Classifying,
    BuildingFinalDocs,
    Uploading,
    Persisting,
    Validating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Outputs a submission produces on its way through the main chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Artifact {
    RawSources,
    MergedDocument,
    PageText,
    ClassifiedPages,
    FieldResolution,
    FinalDocuments,
    UploadedDocuments,
    PersistedRecords,
}

/// Remembers the last artifact produced so a failure can be pinned to a stage.
#[derive(Debug, Clone, Default)]
pub struct ArtifactTrail {
    last: Option<Artifact>,
}

impl ArtifactTrail {
    pub fn record(&mut self, artifact: Artifact) {
        self.last = Some(artifact);
    }

    pub fn last(&self) -> Option<Artifact> {
        self.last
    }

    /// The stage that was running when nothing further got produced.
    pub fn failed_stage(&self) -> PipelineState {
        match self.last {
            None => PipelineState::Downloading,
            Some(Artifact::RawSources) => PipelineState::Merging,
            Some(Artifact::MergedDocument) => PipelineState::ExtractingText,
            Some(Artifact::PageText) | Some(Artifact::ClassifiedPages) => {
                PipelineState::Classifying
            }
            Some(Artifact::FieldResolution) => PipelineState::BuildingFinalDocs,
            Some(Artifact::FinalDocuments) => PipelineState::Uploading,
            Some(Artifact::UploadedDocuments) | Some(Artifact::PersistedRecords) => {
                PipelineState::Persisting
            }
        }
    }
}
