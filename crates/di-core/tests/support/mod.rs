#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use di_core::notify::RecordingSink;
use di_core::persistence::InMemoryStore;
use di_core::scheduler::SubmissionQueue;
use di_core::{
    BlobDestination, BlobRef, BlobStore, Classifier, ClientError, Coordinator, DocumentAssembler,
    IntakeConfig, LocalSource, MergedDocument, PipelineContext, Priority, SourceRef, Submission,
    TextExtractor, WorkerSettings,
};
use serde_json::Value;
use tempfile::TempDir;

pub const CONFIG: &str = r#"{
    "document_types": [
        {"name": "Emirates ID", "code": "EID", "output_filename": "emirates_id.pdf"},
        {"name": "Driving License", "code": "DL", "output_filename": "driving_license.pdf"},
        {"name": "Other Document", "code": "OTH", "output_filename": "other.pdf"}
    ],
    "groups": [
        {"key": "identity_card", "aliases": ["Emirates ID"], "required_fields": ["ID Number"]},
        {"key": "driving_permit", "aliases": ["Driving License"]}
    ],
    "field_mappings": [
        {"target": "FirstName", "sources": [{"group": "identity_card", "field": "First Name", "priority": 1}]},
        {"target": "LicenseNumber", "sources": [{"group": "driving_permit", "field": "License Number"}]},
        {"target": "EmiratesIDExpiryDate", "sources": [
            {"group": "driving_permit", "field": "Expiry Date", "priority": 2},
            {"group": "identity_card", "field": "ID Expiry Date", "priority": 1}
        ]},
        {"target": "IsNonGcc", "sources": [{"group": "identity_card", "field": "Nationality"}], "transform": "invert_yes_no"},
        {"target": "Country", "constant": "UAE"}
    ],
    "essential_fields": ["FirstName", "LicenseNumber"],
    "date_fields": ["EmiratesIDExpiryDate"],
    "retention_days": 30
}"#;

pub const SOURCE_CONTAINER: &str = "uploads";

/// Blob store keyed by (container, path).
#[derive(Default)]
pub struct MemoryBlobs {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    stored: Mutex<Vec<(BlobDestination, Vec<u8>)>>,
}

impl MemoryBlobs {
    pub fn put(&self, container: &str, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((container.to_string(), path.to_string()), bytes.to_vec());
    }

    pub fn stored(&self) -> Vec<(BlobDestination, Vec<u8>)> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn fetch(&self, container: &str, path: &str) -> Result<Vec<u8>, ClientError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(container.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| format!("blob not found: {container}/{path}").into())
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        destination: &BlobDestination,
    ) -> Result<BlobRef, ClientError> {
        let blob = BlobRef {
            url: format!("memory://{}/{}", destination.container, destination.path),
            container: destination.container.clone(),
            path: destination.path.clone(),
            file_name: destination.file_name.clone(),
            content_type: destination.content_type.clone(),
            size: bytes.len() as u64,
        };
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination.clone(), bytes));
        Ok(blob)
    }
}

/// Every downloaded source is one page; merged bytes are the sources joined by newlines.
pub struct LinePages;

#[async_trait]
impl DocumentAssembler for LinePages {
    async fn merge(&self, sources: &[LocalSource]) -> Result<MergedDocument, ClientError> {
        let mut lines = Vec::with_capacity(sources.len());
        for source in sources {
            let bytes = tokio::fs::read(&source.path).await?;
            lines.push(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(MergedDocument {
            bytes: lines.join("\n").into_bytes(),
            page_count: sources.len(),
        })
    }

    async fn extract_pages(
        &self,
        _merged: &MergedDocument,
        indices: &[usize],
    ) -> Result<Vec<u8>, ClientError> {
        let indices: Vec<String> = indices.iter().map(ToString::to_string).collect();
        Ok(format!("pages:{}", indices.join(",")).into_bytes())
    }
}

/// Page text is the merged document's lines, numbered from 1.
pub struct LineText;

#[async_trait]
impl TextExtractor for LineText {
    async fn analyze(&self, document: &[u8]) -> Result<BTreeMap<u32, String>, ClientError> {
        Ok(String::from_utf8_lossy(document)
            .lines()
            .zip(1u32..)
            .map(|(line, page)| (page, line.to_string()))
            .collect())
    }
}

pub enum Reply {
    Pages(Value),
    Error(&'static str),
    Panic,
}

/// Classifier that answers from a script, one reply per call.
#[derive(Default)]
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<Reply>>,
}

impl ScriptedClassifier {
    pub fn push(&self, reply: Reply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _page_text: &BTreeMap<u32, String>) -> Result<Value, ClientError> {
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match reply {
            Some(Reply::Pages(value)) => Ok(value),
            Some(Reply::Error(message)) => Err(message.into()),
            Some(Reply::Panic) => panic!("classifier exploded"),
            None => Err("classifier has no scripted reply".into()),
        }
    }
}

pub struct Harness {
    pub queue: Arc<SubmissionQueue>,
    pub blobs: Arc<MemoryBlobs>,
    pub classifier: Arc<ScriptedClassifier>,
    pub store: Arc<InMemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(SubmissionQueue::default()),
            blobs: Arc::new(MemoryBlobs::default()),
            classifier: Arc::new(ScriptedClassifier::default()),
            store: Arc::new(InMemoryStore::default()),
            sink: Arc::new(RecordingSink::default()),
            scratch: TempDir::new().unwrap(),
        }
    }

    pub fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            idle_poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(10),
            notification_capacity: 16,
            scratch_dir: self.scratch.path().join("work"),
            blob_container: "processed".into(),
        }
    }

    pub fn coordinator(&self) -> Coordinator {
        let (context, config) = self.parts();
        Coordinator::with_worker_id(context, config, self.settings(), "test-worker")
    }

    /// Coordinator claiming under the process run id.
    pub fn default_coordinator(&self) -> Coordinator {
        let (context, config) = self.parts();
        Coordinator::new(context, config, self.settings())
    }

    fn parts(&self) -> (PipelineContext, Arc<IntakeConfig>) {
        let context = PipelineContext {
            jobs: self.queue.clone(),
            blobs: self.blobs.clone(),
            assembler: Arc::new(LinePages),
            text: Arc::new(LineText),
            classifier: self.classifier.clone(),
            store: self.store.clone(),
            notifications: self.sink.clone(),
        };
        let config = IntakeConfig::from_json_str(CONFIG).unwrap();
        (context, Arc::new(config))
    }

    /// Queue a submission whose sources hold `pages`, one page per source.
    pub fn submit(&self, id: i64, request_id: i64, priority: Priority, pages: &[&str]) {
        let received_at = Utc.with_ymd_and_hms(2025, 11, 12, 8, 0, 0).unwrap()
            + chrono::Duration::seconds(id);
        self.queue
            .enqueue(Submission::new(id, request_id, priority, received_at));
        for (index, text) in pages.iter().enumerate() {
            let path = format!("2025/11/12/{request_id}/page{}.pdf", index + 1);
            self.blobs.put(SOURCE_CONTAINER, &path, text.as_bytes());
            self.queue.add_source(
                id,
                SourceRef {
                    container: SOURCE_CONTAINER.into(),
                    path,
                    content_type: Some("application/pdf".into()),
                },
            );
        }
    }
}

/// Classifier output for an identity card, a driving licence and an unrelated page.
pub fn three_page_classification() -> Value {
    serde_json::json!({
        "Pages": [
            {
                "page": 1,
                "Doc Type": "Emirates ID",
                "ID Number": "784-1990-1234567-1",
                "First Name": " Amira ",
                "Nationality": "Yes",
                "ID Expiry Date": "31/01/2030"
            },
            {
                "page": 2,
                "Doc Type": "Driving License",
                "License Number": "12-345",
                "Expiry Date": "15-06-2029"
            },
            {"page": 3, "Doc Type": "Other Document", "Notes": "utility bill"}
        ]
    })
}
