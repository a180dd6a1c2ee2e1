use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const PAGES_KEY: &str = "Pages";
const PAGE_KEY: &str = "page";
const LABEL_KEY: &str = "Doc Type";

/// One page as labelled by the classification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPage {
    /// 1-based position in the merged document.
    pub page: u32,
    pub label: String,
    pub fields: BTreeMap<String, String>,
}

impl ClassifiedPage {
    pub fn new(page: u32, label: &str) -> Self {
        Self {
            page,
            label: label.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClassificationFormatError {
    #[error("classification output is not a page collection")]
    NotACollection,
    #[error("classification entry {index} is not an object")]
    EntryNotObject { index: usize },
    #[error("classification entry {index} has no integer page number")]
    MissingPageNumber { index: usize },
}

/// Turn the classifier's response into pages, in response order.
///
/// Accepts `{"Pages": [...]}` or a bare array. Each entry must be an object with
/// an integer `page`; `Doc Type` defaults to empty (and so lands in `other`).
/// Only string-valued fields are kept.
pub fn parse_classified_pages(
    output: &Value,
) -> Result<Vec<ClassifiedPage>, ClassificationFormatError> {
    let entries = match output {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get(PAGES_KEY) {
            Some(Value::Array(entries)) => entries,
            _ => return Err(ClassificationFormatError::NotACollection),
        },
        _ => return Err(ClassificationFormatError::NotACollection),
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let object = entry
                .as_object()
                .ok_or(ClassificationFormatError::EntryNotObject { index })?;

            let page = object
                .get(PAGE_KEY)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(ClassificationFormatError::MissingPageNumber { index })?;

            let label = object
                .get(LABEL_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let fields = object
                .iter()
                .filter(|(key, _)| key.as_str() != PAGE_KEY && key.as_str() != LABEL_KEY)
                .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                .collect();

            Ok(ClassifiedPage {
                page,
                label,
                fields,
            })
        })
        .collect()
}
