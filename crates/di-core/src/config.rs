//! Intake configuration.
//!
//! [`IntakeConfig`] is deserialized from JSON and validated once at startup;
//! every problem is reported as a [`ConfigError`] before any I/O happens.
//! [`WorkerSettings`] carries the runtime knobs read from the environment.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::fields::{GroupKey, SourceField};
use crate::model::FieldValue;
use crate::resolve::{ConflictPolicy, DEFAULT_SEPARATORS, Transform};

const DEFAULT_SOURCE_PRIORITY: i32 = 999;
const DEFAULT_DOCUMENT_STATUS: &str = "PENDING";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config section `{0}` is missing or empty")]
    EmptySection(&'static str),
    #[error("document type #{index} has an empty `{field}`")]
    EmptyDocumentTypeField { index: usize, field: &'static str },
    #[error("document type `{0}` is configured more than once")]
    DuplicateDocumentType(String),
    #[error("group `{0}` is configured more than once")]
    DuplicateGroup(String),
    #[error("group `{0}` has no aliases")]
    GroupWithoutAliases(String),
    #[error("alias `{alias}` is claimed by both `{first}` and `{second}`")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
    #[error("unknown field `{field}` for group `{group}` in {context}")]
    UnknownField {
        group: String,
        field: String,
        context: String,
    },
    #[error("mapping `{target}` reads from group `{group}`, which is not configured")]
    UnconfiguredGroup { target: String, group: String },
    #[error("`{0}` is not a valid column name")]
    InvalidColumnName(String),
    #[error("target `{0}` is mapped more than once")]
    DuplicateTarget(String),
    #[error("mapping `{0}` has neither a constant nor any sources")]
    RuleWithoutSources(String),
    #[error("mapping `{target}` uses unknown transform `{transform}`")]
    UnknownTransform { target: String, transform: String },
    #[error("mapping `{target}` uses unknown conflict policy `{policy}`")]
    UnknownPolicy { target: String, policy: String },
    #[error("mapping `{0}` uses prefer_separator with no separators")]
    EmptySeparators(String),
    #[error("essential field `{0}` is not the target of any mapping")]
    UnknownEssentialField(String),
    #[error("document status must not be empty")]
    EmptyDocumentStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    document_types: Vec<RawDocumentType>,
    #[serde(default)]
    groups: Vec<RawGroup>,
    #[serde(default)]
    field_mappings: Vec<RawFieldMapping>,
    #[serde(default)]
    essential_fields: Vec<String>,
    #[serde(default)]
    date_fields: Vec<String>,
    #[serde(default)]
    retention_days: Option<u32>,
    #[serde(default)]
    document_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocumentType {
    name: String,
    code: String,
    output_filename: String,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    key: GroupKey,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    required_fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    group: GroupKey,
    field: String,
    #[serde(default = "default_source_priority")]
    priority: i32,
}

fn default_source_priority() -> i32 {
    DEFAULT_SOURCE_PRIORITY
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPolicy {
    Id(String),
    Detailed {
        id: String,
        #[serde(default)]
        separators: Option<Vec<char>>,
    },
}

#[derive(Debug, Deserialize)]
struct RawFieldMapping {
    target: String,
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    constant: Option<FieldValue>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    conflict_policy: Option<RawPolicy>,
}

/// Output bucket for the final document builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentType {
    /// Exact classifier label whose pages make up this document.
    pub name: String,
    /// Stored in `processed_documents.document_type_code`.
    pub code: String,
    pub output_filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub key: GroupKey,
    pub aliases: Vec<String>,
    pub required_fields: Vec<SourceField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSource {
    pub field: SourceField,
    /// Lower wins.
    pub priority: i32,
}

impl FieldSource {
    pub fn group(&self) -> GroupKey {
        self.field.group()
    }

    /// `group.Field Label`, used in conflict records and logs.
    pub fn label(&self) -> String {
        format!("{}.{}", self.group().as_ref(), self.field.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMappingRule {
    pub target: String,
    /// Declaration order; the resolver sorts a copy by priority.
    pub sources: Vec<FieldSource>,
    pub constant: Option<FieldValue>,
    pub transform: Option<Transform>,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeConfig {
    pub document_types: Vec<DocumentType>,
    pub groups: Vec<GroupConfig>,
    pub field_mappings: Vec<FieldMappingRule>,
    pub essential_fields: Vec<String>,
    pub date_fields: BTreeSet<String>,
    pub retention_days: Option<u32>,
    pub document_status: String,
}

impl IntakeConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(raw)?;
        Self::validate(raw)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn group(&self, key: GroupKey) -> Option<&GroupConfig> {
        self.groups.iter().find(|group| group.key == key)
    }

    pub fn document_type(&self, name: &str) -> Option<&DocumentType> {
        self.document_types.iter().find(|doc_type| doc_type.name == name)
    }

    pub fn is_date_field(&self, column: &str) -> bool {
        self.date_fields.contains(column)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.document_types.is_empty() {
            return Err(ConfigError::EmptySection("document_types"));
        }
        if raw.groups.is_empty() {
            return Err(ConfigError::EmptySection("groups"));
        }
        if raw.field_mappings.is_empty() {
            return Err(ConfigError::EmptySection("field_mappings"));
        }

        let document_types = validate_document_types(raw.document_types)?;
        let groups = validate_groups(raw.groups)?;
        let configured: HashSet<GroupKey> = groups.iter().map(|group| group.key).collect();

        let mut targets = HashSet::new();
        let mut field_mappings = Vec::with_capacity(raw.field_mappings.len());
        for mapping in raw.field_mappings {
            let rule = validate_mapping(mapping, &configured)?;
            if !targets.insert(rule.target.clone()) {
                return Err(ConfigError::DuplicateTarget(rule.target));
            }
            field_mappings.push(rule);
        }

        for essential in &raw.essential_fields {
            if !targets.contains(essential) {
                return Err(ConfigError::UnknownEssentialField(essential.clone()));
            }
        }

        let date_fields = raw
            .date_fields
            .into_iter()
            .map(|column| validate_column(column.trim()))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let document_status = match raw.document_status {
            Some(status) if status.trim().is_empty() => {
                return Err(ConfigError::EmptyDocumentStatus);
            }
            Some(status) => status.trim().to_string(),
            None => DEFAULT_DOCUMENT_STATUS.to_string(),
        };

        Ok(Self {
            document_types,
            groups,
            field_mappings,
            essential_fields: raw.essential_fields,
            date_fields,
            retention_days: raw.retention_days,
            document_status,
        })
    }
}

fn validate_document_types(raw: Vec<RawDocumentType>) -> Result<Vec<DocumentType>, ConfigError> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(index, doc_type)| {
            let name = non_empty(index, "name", &doc_type.name)?;
            let code = non_empty(index, "code", &doc_type.code)?;
            let output_filename = non_empty(index, "output_filename", &doc_type.output_filename)?;
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateDocumentType(name));
            }
            Ok(DocumentType {
                name,
                code,
                output_filename,
            })
        })
        .collect()
}

fn non_empty(index: usize, field: &'static str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyDocumentTypeField { index, field });
    }
    Ok(trimmed.to_string())
}

fn validate_groups(raw: Vec<RawGroup>) -> Result<Vec<GroupConfig>, ConfigError> {
    let mut seen = HashSet::new();
    let mut alias_owner: HashMap<String, GroupKey> = HashMap::new();
    let mut groups = Vec::with_capacity(raw.len());

    for group in raw {
        let key_name = group.key.as_ref().to_string();
        if !seen.insert(group.key) {
            return Err(ConfigError::DuplicateGroup(key_name));
        }

        let aliases: Vec<String> = group
            .aliases
            .iter()
            .map(|alias| alias.trim().to_string())
            .filter(|alias| !alias.is_empty())
            .collect();
        if aliases.is_empty() {
            return Err(ConfigError::GroupWithoutAliases(key_name));
        }
        for alias in &aliases {
            if let Some(first) = alias_owner.insert(alias.clone(), group.key) {
                if first != group.key {
                    return Err(ConfigError::DuplicateAlias {
                        alias: alias.clone(),
                        first: first.as_ref().to_string(),
                        second: key_name,
                    });
                }
            }
        }

        let required_fields = group
            .required_fields
            .iter()
            .map(|field| {
                SourceField::parse(group.key, field.trim()).ok_or_else(|| {
                    ConfigError::UnknownField {
                        group: key_name.clone(),
                        field: field.clone(),
                        context: "required_fields".to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        groups.push(GroupConfig {
            key: group.key,
            aliases,
            required_fields,
        });
    }

    Ok(groups)
}

fn validate_mapping(
    raw: RawFieldMapping,
    configured: &HashSet<GroupKey>,
) -> Result<FieldMappingRule, ConfigError> {
    let target = validate_column(raw.target.trim())?;

    if raw.constant.is_none() && raw.sources.is_empty() {
        return Err(ConfigError::RuleWithoutSources(target));
    }

    let sources = raw
        .sources
        .iter()
        .map(|source| {
            let field = SourceField::parse(source.group, source.field.trim()).ok_or_else(|| {
                ConfigError::UnknownField {
                    group: source.group.as_ref().to_string(),
                    field: source.field.clone(),
                    context: format!("mapping `{target}`"),
                }
            })?;
            if !configured.contains(&source.group) {
                return Err(ConfigError::UnconfiguredGroup {
                    target: target.clone(),
                    group: source.group.as_ref().to_string(),
                });
            }
            Ok(FieldSource {
                field,
                priority: source.priority,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let transform = raw
        .transform
        .as_deref()
        .map(|id| {
            Transform::from_str(id.trim()).map_err(|_| ConfigError::UnknownTransform {
                target: target.clone(),
                transform: id.to_string(),
            })
        })
        .transpose()?;

    let conflict_policy = match raw.conflict_policy {
        None => ConflictPolicy::Priority,
        Some(RawPolicy::Id(id)) => parse_policy(&target, &id, None)?,
        Some(RawPolicy::Detailed { id, separators }) => parse_policy(&target, &id, separators)?,
    };

    Ok(FieldMappingRule {
        target,
        sources,
        constant: raw.constant,
        transform,
        conflict_policy,
    })
}

fn parse_policy(
    target: &str,
    id: &str,
    separators: Option<Vec<char>>,
) -> Result<ConflictPolicy, ConfigError> {
    match id.trim() {
        "priority" => Ok(ConflictPolicy::Priority),
        "prefer_latin" => Ok(ConflictPolicy::PreferLatin),
        "prefer_separator" => {
            let separators = separators.unwrap_or_else(|| DEFAULT_SEPARATORS.to_vec());
            if separators.is_empty() {
                return Err(ConfigError::EmptySeparators(target.to_string()));
            }
            Ok(ConflictPolicy::PreferSeparator { separators })
        }
        other => Err(ConfigError::UnknownPolicy {
            target: target.to_string(),
            policy: other.to_string(),
        }),
    }
}

static COLUMN_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Customer columns are interpolated into SQL, so only plain identifiers pass.
pub(crate) fn is_column_identifier(name: &str) -> bool {
    COLUMN_NAME_RE.is_match(name)
}

fn validate_column(name: &str) -> Result<String, ConfigError> {
    if is_column_identifier(name) {
        Ok(name.to_string())
    } else {
        Err(ConfigError::InvalidColumnName(name.to_string()))
    }
}

/// Runtime knobs for the worker loop, read from `DI_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub idle_poll_interval: Duration,
    pub error_backoff: Duration,
    pub notification_capacity: usize,
    pub scratch_dir: PathBuf,
    pub blob_container: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            idle_poll_interval: Duration::from_millis(2_500),
            error_backoff: Duration::from_millis(5_000),
            notification_capacity: 64,
            scratch_dir: std::env::temp_dir().join("document-intake"),
            blob_container: "documents".into(),
        }
    }
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(default)
        }

        fn parse_string(key: &str, default: String) -> String {
            std::env::var(key)
                .ok()
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .unwrap_or(default)
        }

        let defaults = Self::default();

        let idle_ms = parse_u64(
            "DI_IDLE_POLL_INTERVAL_MS",
            defaults.idle_poll_interval.as_millis() as u64,
        );
        let backoff_ms = parse_u64("DI_ERROR_BACKOFF_MS", defaults.error_backoff.as_millis() as u64);
        let capacity = parse_u64(
            "DI_NOTIFICATION_QUEUE_CAPACITY",
            defaults.notification_capacity as u64,
        )
        .max(1);

        let scratch_dir = std::env::var_os("DI_SCRATCH_DIR")
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.scratch_dir);

        Self {
            idle_poll_interval: Duration::from_millis(idle_ms),
            error_backoff: Duration::from_millis(backoff_ms),
            notification_capacity: usize::try_from(capacity).unwrap_or(usize::MAX),
            scratch_dir,
            blob_container: parse_string("DI_BLOB_CONTAINER", defaults.blob_container),
        }
    }
}
