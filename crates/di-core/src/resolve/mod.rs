//! Multi-source field resolution.
//!
//! Each mapping rule names a target customer column and the group fields that
//! may supply it. Sources are walked in priority order, one candidate per
//! source, and disagreements are recorded for audit rather than failing.

mod policy;
mod transform;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::PageGroups;
use crate::config::{FieldMappingRule, FieldSource, IntakeConfig};
use crate::model::FieldValue;

pub use policy::{ConflictPolicy, DEFAULT_SEPARATORS};
pub use transform::Transform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub value: String,
    /// `group.Field Label` of the source that produced the value.
    pub source: String,
    pub priority: i32,
}

/// Audit record for a target whose sources disagreed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictWarning {
    pub field: String,
    pub candidates: Vec<Candidate>,
    pub chosen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EssentialFieldMissingWarning {
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub updates: BTreeMap<String, FieldValue>,
    pub conflicts: Vec<ConflictWarning>,
    pub missing_essential: Vec<EssentialFieldMissingWarning>,
}

pub fn resolve_fields(groups: &PageGroups, config: &IntakeConfig) -> Resolution {
    let mut resolution = Resolution::default();

    for rule in &config.field_mappings {
        let (value, conflict) = resolve_rule(rule, groups);
        if let Some(conflict) = conflict {
            warn!(
                field = %conflict.field,
                chosen = %conflict.chosen,
                candidates = conflict.candidates.len(),
                "conflicting values across sources"
            );
            resolution.conflicts.push(conflict);
        }
        match value {
            Some(value) => {
                debug!(field = %rule.target, "resolved field");
                resolution.updates.insert(rule.target.clone(), value);
            }
            None => debug!(field = %rule.target, "no source produced a value"),
        }
    }

    let present: HashSet<&str> = resolution.updates.keys().map(String::as_str).collect();
    for essential in &config.essential_fields {
        if !present.contains(essential.as_str()) {
            warn!(field = %essential, "essential field missing");
            resolution.missing_essential.push(EssentialFieldMissingWarning {
                field: essential.clone(),
            });
        }
    }

    resolution
}

fn resolve_rule(
    rule: &FieldMappingRule,
    groups: &PageGroups,
) -> (Option<FieldValue>, Option<ConflictWarning>) {
    if let Some(constant) = &rule.constant {
        return (Some(constant.clone()), None);
    }

    let mut sources: Vec<&FieldSource> = rule.sources.iter().collect();
    sources.sort_by_key(|source| source.priority);

    let candidates: Vec<Candidate> = sources
        .into_iter()
        .filter_map(|source| {
            first_value(source, groups).map(|value| Candidate {
                value,
                source: source.label(),
                priority: source.priority,
            })
        })
        .collect();

    let chosen = match candidates.len() {
        0 => return (None, None),
        1 => 0,
        _ => {
            let values: Vec<&str> = candidates.iter().map(|c| c.value.as_str()).collect();
            rule.conflict_policy.choose(&values)
        }
    };
    let chosen_value = candidates[chosen].value.clone();

    let distinct: HashSet<&str> = candidates.iter().map(|c| c.value.as_str()).collect();
    let conflict = (distinct.len() > 1).then(|| ConflictWarning {
        field: rule.target.clone(),
        candidates: candidates.clone(),
        chosen: chosen_value.clone(),
    });

    let value = match rule.transform {
        Some(transform) => transform.apply(&chosen_value),
        None => FieldValue::Text(chosen_value),
    };

    (Some(value), conflict)
}

/// First non-empty trimmed value of the field across the group's pages.
fn first_value(source: &FieldSource, groups: &PageGroups) -> Option<String> {
    groups
        .pages(source.group())
        .iter()
        .filter_map(|page| page.fields.get(source.field))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
