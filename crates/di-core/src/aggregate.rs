use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::classification::ClassifiedPage;
use crate::config::IntakeConfig;
use crate::fields::{DocumentFields, GroupKey, SourceField};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedPage {
    pub page: u32,
    pub label: String,
    pub fields: DocumentFields,
}

/// Classified pages bucketed by canonical group, each bucket in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageGroups {
    groups: BTreeMap<GroupKey, Vec<GroupedPage>>,
}

impl PageGroups {
    pub fn pages(&self, key: GroupKey) -> &[GroupedPage] {
        self.groups.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupKey, &[GroupedPage])> {
        self.groups.iter().map(|(key, pages)| (*key, pages.as_slice()))
    }

    /// Groups that can feed field resolution (everything but `other`).
    pub fn resolvable_count(&self) -> usize {
        self.groups
            .keys()
            .filter(|key| **key != GroupKey::Other)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Reverse lookup from a classifier label to its group.
#[derive(Debug, Clone)]
pub struct AliasIndex {
    by_alias: HashMap<String, GroupKey>,
}

impl AliasIndex {
    pub fn new(config: &IntakeConfig) -> Self {
        let by_alias = config
            .groups
            .iter()
            .flat_map(|group| group.aliases.iter().map(|alias| (alias.clone(), group.key)))
            .collect();
        Self { by_alias }
    }

    /// Exact, case-sensitive lookup after trimming; unmatched labels go to `other`.
    pub fn group_for(&self, label: &str) -> GroupKey {
        self.by_alias
            .get(label.trim())
            .copied()
            .unwrap_or(GroupKey::Other)
    }
}

pub fn aggregate_pages(pages: &[ClassifiedPage], config: &IntakeConfig) -> PageGroups {
    let index = AliasIndex::new(config);
    let mut groups: BTreeMap<GroupKey, Vec<GroupedPage>> = BTreeMap::new();

    for page in pages {
        let key = index.group_for(&page.label);
        if key == GroupKey::Other {
            debug!(page = page.page, label = %page.label, "page label matched no group");
        }
        groups.entry(key).or_default().push(GroupedPage {
            page: page.page,
            label: page.label.clone(),
            fields: DocumentFields::from_raw(key, &page.fields),
        });
    }

    PageGroups { groups }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFieldGap {
    pub group: GroupKey,
    pub page: u32,
    pub missing: Vec<SourceField>,
}

/// Report pages that lack any of their group's required fields. Never fails.
pub fn required_field_gaps(groups: &PageGroups, config: &IntakeConfig) -> Vec<RequiredFieldGap> {
    let mut gaps = Vec::new();

    for (key, pages) in groups.iter() {
        let Some(group) = config.group(key) else {
            continue;
        };
        if group.required_fields.is_empty() {
            continue;
        }

        for page in pages {
            let missing: Vec<SourceField> = group
                .required_fields
                .iter()
                .copied()
                .filter(|field| {
                    page.fields
                        .get(*field)
                        .is_none_or(|value| value.trim().is_empty())
                })
                .collect();

            if missing.is_empty() {
                continue;
            }

            let labels: Vec<&str> = missing.iter().map(SourceField::label).collect();
            warn!(
                group = key.as_ref(),
                page = page.page,
                missing = ?labels,
                "page is missing required fields"
            );
            gaps.push(RequiredFieldGap {
                group: key,
                page: page.page,
                missing,
            });
        }
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE_CONFIG;
    use crate::fields::{DrivingPermitField, IdentityCardField};

    fn config() -> IntakeConfig {
        IntakeConfig::from_json_str(SAMPLE_CONFIG).unwrap()
    }

    #[test]
    fn buckets_pages_by_alias_in_input_order() {
        let pages = vec![
            ClassifiedPage::new(1, "Emirates ID").with_field("First Name", "Aisha"),
            ClassifiedPage::new(2, "Driving License"),
            ClassifiedPage::new(3, " Emirates ID Back "),
            ClassifiedPage::new(4, "Passport"),
        ];

        let groups = aggregate_pages(&pages, &config());
        let identity: Vec<u32> = groups
            .pages(GroupKey::IdentityCard)
            .iter()
            .map(|p| p.page)
            .collect();
        assert_eq!(identity, vec![1, 3]);
        assert_eq!(groups.pages(GroupKey::DrivingPermit).len(), 1);
        assert_eq!(groups.pages(GroupKey::Other)[0].page, 4);
        assert_eq!(groups.resolvable_count(), 2);
        assert!(groups.pages(GroupKey::VehicleRegistration).is_empty());
    }

    #[test]
    fn alias_matching_is_case_sensitive() {
        let index = AliasIndex::new(&config());
        assert_eq!(index.group_for("Emirates ID"), GroupKey::IdentityCard);
        assert_eq!(index.group_for("emirates id"), GroupKey::Other);
        assert_eq!(index.group_for(""), GroupKey::Other);
    }

    #[test]
    fn reports_missing_required_fields_per_page() {
        let pages = vec![
            ClassifiedPage::new(1, "Emirates ID").with_field("ID Number", "784-1990-1234567-1"),
            ClassifiedPage::new(2, "Driving License").with_field("License Number", "  "),
        ];
        let groups = aggregate_pages(&pages, &config());

        let gaps = required_field_gaps(&groups, &config());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].group, GroupKey::DrivingPermit);
        assert_eq!(gaps[0].page, 2);
        assert_eq!(
            gaps[0].missing,
            vec![
                SourceField::DrivingPermit(DrivingPermitField::LicenseNumber),
                SourceField::DrivingPermit(DrivingPermitField::ExpiryDate),
            ]
        );
        assert!(
            !gaps
                .iter()
                .any(|gap| gap.missing.contains(&SourceField::IdentityCard(IdentityCardField::IdNumber)))
        );
    }
}
