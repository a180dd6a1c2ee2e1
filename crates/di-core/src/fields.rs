//! Canonical document groups and the field identifiers each group may carry.
//!
//! Classifier output arrives as free-form `label -> value` maps. Once a page is
//! bucketed into a group, its map is narrowed into [`DocumentFields`], which
//! only admits that group's known fields. Mapping rules refer to fields through
//! [`SourceField`], validated when the configuration is loaded.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupKey {
    IdentityCard,
    DrivingPermit,
    VehicleRegistration,
    /// Reserved bucket for labels no group claims.
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, EnumIter, IntoStaticStr,
)]
pub enum IdentityCardField {
    #[strum(serialize = "ID Number")]
    IdNumber,
    #[strum(serialize = "First Name")]
    FirstName,
    #[strum(serialize = "Last Name")]
    LastName,
    #[strum(serialize = "Nationality")]
    Nationality,
    #[strum(serialize = "Gender")]
    Gender,
    #[strum(serialize = "Date Of Birth")]
    DateOfBirth,
    #[strum(serialize = "ID Issue Date")]
    IssueDate,
    #[strum(serialize = "ID Expiry Date")]
    ExpiryDate,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, EnumIter, IntoStaticStr,
)]
pub enum DrivingPermitField {
    #[strum(serialize = "License Number")]
    LicenseNumber,
    #[strum(serialize = "Issue Date")]
    IssueDate,
    #[strum(serialize = "Expiry Date")]
    ExpiryDate,
    #[strum(serialize = "Traffic Code")]
    TrafficCode,
    #[strum(serialize = "Place Of Issue")]
    PlaceOfIssue,
    #[strum(serialize = "Category")]
    Category,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, EnumIter, IntoStaticStr,
)]
pub enum VehicleRegistrationField {
    #[strum(serialize = "Vehicle Year")]
    Year,
    #[strum(serialize = "Vehicle Make")]
    Make,
    #[strum(serialize = "Vehicle Model")]
    Model,
    #[strum(serialize = "Vehicle Color")]
    Color,
    #[strum(serialize = "Chassis Number")]
    ChassisNumber,
    #[strum(serialize = "Engine Number")]
    EngineNumber,
    #[strum(serialize = "Plate Number")]
    PlateNumber,
    #[strum(serialize = "No of Seat")]
    Seats,
    #[strum(serialize = "No of Cylinder")]
    Cylinders,
    #[strum(serialize = "Registration Expiry Date")]
    RegistrationExpiryDate,
    #[strum(serialize = "Insurance Expiry Date")]
    InsuranceExpiryDate,
}

/// A field of a specific group, as referenced by a mapping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceField {
    IdentityCard(IdentityCardField),
    DrivingPermit(DrivingPermitField),
    VehicleRegistration(VehicleRegistrationField),
}

impl SourceField {
    /// Resolve a field label within a group. `None` for unknown labels and for
    /// the `other` group, which carries no fields.
    pub fn parse(group: GroupKey, label: &str) -> Option<Self> {
        match group {
            GroupKey::IdentityCard => IdentityCardField::from_str(label)
                .ok()
                .map(SourceField::IdentityCard),
            GroupKey::DrivingPermit => DrivingPermitField::from_str(label)
                .ok()
                .map(SourceField::DrivingPermit),
            GroupKey::VehicleRegistration => VehicleRegistrationField::from_str(label)
                .ok()
                .map(SourceField::VehicleRegistration),
            GroupKey::Other => None,
        }
    }

    pub fn group(&self) -> GroupKey {
        match self {
            SourceField::IdentityCard(_) => GroupKey::IdentityCard,
            SourceField::DrivingPermit(_) => GroupKey::DrivingPermit,
            SourceField::VehicleRegistration(_) => GroupKey::VehicleRegistration,
        }
    }

    pub fn label(&self) -> &'static str {
        match *self {
            SourceField::IdentityCard(field) => field.into(),
            SourceField::DrivingPermit(field) => field.into(),
            SourceField::VehicleRegistration(field) => field.into(),
        }
    }
}

/// Page fields narrowed to the page's group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFields {
    IdentityCard(BTreeMap<IdentityCardField, String>),
    DrivingPermit(BTreeMap<DrivingPermitField, String>),
    VehicleRegistration(BTreeMap<VehicleRegistrationField, String>),
    Other,
}

fn narrow<F>(group: GroupKey, raw: &BTreeMap<String, String>) -> BTreeMap<F, String>
where
    F: FromStr + Ord,
{
    raw.iter()
        .filter_map(|(label, value)| match F::from_str(label) {
            Ok(field) => Some((field, value.clone())),
            Err(_) => {
                debug!(group = group.as_ref(), field = %label, "dropping unknown page field");
                None
            }
        })
        .collect()
}

impl DocumentFields {
    pub fn from_raw(group: GroupKey, raw: &BTreeMap<String, String>) -> Self {
        match group {
            GroupKey::IdentityCard => DocumentFields::IdentityCard(narrow(group, raw)),
            GroupKey::DrivingPermit => DocumentFields::DrivingPermit(narrow(group, raw)),
            GroupKey::VehicleRegistration => {
                DocumentFields::VehicleRegistration(narrow(group, raw))
            }
            GroupKey::Other => DocumentFields::Other,
        }
    }

    pub fn group(&self) -> GroupKey {
        match self {
            DocumentFields::IdentityCard(_) => GroupKey::IdentityCard,
            DocumentFields::DrivingPermit(_) => GroupKey::DrivingPermit,
            DocumentFields::VehicleRegistration(_) => GroupKey::VehicleRegistration,
            DocumentFields::Other => GroupKey::Other,
        }
    }

    /// Whether the page carries the field at all (empty values included).
    pub fn contains(&self, field: SourceField) -> bool {
        self.get(field).is_some()
    }

    pub fn get(&self, field: SourceField) -> Option<&str> {
        let value = match (self, field) {
            (DocumentFields::IdentityCard(map), SourceField::IdentityCard(f)) => map.get(&f),
            (DocumentFields::DrivingPermit(map), SourceField::DrivingPermit(f)) => map.get(&f),
            (DocumentFields::VehicleRegistration(map), SourceField::VehicleRegistration(f)) => {
                map.get(&f)
            }
            _ => None,
        };
        value.map(String::as_str)
    }
}
