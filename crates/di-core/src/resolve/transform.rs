use strum::{AsRefStr, EnumString};

use crate::model::FieldValue;

/// Post-selection rewrite applied to a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Transform {
    /// `yes` becomes `false`, anything else `true`.
    InvertYesNo,
    Uppercase,
    Lowercase,
    TitleCase,
}

impl Transform {
    pub fn apply(&self, value: &str) -> FieldValue {
        match self {
            Transform::InvertYesNo => FieldValue::Bool(!value.trim().eq_ignore_ascii_case("yes")),
            Transform::Uppercase => FieldValue::Text(value.to_uppercase()),
            Transform::Lowercase => FieldValue::Text(value.to_lowercase()),
            Transform::TitleCase => FieldValue::Text(title_case(value)),
        }
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
