/// How to pick among two or more candidates for one target field.
///
/// Candidates are always presented in priority order, so every policy falls
/// back to the first one when nothing matches its preference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Priority,
    /// First value carrying a Latin letter; used for bilingual name fields.
    PreferLatin,
    /// First value carrying one of the separators; used for formatted identifiers.
    PreferSeparator { separators: Vec<char> },
}

pub const DEFAULT_SEPARATORS: &[char] = &['-'];

impl ConflictPolicy {
    pub fn id(&self) -> &'static str {
        match self {
            ConflictPolicy::Priority => "priority",
            ConflictPolicy::PreferLatin => "prefer_latin",
            ConflictPolicy::PreferSeparator { .. } => "prefer_separator",
        }
    }

    /// Index of the chosen value. `values` must be non-empty.
    pub fn choose(&self, values: &[&str]) -> usize {
        let preferred = match self {
            ConflictPolicy::Priority => None,
            ConflictPolicy::PreferLatin => values
                .iter()
                .position(|value| value.chars().any(is_latin_letter)),
            ConflictPolicy::PreferSeparator { separators } => values
                .iter()
                .position(|value| value.chars().any(|c| separators.contains(&c))),
        };
        preferred.unwrap_or(0)
    }
}

/// ASCII letters plus Latin-1 Supplement and Latin Extended-A/B letters.
fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || (matches!(c, '\u{00C0}'..='\u{024F}') && c != '\u{00D7}' && c != '\u{00F7}')
}
