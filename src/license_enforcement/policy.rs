use std::collections::HashSet;

pub const DEFAULT_ALLOWED_IDENTIFIERS: &[&str] = &["b2a9be8c7159d8de", "f28fa9cb89609e6e"];
pub const DEFAULT_ALLOWED_PREFIX: &str = "lincosdemo";

/// Immutable set of devices permitted to run the application.
///
/// Identifiers and the prefix are lowercased at construction so matching is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    allowed_identifiers: HashSet<String>,
    allowed_prefix: String,
}

impl Policy {
    pub fn new<I, S>(allowed_identifiers: I, allowed_prefix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_identifiers: allowed_identifiers
                .into_iter()
                .map(|identifier| identifier.as_ref().trim().to_lowercase())
                .collect(),
            allowed_prefix: allowed_prefix.trim().to_lowercase(),
        }
    }

    /// Returns true if the identifier is on the allow-list or starts with
    /// the allowed prefix.
    ///
    /// An empty prefix matches nothing. This is stricter than a bare
    /// `starts_with` test, under which an empty prefix admits every
    /// identifier.
    pub fn is_allowed(&self, identifier: &str) -> bool {
        let identifier = identifier.to_lowercase();

        if self.allowed_identifiers.contains(&identifier) {
            return true;
        }

        !self.allowed_prefix.is_empty()
            && identifier.starts_with(&self.allowed_prefix.to_lowercase())
    }

    pub fn allowed_prefix(&self) -> &str {
        &self.allowed_prefix
    }

    pub fn allowed_identifiers(&self) -> impl Iterator<Item = &str> {
        self.allowed_identifiers.iter().map(String::as_str)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_IDENTIFIERS, DEFAULT_ALLOWED_PREFIX)
    }
}
