use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix added to a kind to name its default sequence.
pub const SEQUENCE_POSTFIX: &str = "_SEQUENCE__";

/// Names the sequence an allocation draws from.
///
/// The appendage is an explicit suffix for callers that need separate id
/// spaces for the same kind (for example, isolated test runs). It is carried
/// by value, so two contexts for the same kind never interfere.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceContext {
    base: String,
    appendage: String,
}

impl SequenceContext {
    /// The default sequence for a kind: `<kind>_SEQUENCE__`.
    pub fn for_kind(kind: &str) -> Self {
        Self {
            base: format!("{kind}{SEQUENCE_POSTFIX}"),
            appendage: String::new(),
        }
    }

    /// An explicitly named sequence.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            base: name.into(),
            appendage: String::new(),
        }
    }

    pub fn with_appendage(mut self, appendage: impl Into<String>) -> Self {
        self.appendage = appendage.into();
        self
    }

    pub fn appendage(&self) -> &str {
        &self.appendage
    }

    /// Full sequence name as reserved against the store.
    pub fn name(&self) -> String {
        format!("{}{}", self.base, self.appendage)
    }
}

impl fmt::Display for SequenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.appendage)
    }
}
