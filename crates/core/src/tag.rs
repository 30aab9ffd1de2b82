//! Tags attached to blobs and used as query predicates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A name/value metadata pair.
///
/// Equality is exact on both fields: no case folding, no trimming, and an
/// absent value only equals another absent value. Tag sets may contain the
/// same name more than once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl Tag {
    /// Create a tag with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a tag without a value.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Borrow the value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether this tag matches some entry of either tag set.
    pub fn is_in_either(&self, user_tags: &[Tag], system_tags: &[Tag]) -> bool {
        user_tags.contains(self) || system_tags.contains(self)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Reference matching rule shared by every backend: each requested tag must
/// appear in the user tags or in the system tags.
pub fn matches_all(query: &[Tag], user_tags: &[Tag], system_tags: &[Tag]) -> bool {
    query
        .iter()
        .all(|tag| tag.is_in_either(user_tags, system_tags))
}

/// Find the first tag with the given name.
pub fn find<'a>(tags: &'a [Tag], name: &str) -> Option<&'a Tag> {
    tags.iter().find(|tag| tag.name == name)
}
