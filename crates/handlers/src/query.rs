//! Checks shared by every tag query translator.

use crate::error::TranslationError;
use lakeside_core::Tag;

/// Reject predicates no backend can express.
pub fn check_tags(tags: &[Tag]) -> Result<(), TranslationError> {
    match tags.iter().position(|tag| tag.name.is_empty()) {
        Some(position) => Err(TranslationError::EmptyTagName { position }),
        None => Ok(()),
    }
}
