//! Tag query translation to a DynamoDB scan filter.
//!
//! Each requested tag is bound to one placeholder `:tagN` holding the tag as a
//! `{name, value}` map, and matched with `contains` against both tag lists:
//!
//! ```text
//! (contains(#user_tags, :tag0) OR contains(#system_tags, :tag0)) AND ...
//! ```
//!
//! Tag text only ever appears in the expression attribute values.

use crate::dynamodb::item::tag_attribute;
use crate::error::TranslationError;
use crate::query::check_tags;
use aws_sdk_dynamodb::types::AttributeValue;
use lakeside_core::Tag;
use std::collections::HashMap;

/// DynamoDB limit on the length of any expression.
pub const MAX_EXPRESSION_BYTES: usize = 4096;

pub const USER_TAGS_PLACEHOLDER: &str = "#user_tags";
pub const SYSTEM_TAGS_PLACEHOLDER: &str = "#system_tags";

/// A rendered scan filter.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanFilter {
    expression: String,
    values: HashMap<String, AttributeValue>,
    clauses: usize,
}

impl ScanFilter {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn attribute_names(&self) -> HashMap<String, String> {
        HashMap::from([
            (USER_TAGS_PLACEHOLDER.to_string(), "user_tags".to_string()),
            (SYSTEM_TAGS_PLACEHOLDER.to_string(), "system_tags".to_string()),
        ])
    }

    pub fn attribute_values(&self) -> &HashMap<String, AttributeValue> {
        &self.values
    }

    /// Number of per-tag clauses; clause `n` is bound to [`value_placeholder`]`(n)`.
    pub fn clause_count(&self) -> usize {
        self.clauses
    }
}

/// Placeholder bound to the tag of clause `n`.
pub fn value_placeholder(n: usize) -> String {
    format!(":tag{n}")
}

/// Build the scan filter for `tags`. An empty tag list needs no filter.
pub fn translate(tags: &[Tag]) -> Result<Option<ScanFilter>, TranslationError> {
    check_tags(tags)?;
    if tags.is_empty() {
        return Ok(None);
    }

    let mut clauses = Vec::with_capacity(tags.len());
    let mut values = HashMap::with_capacity(tags.len());
    for (n, tag) in tags.iter().enumerate() {
        let placeholder = value_placeholder(n);
        clauses.push(format!(
            "(contains({USER_TAGS_PLACEHOLDER}, {placeholder}) OR contains({SYSTEM_TAGS_PLACEHOLDER}, {placeholder}))"
        ));
        values.insert(placeholder, tag_attribute(tag));
    }

    let expression = clauses.join(" AND ");
    if expression.len() > MAX_EXPRESSION_BYTES {
        return Err(TranslationError::ExpressionTooLong {
            length: expression.len(),
            limit: MAX_EXPRESSION_BYTES,
        });
    }

    Ok(Some(ScanFilter {
        expression,
        values,
        clauses: tags.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tags_need_no_filter() {
        assert_eq!(translate(&[]).unwrap(), None);
    }

    #[test]
    fn test_expression_shape() {
        let filter = translate(&[Tag::new("a", "1"), Tag::new("b", "2")])
            .unwrap()
            .unwrap();

        assert_eq!(
            filter.expression(),
            "(contains(#user_tags, :tag0) OR contains(#system_tags, :tag0)) AND \
             (contains(#user_tags, :tag1) OR contains(#system_tags, :tag1))"
        );
        assert_eq!(filter.clause_count(), 2);
        assert_eq!(filter.attribute_names()["#system_tags"], "system_tags");
        assert_eq!(
            filter.attribute_values()[":tag1"],
            tag_attribute(&Tag::new("b", "2"))
        );
    }

    #[test]
    fn test_values_never_reach_the_expression() {
        let filter = translate(&[Tag::new("x) OR (1", "y")]).unwrap().unwrap();
        assert!(!filter.expression().contains("x) OR (1"));
    }

    #[test]
    fn test_expression_length_limit() {
        // Each clause renders to about 64 bytes plus 5 for the joining " AND ".
        let tags: Vec<Tag> = (0..100).map(|i| Tag::new(format!("t{i}"), "v")).collect();
        match translate(&tags) {
            Err(TranslationError::ExpressionTooLong { length, limit }) => {
                assert!(length > limit);
                assert_eq!(limit, MAX_EXPRESSION_BYTES);
            }
            other => panic!("expected ExpressionTooLong, got {other:?}"),
        }

        let tags: Vec<Tag> = (0..40).map(|i| Tag::new(format!("t{i}"), "v")).collect();
        assert!(translate(&tags).is_ok());
    }

    #[test]
    fn test_empty_tag_name_rejected() {
        assert_eq!(
            translate(&[Tag::new("ok", "1"), Tag::bare("")]),
            Err(TranslationError::EmptyTagName { position: 1 })
        );
    }
}
