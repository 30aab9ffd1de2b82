//! Tag query translation to parameterized Cosmos DB SQL.
//!
//! Each requested tag becomes
//!
//! ```text
//! (EXISTS(SELECT VALUE t FROM t IN c.user_tags WHERE t["name"] = @name_N AND t["value"] = @value_N)
//!  OR EXISTS(SELECT VALUE t FROM t IN c.system_tags WHERE ...))
//! ```
//!
//! and the clauses are joined with `AND`. Names and values are bound as
//! parameters only.
//!
//! Queries carry no `ORDER BY`: the gateway cannot serve an ordered
//! cross-partition query, so the handler sorts results by id instead.

use crate::error::TranslationError;
use crate::query::check_tags;
use lakeside_core::Tag;
use serde::Serialize;
use serde_json::Value;

/// A query in the shape of the Cosmos DB REST query body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentQuery {
    pub query: String,
    pub parameters: Vec<QueryParameter>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

impl DocumentQuery {
    /// Look up a bound parameter by name (including the `@`).
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

pub fn name_parameter(n: usize) -> String {
    format!("@name_{n}")
}

pub fn value_parameter(n: usize) -> String {
    format!("@value_{n}")
}

fn tag_exists(field: &str, n: usize, has_value: bool) -> String {
    let value_test = if has_value {
        format!("t[\"value\"] = {}", value_parameter(n))
    } else {
        "(NOT IS_DEFINED(t[\"value\"]) OR IS_NULL(t[\"value\"]))".to_string()
    };
    format!(
        "EXISTS(SELECT VALUE t FROM t IN c.{field} WHERE t[\"name\"] = {} AND {value_test})",
        name_parameter(n)
    )
}

/// Build the metadata query for `tags`.
pub fn translate(tags: &[Tag]) -> Result<DocumentQuery, TranslationError> {
    check_tags(tags)?;

    let mut clauses = Vec::with_capacity(tags.len());
    let mut parameters = Vec::with_capacity(tags.len() * 2);
    for (n, tag) in tags.iter().enumerate() {
        let has_value = tag.value.is_some();
        clauses.push(format!(
            "({} OR {})",
            tag_exists("user_tags", n, has_value),
            tag_exists("system_tags", n, has_value)
        ));

        parameters.push(QueryParameter {
            name: name_parameter(n),
            value: Value::String(tag.name.clone()),
        });
        if let Some(value) = &tag.value {
            parameters.push(QueryParameter {
                name: value_parameter(n),
                value: Value::String(value.clone()),
            });
        }
    }

    let query = if clauses.is_empty() {
        "SELECT * FROM c".to_string()
    } else {
        format!("SELECT * FROM c WHERE {}", clauses.join(" AND "))
    };

    Ok(DocumentQuery { query, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_query_selects_everything() {
        let query = translate(&[]).unwrap();
        assert_eq!(query.query, "SELECT * FROM c");
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn test_clause_per_tag_over_both_categories() {
        let query = translate(&[Tag::new("env", "prod"), Tag::bare("draft")]).unwrap();

        assert_eq!(
            query.query,
            "SELECT * FROM c WHERE \
             (EXISTS(SELECT VALUE t FROM t IN c.user_tags WHERE t[\"name\"] = @name_0 AND t[\"value\"] = @value_0) \
             OR EXISTS(SELECT VALUE t FROM t IN c.system_tags WHERE t[\"name\"] = @name_0 AND t[\"value\"] = @value_0)) \
             AND (EXISTS(SELECT VALUE t FROM t IN c.user_tags WHERE t[\"name\"] = @name_1 AND (NOT IS_DEFINED(t[\"value\"]) OR IS_NULL(t[\"value\"]))) \
             OR EXISTS(SELECT VALUE t FROM t IN c.system_tags WHERE t[\"name\"] = @name_1 AND (NOT IS_DEFINED(t[\"value\"]) OR IS_NULL(t[\"value\"]))))"
        );
        assert_eq!(query.parameter("@name_0"), Some(&json!("env")));
        assert_eq!(query.parameter("@value_0"), Some(&json!("prod")));
        assert_eq!(query.parameter("@name_1"), Some(&json!("draft")));
        assert_eq!(query.parameter("@value_1"), None);
    }

    #[test]
    fn test_no_cross_partition_ordering() {
        for tags in [vec![], vec![Tag::new("env", "prod")]] {
            assert!(!translate(&tags).unwrap().query.contains("ORDER BY"));
        }
    }

    #[test]
    fn test_values_are_never_interpolated() {
        let hostile = "x' OR '1'='1";
        let query = translate(&[Tag::new("k", hostile)]).unwrap();
        assert!(!query.query.contains(hostile));
        assert_eq!(query.parameter("@value_0"), Some(&json!(hostile)));
    }

    #[test]
    fn test_serializes_as_rest_body() {
        let body = serde_json::to_value(translate(&[Tag::bare("draft")]).unwrap()).unwrap();
        assert_eq!(body["parameters"], json!([{"name": "@name_0", "value": "draft"}]));
        assert!(body["query"].as_str().unwrap().starts_with("SELECT * FROM c WHERE"));
    }

    #[test]
    fn test_empty_tag_name_rejected() {
        assert_eq!(
            translate(&[Tag::new("", "v")]),
            Err(TranslationError::EmptyTagName { position: 0 })
        );
    }
}
