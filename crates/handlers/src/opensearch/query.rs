//! Tag query translation to the OpenSearch query DSL.
//!
//! Tags are indexed as `nested` objects so that name and value are matched on
//! the same tag entry. Each requested tag becomes
//!
//! ```text
//! bool.should [ nested(user_tags, name AND value), nested(system_tags, name AND value) ]
//! ```
//!
//! with `minimum_should_match: 1`, and the per-tag clauses are combined under
//! `bool.must`. Values travel as JSON literals in the request body.

use crate::error::TranslationError;
use crate::query::check_tags;
use lakeside_core::Tag;
use serde_json::{Value, json};

/// OpenSearch default `indices.query.bool.max_clause_count`.
pub const MAX_CLAUSES: usize = 1024;

/// Query clauses generated per requested tag: the outer `bool`, and for each
/// tag category a `nested` query, its `bool` and two leaf queries (`term` on
/// name, plus `term` on value or `must_not` `exists`).
const CLAUSES_PER_TAG: usize = 1 + TAG_FIELDS.len() * 4;

pub const TAG_FIELDS: [&str; 2] = ["user_tags", "system_tags"];

/// Build the search request body for `tags`, returning at most `size` hits
/// sorted by id.
pub fn translate(tags: &[Tag], size: usize) -> Result<Value, TranslationError> {
    check_tags(tags)?;

    // Top-level `bool` or `match_all`, then the per-tag clauses.
    let clauses = 1 + tags.len() * CLAUSES_PER_TAG;
    if clauses > MAX_CLAUSES {
        return Err(TranslationError::TooManyClauses {
            clauses,
            limit: MAX_CLAUSES,
        });
    }

    let query = if tags.is_empty() {
        json!({ "match_all": {} })
    } else {
        let must: Vec<Value> = tags.iter().map(tag_clause).collect();
        json!({ "bool": { "must": must } })
    };

    Ok(json!({
        "size": size,
        "sort": [{ "id": { "order": "asc" } }],
        "query": query,
    }))
}

fn tag_clause(tag: &Tag) -> Value {
    let should: Vec<Value> = TAG_FIELDS
        .iter()
        .map(|field| nested_match(field, tag))
        .collect();

    json!({
        "bool": {
            "should": should,
            "minimum_should_match": 1,
        }
    })
}

fn nested_match(path: &str, tag: &Tag) -> Value {
    let name_field = format!("{path}.name");
    let value_field = format!("{path}.value");

    let inner = match tag.value() {
        Some(value) => json!({
            "bool": {
                "must": [
                    { "term": { name_field: tag.name } },
                    { "term": { value_field: value } },
                ]
            }
        }),
        None => json!({
            "bool": {
                "must": [{ "term": { name_field: tag.name } }],
                "must_not": [{ "exists": { "field": value_field } }],
            }
        }),
    };

    json!({
        "nested": {
            "path": path,
            "query": inner,
        }
    })
}

/// Index mapping the search queries rely on. Applied by
/// [`SearchIndex::ensure_index`](super::SearchIndex::ensure_index) when the
/// tenant index does not exist yet.
pub fn index_mapping() -> Value {
    let tag = json!({
        "type": "nested",
        "properties": {
            "name": { "type": "keyword" },
            "value": { "type": "keyword" },
        }
    });

    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "name": { "type": "keyword" },
                "content_type": { "type": "keyword" },
                "timestamp": { "type": "date" },
                "source": { "type": "keyword" },
                "size": { "type": "long" },
                "user_tags": tag.clone(),
                "system_tags": tag,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_matches_all() {
        let body = translate(&[], 1500).unwrap();
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert_eq!(body["size"], 1500);
        assert_eq!(body["sort"][0]["id"]["order"], "asc");
    }

    #[test]
    fn test_tag_clause_structure() {
        let body = translate(&[Tag::new("env", "prod")], 10).unwrap();
        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 1);

        let should = must[0]["bool"]["should"].as_array().unwrap();
        assert_eq!(must[0]["bool"]["minimum_should_match"], 1);
        assert_eq!(should.len(), 2);
        assert_eq!(should[0]["nested"]["path"], "user_tags");
        assert_eq!(should[1]["nested"]["path"], "system_tags");
        assert_eq!(
            should[0]["nested"]["query"]["bool"]["must"],
            json!([
                { "term": { "user_tags.name": "env" } },
                { "term": { "user_tags.value": "prod" } },
            ])
        );
    }

    #[test]
    fn test_absent_value_requires_missing_value_field() {
        let body = translate(&[Tag::bare("draft")], 10).unwrap();
        let nested = &body["query"]["bool"]["must"][0]["bool"]["should"][1]["nested"]["query"];
        assert_eq!(
            nested["bool"]["must_not"],
            json!([{ "exists": { "field": "system_tags.value" } }])
        );
    }

    #[test]
    fn test_values_are_literals_not_query_syntax() {
        let tag = Tag::new("q", "\" OR 1=1 *");
        let body = translate(std::slice::from_ref(&tag), 10).unwrap();
        let term = &body["query"]["bool"]["must"][0]["bool"]["should"][0]["nested"]["query"]["bool"]
            ["must"][1]["term"]["user_tags.value"];
        assert_eq!(term, "\" OR 1=1 *");
    }

    /// Count query objects: every `bool`, `nested`, `term`, `exists` and
    /// `match_all` in the body.
    fn count_clauses(query: &Value) -> usize {
        let Some(map) = query.as_object() else {
            return 0;
        };
        let Some((kind, args)) = map.iter().next() else {
            return 0;
        };
        let children = match kind.as_str() {
            "bool" => ["must", "should", "must_not"]
                .iter()
                .filter_map(|key| args.get(*key).and_then(Value::as_array))
                .flatten()
                .map(count_clauses)
                .sum(),
            "nested" => count_clauses(&args["query"]),
            _ => 0,
        };
        1 + children
    }

    #[test]
    fn test_clause_count_matches_emitted_query() {
        for tags in [
            vec![],
            vec![Tag::new("env", "prod")],
            vec![Tag::new("env", "prod"), Tag::bare("draft"), Tag::new("team", "red")],
        ] {
            let body = translate(&tags, 10).unwrap();
            assert_eq!(
                count_clauses(&body["query"]),
                1 + tags.len() * CLAUSES_PER_TAG
            );
        }
    }

    #[test]
    fn test_clause_limit() {
        let max_tags = (MAX_CLAUSES - 1) / CLAUSES_PER_TAG;
        let tags: Vec<Tag> = (0..max_tags).map(|i| Tag::new(format!("t{i}"), "v")).collect();
        assert!(translate(&tags, 10).is_ok());

        let tags: Vec<Tag> = (0..=max_tags).map(|i| Tag::new(format!("t{i}"), "v")).collect();
        assert!(matches!(
            translate(&tags, 10),
            Err(TranslationError::TooManyClauses { limit: MAX_CLAUSES, .. })
        ));
    }

    #[test]
    fn test_empty_tag_name_rejected() {
        assert!(matches!(
            translate(&[Tag::new("", "x")], 10),
            Err(TranslationError::EmptyTagName { position: 0 })
        ));
    }

    #[test]
    fn test_mapping_declares_nested_tags() {
        let mapping = index_mapping();
        for field in TAG_FIELDS {
            assert_eq!(mapping["mappings"]["properties"][field]["type"], "nested");
        }
    }
}
