//! In-memory search index evaluating the OpenSearch query DSL subset the
//! translator emits: `match_all`, `bool`, `nested`, `term` and `exists`.
//!
//! Indexing into a missing index creates it with a dynamic mapping, under
//! which `nested` queries are rejected the way OpenSearch rejects them.

use crate::client::{ClientError, ClientResult};
use crate::opensearch::SearchIndex;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// OpenSearch default page size when a request has no `size`.
const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Default)]
enum IndexState {
    #[default]
    Missing,
    Dynamic,
    Mapped(Value),
}

#[derive(Default)]
pub struct MemorySearchIndex {
    state: RwLock<IndexState>,
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document(&self, id: &str) -> Option<Value> {
        self.documents.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Mapping applied when the index was created, if it was created explicitly.
    pub async fn mapping(&self) -> Option<Value> {
        match &*self.state.read().await {
            IndexState::Mapped(mapping) => Some(mapping.clone()),
            _ => None,
        }
    }
}

/// Collect the `path` of every `nested` query in `query`.
fn nested_paths<'a>(query: &'a Value, paths: &mut Vec<&'a str>) {
    match query {
        Value::Object(map) => {
            if let Some(path) = map
                .get("nested")
                .and_then(|nested| nested.get("path"))
                .and_then(Value::as_str)
            {
                paths.push(path);
            }
            for value in map.values() {
                nested_paths(value, paths);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| nested_paths(item, paths)),
        _ => {}
    }
}

fn check_nested_mapping(state: &IndexState, query: &Value) -> ClientResult<()> {
    let mut paths = Vec::new();
    nested_paths(query, &mut paths);

    for path in paths {
        let nested = match state {
            IndexState::Mapped(mapping) => {
                mapping["mappings"]["properties"][path]["type"] == "nested"
            }
            _ => false,
        };
        if !nested {
            return Err(ClientError::Status {
                status: 400,
                body: format!("[nested] nested object under path [{path}] is not of nested type"),
            });
        }
    }
    Ok(())
}

fn single_entry<'a>(value: &'a Value, what: &str) -> ClientResult<(&'a str, &'a Value)> {
    match value.as_object() {
        Some(map) if map.len() == 1 => map
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ClientError::Rejected(format!("empty {what}"))),
        _ => Err(ClientError::Rejected(format!(
            "{what} must be an object with one key: {value}"
        ))),
    }
}

/// Resolve a field, looking inside the current nested object first.
fn resolve<'a>(field: &str, doc: &'a Value, scope: Option<(&str, &'a Value)>) -> Option<&'a Value> {
    if let Some((path, element)) = scope
        && let Some(rest) = field.strip_prefix(path).and_then(|r| r.strip_prefix('.'))
    {
        return element.get(rest);
    }
    doc.get(field)
}

fn clauses(args: &Value, key: &str) -> Vec<Value> {
    match args.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    }
}

fn eval(query: &Value, doc: &Value, scope: Option<(&str, &Value)>) -> ClientResult<bool> {
    let (kind, args) = single_entry(query, "query")?;

    match kind {
        "match_all" => Ok(true),
        "bool" => {
            let must = clauses(args, "must");
            let should = clauses(args, "should");
            let must_not = clauses(args, "must_not");

            for clause in &must {
                if !eval(clause, doc, scope)? {
                    return Ok(false);
                }
            }
            for clause in &must_not {
                if eval(clause, doc, scope)? {
                    return Ok(false);
                }
            }

            if !should.is_empty() {
                let default_min = if must.is_empty() { 1 } else { 0 };
                let minimum = args
                    .get("minimum_should_match")
                    .and_then(Value::as_u64)
                    .map(|m| m as usize)
                    .unwrap_or(default_min);
                let mut matched = 0;
                for clause in &should {
                    if eval(clause, doc, scope)? {
                        matched += 1;
                    }
                }
                return Ok(matched >= minimum);
            }
            Ok(true)
        }
        "nested" => {
            let path = args
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::Rejected("nested query without path".to_string()))?;
            let inner = args
                .get("query")
                .ok_or_else(|| ClientError::Rejected("nested query without query".to_string()))?;

            let Some(Value::Array(elements)) = doc.get(path) else {
                return Ok(false);
            };
            for element in elements {
                if eval(inner, doc, Some((path, element)))? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "term" => {
            let (field, expected) = single_entry(args, "term")?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(resolve(field, doc, scope) == Some(expected))
        }
        "exists" => {
            let field = args
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::Rejected("exists query without field".to_string()))?;
            Ok(!matches!(resolve(field, doc, scope), None | Some(Value::Null)))
        }
        other => Err(ClientError::Rejected(format!(
            "unsupported query type: {other}"
        ))),
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn ensure_index(&self, mapping: &Value) -> ClientResult<()> {
        let mut state = self.state.write().await;
        if matches!(*state, IndexState::Missing) {
            *state = IndexState::Mapped(mapping.clone());
        }
        Ok(())
    }

    async fn index_document(&self, id: &str, document: &Value) -> ClientResult<()> {
        {
            let mut state = self.state.write().await;
            if matches!(*state, IndexState::Missing) {
                *state = IndexState::Dynamic;
            }
        }
        self.documents
            .write()
            .await
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn search(&self, body: &Value) -> ClientResult<Vec<Value>> {
        let match_all = serde_json::json!({ "match_all": {} });
        let query = body.get("query").unwrap_or(&match_all);
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);

        {
            let state = self.state.read().await;
            if matches!(*state, IndexState::Missing) {
                return Err(ClientError::Status {
                    status: 404,
                    body: "no such index".to_string(),
                });
            }
            check_nested_mapping(&state, query)?;
        }

        // Documents are keyed by id, so iteration order is the id sort order.
        let documents = self.documents.read().await;
        let mut hits = Vec::new();
        for document in documents.values() {
            if hits.len() == size {
                break;
            }
            if eval(query, document, None)? {
                hits.push(document.clone());
            }
        }
        Ok(hits)
    }

    async fn health_check(&self) -> ClientResult<()> {
        Ok(())
    }
}
