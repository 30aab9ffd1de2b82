//! In-memory document store evaluating bound [`DocumentQuery`] parameters.

use crate::client::{ClientError, ClientResult};
use crate::cosmos::query::{DocumentQuery, name_parameter, value_parameter};
use crate::cosmos::{Container, DocumentStore};
use async_trait::async_trait;
use lakeside_core::Tag;
use lakeside_core::tag::matches_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryDocumentStore {
    containers: RwLock<HashMap<Container, BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document(&self, container: Container, id: &str) -> Option<Value> {
        self.containers
            .read()
            .await
            .get(&container)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    pub async fn len(&self, container: Container) -> usize {
        self.containers
            .read()
            .await
            .get(&container)
            .map_or(0, BTreeMap::len)
    }
}

/// Recover the requested tags from the bound parameters.
fn requested_tags(query: &DocumentQuery) -> ClientResult<Vec<Tag>> {
    let text = |value: &Value, name: &str| {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Rejected(format!("parameter {name} is not a string")))
    };

    let mut tags = Vec::new();
    for n in 0.. {
        let name_param = name_parameter(n);
        let Some(name) = query.parameter(&name_param) else {
            break;
        };
        let value_param = value_parameter(n);
        let value = match query.parameter(&value_param) {
            Some(value) => Some(text(value, &value_param)?),
            None => None,
        };
        tags.push(Tag {
            name: text(name, &name_param)?,
            value,
        });
    }
    Ok(tags)
}

fn document_tags(document: &Value, field: &str) -> ClientResult<Vec<Tag>> {
    match document.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(tags) => serde_json::from_value(tags.clone())
            .map_err(|e| ClientError::Decode(format!("{field}: {e}"))),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, container: Container, document: &Value) -> ClientResult<()> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Rejected("document has no string id".to_string()))?;

        self.containers
            .write()
            .await
            .entry(container)
            .or_default()
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn query(&self, container: Container, query: &DocumentQuery) -> ClientResult<Vec<Value>> {
        let tags = requested_tags(query)?;
        let containers = self.containers.read().await;
        let Some(documents) = containers.get(&container) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for document in documents.values() {
            let user_tags = document_tags(document, "user_tags")?;
            let system_tags = document_tags(document, "system_tags")?;
            if matches_all(&tags, &user_tags, &system_tags) {
                matched.push(document.clone());
            }
        }
        Ok(matched)
    }

    async fn health_check(&self) -> ClientResult<()> {
        Ok(())
    }
}
