//! In-memory attribute table evaluating [`ScanFilter`]s.

use crate::client::{ClientError, ClientResult};
use crate::dynamodb::AttributeTable;
use crate::dynamodb::item::Item;
use crate::dynamodb::query::{
    SYSTEM_TAGS_PLACEHOLDER, ScanFilter, USER_TAGS_PLACEHOLDER, value_placeholder,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryTable {
    items: RwLock<BTreeMap<String, Item>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn item(&self, id: &str) -> Option<Item> {
        self.items.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

/// `contains(list, value)` on a list attribute.
fn list_contains(item: &Item, attribute: &str, value: &AttributeValue) -> bool {
    matches!(item.get(attribute), Some(AttributeValue::L(list)) if list.contains(value))
}

fn passes(item: &Item, filter: &ScanFilter) -> ClientResult<bool> {
    let names = filter.attribute_names();
    let lists = [USER_TAGS_PLACEHOLDER, SYSTEM_TAGS_PLACEHOLDER]
        .iter()
        .map(|p| {
            names
                .get(*p)
                .cloned()
                .ok_or_else(|| ClientError::Rejected(format!("unbound attribute name {p}")))
        })
        .collect::<ClientResult<Vec<_>>>()?;

    for n in 0..filter.clause_count() {
        let placeholder = value_placeholder(n);
        let value = filter
            .attribute_values()
            .get(&placeholder)
            .ok_or_else(|| ClientError::Rejected(format!("unbound value {placeholder}")))?;

        if !lists.iter().any(|list| list_contains(item, list, value)) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait]
impl AttributeTable for MemoryTable {
    async fn put_item(&self, item: Item) -> ClientResult<()> {
        let id = match item.get("id") {
            Some(AttributeValue::S(id)) => id.clone(),
            _ => return Err(ClientError::Rejected("item has no string id".to_string())),
        };
        self.items.write().await.insert(id, item);
        Ok(())
    }

    async fn scan(&self, filter: Option<&ScanFilter>) -> ClientResult<Vec<Item>> {
        let items = self.items.read().await;
        let mut matched = Vec::new();
        for item in items.values() {
            let keep = match filter {
                Some(filter) => passes(item, filter)?,
                None => true,
            };
            if keep {
                matched.push(item.clone());
            }
        }
        Ok(matched)
    }

    async fn health_check(&self) -> ClientResult<()> {
        Ok(())
    }
}
