//! In-memory append-only warehouse table.

use crate::bigquery::query::{TableRef, WarehouseQuery, name_parameter, value_parameter};
use crate::bigquery::{Warehouse, WarehouseRow};
use crate::client::ClientResult;
use async_trait::async_trait;
use lakeside_core::{Blob, Tag};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

pub struct MemoryWarehouse {
    table: TableRef,
    schema: RwLock<Option<Value>>,
    rows: RwLock<Vec<WarehouseRow>>,
}

impl MemoryWarehouse {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            schema: RwLock::new(None),
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Schema the table was created with.
    pub async fn schema(&self) -> Option<Value> {
        self.schema.read().await.clone()
    }

    /// Every appended row, oldest first.
    pub async fn rows(&self) -> Vec<WarehouseRow> {
        self.rows.read().await.clone()
    }
}

fn requested_tags(query: &WarehouseQuery) -> Vec<Tag> {
    (0..)
        .map_while(|n| {
            query.parameter(&name_parameter(n)).map(|name| Tag {
                name: name.to_string(),
                value: query.parameter(&value_parameter(n)).map(str::to_string),
            })
        })
        .collect()
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn table(&self) -> &TableRef {
        &self.table
    }

    async fn ensure_table(&self, schema: &Value) -> ClientResult<()> {
        self.schema.write().await.get_or_insert_with(|| schema.clone());
        Ok(())
    }

    async fn insert_row(&self, row: &WarehouseRow) -> ClientResult<()> {
        self.rows.write().await.push(row.clone());
        Ok(())
    }

    async fn query(&self, query: &WarehouseQuery) -> ClientResult<Vec<Blob>> {
        let tags = requested_tags(query);
        let rows = self.rows.read().await;

        // Later rows replace earlier ones with the same id.
        let latest: BTreeMap<&str, &WarehouseRow> =
            rows.iter().map(|row| (row.id.as_str(), row)).collect();

        latest
            .into_values()
            .filter(|row| lakeside_core::tag::matches_all(&tags, &row.user_tags, &row.system_tags))
            .map(WarehouseRow::to_blob)
            .collect()
    }

    async fn health_check(&self) -> ClientResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigquery::query::translate;
    use lakeside_core::{BlobCreate, BlobId, BlobMetadata, ProcessedPayload};

    fn table() -> TableRef {
        TableRef {
            project: "p".to_string(),
            dataset: "d".to_string(),
            table: "blobs".to_string(),
        }
    }

    #[tokio::test]
    async fn test_latest_row_wins() {
        let warehouse = MemoryWarehouse::new(table());
        let staged = BlobMetadata::staged(
            BlobId::new(),
            BlobCreate::new("a").with_user_tags(vec![Tag::new("v", "1")]),
        );
        let payload = ProcessedPayload::new(&b"x"[..], vec![]);
        let first = staged.finalize_with(&payload);
        let second = BlobMetadata {
            user_tags: vec![Tag::new("v", "2")],
            ..first.clone()
        };

        for meta in [&first, &second] {
            let row = WarehouseRow::new(meta, &payload).unwrap();
            warehouse.insert_row(&row).await.unwrap();
        }
        assert_eq!(warehouse.rows().await.len(), 2);

        let old = translate(&table(), &[Tag::new("v", "1")]).unwrap();
        assert!(warehouse.query(&old).await.unwrap().is_empty());

        let new = translate(&table(), &[Tag::new("v", "2")]).unwrap();
        assert_eq!(warehouse.query(&new).await.unwrap(), vec![Blob::from(second)]);
    }

    #[tokio::test]
    async fn test_existing_table_keeps_schema() {
        let warehouse = MemoryWarehouse::new(table());
        assert!(warehouse.schema().await.is_none());

        let schema = crate::bigquery::query::table_schema();
        warehouse.ensure_table(&schema).await.unwrap();
        warehouse
            .ensure_table(&serde_json::json!({"fields": []}))
            .await
            .unwrap();
        assert_eq!(warehouse.schema().await, Some(schema));
    }
}
