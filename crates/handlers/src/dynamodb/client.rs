//! DynamoDB table client.

use crate::client::{ClientError, ClientResult};
use crate::dynamodb::item::Item;
use crate::dynamodb::query::ScanFilter;
use crate::dynamodb::AttributeTable;
use async_trait::async_trait;
use tracing::instrument;

/// One DynamoDB table keyed by blob id.
pub struct DynamoTable {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoTable {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

fn sdk_error<E>(err: aws_sdk_dynamodb::error::SdkError<E>) -> ClientError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ClientError::DynamoDb(Box::new(err))
}

#[async_trait]
impl AttributeTable for DynamoTable {
    #[instrument(skip(self, item), fields(backend = "dynamodb", table = %self.table))]
    async fn put_item(&self, item: Item) -> ClientResult<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self, filter), fields(backend = "dynamodb", table = %self.table))]
    async fn scan(&self, filter: Option<&ScanFilter>) -> ClientResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = None;
        let mut pages = 0usize;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table)
                .set_exclusive_start_key(start_key.take());

            if let Some(filter) = filter {
                request = request
                    .filter_expression(filter.expression())
                    .set_expression_attribute_names(Some(filter.attribute_names()))
                    .set_expression_attribute_values(Some(filter.attribute_values().clone()));
            }

            let output = request.send().await.map_err(sdk_error)?;
            pages += 1;
            items.extend(output.items.unwrap_or_default());

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        tracing::debug!(pages, items = items.len(), "scan complete");
        Ok(items)
    }

    async fn health_check(&self) -> ClientResult<()> {
        self.client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}
