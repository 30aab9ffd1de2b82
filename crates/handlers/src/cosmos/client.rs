//! Cosmos DB (SQL API) REST client authenticated with an Entra ID token.

use crate::client::{ClientError, ClientResult, check_status};
use crate::cosmos::query::DocumentQuery;
use crate::cosmos::{Container, DocumentStore};
use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::instrument;

const API_VERSION: &str = "2018-12-31";

/// Page size requested for queries.
const MAX_ITEM_COUNT: &str = "1000";

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents")]
    documents: Vec<Value>,
}

/// Client for one Cosmos DB database.
///
/// Containers are expected to be partitioned on `/id`.
pub struct CosmosClient {
    http: reqwest::Client,
    base_url: Url,
    database: String,
    payload_container: String,
    metadata_container: String,
    access_token: String,
}

impl std::fmt::Debug for CosmosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosClient")
            .field("base_url", &self.base_url.as_str())
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl CosmosClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        database: &str,
        payload_container: &str,
        metadata_container: &str,
        access_token: &str,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| ClientError::Rejected(format!("invalid Cosmos endpoint {endpoint}: {e}")))?;

        for (what, name) in [
            ("database", database),
            ("payload container", payload_container),
            ("metadata container", metadata_container),
        ] {
            if name.is_empty() || name.contains('/') {
                return Err(ClientError::Rejected(format!("invalid {what} name: {name:?}")));
            }
        }

        Ok(Self {
            http,
            base_url,
            database: database.to_string(),
            payload_container: payload_container.to_string(),
            metadata_container: metadata_container.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn container_name(&self, container: Container) -> &str {
        match container {
            Container::Payload => &self.payload_container,
            Container::Metadata => &self.metadata_container,
        }
    }

    fn docs_url(&self, container: Container) -> ClientResult<Url> {
        let path = format!(
            "dbs/{}/colls/{}/docs",
            self.database,
            self.container_name(container)
        );
        self.base_url
            .join(&path)
            .map_err(|e| ClientError::Rejected(format!("failed to build URL: {e}")))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> ClientResult<reqwest::RequestBuilder> {
        let date = OffsetDateTime::now_utc()
            .format(format_description!(
                "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
            ))
            .map_err(|e| ClientError::Rejected(format!("date: {e}")))?;

        Ok(self
            .http
            .request(method, url)
            .header("authorization", authorization_header(&self.access_token))
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION))
    }
}

/// Authorization header value for an Entra ID (AAD) token.
fn authorization_header(token: &str) -> String {
    let raw = format!("type=aad&ver=1.0&sig={token}");
    utf8_percent_encode(&raw, NON_ALPHANUMERIC).to_string()
}

fn partition_key(document: &Value) -> ClientResult<String> {
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Rejected("document has no string id".to_string()))?;
    Ok(serde_json::to_string(&[id])?)
}

#[async_trait]
impl DocumentStore for CosmosClient {
    #[instrument(skip(self, document), fields(backend = "cosmos", container = ?container))]
    async fn upsert(&self, container: Container, document: &Value) -> ClientResult<()> {
        let url = self.docs_url(container)?;
        let response = self
            .request(reqwest::Method::POST, url)?
            .header("x-ms-documentdb-is-upsert", "True")
            .header("x-ms-documentdb-partitionkey", partition_key(document)?)
            .json(document)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(backend = "cosmos", container = ?container))]
    async fn query(&self, container: Container, query: &DocumentQuery) -> ClientResult<Vec<Value>> {
        let url = self.docs_url(container)?;
        let body = serde_json::to_vec(query)?;
        let mut documents = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .request(reqwest::Method::POST, url.clone())?
                .header("content-type", "application/query+json")
                .header("x-ms-documentdb-isquery", "True")
                .header("x-ms-documentdb-query-enablecrosspartition", "True")
                .header("x-ms-max-item-count", MAX_ITEM_COUNT)
                .body(body.clone());
            if let Some(token) = continuation.take() {
                request = request.header("x-ms-continuation", token);
            }

            let response = check_status(request.send().await?).await?;
            let next = response
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let page: QueryResponse = response.json().await?;
            documents.extend(page.documents);

            match next {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }

    async fn health_check(&self) -> ClientResult<()> {
        let url = self
            .base_url
            .join(&format!("dbs/{}", self.database))
            .map_err(|e| ClientError::Rejected(format!("failed to build URL: {e}")))?;
        let response = self.request(reqwest::Method::GET, url)?.send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> CosmosClient {
        CosmosClient::new(
            reqwest::Client::new(),
            "https://tenant.documents.azure.com:443/",
            "lakeside",
            "payloads",
            "metadata",
            "token",
        )
        .unwrap()
    }

    #[test]
    fn test_docs_urls() {
        let client = client();
        assert_eq!(
            client.docs_url(Container::Metadata).unwrap().as_str(),
            "https://tenant.documents.azure.com/dbs/lakeside/colls/metadata/docs"
        );
        assert_eq!(
            client.docs_url(Container::Payload).unwrap().path(),
            "/dbs/lakeside/colls/payloads/docs"
        );
    }

    #[test]
    fn test_authorization_header_is_url_encoded() {
        assert_eq!(
            authorization_header("abc.def"),
            "type%3Daad%26ver%3D1%2E0%26sig%3Dabc%2Edef"
        );
    }

    #[test]
    fn test_partition_key_from_id() {
        assert_eq!(partition_key(&json!({"id": "abc"})).unwrap(), r#"["abc"]"#);
        assert!(partition_key(&json!({"name": "x"})).is_err());
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(
            CosmosClient::new(reqwest::Client::new(), "https://x", "db", "", "m", "t").is_err()
        );
        assert!(
            CosmosClient::new(reqwest::Client::new(), "https://x", "a/b", "p", "m", "t").is_err()
        );
    }
}
