//! OpenSearch REST client.

use crate::client::{ClientError, ClientResult, check_status};
use crate::opensearch::SearchIndex;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

/// Client for one OpenSearch index.
#[derive(Clone)]
pub struct OpenSearchClient {
    http: reqwest::Client,
    base_url: Url,
    index: String,
    basic_auth: Option<(String, String)>,
}

impl std::fmt::Debug for OpenSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchClient")
            .field("base_url", &self.base_url.as_str())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Value,
}

impl OpenSearchClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        index: &str,
        basic_auth: Option<(String, String)>,
    ) -> ClientResult<Self> {
        let mut base_url = Url::parse(endpoint)
            .map_err(|e| ClientError::Rejected(format!("invalid OpenSearch endpoint {endpoint}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if index.is_empty() || index.contains('/') {
            return Err(ClientError::Rejected(format!("invalid index name: {index:?}")));
        }

        Ok(Self {
            http,
            base_url,
            index: index.to_string(),
            basic_auth,
        })
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Rejected(format!("failed to build URL: {e}")))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.basic_auth {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }
}

/// Whether a failed index creation lost a race with another writer.
fn already_exists(err: &ClientError) -> bool {
    matches!(err, ClientError::Status { status: 400, body } if body.contains("resource_already_exists_exception"))
}

#[async_trait]
impl SearchIndex for OpenSearchClient {
    #[instrument(skip(self, mapping), fields(backend = "opensearch", index = %self.index))]
    async fn ensure_index(&self, mapping: &Value) -> ClientResult<()> {
        let url = self.url(&self.index)?;
        let response = self.authorize(self.http.head(url.clone())).send().await?;
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            check_status(response).await?;
            return Ok(());
        }

        tracing::info!("creating index with nested tag mapping");
        let response = self
            .authorize(self.http.put(url))
            .json(mapping)
            .send()
            .await?;
        match check_status(response).await {
            Ok(_) => Ok(()),
            Err(e) if already_exists(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, document), fields(backend = "opensearch", index = %self.index))]
    async fn index_document(&self, id: &str, document: &Value) -> ClientResult<()> {
        let url = self.url(&format!("{}/_doc/{}", self.index, id))?;
        let response = self
            .authorize(self.http.put(url))
            .json(document)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(backend = "opensearch", index = %self.index))]
    async fn search(&self, body: &Value) -> ClientResult<Vec<Value>> {
        let url = self.url(&format!("{}/_search", self.index))?;
        let response = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await?;
        let response: SearchResponse = check_status(response).await?.json().await?;

        Ok(response.hits.hits.into_iter().map(|hit| hit.source).collect())
    }

    async fn health_check(&self) -> ClientResult<()> {
        let url = self.url(&self.index)?;
        let response = self.authorize(self.http.head(url)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}
