//! BigQuery REST client (`tabledata.insertAll` and `jobs.query`).

use crate::bigquery::query::{SEARCH_COLUMNS, TableRef, WarehouseQuery};
use crate::bigquery::{Warehouse, WarehouseRow};
use crate::client::{ClientError, ClientResult, check_status};
use async_trait::async_trait;
use lakeside_core::{Blob, BlobId, Tag};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2/";

/// Server-side wait per `jobs.query` / `getQueryResults` call.
const QUERY_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on result polls and pages for one search.
const MAX_POLLS: usize = 100;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<Row>,
    page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    v: Value,
}

/// Client for one BigQuery table.
pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: Url,
    table: TableRef,
    location: Option<String>,
    access_token: String,
}

impl std::fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("table", &self.table)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl BigQueryClient {
    pub fn new(
        http: reqwest::Client,
        table: TableRef,
        location: Option<String>,
        access_token: &str,
    ) -> ClientResult<Self> {
        table.validate().map_err(ClientError::Rejected)?;
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| ClientError::Rejected(format!("invalid BigQuery URL: {e}")))?;

        Ok(Self {
            http,
            base_url,
            table,
            location,
            access_token: access_token.to_string(),
        })
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Rejected(format!("failed to build URL: {e}")))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<T> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> ClientResult<QueryResponse> {
        let mut url = self.url(&format!(
            "projects/{}/queries/{}",
            self.table.project, job.job_id
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("timeoutMs", &QUERY_TIMEOUT_MS.to_string());
            if let Some(location) = job.location.as_deref().or(self.location.as_deref()) {
                pairs.append_pair("location", location);
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        self.send(self.http.get(url)).await
    }
}

fn query_body(query: &WarehouseQuery, location: Option<&str>) -> Value {
    let parameters: Vec<Value> = query
        .parameters
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": p.value },
            })
        })
        .collect();

    let mut body = json!({
        "query": query.sql,
        "useLegacySql": false,
        "parameterMode": "NAMED",
        "queryParameters": parameters,
        "timeoutMs": QUERY_TIMEOUT_MS,
    });
    if let Some(location) = location {
        body["location"] = json!(location);
    }
    body
}

fn cell_str<'a>(row: &'a Row, index: usize) -> ClientResult<&'a str> {
    row.f
        .get(index)
        .and_then(|cell| cell.v.as_str())
        .ok_or_else(|| ClientError::Decode(format!("column {} is not a string", SEARCH_COLUMNS[index])))
}

/// Decode a `REPEATED RECORD<name STRING, value STRING>` cell.
fn cell_tags(row: &Row, index: usize) -> ClientResult<Vec<Tag>> {
    let entries = match row.f.get(index).map(|cell| &cell.v) {
        Some(Value::Array(entries)) => entries,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => {
            return Err(ClientError::Decode(format!(
                "column {} is not repeated",
                SEARCH_COLUMNS[index]
            )));
        }
    };

    entries
        .iter()
        .map(|entry| {
            let fields = entry["v"]["f"]
                .as_array()
                .ok_or_else(|| ClientError::Decode("tag entry is not a record".to_string()))?;
            let name = fields
                .first()
                .and_then(|f| f["v"].as_str())
                .ok_or_else(|| ClientError::Decode("tag entry has no name".to_string()))?;
            let value = fields.get(1).and_then(|f| f["v"].as_str());
            Ok(Tag {
                name: name.to_string(),
                value: value.map(str::to_string),
            })
        })
        .collect()
}

/// Decode a TIMESTAMP cell. The REST API returns these as epoch seconds in
/// floating point notation, e.g. `1.7145504E9`.
fn cell_timestamp(row: &Row, index: usize) -> ClientResult<OffsetDateTime> {
    let raw = cell_str(row, index)?;
    if let Ok(timestamp) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(timestamp);
    }

    let seconds = raw
        .parse::<f64>()
        .map_err(|e| ClientError::Decode(format!("timestamp {raw:?}: {e}")))?;
    let micros = (seconds * 1_000_000.0).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(micros * 1_000)
        .map_err(|e| ClientError::Decode(format!("timestamp {raw:?}: {e}")))
}

/// Streaming insert dedup key. Unique per attempt, so a later finalize of the
/// same id is appended instead of being dropped as a retry.
fn insert_id(row: &WarehouseRow) -> String {
    format!("{}:{}", row.id, row.ingested_at)
}

fn decode_row(row: &Row) -> ClientResult<Blob> {
    let id = BlobId::parse(cell_str(row, 0)?).map_err(|e| ClientError::Decode(e.to_string()))?;
    let timestamp = cell_timestamp(row, 3)?;
    let size = cell_str(row, 7)?
        .parse::<u64>()
        .map_err(|e| ClientError::Decode(format!("size: {e}")))?;

    Ok(Blob {
        id,
        name: cell_str(row, 1)?.to_string(),
        content_type: cell_str(row, 2)?.to_string(),
        timestamp,
        source: cell_str(row, 4)?.to_string(),
        user_tags: cell_tags(row, 5)?,
        system_tags: cell_tags(row, 6)?,
        size,
    })
}

#[async_trait]
impl Warehouse for BigQueryClient {
    fn table(&self) -> &TableRef {
        &self.table
    }

    #[instrument(skip(self, schema), fields(backend = "bigquery", table = %self.table))]
    async fn ensure_table(&self, schema: &Value) -> ClientResult<()> {
        let tables = format!(
            "projects/{}/datasets/{}/tables",
            self.table.project, self.table.dataset
        );
        let url = self.url(&format!("{tables}/{}", self.table.table))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            check_status(response).await?;
            return Ok(());
        }

        tracing::info!("creating table");
        let body = json!({
            "tableReference": {
                "projectId": self.table.project,
                "datasetId": self.table.dataset,
                "tableId": self.table.table,
            },
            "schema": schema,
        });
        let response = self
            .http
            .post(self.url(&tables)?)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        match check_status(response).await {
            Ok(_) => Ok(()),
            Err(ClientError::Status { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, row), fields(backend = "bigquery", table = %self.table, blob_id = %row.id))]
    async fn insert_row(&self, row: &WarehouseRow) -> ClientResult<()> {
        let url = self.url(&format!(
            "projects/{}/datasets/{}/tables/{}/insertAll",
            self.table.project, self.table.dataset, self.table.table
        ))?;
        let body = json!({
            "rows": [{ "insertId": insert_id(row), "json": row }],
        });

        let response: InsertAllResponse = self.send(self.http.post(url).json(&body)).await?;
        if !response.insert_errors.is_empty() {
            return Err(ClientError::Rejected(format!(
                "insertAll rejected row: {}",
                Value::Array(response.insert_errors)
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, query), fields(backend = "bigquery", table = %self.table))]
    async fn query(&self, query: &WarehouseQuery) -> ClientResult<Vec<Blob>> {
        let url = self.url(&format!("projects/{}/queries", self.table.project))?;
        let body = query_body(query, self.location.as_deref());
        let mut response: QueryResponse = self.send(self.http.post(url).json(&body)).await?;

        let mut blobs = Vec::new();
        let mut polls = 0;
        loop {
            if response.job_complete {
                for row in &response.rows {
                    blobs.push(decode_row(row)?);
                }
                if response.page_token.is_none() {
                    break;
                }
            }

            polls += 1;
            if polls > MAX_POLLS {
                return Err(ClientError::Rejected(format!(
                    "query did not finish after {MAX_POLLS} polls"
                )));
            }

            let job = response
                .job_reference
                .take()
                .ok_or_else(|| ClientError::Decode("query response has no job reference".to_string()))?;
            let page_token = if response.job_complete {
                response.page_token.take()
            } else {
                None
            };
            let next = self.query_results(&job, page_token.as_deref()).await?;
            response = QueryResponse {
                job_reference: next.job_reference.or(Some(job)),
                ..next
            };
        }

        Ok(blobs)
    }

    async fn health_check(&self) -> ClientResult<()> {
        let url = self.url(&format!(
            "projects/{}/datasets/{}/tables/{}",
            self.table.project, self.table.dataset, self.table.table
        ))?;
        let _: Value = self.send(self.http.get(url)).await?;
        Ok(())
    }
}
