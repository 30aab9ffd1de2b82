//! Connector for the AWS deployments (`AWS_1`, `AWS_2`).

use crate::client::http_client;
use crate::connect::Connect;
use crate::dynamodb::{DynamoTable, KeyAttributeBackends, KeyAttributeResources};
use crate::error::{HandlerError, HandlerResult};
use crate::opensearch::{OpenSearchClient, SearchEngineBackends, SearchEngineResources};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use lakeside_core::{Credentials, DeploymentDescriptor};
use lakeside_storage::backends::s3::DEFAULT_REGION;
use lakeside_storage::{S3Backend, S3Credentials, S3Settings};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// S3 bucket holding blob payloads.
#[derive(Clone, Debug, Deserialize)]
pub struct BucketResource {
    pub bucket_name: String,
    /// Custom endpoint, for S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

/// Static AWS credentials taken from a deployment descriptor.
#[derive(Clone)]
struct AwsKeys {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    region: String,
}

impl AwsKeys {
    fn from_deployment(deployment: &DeploymentDescriptor) -> HandlerResult<Self> {
        match &deployment.credentials {
            Credentials::Aws {
                access_key_id,
                secret_access_key,
                session_token,
                region,
            } => Ok(Self {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: session_token.clone(),
                region: region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string()),
            }),
            other => Err(HandlerError::InvalidDeployment(format!(
                "{} requires aws credentials, got {}",
                deployment.deploy_type,
                other.provider()
            ))),
        }
    }
}

/// Builds S3, OpenSearch and DynamoDB clients from tenant credentials.
pub struct AwsConnector {
    http: reqwest::Client,
}

impl AwsConnector {
    pub fn new(http_timeout: Duration) -> HandlerResult<Self> {
        let http = http_client(http_timeout)
            .map_err(|e| HandlerError::InvalidDeployment(format!("HTTP client: {e}")))?;
        Ok(Self { http })
    }

    fn object_store(bucket: &BucketResource, keys: &AwsKeys) -> HandlerResult<Arc<S3Backend>> {
        let settings = S3Settings {
            bucket: bucket.bucket_name.clone(),
            region: Some(keys.region.clone()),
            endpoint: bucket.endpoint.clone(),
            prefix: bucket.prefix.clone(),
            force_path_style: bucket.force_path_style,
        };
        let credentials = S3Credentials {
            access_key_id: keys.access_key_id.clone(),
            secret_access_key: keys.secret_access_key.clone(),
            session_token: keys.session_token.clone(),
        };

        S3Backend::new(settings, credentials)
            .map(Arc::new)
            .map_err(|e| HandlerError::InvalidDeployment(e.to_string()))
    }

    fn dynamodb_client(endpoint: Option<&str>, keys: &AwsKeys) -> aws_sdk_dynamodb::Client {
        let mut builder = aws_sdk_dynamodb::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(keys.region.clone()))
            .credentials_provider(aws_sdk_dynamodb::config::Credentials::new(
                keys.access_key_id.clone(),
                keys.secret_access_key.clone(),
                keys.session_token.clone(),
                None,
                "lakeside-deployment",
            ));

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        aws_sdk_dynamodb::Client::from_conf(builder.build())
    }
}

#[async_trait]
impl Connect<SearchEngineBackends> for AwsConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<SearchEngineBackends> {
        let resources: SearchEngineResources = deployment.resources()?;
        let keys = AwsKeys::from_deployment(deployment)?;

        let opensearch = &resources.opensearch;
        let basic_auth = match (&opensearch.username, &opensearch.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (None, None) => None,
            _ => {
                return Err(HandlerError::InvalidDeployment(
                    "opensearch requires both username and password when either is set"
                        .to_string(),
                ));
            }
        };
        let index = OpenSearchClient::new(
            self.http.clone(),
            &opensearch.endpoint,
            &opensearch.index,
            basic_auth,
        )
        .map_err(|e| HandlerError::InvalidDeployment(e.to_string()))?;

        Ok(SearchEngineBackends {
            objects: Self::object_store(&resources.s3, &keys)?,
            index: Arc::new(index),
        })
    }
}

#[async_trait]
impl Connect<KeyAttributeBackends> for AwsConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<KeyAttributeBackends> {
        let resources: KeyAttributeResources = deployment.resources()?;
        let keys = AwsKeys::from_deployment(deployment)?;

        if resources.dynamodb.table_name.is_empty() {
            return Err(HandlerError::InvalidDeployment(
                "dynamodb table_name is empty".to_string(),
            ));
        }

        let client = Self::dynamodb_client(resources.dynamodb.endpoint.as_deref(), &keys);
        Ok(KeyAttributeBackends {
            objects: Self::object_store(&resources.s3, &keys)?,
            table: Arc::new(DynamoTable::new(client, resources.dynamodb.table_name)),
        })
    }
}
