//! Tenant deployment descriptors.
//!
//! A deployment descriptor is produced by the (external) tenant configuration
//! layer and is read-only to the core. It names the backend pairing chosen by
//! the tenant, carries the backend-specific resource payload (bucket names,
//! endpoints, table names) and the credentials needed to reach it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Backend pairing selected by a tenant project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeploymentType {
    /// S3 payloads, OpenSearch index.
    #[serde(rename = "AWS_1")]
    Aws1,
    /// S3 payloads, DynamoDB table.
    #[serde(rename = "AWS_2")]
    Aws2,
    /// BigQuery table holding payload and metadata.
    #[serde(rename = "GCP_1")]
    Gcp1,
    /// Cloud Storage payloads, Bigtable index.
    #[serde(rename = "GCP_2")]
    Gcp2,
    #[serde(rename = "GCP_3")]
    Gcp3,
    /// Cosmos DB containers for payload and metadata.
    #[serde(rename = "AZURE_1")]
    Azure1,
}

impl DeploymentType {
    /// All known deployment identifiers, registered or not.
    pub const ALL: [DeploymentType; 6] = [
        Self::Aws1,
        Self::Aws2,
        Self::Gcp1,
        Self::Gcp2,
        Self::Gcp3,
        Self::Azure1,
    ];

    /// Wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws1 => "AWS_1",
            Self::Aws2 => "AWS_2",
            Self::Gcp1 => "GCP_1",
            Self::Gcp2 => "GCP_2",
            Self::Gcp3 => "GCP_3",
            Self::Azure1 => "AZURE_1",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::Error::UnknownDeploymentType(s.to_string()))
    }
}

/// Provider credentials for a deployment.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum Credentials {
    Aws {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default)]
        session_token: Option<String>,
        /// Defaults to us-east-1 when unset.
        #[serde(default)]
        region: Option<String>,
    },
    Gcp {
        project_id: String,
        /// OAuth2 bearer token with the cloud-platform scope.
        access_token: String,
    },
    Azure {
        tenant_id: String,
        /// Entra ID (AAD) bearer token for the Cosmos DB account.
        access_token: String,
    },
}

impl Credentials {
    /// Provider name, for logging.
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Aws { .. } => "aws",
            Self::Gcp { .. } => "gcp",
            Self::Azure { .. } => "azure",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws {
                access_key_id,
                region,
                ..
            } => f
                .debug_struct("Aws")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .field("region", region)
                .finish_non_exhaustive(),
            Self::Gcp { project_id, .. } => f
                .debug_struct("Gcp")
                .field("project_id", project_id)
                .field("access_token", &"<redacted>")
                .finish(),
            Self::Azure { tenant_id, .. } => f
                .debug_struct("Azure")
                .field("tenant_id", tenant_id)
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything the core needs to know about a tenant's deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub project_id: Uuid,
    pub deploy_type: DeploymentType,
    /// Backend-specific resource payload, parsed by the handler variant.
    #[serde(default)]
    pub resources: serde_json::Value,
    pub credentials: Credentials,
}

impl DeploymentDescriptor {
    /// Check that the descriptor carries a resource payload at all.
    pub fn validate(&self) -> crate::Result<()> {
        match &self.resources {
            serde_json::Value::Object(map) if !map.is_empty() => Ok(()),
            serde_json::Value::Object(_) => Err(crate::Error::InvalidDeployment(format!(
                "project {} has an empty resource payload",
                self.project_id
            ))),
            _ => Err(crate::Error::InvalidDeployment(format!(
                "project {} has no resource payload",
                self.project_id
            ))),
        }
    }

    /// Parse the resource payload into a variant-specific structure.
    pub fn resources<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_value(self.resources.clone()).map_err(|e| {
            crate::Error::InvalidDeployment(format!(
                "{} resources for project {}: {e}",
                self.deploy_type, self.project_id
            ))
        })
    }
}
