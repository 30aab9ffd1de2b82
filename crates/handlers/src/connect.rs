//! Connectors turn a deployment descriptor into backend clients.

use crate::error::HandlerResult;
use async_trait::async_trait;
use lakeside_core::DeploymentDescriptor;

/// Builds the backend clients of type `B` for a deployment.
///
/// Called once per request with the tenant's credentials, so handlers never
/// hold long-lived clients or read credentials from global configuration.
#[async_trait]
pub trait Connect<B: Send + 'static>: Send + Sync {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<B>;
}
