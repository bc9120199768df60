//! HTTP client for the hosting platform.
//!
//! - `POST {base}/deployments` with `{projectId, files, flags}` returns `{id}`
//! - `GET {base}/deployments/{id}` returns the [`PlatformStatus`]
//! - `GET {base}/deployments/{id}/logs` returns [`DeploymentLogs`]

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use shipwright_core::DeployConfig;

use crate::error::{DeployError, DeployResult};
use crate::platform::{DeployRequest, DeploymentLogs, DeploymentPlatform, PlatformStatus};

/// Environment variable holding the platform bearer token.
pub const DEPLOY_TOKEN_ENV: &str = "SHIPWRIGHT_DEPLOY_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct CreatedDeployment {
    id: String,
}

/// REST client for the deployment platform.
#[derive(Debug, Clone)]
pub struct HttpDeploymentPlatform {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpDeploymentPlatform {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> DeployResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    /// Create from configuration, reading the token from the environment.
    pub fn from_config(config: &DeployConfig) -> DeployResult<Self> {
        let token = std::env::var(DEPLOY_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Self::new(config.base_url.clone(), token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn checked(response: reqwest::Response) -> DeployResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeployError::from_status(status.as_u16(), body))
    }
}

#[async_trait]
impl DeploymentPlatform for HttpDeploymentPlatform {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_deployment(&self, request: &DeployRequest) -> DeployResult<String> {
        let url = self.url("/deployments");
        debug!("POST {} ({} files)", url, request.files.len());
        let response = self
            .authorized(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        let created: CreatedDeployment = Self::checked(response).await?.json().await?;
        Ok(created.id)
    }

    async fn get_status(&self, deployment_id: &str) -> DeployResult<PlatformStatus> {
        let url = self.url(&format!("/deployments/{}", deployment_id));
        let response = self.authorized(self.client.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DeployError::UnknownDeployment(deployment_id.to_string()));
        }
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn get_logs(&self, deployment_id: &str) -> DeployResult<DeploymentLogs> {
        let url = self.url(&format!("/deployments/{}/logs", deployment_id));
        let response = self.authorized(self.client.get(&url)).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }
}
