//! Template source backed by an HTTP template service.
//!
//! `GET {base}/templates/{id}/tree` returns the nested listing as JSON;
//! entries without inline content are fetched from their `download_url`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::source::TemplateSource;
use crate::tree::TemplateEntry;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP template source.
#[derive(Debug, Clone)]
pub struct HttpTemplateSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTemplateSource {
    pub fn new(base_url: impl Into<String>) -> TemplateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn tree_url(&self, template_id: &str) -> String {
        format!("{}/templates/{}/tree", self.base_url, template_id)
    }
}

#[async_trait]
impl TemplateSource for HttpTemplateSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_tree(&self, template_id: &str) -> TemplateResult<Vec<TemplateEntry>> {
        let url = self.tree_url(template_id);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(TemplateError::NotFound(template_id.to_string())),
            status if !status.is_success() => Err(TemplateError::Fetch(format!(
                "{} returned {}",
                url, status
            ))),
            _ => Ok(response.json::<Vec<TemplateEntry>>().await?),
        }
    }

    async fn download(&self, url: &str) -> TemplateResult<String> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TemplateError::Fetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_url() {
        let source = HttpTemplateSource::new("https://templates.example.com/").unwrap();
        assert_eq!(
            source.tree_url("nextjs"),
            "https://templates.example.com/templates/nextjs/tree"
        );
    }
}
