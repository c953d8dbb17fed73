//! Webhook delivery of matched documents.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use condor_core::{Document, Error, ModuleConfig, OutputModule, Result, params};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebhookParams {
    /// Endpoint receiving matched documents. Required.
    url: String,
    /// Documents scoring below this are skipped.
    min_score: u32,
    /// Request timeout in seconds.
    timeout: u64,
}

impl Default for WebhookParams {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_score: 0,
            timeout: 5,
        }
    }
}

struct WebhookState {
    params: WebhookParams,
    http: Client,
}

/// [`OutputModule`] posting matched documents to an HTTP endpoint (driver
/// `webhook`).
#[derive(Default)]
pub struct WebhookOutput {
    state: OnceLock<WebhookState>,
}

impl WebhookOutput {
    /// Creates an unconfigured output module.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<&WebhookState> {
        self.state
            .get()
            .ok_or_else(|| Error::module("webhook output module is not configured"))
    }
}

#[async_trait]
impl OutputModule for WebhookOutput {
    async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        let bound = params::bind(WebhookParams::default(), &config.params)?;
        if bound.url.is_empty() {
            return Err(Error::invalid_config("webhook url is required"));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(bound.timeout.max(1)))
            .build()
            .map_err(|error| Error::module_with_source("failed to build http client", error))?;

        self.state
            .set(WebhookState {
                params: bound,
                http,
            })
            .map_err(|_| Error::invalid_config("webhook output module configured twice"))
    }

    async fn send(&self, document: &Document) -> Result<()> {
        let state = self.state()?;
        if document.score < state.params.min_score {
            tracing::debug!(
                target: TRACING_TARGET,
                item_id = %document.id,
                score = document.score,
                min_score = state.params.min_score,
                "skipping document below the score threshold"
            );
            return Ok(());
        }

        let response = state
            .http
            .post(&state.params.url)
            .json(document)
            .send()
            .await
            .map_err(|error| Error::module_with_source("failed to deliver webhook", error))?;
        if !response.status().is_success() {
            return Err(Error::module(format!(
                "webhook rejected with status {}",
                response.status()
            )));
        }
        tracing::debug!(
            target: TRACING_TARGET,
            item_id = %document.id,
            score = document.score,
            "delivered document"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn configured(min_score: u32) -> WebhookOutput {
        let output = WebhookOutput::new();
        let config = ModuleConfig::new("webhook")
            .with_param("url", "http://127.0.0.1:1/hook")
            .with_param("min_score", min_score);
        output.configure(&config).await.unwrap();
        output
    }

    #[tokio::test]
    async fn missing_url_fails_configuration() {
        let output = WebhookOutput::new();
        let result = output.configure(&ModuleConfig::new("webhook")).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn low_scores_are_skipped_without_a_request() {
        let output = configured(10).await;
        let mut document = Document::new("a1");
        document.score = 5;
        // The endpoint is unreachable; a skip must still succeed.
        output.send(&document).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_params_are_rejected() {
        let output = WebhookOutput::new();
        let config = ModuleConfig::new("webhook")
            .with_param("url", "http://127.0.0.1:1/hook")
            .with_param("minimum_score", 10);
        let result = output.configure(&config).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
