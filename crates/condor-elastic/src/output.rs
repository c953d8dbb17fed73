//! Document indexing over the Elasticsearch REST API.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use condor_core::{Document, Error, ModuleConfig, OutputModule, Result, params};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElasticParams {
    /// Base URL of the cluster.
    url: String,
    /// Index receiving the documents.
    index: String,
    /// Request timeout in seconds.
    timeout: u64,
    /// Shard count used when the index has to be created.
    shards: u32,
    /// Replica count used when the index has to be created.
    replicas: u32,
}

impl Default for ElasticParams {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            index: "condor".to_string(),
            timeout: 3,
            shards: 1,
            replicas: 0,
        }
    }
}

struct ElasticState {
    params: ElasticParams,
    http: Client,
}

impl ElasticState {
    fn index_url(&self) -> String {
        format!("{}/{}", self.params.url.trim_end_matches('/'), self.params.index)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/_doc/{id}", self.index_url())
    }
}

/// [`OutputModule`] indexing documents into Elasticsearch (driver
/// `elasticsearch`).
#[derive(Default)]
pub struct ElasticOutput {
    state: OnceLock<ElasticState>,
}

impl ElasticOutput {
    /// Creates an unconfigured output module.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<&ElasticState> {
        self.state
            .get()
            .ok_or_else(|| Error::module("elasticsearch output module is not configured"))
    }

    async fn ensure_index(state: &ElasticState) -> Result<()> {
        let head = state
            .http
            .head(state.index_url())
            .send()
            .await
            .map_err(|error| Error::module_with_source("failed to reach elasticsearch", error))?;
        if head.status() != StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = serde_json::json!({
            "settings": {
                "number_of_shards": state.params.shards,
                "number_of_replicas": state.params.replicas,
            }
        });
        let created = state
            .http
            .put(state.index_url())
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::module_with_source("failed to create index", error))?;
        if !created.status().is_success() {
            return Err(Error::invalid_config(format!(
                "index creation not acknowledged: {}",
                created.status()
            )));
        }
        tracing::info!(
            target: TRACING_TARGET,
            index = %state.params.index,
            "created index"
        );
        Ok(())
    }
}

#[async_trait]
impl OutputModule for ElasticOutput {
    async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        let bound = params::bind(ElasticParams::default(), &config.params)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(bound.timeout.max(1)))
            .build()
            .map_err(|error| Error::module_with_source("failed to build http client", error))?;

        let state = ElasticState {
            params: bound,
            http,
        };
        Self::ensure_index(&state).await?;

        self.state
            .set(state)
            .map_err(|_| Error::invalid_config("elasticsearch output module configured twice"))
    }

    async fn send(&self, document: &Document) -> Result<()> {
        let state = self.state()?;
        let response = state
            .http
            .put(state.document_url(&document.id))
            .json(document)
            .send()
            .await
            .map_err(|error| Error::module_with_source("failed to index document", error))?;
        if !response.status().is_success() {
            return Err(Error::module(format!(
                "indexing rejected with status {}",
                response.status()
            )));
        }
        tracing::debug!(
            target: TRACING_TARGET,
            item_id = %document.id,
            index = %state.params.index,
            "indexed document"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_defaults() {
        let bound = params::bind(ElasticParams::default(), &serde_json::Map::new()).unwrap();
        assert_eq!(bound.url, "http://127.0.0.1:9200");
        assert_eq!(bound.index, "condor");
        assert_eq!(bound.timeout, 3);
    }

    #[test]
    fn document_urls_are_keyed_by_id() {
        let state = ElasticState {
            params: ElasticParams {
                url: "http://search.internal:9200/".into(),
                ..ElasticParams::default()
            },
            http: Client::new(),
        };
        assert_eq!(state.index_url(), "http://search.internal:9200/condor");
        assert_eq!(
            state.document_url("a1"),
            "http://search.internal:9200/condor/_doc/a1"
        );
    }
}
