//! Input module polling the Pastebin scraping API.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use condor_core::{Document, Error, InputModule, ModuleConfig, Result, Stopper, params};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};

use crate::TRACING_TARGET;
use crate::listing::PasteEntry;

const LISTING_URL: &str = "https://scrape.pastebin.com/api_scraping.php";
const SCRAPING_URL: &str = "https://scrape.pastebin.com/api_scrape_item.php";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// The scraping API sometimes answers with this page even for authorized
// IPs; retries eventually succeed.
static NO_ACCESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("YOUR IP: .* DOES NOT HAVE ACCESS").expect("static pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PastebinParams {
    /// Seconds between listing polls. Zero disables listing entirely.
    interval: u64,
    /// Maximum number of pastes requested per poll.
    limit: u32,
}

impl Default for PastebinParams {
    fn default() -> Self {
        Self {
            interval: 15,
            limit: 250,
        }
    }
}

struct PastebinState {
    params: PastebinParams,
    http: Client,
}

/// [`InputModule`] for the Pastebin scraping API (driver `pastebin`).
#[derive(Default)]
pub struct PastebinInput {
    state: OnceLock<PastebinState>,
}

impl PastebinInput {
    /// Creates an unconfigured input module.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<&PastebinState> {
        self.state
            .get()
            .ok_or_else(|| Error::module("pastebin input module is not configured"))
    }

    async fn fetch_listing(&self, state: &PastebinState) -> Result<Vec<PasteEntry>> {
        let response = state
            .http
            .get(LISTING_URL)
            .query(&[("limit", state.params.limit)])
            .send()
            .await
            .map_err(|error| Error::module_with_source("failed to list new pastes", error))?;
        response
            .json()
            .await
            .map_err(|error| Error::module_with_source("failed to parse paste listing", error))
    }
}

#[async_trait]
impl InputModule for PastebinInput {
    async fn configure(&self, config: &ModuleConfig) -> Result<()> {
        let bound = params::bind(PastebinParams::default(), &config.params)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::module_with_source("failed to build http client", error))?;
        self.state
            .set(PastebinState {
                params: bound,
                http,
            })
            .map_err(|_| Error::invalid_config("pastebin input module configured twice"))
    }

    async fn list(&self, stopper: Stopper, documents: mpsc::Sender<Document>) -> Result<()> {
        let state = self.state()?;
        if state.params.interval == 0 {
            stopper.cancelled().await;
            return Ok(());
        }

        let period = Duration::from_secs(state.params.interval);
        let mut poll = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                () = stopper.cancelled() => return Ok(()),
                _ = poll.tick() => {}
            }

            let listing = match self.fetch_listing(state).await {
                Ok(listing) => listing,
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        error = %error,
                        "failed to list new pastes"
                    );
                    continue;
                }
            };
            for entry in listing {
                if documents.send(entry.into_document()).await.is_err() {
                    // The relay is gone; the pipeline is shutting down.
                    return Ok(());
                }
            }
        }
    }

    async fn scrape(&self, document: &mut Document) -> Result<()> {
        let state = self.state()?;
        let response = state
            .http
            .get(SCRAPING_URL)
            .query(&[("i", document.id.as_str())])
            .send()
            .await
            .map_err(|error| Error::module_with_source("failed to scrape paste", error))?;
        let content = response
            .bytes()
            .await
            .map_err(|error| Error::module_with_source("failed to read paste body", error))?;

        if NO_ACCESS.is_match(&String::from_utf8_lossy(&content)) {
            return Err(Error::module("scraping api denied access, will retry"));
        }

        document.content = content;
        Ok(())
    }
}
