//! HTTP fetch collaborator.
//!
//! Backends never talk to `reqwest` directly; they go through the
//! [`Fetcher`] trait so tests can substitute an in-memory fixture set
//! for the remote catalog.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::Config;

/// A fetched remote document, with the Content-Type the server declared
/// (used as a fallback when the URL extension is not telling).
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub body: String,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument>;
}

/// Production fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("request to {url} returned an error status"))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let body = response
            .text()
            .await
            .with_context(|| format!("reading body from {url} failed"))?;

        Ok(FetchedDocument { body, content_type })
    }
}

/// In-memory fetcher serving canned documents, for tests.
#[derive(Default)]
pub struct FixtureFetcher {
    documents: std::collections::HashMap<String, FetchedDocument>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(
        mut self,
        url: impl Into<String>,
        body: impl Into<String>,
        content_type: Option<&str>,
    ) -> Self {
        self.documents.insert(
            url.into(),
            FetchedDocument {
                body: body.into(),
                content_type: content_type.map(|s| s.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no fixture registered for {url}"))
    }
}
