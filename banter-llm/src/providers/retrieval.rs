//! Clients for the external retrieval and ingestion services.
//!
//! Both speak a small JSON-over-HTTP contract: retrieval answers
//! `{query, top_k}` with scored passages, ingestion accepts
//! `{path, metadata}` and indexes the file asynchronously on its side.
//! When either endpoint is not configured, callers fall back to the
//! null providers in the crate root.

use crate::providers::{invalid_response, request_failed};
use crate::{IngestMetadata, Ingestor, Retriever};
use async_trait::async_trait;
use banter_core::{BanterResult, SourcePassage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const RETRIEVAL_PROVIDER: &str = "retrieval";
const INGEST_PROVIDER: &str = "ingest";

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    top_k: i64,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    passages: Vec<SourcePassage>,
}

/// Retriever backed by an HTTP retrieval service.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    http: Client,
    url: String,
}

impl HttpRetriever {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, query: &str, top_k: i64) -> BanterResult<Vec<SourcePassage>> {
        let response = self
            .http
            .post(&self.url)
            .json(&RetrieveRequest { query, top_k })
            .send()
            .await
            .map_err(|e| {
                request_failed(RETRIEVAL_PROVIDER, 0, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(request_failed(
                RETRIEVAL_PROVIDER,
                status.as_u16() as i32,
                body,
            ));
        }

        let decoded: RetrieveResponse = response.json().await.map_err(|e| {
            invalid_response(RETRIEVAL_PROVIDER, format!("failed to parse response: {}", e))
        })?;
        Ok(decoded.passages)
    }
}

#[derive(Debug, Serialize)]
struct IngestRequest<'a> {
    path: &'a str,
    metadata: &'a IngestMetadata,
}

/// Ingestor backed by an HTTP indexing service.
#[derive(Debug, Clone)]
pub struct HttpIngestor {
    http: Client,
    url: String,
}

impl HttpIngestor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Ingestor for HttpIngestor {
    async fn ingest(&self, path: &str, metadata: &IngestMetadata) -> BanterResult<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&IngestRequest { path, metadata })
            .send()
            .await
            .map_err(|e| {
                request_failed(INGEST_PROVIDER, 0, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(request_failed(INGEST_PROVIDER, status.as_u16() as i32, body));
        }
        Ok(())
    }
}
