//! Endpoint fallback chain.
//!
//! Try each upstream source in fixed order, classify the response by its
//! declared content type, run the matching candidate search, and stop at the
//! first endpoint whose pool survives ranking. A failed fetch is never
//! retried within the same resolution; the chain just advances.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::extract::{html, json, rank, CandidatePool, Origin};

/// Maximum raw-body slice kept for debug traces.
pub const RAW_TRACE_LIMIT: usize = 20_000;

/// What an endpoint claims to serve. Advisory: classification trusts the
/// actual Content-Type header, a mismatch only logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyShape {
    Json,
    Html,
}

/// One upstream source: URL template with an `{id}` placeholder plus the
/// shape it is expected to serve. Immutable configuration, never mutated at
/// runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSpec {
    pub url: String,
    pub expects: BodyShape,
}

impl EndpointSpec {
    pub fn url_for(&self, subject_id: &str) -> String {
        self.url.replace("{id}", subject_id)
    }
}

/// Minimal view of an upstream response; the engine consumes nothing else.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Outbound transport seam. The engine never talks to the network directly;
/// tests plug stubs in here.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// Production fetcher: reqwest with a fixed per-call timeout. Non-2xx is not
/// an error — the chain inspects status itself.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("building upstream http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let resp = self.client.get(url).send().await.context("upstream fetch")?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp.text().await.context("reading upstream body")?;
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Everything one fallback-chain attempt produced. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Best surviving candidate. `None` means an endpoint was usable but the
    /// pool came up empty — zero, by contrast, is a real extracted value.
    pub selected: Option<u64>,
    /// The endpoint URL that produced this result.
    pub source: String,
    pub pool: CandidatePool,
    /// Truncated raw body, for diagnostics.
    pub raw_trace: Option<String>,
}

pub struct ValueResolver {
    endpoints: Vec<EndpointSpec>,
    fetcher: Arc<dyn Fetch>,
}

impl ValueResolver {
    pub fn new(endpoints: Vec<EndpointSpec>, fetcher: Arc<dyn Fetch>) -> Self {
        Self { endpoints, fetcher }
    }

    /// Walk the endpoint list in order.
    ///
    /// Returns `None` only when nothing was usable at all. A usable endpoint
    /// whose pool stayed empty yields `Some` with `selected: None` (the first
    /// such endpoint is the attributed source), so the caller can tell
    /// "extraction ambiguous" from "upstream unavailable".
    pub async fn resolve(&self, subject_id: &str) -> Option<ExtractionResult> {
        let mut empty_fallback: Option<ExtractionResult> = None;

        for ep in &self.endpoints {
            let url = ep.url_for(subject_id);
            counter!("endpoint_attempts_total").increment(1);

            let resp = match self.fetcher.fetch(&url).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = ?e, endpoint = %url, "endpoint fetch failed");
                    counter!("endpoint_errors_total").increment(1);
                    continue;
                }
            };
            if resp.status != 200 {
                tracing::debug!(status = resp.status, endpoint = %url, "unusable status");
                continue;
            }

            let ct = resp.content_type.to_ascii_lowercase();
            let shape = if ct.contains("application/json") {
                BodyShape::Json
            } else if ct.contains("text/html") {
                BodyShape::Html
            } else {
                tracing::debug!(content_type = %resp.content_type, endpoint = %url, "unusable content type");
                continue;
            };
            if shape != ep.expects {
                tracing::debug!(endpoint = %url, "content type differs from declared shape");
            }

            let t0 = std::time::Instant::now();
            let mut pool = CandidatePool::new();
            match shape {
                BodyShape::Json => {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&resp.body) else {
                        // Declared JSON that does not parse is an unusable
                        // endpoint, not a fatal error.
                        continue;
                    };
                    json::search_json(&value, &Origin::Json, &mut pool);
                }
                BodyShape::Html => {
                    html::search_html_str(&resp.body, &mut pool);
                }
            }
            histogram!("extract_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            counter!("extract_candidates_total").increment(pool.len() as u64);

            let raw_trace = Some(truncate_chars(&resp.body, RAW_TRACE_LIMIT));
            if let Some(best) = rank::select(&pool) {
                tracing::debug!(endpoint = %url, value = best, candidates = pool.len(), "chain resolved");
                return Some(ExtractionResult {
                    selected: Some(best),
                    source: url,
                    pool,
                    raw_trace,
                });
            }
            if empty_fallback.is_none() {
                empty_fallback = Some(ExtractionResult {
                    selected: None,
                    source: url,
                    pool,
                    raw_trace,
                });
            }
        }

        empty_fallback
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
