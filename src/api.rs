//! Inbound HTTP API.
//!
//! Thin layer over the engine: validate the subject id, consult the cache,
//! run the fallback chain on a miss, cache whatever came out, and answer.
//! The service degrades to "best guess, possibly zero, plus a note" rather
//! than failing outright — callers expect a numeric answer even under
//! uncertainty.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::cache::{DebugTrace, ValueCache};
use crate::config::Config;
use crate::extract::{rank, Candidate};
use crate::metrics::ensure_described;
use crate::resolve::{Fetch, HttpFetcher, ValueResolver};

const NOTE_UPSTREAM_UNAVAILABLE: &str = "upstream unavailable";
const NOTE_NO_NUMERIC: &str = "could not extract numeric value";

/// Shared app state: one cache and one resolver for the process lifetime,
/// injected into handlers (no ambient globals).
#[derive(Clone)]
pub struct AppState {
    cache: Arc<ValueCache>,
    resolver: Arc<ValueResolver>,
}

impl AppState {
    /// Production wiring: reqwest-backed fetcher per the config.
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(cfg.fetch_timeout)?);
        Ok(Self::with_fetcher(cfg, fetcher))
    }

    /// Same wiring with any transport; this is the seam tests use.
    pub fn with_fetcher(cfg: &Config, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            cache: Arc::new(ValueCache::new(cfg.cache_ttl)),
            resolver: Arc::new(ValueResolver::new(cfg.endpoints.clone(), fetcher)),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    ensure_described();
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .route("/avatarValue", get(avatar_value))
        .route("/clearCache", get(clear_cache))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "msg": concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), " alive"),
    }))
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    nocache: Option<String>,
    debug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    total_value: u64,
    source: Option<String>,
    cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'static str>,
    /// RFC 3339 time the cached entry was originally fetched; only present
    /// on cache hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    fetched_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<Candidate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_snippet: Option<String>,
}

impl LookupResponse {
    fn bare(total_value: u64, source: Option<String>, cached: bool) -> Self {
        Self {
            total_value,
            source,
            cached,
            note: None,
            fetched_at: None,
            candidates: None,
            raw_snippet: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    ok: bool,
    cleared: String,
}

async fn avatar_value(State(state): State<AppState>, Query(q): Query<LookupQuery>) -> Response {
    counter!("lookup_requests_total").increment(1);

    let user_id = match require_subject_id(q.user_id.as_deref()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let nocache = flag(q.nocache.as_deref());
    let debug = flag(q.debug.as_deref());
    let key = cache_key(user_id);

    if !nocache {
        if let Some(entry) = state.cache.get(&key) {
            counter!("lookup_cache_hits_total").increment(1);
            tracing::info!(subject = %anon_id(user_id), "lookup served from cache");
            let mut out = LookupResponse::bare(entry.value, entry.source, true);
            out.fetched_at = chrono::DateTime::from_timestamp(entry.ts_unix as i64, 0)
                .map(|t| t.to_rfc3339());
            if debug {
                if let Some(trace) = entry.debug {
                    out.candidates = Some(trace.candidates);
                    out.raw_snippet = trace.raw_snippet;
                }
            }
            return Json(out).into_response();
        }
    }
    counter!("lookup_cache_misses_total").increment(1);

    match state.resolver.resolve(user_id).await {
        Some(res) => {
            let value = res.selected.unwrap_or(0);
            let note = if res.selected.is_some() {
                None
            } else {
                Some(NOTE_NO_NUMERIC)
            };
            let trace = debug.then(|| DebugTrace {
                candidates: rank::ranked(&res.pool),
                raw_snippet: res.raw_trace.clone(),
            });
            state
                .cache
                .put(&key, value, Some(res.source.clone()), trace.clone());
            tracing::info!(
                subject = %anon_id(user_id),
                value,
                source = %res.source,
                extracted = res.selected.is_some(),
                "lookup resolved"
            );

            let mut out = LookupResponse::bare(value, Some(res.source), false);
            out.note = note;
            if let Some(trace) = trace {
                out.candidates = Some(trace.candidates);
                out.raw_snippet = trace.raw_snippet;
            }
            Json(out).into_response()
        }
        None => {
            // Nothing usable upstream. Degrade to a suppressive zero so
            // repeated lookups do not hammer a source that is already down.
            counter!("lookup_upstream_exhausted_total").increment(1);
            state.cache.put(&key, 0, None, None);
            tracing::warn!(subject = %anon_id(user_id), "all endpoints exhausted");

            let mut out = LookupResponse::bare(0, None, false);
            out.note = Some(NOTE_UPSTREAM_UNAVAILABLE);
            (StatusCode::BAD_GATEWAY, Json(out)).into_response()
        }
    }
}

async fn clear_cache(State(state): State<AppState>, Query(q): Query<ClearQuery>) -> Response {
    let user_id = match require_subject_id(q.user_id.as_deref()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let key = cache_key(user_id);
    state.cache.invalidate(&key);
    tracing::info!(subject = %anon_id(user_id), "cache entry cleared");
    Json(ClearResponse { ok: true, cleared: key }).into_response()
}

/// Subject ids are spliced into URL templates, so the accepted charset is
/// restricted to URL-safe characters instead of percent-encoding arbitrary
/// input.
static SUBJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("subject id regex"));

fn require_subject_id(raw: Option<&str>) -> Result<&str, Response> {
    let Some(id) = raw.filter(|s| !s.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "Missing userId",
            }),
        )
            .into_response());
    };
    if !SUBJECT_ID_RE.is_match(id) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "Invalid userId",
            }),
        )
            .into_response());
    }
    Ok(id)
}

fn flag(v: Option<&str>) -> bool {
    matches!(v, Some("1") | Some("true"))
}

fn cache_key(subject_id: &str) -> String {
    format!("u:{subject_id}")
}

/// Short stable hash so subject ids never appear raw in logs.
fn anon_id(id: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(id.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
