//! Process configuration: port, cache TTL, fetch timeout, endpoint list.
//!
//! Everything has a built-in default; env vars override, and the endpoint
//! list can come from a TOML file pointed at by `ENDPOINTS_CONFIG_PATH`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::resolve::EndpointSpec;

// --- env defaults & names ---
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600; // 1 hour
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

pub const ENV_PORT: &str = "PORT";
pub const ENV_CACHE_TTL_SECS: &str = "CACHE_TTL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "FETCH_TIMEOUT_SECS";
pub const ENV_ENDPOINTS_CONFIG_PATH: &str = "ENDPOINTS_CONFIG_PATH";

/// Built-in fallback chain: the upstream's JSON API first, then the site API
/// mirror, then the HTML profile page, then the legacy ajax variant.
const DEFAULT_ENDPOINTS_TOML: &str = r#"
[[endpoints]]
url = "https://api.rolimons.com/player/{id}"
expects = "json"

[[endpoints]]
url = "https://www.rolimons.com/api/player/{id}"
expects = "json"

[[endpoints]]
url = "https://www.rolimons.com/player/{id}"
expects = "html"

[[endpoints]]
url = "https://www.rolimons.com/ajax/player/{id}"
expects = "json"
"#;

#[derive(Debug, Clone, Deserialize)]
struct EndpointsFile {
    endpoints: Vec<EndpointSpec>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub endpoints: Vec<EndpointSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            endpoints: default_endpoints(),
        }
    }
}

impl Config {
    /// Assemble from process env. Missing vars fall back to defaults;
    /// malformed values are rejected rather than silently defaulted.
    pub fn from_env() -> Result<Self> {
        let port = parse_env(ENV_PORT)?.unwrap_or(DEFAULT_PORT);
        let ttl_secs = parse_env(ENV_CACHE_TTL_SECS)?.unwrap_or(DEFAULT_CACHE_TTL_SECS);
        let timeout_secs = parse_env(ENV_FETCH_TIMEOUT_SECS)?.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let endpoints = match std::env::var(ENV_ENDPOINTS_CONFIG_PATH) {
            Ok(path) => {
                let path = PathBuf::from(path);
                let content = std::fs::read_to_string(&path).with_context(|| {
                    format!("reading endpoints config at {}", path.display())
                })?;
                endpoints_from_toml_str(&content)?
            }
            Err(_) => default_endpoints(),
        };

        Ok(Self {
            port,
            cache_ttl: Duration::from_secs(ttl_secs),
            fetch_timeout: Duration::from_secs(timeout_secs),
            endpoints,
        })
    }
}

pub fn default_endpoints() -> Vec<EndpointSpec> {
    endpoints_from_toml_str(DEFAULT_ENDPOINTS_TOML).expect("built-in endpoint config is valid")
}

/// Parse an endpoint list from a TOML document and validate the templates.
pub fn endpoints_from_toml_str(doc: &str) -> Result<Vec<EndpointSpec>> {
    let file: EndpointsFile = toml::from_str(doc).context("parsing endpoints config")?;
    if file.endpoints.is_empty() {
        anyhow::bail!("endpoints config lists no endpoints");
    }
    for ep in &file.endpoints {
        if !ep.url.contains("{id}") {
            anyhow::bail!("endpoint `{}` is missing the {{id}} placeholder", ep.url);
        }
    }
    Ok(file.endpoints)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => {
            let v = raw
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {name}: {e}"))?;
            Ok(Some(v))
        }
        Err(_) => Ok(None),
    }
}
