use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    ApiCache, RateLimiter, RegistryError, RegistryNode, RegistryNodeVersion, RetryConfig,
};

const CACHE_NAMESPACE: &str = "registry";
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Client for the node registry HTTP API. Lookups are rate limited,
/// retried with backoff on transient failures, and cached with a TTL.
pub struct RegistryClient {
    base_url: String,
    client: reqwest::blocking::Client,
    cache: Option<Arc<ApiCache>>,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, cache: Option<Arc<ApiCache>>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("comfydock/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            cache,
            limiter: RateLimiter::new(Duration::from_millis(100)),
            retry: RetryConfig::default(),
        }
    }

    fn host(&self) -> &str {
        self.base_url
            .strip_prefix("https://")
            .or_else(|| self.base_url.strip_prefix("http://"))
            .unwrap_or(&self.base_url)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RegistryError> {
        self.retry.run(
            || {
                self.limiter.wait(self.host());
                let response = self
                    .client
                    .get(url)
                    .send()
                    .map_err(|source| RegistryError::Unavailable { source })?;
                let status = response.status();
                if status.as_u16() == 404 {
                    return Err(RegistryError::NotFound(url.to_string()));
                }
                if !status.is_success() {
                    return Err(RegistryError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                response
                    .json::<T>()
                    .map_err(|source| RegistryError::Unavailable { source })
            },
            is_retryable,
        )
    }

    /// Look up a node package by registry ID.
    pub fn get_node(&self, node_id: &str) -> Result<RegistryNode, RegistryError> {
        let cache_key = format!("node:{node_id}");
        if let Some(cache) = &self.cache {
            if let Some(node) = cache.get::<RegistryNode>(CACHE_NAMESPACE, &cache_key, CACHE_TTL) {
                tracing::debug!("registry cache hit for '{node_id}'");
                return Ok(node);
            }
        }

        let url = format!("{}/nodes/{node_id}", self.base_url);
        let node: RegistryNode = self.get_json(&url).map_err(|err| match err {
            RegistryError::NotFound(_) => RegistryError::NotFound(node_id.to_string()),
            other => other,
        })?;

        if let Some(cache) = &self.cache {
            cache.put(CACHE_NAMESPACE, &cache_key, &node)?;
        }
        Ok(node)
    }

    /// Resolve the installable artifact for a node version. Without an
    /// explicit version the registry answers with the latest.
    pub fn get_install_version(
        &self,
        node_id: &str,
        version: Option<&str>,
    ) -> Result<RegistryNodeVersion, RegistryError> {
        let cache_key = format!("install:{node_id}@{}", version.unwrap_or("latest"));
        if let Some(cache) = &self.cache {
            if let Some(found) =
                cache.get::<RegistryNodeVersion>(CACHE_NAMESPACE, &cache_key, CACHE_TTL)
            {
                return Ok(found);
            }
        }

        let mut url = format!("{}/nodes/{node_id}/install", self.base_url);
        if let Some(version) = version {
            url.push_str(&format!("?version={version}"));
        }
        let resolved: RegistryNodeVersion = self.get_json(&url).map_err(|err| match err {
            RegistryError::NotFound(_) => RegistryError::NotFound(node_id.to_string()),
            other => other,
        })?;

        if let Some(cache) = &self.cache {
            cache.put(CACHE_NAMESPACE, &cache_key, &resolved)?;
        }
        Ok(resolved)
    }

    /// Free-text search over the registry.
    pub fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<RegistryNode>, RegistryError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            nodes: Vec<RegistryNode>,
        }

        let url = format!(
            "{}/nodes/search?search={}&limit={limit}",
            self.base_url,
            urlencode(query)
        );
        let response: SearchResponse = self.get_json(&url)?;
        Ok(response.nodes)
    }
}

fn is_retryable(err: &RegistryError) -> bool {
    match err {
        RegistryError::Unavailable { source } => {
            source.is_timeout() || source.is_connect() || source.is_request()
        }
        RegistryError::HttpStatus { status, .. } => {
            matches!(status, 429 | 500 | 502 | 503 | 504)
        }
        _ => false,
    }
}

fn urlencode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
