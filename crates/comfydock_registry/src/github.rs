use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    ApiCache, RateLimiter, RegistryError, RepoInfo, RetryConfig, url::parse_github_url,
};

const CACHE_NAMESPACE: &str = "github";
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Client for the repository-hosting API, used to validate repository URLs
/// and pin git-sourced nodes to commits.
pub struct GitHubClient {
    api_base: String,
    client: reqwest::blocking::Client,
    cache: Option<Arc<ApiCache>>,
    limiter: RateLimiter,
    retry: RetryConfig,
}

#[derive(Deserialize)]
struct ApiRepo {
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    clone_url: Option<String>,
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, cache: Option<Arc<ApiCache>>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("comfydock/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
            cache,
            limiter: RateLimiter::new(Duration::from_millis(50)),
            retry: RetryConfig::default(),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RegistryError> {
        self.retry.run(
            || {
                self.limiter.wait("api.github.com");
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
            |err| match err {
                RegistryError::Unavailable { source } => source.is_timeout() || source.is_connect(),
                RegistryError::HttpStatus { status, .. } => {
                    matches!(status, 429 | 500 | 502 | 503 | 504)
                }
                _ => false,
            },
        )
    }

    /// Repository metadata for a GitHub URL. A ref embedded in the URL
    /// (`...repo@<commit>`) is carried through as the pinned commit.
    pub fn get_repository_info(&self, repo_url: &str) -> Result<RepoInfo, RegistryError> {
        let (owner, name, pinned_commit) = parse_github_url(repo_url)
            .ok_or_else(|| RegistryError::InvalidUrl(repo_url.to_string()))?;

        let cache_key = match &pinned_commit {
            Some(commit) => format!("{owner}/{name}@{commit}"),
            None => format!("{owner}/{name}"),
        };
        if let Some(cache) = &self.cache {
            if let Some(info) = cache.get::<RepoInfo>(CACHE_NAMESPACE, &cache_key, CACHE_TTL) {
                tracing::debug!("github cache hit for '{cache_key}'");
                return Ok(info);
            }
        }

        let repo: ApiRepo = self
            .get_json(&format!("{}/repos/{owner}/{name}", self.api_base))
            .map_err(|err| match err {
                RegistryError::NotFound(_) => RegistryError::NotFound(repo_url.to_string()),
                other => other,
            })?;
        let default_branch = repo.default_branch.unwrap_or_else(|| "main".to_string());

        let latest_commit = match pinned_commit {
            Some(commit) => Some(commit),
            None => self
                .get_json::<ApiCommit>(&format!(
                    "{}/repos/{owner}/{name}/commits/{default_branch}",
                    self.api_base
                ))
                .ok()
                .map(|commit| commit.sha),
        };

        let info = RepoInfo {
            clone_url: repo
                .clone_url
                .or_else(|| Some(format!("https://github.com/{owner}/{name}.git"))),
            owner,
            name,
            default_branch,
            description: repo.description,
            latest_commit,
            latest_release: None,
        };

        if let Some(cache) = &self.cache {
            cache.put(CACHE_NAMESPACE, &cache_key, &info)?;
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_rejected_without_network() {
        let client = GitHubClient::new("https://api.github.com", None);
        let err = client.get_repository_info("https://example.com/foo").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl(_)));
    }
}
