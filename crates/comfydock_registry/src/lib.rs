//! Access to the external node ecosystem: the node registry HTTP API, the
//! repository hosting service, the global node-mappings table, and the
//! local caches that keep all three cheap to consult. Network calls are
//! rate limited per host and retried with exponential backoff and jitter;
//! successful lookups land in a TTL'd SQLite key-value cache.

mod api_cache;
mod client;
mod error;
mod github;
mod mappings;
mod node_cache;
mod retry;
mod scan;
mod service;
mod types;
pub mod url;

pub use api_cache::ApiCache;
pub use client::RegistryClient;
pub use error::RegistryError;
pub use github::GitHubClient;
pub use mappings::{
    MappingCandidate, MappingPackage, MappingPackageVersion, MappingsStats, NodeMappings,
    ResolvedNodePackage,
};
pub use node_cache::NodeCache;
pub use retry::{RateLimiter, RetryConfig};
pub use scan::scan_requirements;
pub use self::url::{normalize_github_url, parse_github_url};
pub use service::{NodePackage, NodeService};
pub use types::{MatchType, RegistryNode, RegistryNodeVersion, RepoInfo};
