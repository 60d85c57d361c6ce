use std::{collections::HashMap, path::Path};

use indexmap::IndexMap;
use serde::Deserialize;

use comfydock_workflow::{TYPE_ONLY_SIGNATURE, WorkflowNode, input_signature, node_key};

use crate::{MatchType, RegistryError, url::normalize_github_url};

/// One candidate in a mapping entry: a package that provides the node type,
/// with its rank among the alternatives (rank 1 is the preferred choice).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappingCandidate {
    pub package_id: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default = "default_rank")]
    pub rank: u32,
    #[serde(default)]
    pub source: Option<String>,
}

fn default_rank() -> u32 {
    1
}

/// Display and install metadata for a package referenced by the mappings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingPackage {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub downloads: Option<u64>,
    #[serde(default)]
    pub versions: HashMap<String, MappingPackageVersion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingPackageVersion {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingsStats {
    #[serde(default)]
    pub packages: Option<u64>,
    #[serde(default)]
    pub signatures: Option<u64>,
    #[serde(default)]
    pub total_nodes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MappingsFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    generated_at: String,
    #[serde(default)]
    stats: MappingsStats,
    #[serde(default)]
    mappings: IndexMap<String, Vec<MappingCandidate>>,
    #[serde(default)]
    packages: HashMap<String, MappingPackage>,
}

/// A package candidate matched for a workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNodePackage {
    pub package_id: String,
    pub versions: Vec<String>,
    pub rank: u32,
    pub match_type: MatchType,
}

impl ResolvedNodePackage {
    pub fn user_confirmed(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            versions: Vec::new(),
            rank: 1,
            match_type: MatchType::UserConfirmed,
        }
    }
}

/// The global node-mappings table: compound keys `NodeType::<signature>`
/// (or `NodeType::_` for type-only entries) mapped to ranked candidate
/// lists, plus package metadata and a reverse index from canonical GitHub
/// URLs to package IDs.
pub struct NodeMappings {
    version: String,
    generated_at: String,
    stats: MappingsStats,
    mappings: IndexMap<String, Vec<MappingCandidate>>,
    packages: HashMap<String, MappingPackage>,
    github_to_package: HashMap<String, String>,
}

impl NodeMappings {
    /// A table with no entries. Resolution degrades to "nothing matches";
    /// used when the mappings file has not been fetched yet.
    pub fn empty() -> Self {
        Self {
            version: String::new(),
            generated_at: String::new(),
            stats: MappingsStats::default(),
            mappings: IndexMap::new(),
            packages: HashMap::new(),
            github_to_package: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.is_file() {
            return Err(RegistryError::MappingsNotFound(
                path.display().to_string(),
            ));
        }
        let contents = fs_err::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, RegistryError> {
        let file: MappingsFile = serde_json::from_str(contents)?;

        let mut github_to_package = HashMap::new();
        for (package_id, package) in &file.packages {
            if let Some(repository) = &package.repository {
                let normalized = normalize_github_url(repository);
                if !normalized.is_empty() {
                    github_to_package.insert(normalized, package_id.clone());
                }
            }
        }

        tracing::info!(
            "loaded node mappings v{}: {} keys, {} packages",
            file.version,
            file.mappings.len(),
            file.packages.len()
        );
        Ok(Self {
            version: file.version,
            generated_at: file.generated_at,
            stats: file.stats,
            mappings: file.mappings,
            packages: file.packages,
            github_to_package,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn generated_at(&self) -> &str {
        &self.generated_at
    }

    pub fn stats(&self) -> &MappingsStats {
        &self.stats
    }

    pub fn package(&self, package_id: &str) -> Option<&MappingPackage> {
        self.packages.get(package_id)
    }

    pub fn repository_for_package(&self, package_id: &str) -> Option<&str> {
        self.package(package_id)?.repository.as_deref()
    }

    /// Reverse lookup: the package whose repository matches `url` (after
    /// canonicalization).
    pub fn package_for_github_url(&self, url: &str) -> Option<&str> {
        self.github_to_package
            .get(&normalize_github_url(url))
            .map(String::as_str)
    }

    /// Resolve a single workflow node to its candidate packages.
    ///
    /// Lookup order: exact `type::signature` key, then the type-only key,
    /// then a substring fuzzy pass over all keys. The caller applies
    /// selection policy to multi-candidate results.
    pub fn resolve_node(&self, node: &WorkflowNode) -> Vec<ResolvedNodePackage> {
        if let Some(signature) = input_signature(node) {
            let exact_key = node_key(&node.r#type, &signature);
            if let Some(candidates) = self.mappings.get(&exact_key) {
                tracing::debug!("exact mapping hit for '{exact_key}'");
                return to_resolved(candidates, MatchType::Exact);
            }
        }

        let type_only_key = node_key(&node.r#type, TYPE_ONLY_SIGNATURE);
        if let Some(candidates) = self.mappings.get(&type_only_key) {
            tracing::debug!("type-only mapping hit for '{type_only_key}'");
            return to_resolved(candidates, MatchType::TypeOnly);
        }

        // Fuzzy: substring match against the type part of every key.
        let needle = node.r#type.to_lowercase();
        let mut seen = std::collections::HashSet::new();
        let mut matches = Vec::new();
        for (key, candidates) in &self.mappings {
            let mapped_type = key.split("::").next().unwrap_or(key).to_lowercase();
            if mapped_type.contains(&needle) || needle.contains(&mapped_type) {
                for candidate in to_resolved(candidates, MatchType::Fuzzy) {
                    if seen.insert(candidate.package_id.clone()) {
                        matches.push(candidate);
                    }
                }
            }
        }
        matches.sort_by_key(|candidate| candidate.rank);
        if !matches.is_empty() {
            tracing::debug!("fuzzy mapping match for '{}'", node.r#type);
        }
        matches
    }
}

fn to_resolved(candidates: &[MappingCandidate], match_type: MatchType) -> Vec<ResolvedNodePackage> {
    let mut resolved: Vec<ResolvedNodePackage> = candidates
        .iter()
        .map(|candidate| ResolvedNodePackage {
            package_id: candidate.package_id.clone(),
            versions: candidate.versions.clone(),
            rank: candidate.rank,
            match_type,
        })
        .collect();
    resolved.sort_by_key(|candidate| candidate.rank);
    resolved
}
