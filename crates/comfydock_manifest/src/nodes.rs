use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use toml_edit::{Item, Table};

use crate::{Manifest, ManifestError};

const NODES_TABLE: &str = "tool.comfydock.nodes";

/// Where an installed node package came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSource {
    Registry,
    Git,
    Development,
    #[default]
    Unknown,
}

impl NodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeSource::Registry => "registry",
            NodeSource::Git => "git",
            NodeSource::Development => "development",
            NodeSource::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "registry" => NodeSource::Registry,
            "git" => NodeSource::Git,
            "development" => NodeSource::Development,
            _ => NodeSource::Unknown,
        }
    }
}

impl std::fmt::Display for NodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node package entry as persisted under `[tool.comfydock.nodes.<id>]`.
///
/// Registry nodes carry `registry_id`, `version` and `download_url`; git
/// nodes carry `repository` and a pinned commit in `version`; development
/// nodes carry only their directory name with `version = "dev"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeSpec {
    pub name: String,
    pub registry_id: Option<String>,
    pub repository: Option<String>,
    pub version: Option<String>,
    pub download_url: Option<String>,
    pub source: NodeSource,
    /// uv source names this node introduced; consulted by orphan cleanup.
    pub dependency_sources: Vec<String>,
}

impl NodeSpec {
    pub fn development(name: impl Into<String>) -> Self {
        NodeSpec {
            name: name.into(),
            version: Some("dev".to_string()),
            source: NodeSource::Development,
            ..NodeSpec::default()
        }
    }

    /// The key under which this node is stored: the registry ID when known,
    /// the directory name otherwise.
    pub fn identifier(&self) -> &str {
        self.registry_id.as_deref().unwrap_or(&self.name)
    }

    pub fn is_development(&self) -> bool {
        self.source == NodeSource::Development || self.version.as_deref() == Some("dev")
    }

    /// Collision-resistant dependency-group name:
    /// `<slug(name)>-<hex8(sha256(repository | identifier))>`.
    ///
    /// The hash source prefers the repository URL so that two registry
    /// packages sharing a directory name still get distinct groups.
    pub fn group_name(&self) -> String {
        let slug: String = {
            let lowered = self.name.to_lowercase();
            let mut slug = String::with_capacity(lowered.len());
            let mut last_dash = true;
            for ch in lowered.chars() {
                if ch.is_ascii_alphanumeric() {
                    slug.push(ch);
                    last_dash = false;
                } else if !last_dash {
                    slug.push('-');
                    last_dash = true;
                }
            }
            slug.trim_matches('-').to_string()
        };

        let hash_source = self
            .repository
            .as_deref()
            .unwrap_or_else(|| self.identifier());
        let digest = Sha256::digest(hash_source.as_bytes());
        format!("{slug}-{}", &hex::encode(digest)[..8])
    }

    fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.insert("name", toml_edit::value(&self.name));
        if let Some(registry_id) = &self.registry_id {
            table.insert("registry_id", toml_edit::value(registry_id));
        }
        if let Some(repository) = &self.repository {
            table.insert("repository", toml_edit::value(repository));
        }
        if let Some(version) = &self.version {
            table.insert("version", toml_edit::value(version));
        }
        if let Some(download_url) = &self.download_url {
            table.insert("download_url", toml_edit::value(download_url));
        }
        table.insert("source", toml_edit::value(self.source.as_str()));
        if !self.dependency_sources.is_empty() {
            let mut array = toml_edit::Array::new();
            for source in &self.dependency_sources {
                array.push(source.as_str());
            }
            table.insert("dependency_sources", toml_edit::value(array));
        }
        table
    }

    fn from_table(identifier: &str, table: &dyn toml_edit::TableLike) -> Self {
        let get = |key: &str| {
            table
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        NodeSpec {
            name: get("name").unwrap_or_else(|| identifier.to_string()),
            registry_id: get("registry_id"),
            repository: get("repository"),
            version: get("version"),
            download_url: get("download_url"),
            source: get("source")
                .map(|s| NodeSource::parse(&s))
                .unwrap_or_default(),
            dependency_sources: table
                .get("dependency_sources")
                .and_then(|v| v.as_array())
                .map(|array| {
                    array
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// View over `[tool.comfydock.nodes]`.
pub struct Nodes<'a> {
    manifest: &'a mut Manifest,
}

impl<'a> Nodes<'a> {
    pub(crate) fn new(manifest: &'a mut Manifest) -> Self {
        Self { manifest }
    }

    /// Insert or replace a node entry under `identifier` (defaults to the
    /// node's own identifier).
    pub fn add(&mut self, spec: &NodeSpec, identifier: Option<&str>) -> Result<(), ManifestError> {
        let identifier = identifier.unwrap_or_else(|| spec.identifier()).to_string();
        self.manifest
            .document_mut()
            .get_or_insert_nested_table(NODES_TABLE)?
            .insert(&identifier, Item::Table(spec.to_table()));
        tracing::info!("added node '{identifier}' to manifest");
        self.manifest.save()
    }

    /// All node entries keyed by identifier.
    pub fn get_existing(&self) -> IndexMap<String, NodeSpec> {
        let mut nodes = IndexMap::new();
        if let Ok(table) = self.manifest.document().get_nested_table(NODES_TABLE) {
            for (identifier, item) in table.iter() {
                if let Some(node_table) = item.as_table_like() {
                    nodes.insert(
                        identifier.to_string(),
                        NodeSpec::from_table(identifier, node_table),
                    );
                }
            }
        }
        nodes
    }

    pub fn get(&self, identifier: &str) -> Option<NodeSpec> {
        self.manifest
            .document()
            .get_nested_table(NODES_TABLE)
            .ok()
            .and_then(|t| t.get(identifier))
            .and_then(|item| item.as_table_like())
            .map(|table| NodeSpec::from_table(identifier, table))
    }

    /// Remove a node entry together with its dependency group. Returns the
    /// removed spec so callers can clean up its uv sources and filesystem
    /// directory.
    pub fn remove(&mut self, identifier: &str) -> Result<Option<NodeSpec>, ManifestError> {
        let Some(spec) = self.get(identifier) else {
            return Ok(None);
        };

        let group = spec.group_name();
        self.manifest
            .document_mut()
            .remove_from_table("dependency-groups", &group);
        self.manifest
            .document_mut()
            .remove_from_table(NODES_TABLE, identifier);
        tracing::info!("removed node '{identifier}' and dependency group '{group}'");
        self.manifest.save()?;
        Ok(Some(spec))
    }
}
