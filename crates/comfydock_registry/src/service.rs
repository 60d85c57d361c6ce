use std::{
    io::Read,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
    time::Duration,
};

use comfydock_manifest::{NodeSource, NodeSpec};

use crate::{
    ApiCache, GitHubClient, NodeCache, RegistryClient, RegistryError, node_cache::copy_dir,
    scan::scan_requirements,
};

/// A node resolved to install state: the manifest entry plus the Python
/// requirements its tree declares.
#[derive(Debug, Clone)]
pub struct NodePackage {
    pub spec: NodeSpec,
    pub requirements: Vec<String>,
}

impl NodePackage {
    pub fn identifier(&self) -> &str {
        self.spec.identifier()
    }
}

/// Finds node packages in the registry or on the hosting service, downloads
/// them (through the write-once node cache), and scans their requirements.
pub struct NodeService {
    registry: RegistryClient,
    github: GitHubClient,
    cache: NodeCache,
}

impl NodeService {
    pub fn new(cache_dir: impl Into<PathBuf>, api_cache: Option<Arc<ApiCache>>) -> Self {
        Self {
            registry: RegistryClient::new(
                comfydock_consts::DEFAULT_REGISTRY_URL,
                api_cache.clone(),
            ),
            github: GitHubClient::new(comfydock_consts::DEFAULT_GITHUB_API_URL, api_cache),
            cache: NodeCache::new(cache_dir),
        }
    }

    pub fn with_clients(
        registry: RegistryClient,
        github: GitHubClient,
        cache: NodeCache,
    ) -> Self {
        Self {
            registry,
            github,
            cache,
        }
    }

    pub fn node_cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Resolve an identifier (a registry ID, optionally `@version`, or a git
    /// URL) to a manifest-ready node spec.
    pub fn find_node(&self, identifier: &str) -> Result<NodeSpec, RegistryError> {
        // Git URLs are validated against the hosting service and pinned to
        // a commit.
        if identifier.starts_with("https://")
            || identifier.starts_with("git@")
            || identifier.starts_with("ssh://")
        {
            let info = self.github.get_repository_info(identifier)?;
            return Ok(NodeSpec {
                name: info.name.clone(),
                repository: info.clone_url,
                version: info.latest_commit,
                source: NodeSource::Git,
                ..NodeSpec::default()
            });
        }

        let (node_id, requested_version) = match identifier.split_once('@') {
            Some((id, version)) => (id, Some(version)),
            None => (identifier, None),
        };

        let node = self.registry.get_node(node_id)?;
        let install = self
            .registry
            .get_install_version(&node.id, requested_version)?;
        tracing::info!("found node '{}' in registry at version {}", node.name, install.version);
        Ok(NodeSpec {
            name: node.name,
            registry_id: Some(node.id),
            repository: node.repository,
            version: Some(install.version),
            download_url: install.download_url,
            source: NodeSource::Registry,
            ..NodeSpec::default()
        })
    }

    /// Resolve an identifier and scan its tree for Python requirements.
    /// Downloads go through the node cache, so repeated prepares of the
    /// same version touch the network once.
    pub fn prepare_node(&self, identifier: &str) -> Result<NodePackage, RegistryError> {
        let spec = self.find_node(identifier)?;
        let requirements = self.scan_node_requirements(&spec)?;
        Ok(NodePackage { spec, requirements })
    }

    fn scan_node_requirements(&self, spec: &NodeSpec) -> Result<Vec<String>, RegistryError> {
        if let Some(cached) = self.cache.cached_path(spec) {
            return Ok(scan_requirements(&cached));
        }
        let staging = tempfile::tempdir()?;
        let node_dir = staging.path().join("node");
        self.download_node(spec, &node_dir)?;
        Ok(scan_requirements(&node_dir))
    }

    /// Materialize a node's tree at `target_path`: from the cache when
    /// present, otherwise by archive download (registry) or clone (git),
    /// caching the fresh tree afterwards.
    pub fn download_node(&self, spec: &NodeSpec, target_path: &Path) -> Result<(), RegistryError> {
        if self.cache.restore(spec, target_path)? {
            return Ok(());
        }

        match spec.source {
            NodeSource::Registry => {
                let url = spec.download_url.as_deref().ok_or_else(|| {
                    RegistryError::NotFound(format!("no download URL for node '{}'", spec.name))
                })?;
                tracing::info!("downloading '{}' from {url}", spec.name);
                download_and_extract_archive(url, target_path)?;
            }
            NodeSource::Git => {
                let url = spec.repository.as_deref().ok_or_else(|| {
                    RegistryError::NotFound(format!("no repository URL for node '{}'", spec.name))
                })?;
                tracing::info!("cloning '{}' from {url}", spec.name);
                git_clone(url, target_path, spec.version.as_deref())?;
            }
            NodeSource::Development | NodeSource::Unknown => {
                return Err(RegistryError::NotFound(format!(
                    "node '{}' has no downloadable source",
                    spec.name
                )));
            }
        }

        self.cache.store(spec, target_path)?;
        Ok(())
    }
}

fn git_clone(url: &str, target: &Path, reference: Option<&str>) -> Result<(), RegistryError> {
    let mut command = Command::new("git");
    command.arg("clone");
    // A pinned commit needs full history to check out; otherwise a shallow
    // clone is enough.
    if reference.is_none() {
        command.args(["--depth", "1"]);
    }
    command.arg(url).arg(target);
    let output = command.output()?;
    if !output.status.success() {
        return Err(RegistryError::CloneFailed {
            url: url.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    if let Some(reference) = reference {
        let output = Command::new("git")
            .arg("-C")
            .arg(target)
            .args(["checkout", "--quiet", reference])
            .output()?;
        if !output.status.success() {
            return Err(RegistryError::CloneFailed {
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
    }
    Ok(())
}

/// Fetch a zip archive and extract it into `target_path`. Archives that
/// wrap everything in a single top-level directory are flattened.
fn download_and_extract_archive(url: &str, target_path: &Path) -> Result<(), RegistryError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_default();
    let mut response = client
        .get(url)
        .send()
        .map_err(|source| RegistryError::Unavailable { source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut archive_file = tempfile::tempfile()?;
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = response.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        std::io::Write::write_all(&mut archive_file, &buffer[..read])?;
    }

    let mut archive = zip::ZipArchive::new(archive_file)?;
    let staging = tempfile::tempdir()?;
    archive.extract(staging.path())?;

    // Flatten a single wrapping directory.
    let entries: Vec<PathBuf> = fs_err::read_dir(staging.path())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    let source_root = match entries.as_slice() {
        [single] if single.is_dir() => single.clone(),
        _ => staging.path().to_path_buf(),
    };
    copy_dir(&source_root, target_path)?;
    Ok(())
}
