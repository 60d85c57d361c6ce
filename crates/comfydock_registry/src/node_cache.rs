use std::path::{Path, PathBuf};

use comfydock_manifest::NodeSpec;

use crate::RegistryError;

/// On-disk cache of extracted node packages, keyed by
/// `(source kind, identifier, version-or-commit)`. Entries are write-once:
/// reinstalling the same node version is a local copy.
#[derive(Debug, Clone)]
pub struct NodeCache {
    base_dir: PathBuf,
}

impl NodeCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn cache_key(spec: &NodeSpec) -> String {
        let identifier = spec
            .registry_id
            .as_deref()
            .or(spec.repository.as_deref())
            .unwrap_or(&spec.name);
        let version = spec.version.as_deref().unwrap_or("unversioned");
        sanitize(&format!("{}_{identifier}_{version}", spec.source.as_str()))
    }

    pub fn cached_path(&self, spec: &NodeSpec) -> Option<PathBuf> {
        let path = self.base_dir.join(Self::cache_key(spec));
        path.is_dir().then_some(path)
    }

    /// Copy an extracted node tree into the cache. An existing entry for
    /// the same key is left untouched.
    pub fn store(&self, spec: &NodeSpec, source_dir: &Path) -> Result<PathBuf, RegistryError> {
        let target = self.base_dir.join(Self::cache_key(spec));
        if target.is_dir() {
            return Ok(target);
        }
        copy_dir(source_dir, &target)?;
        tracing::debug!("cached node '{}' at {}", spec.name, target.display());
        Ok(target)
    }

    /// Copy a cached entry to `target`.
    pub fn restore(&self, spec: &NodeSpec, target: &Path) -> Result<bool, RegistryError> {
        match self.cached_path(spec) {
            Some(cached) => {
                copy_dir(&cached, target)?;
                tracing::debug!("restored node '{}' from cache", spec.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

/// Recursive directory copy that skips `.git` (pins live in the manifest,
/// not in the cached tree).
pub(crate) fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    fs_err::create_dir_all(to)?;
    for entry in fs_err::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let source = entry.path();
        let target = to.join(&name);
        if entry.file_type()?.is_dir() {
            copy_dir(&source, &target)?;
        } else {
            fs_err::copy(&source, &target)?;
        }
    }
    Ok(())
}
