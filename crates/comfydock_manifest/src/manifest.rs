use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use fs_err as fs;
use toml_edit::DocumentMut;

use crate::{
    ManifestError, TomlDocument,
    dependencies::Dependencies,
    models::Models,
    node_mappings::NodeMappings,
    nodes::Nodes,
    uv_settings::UvSettings,
    workflows::Workflows,
};

/// The declarative manifest of an environment, backed by the
/// `pyproject.toml` inside the environment's metadata directory.
///
/// All typed views borrow the same owner; there is no cached handler state.
/// Every mutating handler operation persists the full document before it
/// returns, which is what makes interrupted interactive sessions resumable.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    document: TomlDocument,
}

impl Manifest {
    /// Parse the manifest at `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let path = path.into();
        if !path.is_file() {
            return Err(ManifestError::NotFound { path });
        }
        let contents = fs::read_to_string(&path)
            .map_err(|err| ManifestError::invalid(&path, err.to_string()))?;
        Self::from_str_at(&path, &contents)
    }

    /// Parse manifest `contents` as if it lived at `path`. Used both by
    /// [`Manifest::from_path`] and when diffing against a committed copy.
    pub fn from_str_at(path: &Path, contents: &str) -> Result<Self, ManifestError> {
        if contents.trim().is_empty() {
            return Err(ManifestError::invalid(path, "document is empty"));
        }
        let document = DocumentMut::from_str(contents).map_err(|err| ManifestError::Invalid {
            path: path.to_path_buf(),
            reason: "TOML parse error".to_string(),
            source: Some(err),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            document: TomlDocument::new(document),
        })
    }

    /// Write `contents` to `path` and return the parsed manifest. Used by the
    /// environment factory to seed a fresh environment.
    pub fn create(path: impl Into<PathBuf>, contents: &str) -> Result<Self, ManifestError> {
        let path: PathBuf = path.into();
        let manifest = Self::from_str_at(&path, contents)?;
        manifest.save()?;
        Ok(manifest)
    }

    /// Re-read the manifest from disk, discarding in-memory state. Required
    /// after git has rewritten the file underneath us (rollback).
    pub fn reload(&mut self) -> Result<(), ManifestError> {
        *self = Self::from_path(self.path.clone())?;
        Ok(())
    }

    /// Persist the document. Empty sub-tables under the tool namespaces are
    /// elided first; the write is atomic (temp file + rename).
    pub fn save(&self) -> Result<(), ManifestError> {
        let mut document = self.document.clone();
        document.prune_empty_tables(comfydock_consts::TOOL_TABLE_PREFIX);
        document.prune_empty_tables("tool.uv");
        document.prune_empty_tables("tool");
        document.prune_empty_tables("dependency-groups");

        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).map_err(|err| ManifestError::WriteFailed {
            path: self.path.clone(),
            source: err,
        })?;

        let write = || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
            std::io::Write::write_all(&mut temp, document.to_string().as_bytes())?;
            temp.persist(&self.path).map_err(|err| err.error)?;
            Ok(())
        };
        write().map_err(|err| ManifestError::WriteFailed {
            path: self.path.clone(),
            source: err,
        })?;
        tracing::debug!("saved manifest to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &TomlDocument {
        &self.document
    }

    pub(crate) fn document_mut(&mut self) -> &mut TomlDocument {
        &mut self.document
    }

    /// The project name from `[project]`.
    pub fn project_name(&self) -> Option<String> {
        self.document
            .get_nested_table("project")
            .ok()
            .and_then(|t| t.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// A scalar value from the tool namespace, e.g. `comfyui_version`.
    pub fn tool_value(&self, key: &str) -> Option<String> {
        self.document
            .get_nested_table(comfydock_consts::TOOL_TABLE_PREFIX)
            .ok()
            .and_then(|t| t.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn set_tool_value(&mut self, key: &str, value: &str) -> Result<(), ManifestError> {
        self.document
            .get_or_insert_nested_table(comfydock_consts::TOOL_TABLE_PREFIX)?
            .insert(key, toml_edit::value(value));
        self.save()
    }

    // Typed views. Each borrows the manifest; the borrow checker enforces
    // the one-writer rule the storage contract requires.

    pub fn dependencies(&mut self) -> Dependencies<'_> {
        Dependencies::new(self)
    }

    pub fn uv_settings(&mut self) -> UvSettings<'_> {
        UvSettings::new(self)
    }

    pub fn nodes(&mut self) -> Nodes<'_> {
        Nodes::new(self)
    }

    pub fn workflows(&mut self) -> Workflows<'_> {
        Workflows::new(self)
    }

    pub fn models(&mut self) -> Models<'_> {
        Models::new(self)
    }

    pub fn node_mappings(&mut self) -> NodeMappings<'_> {
        NodeMappings::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"[project]
name = "test-env"
version = "0.1.0"
requires-python = ">=3.11"
dependencies = []

[tool.comfydock]
comfyui_version = "v0.3.60"
python_version = "3.12"
"#;

    #[test]
    fn round_trip_preserves_unknown_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        let contents = format!("{MINIMAL}\n[tool.other]\n# a comment\nkey = 1\n");
        let manifest = Manifest::create(&path, &contents).unwrap();
        manifest.save().unwrap();

        let reloaded = fs::read_to_string(&path).unwrap();
        assert!(reloaded.contains("# a comment"));
        assert!(reloaded.contains("[tool.other]"));
    }

    #[test]
    fn parse_then_serialize_then_parse_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        let manifest = Manifest::create(&path, MINIMAL).unwrap();
        manifest.save().unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let again = Manifest::from_path(&path).unwrap();
        again.save().unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::from_path(dir.path().join("pyproject.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }

    #[test]
    fn empty_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(&path, "\n").unwrap();
        let err = Manifest::from_path(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn empty_tool_sections_are_elided_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        let contents = format!(
            "{MINIMAL}\n[tool.comfydock.nodes]\n\n[tool.comfydock.models.required]\n"
        );
        let manifest = Manifest::create(&path, &contents).unwrap();
        manifest.save().unwrap();

        let rendered = fs::read_to_string(&path).unwrap();
        assert!(!rendered.contains("nodes"));
        assert!(!rendered.contains("models"));
        assert!(rendered.contains("[tool.comfydock]"));
    }
}
