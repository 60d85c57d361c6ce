use indexmap::{IndexMap, IndexSet};
use toml_edit::{ArrayOfTables, InlineTable, Item, Table, Value};

use crate::{Manifest, ManifestError};

const UV_TABLE: &str = "tool.uv";
const SOURCES_TABLE: &str = "tool.uv.sources";
const NODES_TABLE: &str = "tool.comfydock.nodes";

/// A named package index (`[[tool.uv.index]]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIndex {
    pub name: String,
    pub url: String,
    pub explicit: bool,
}

/// A source mapping for one package under `[tool.uv.sources]`: either one or
/// more direct URLs with environment markers, or a reference to a named
/// index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Urls(Vec<UrlWithMarker>),
    Index(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlWithMarker {
    pub url: String,
    pub marker: Option<String>,
}

impl UrlWithMarker {
    fn to_inline(&self) -> InlineTable {
        let mut table = InlineTable::new();
        table.insert("url", self.url.as_str().into());
        if let Some(marker) = &self.marker {
            table.insert("marker", marker.as_str().into());
        }
        table
    }
}

/// Extract the bare package name from a PEP 508 requirement specifier,
/// normalized to lowercase.
pub fn extract_package_name(spec: &str) -> String {
    spec.trim()
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        .collect::<String>()
        .to_lowercase()
}

/// View over the `[tool.uv]` configuration the package manager consumes.
pub struct UvSettings<'a> {
    manifest: &'a mut Manifest,
}

impl<'a> UvSettings<'a> {
    pub(crate) fn new(manifest: &'a mut Manifest) -> Self {
        Self { manifest }
    }

    // Constraints

    /// Add or update a constraint specifier in
    /// `tool.uv.constraint-dependencies`, matching by package name.
    pub fn add_constraint(&mut self, spec: &str) -> Result<(), ManifestError> {
        let name = extract_package_name(spec);
        let array = self
            .manifest
            .document_mut()
            .get_or_insert_toml_array_mut(UV_TABLE, "constraint-dependencies")?;

        let existing = array
            .iter()
            .position(|v| v.as_str().map(extract_package_name).as_deref() == Some(name.as_str()));
        match existing {
            Some(index) => {
                array.replace(index, spec);
                tracing::info!("updated constraint '{spec}'");
            }
            None => {
                array.push(spec);
                tracing::info!("added constraint '{spec}'");
            }
        }
        self.manifest.save()
    }

    /// Remove the constraint for `package_name`. Returns `false` when no
    /// constraint matched.
    pub fn remove_constraint(&mut self, package_name: &str) -> Result<bool, ManifestError> {
        let name = package_name.to_lowercase();
        let Some(array) = self
            .manifest
            .document_mut()
            .get_or_insert_nested_table(UV_TABLE)?
            .get_mut("constraint-dependencies")
            .and_then(|item| item.as_array_mut())
        else {
            return Ok(false);
        };

        let before = array.len();
        array.retain(|v| v.as_str().map(extract_package_name).as_deref() != Some(name.as_str()));
        let removed = array.len() != before;
        if removed {
            tracing::info!("removed constraint for '{package_name}'");
            self.manifest.save()?;
        }
        Ok(removed)
    }

    pub fn get_constraints(&self) -> Vec<String> {
        self.manifest
            .document()
            .get_toml_array(UV_TABLE, "constraint-dependencies")
            .map(|array| {
                array
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    // Indexes

    /// Add or update a named index in `[[tool.uv.index]]`.
    pub fn add_index(&mut self, name: &str, url: &str, explicit: bool) -> Result<(), ManifestError> {
        let mut entry = Table::new();
        entry.insert("name", toml_edit::value(name));
        entry.insert("url", toml_edit::value(url));
        entry.insert("explicit", toml_edit::value(explicit));

        let uv = self
            .manifest
            .document_mut()
            .get_or_insert_nested_table(UV_TABLE)?;
        let indexes = uv
            .entry("index")
            .or_insert(Item::ArrayOfTables(ArrayOfTables::new()))
            .as_array_of_tables_mut()
            .ok_or_else(|| crate::TomlError::array_error("index", UV_TABLE))?;

        let existing = indexes
            .iter()
            .position(|t| t.get("name").and_then(|v| v.as_str()) == Some(name));
        match existing {
            Some(index) => *indexes.get_mut(index).expect("position is in bounds") = entry,
            None => indexes.push(entry),
        }
        self.manifest.save()
    }

    pub fn get_indexes(&self) -> Vec<PackageIndex> {
        let Ok(uv) = self.manifest.document().get_nested_table(UV_TABLE) else {
            return Vec::new();
        };
        let Some(indexes) = uv.get("index").and_then(|item| item.as_array_of_tables()) else {
            return Vec::new();
        };
        indexes
            .iter()
            .filter_map(|t| {
                Some(PackageIndex {
                    name: t.get("name")?.as_str()?.to_string(),
                    url: t.get("url")?.as_str()?.to_string(),
                    explicit: t
                        .get("explicit")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                })
            })
            .collect()
    }

    // Sources

    /// Set the source mapping for `package_name`.
    pub fn add_source(
        &mut self,
        package_name: &str,
        source: &PackageSource,
    ) -> Result<(), ManifestError> {
        let value: Value = match source {
            PackageSource::Index(index) => {
                let mut table = InlineTable::new();
                table.insert("index", index.as_str().into());
                table.into()
            }
            PackageSource::Urls(urls) if urls.len() == 1 => urls[0].to_inline().into(),
            PackageSource::Urls(urls) => {
                let mut array = toml_edit::Array::new();
                for url in urls {
                    array.push(Value::from(url.to_inline()));
                }
                array.into()
            }
        };
        self.manifest
            .document_mut()
            .get_or_insert_nested_table(SOURCES_TABLE)?
            .insert(package_name, Item::Value(value));
        tracing::info!("added uv source for '{package_name}'");
        self.manifest.save()
    }

    /// Set URL sources for a package and, when `group` is given, make sure
    /// the package is listed in that dependency group (one entry per unique
    /// marker).
    pub fn add_url_sources(
        &mut self,
        package_name: &str,
        urls: &[UrlWithMarker],
        group: Option<&str>,
    ) -> Result<(), ManifestError> {
        let cleaned: Vec<UrlWithMarker> = urls
            .iter()
            .map(|u| UrlWithMarker {
                url: u.url.clone(),
                marker: u
                    .marker
                    .as_ref()
                    .map(|m| m.replace("\\\"", "\"").replace("\\'", "'")),
            })
            .collect();
        self.add_source(package_name, &PackageSource::Urls(cleaned.clone()))?;

        if let Some(group) = group {
            let markers: IndexSet<String> =
                cleaned.iter().filter_map(|u| u.marker.clone()).collect();
            let specs: Vec<String> = if markers.is_empty() {
                vec![package_name.to_string()]
            } else {
                markers
                    .into_iter()
                    .map(|marker| format!("{package_name} ; {marker}"))
                    .collect()
            };

            // Skip when the group already carries the package under any form.
            let normalized = extract_package_name(package_name);
            let already_present = self
                .manifest
                .document()
                .get_toml_array("dependency-groups", group)
                .map(|array| {
                    array.iter().any(|v| {
                        v.as_str().map(extract_package_name).as_deref()
                            == Some(normalized.as_str())
                    })
                })
                .unwrap_or(false);
            if !already_present {
                self.manifest.dependencies().add_to_group(group, &specs)?;
            }
        }
        Ok(())
    }

    pub fn get_sources(&self) -> IndexMap<String, PackageSource> {
        let mut sources = IndexMap::new();
        let Ok(table) = self.manifest.document().get_nested_table(SOURCES_TABLE) else {
            return sources;
        };
        for (name, item) in table.iter() {
            let Some(value) = item.as_value() else { continue };
            if let Some(parsed) = parse_source_value(value) {
                sources.insert(name.to_string(), parsed);
            }
        }
        sources
    }

    pub fn get_source_names(&self) -> IndexSet<String> {
        self.get_sources().into_keys().collect()
    }

    /// Drop sources that were introduced by removed nodes and are no longer
    /// referenced by any remaining node. Source names matching the protected
    /// set (PyTorch indexes, CPU/CUDA) are never removed.
    pub fn cleanup_orphaned_sources(
        &mut self,
        removed_sources: &[String],
    ) -> Result<(), ManifestError> {
        if removed_sources.is_empty() {
            return Ok(());
        }

        let mut in_use: IndexSet<String> = IndexSet::new();
        if let Ok(nodes) = self.manifest.document().get_nested_table(NODES_TABLE) {
            for (_, item) in nodes.iter() {
                let Some(node) = item.as_table_like() else { continue };
                if let Some(array) = node.get("dependency_sources").and_then(|v| v.as_array()) {
                    in_use.extend(array.iter().filter_map(|v| v.as_str().map(str::to_string)));
                }
            }
        }

        let mut removed_any = false;
        for source_name in removed_sources {
            if in_use.contains(source_name) || is_protected_source(source_name) {
                continue;
            }
            if self
                .manifest
                .document_mut()
                .remove_from_table(SOURCES_TABLE, source_name)
                .is_some()
            {
                tracing::info!("removed orphaned uv source '{source_name}'");
                removed_any = true;
            }
        }
        if removed_any {
            self.manifest.save()?;
        }
        Ok(())
    }
}

fn is_protected_source(source_name: &str) -> bool {
    let lowered = source_name.to_lowercase();
    comfydock_consts::PROTECTED_SOURCES
        .iter()
        .any(|protected| lowered.contains(protected))
}

fn parse_source_value(value: &Value) -> Option<PackageSource> {
    if let Some(table) = value.as_inline_table() {
        if let Some(index) = table.get("index").and_then(|v| v.as_str()) {
            return Some(PackageSource::Index(index.to_string()));
        }
        return Some(PackageSource::Urls(vec![parse_url_entry(table)?]));
    }
    if let Some(array) = value.as_array() {
        let urls: Vec<UrlWithMarker> = array
            .iter()
            .filter_map(|v| v.as_inline_table().and_then(parse_url_entry))
            .collect();
        if !urls.is_empty() {
            return Some(PackageSource::Urls(urls));
        }
    }
    None
}

fn parse_url_entry(table: &InlineTable) -> Option<UrlWithMarker> {
    Some(UrlWithMarker {
        url: table.get("url")?.as_str()?.to_string(),
        marker: table
            .get("marker")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> (tempfile::TempDir, Manifest) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        let manifest = Manifest::create(
            &path,
            "[project]\nname = \"t\"\nversion = \"0.1.0\"\ndependencies = []\n",
        )
        .unwrap();
        (dir, manifest)
    }

    #[test]
    fn add_constraint_updates_existing_by_name() {
        let (_dir, mut manifest) = manifest();
        manifest.uv_settings().add_constraint("numpy<2").unwrap();
        manifest.uv_settings().add_constraint("numpy>=1.26,<2.1").unwrap();

        assert_eq!(
            manifest.uv_settings().get_constraints(),
            vec!["numpy>=1.26,<2.1".to_string()]
        );
    }

    #[test]
    fn remove_constraint_by_package_name() {
        let (_dir, mut manifest) = manifest();
        manifest.uv_settings().add_constraint("torch==2.4.1+cu124").unwrap();
        assert!(manifest.uv_settings().remove_constraint("torch").unwrap());
        assert!(manifest.uv_settings().get_constraints().is_empty());
        assert!(!manifest.uv_settings().remove_constraint("torch").unwrap());
    }

    #[test]
    fn add_index_replaces_by_name() {
        let (_dir, mut manifest) = manifest();
        manifest
            .uv_settings()
            .add_index("pytorch-cuda", "https://download.pytorch.org/whl/cu124", true)
            .unwrap();
        manifest
            .uv_settings()
            .add_index("pytorch-cuda", "https://download.pytorch.org/whl/cu126", true)
            .unwrap();

        let indexes = manifest.uv_settings().get_indexes();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].url, "https://download.pytorch.org/whl/cu126");
    }

    #[test]
    fn url_sources_round_trip() {
        let (_dir, mut manifest) = manifest();
        let urls = vec![
            UrlWithMarker {
                url: "https://example.com/pkg-cp312-linux.whl".to_string(),
                marker: Some("sys_platform == 'linux'".to_string()),
            },
            UrlWithMarker {
                url: "https://example.com/pkg-cp312-win.whl".to_string(),
                marker: Some("sys_platform == 'win32'".to_string()),
            },
        ];
        manifest
            .uv_settings()
            .add_url_sources("insightface", &urls, Some("node-a-00000000"))
            .unwrap();

        let sources = manifest.uv_settings().get_sources();
        assert_eq!(sources.get("insightface"), Some(&PackageSource::Urls(urls)));

        let groups = manifest.dependencies().get_groups();
        let group = groups.get("node-a-00000000").unwrap();
        assert_eq!(group.len(), 2);
        assert!(group[0].starts_with("insightface ; "));
    }

    #[test]
    fn orphan_cleanup_spares_protected_and_in_use_sources() {
        let (_dir, mut manifest) = manifest();
        let single = |url: &str| PackageSource::Urls(vec![UrlWithMarker {
            url: url.to_string(),
            marker: None,
        }]);
        manifest
            .uv_settings()
            .add_source("pytorch-cuda", &PackageSource::Index("pytorch-cuda".into()))
            .unwrap();
        manifest.uv_settings().add_source("orphaned", &single("https://x/a.whl")).unwrap();
        manifest.uv_settings().add_source("shared", &single("https://x/b.whl")).unwrap();

        // A remaining node still references "shared".
        let spec = crate::nodes::NodeSpec {
            name: "keeper".to_string(),
            dependency_sources: vec!["shared".to_string()],
            ..Default::default()
        };
        manifest.nodes().add(&spec, None).unwrap();

        manifest
            .uv_settings()
            .cleanup_orphaned_sources(&[
                "pytorch-cuda".to_string(),
                "orphaned".to_string(),
                "shared".to_string(),
            ])
            .unwrap();

        let names = manifest.uv_settings().get_source_names();
        assert!(names.contains("pytorch-cuda"));
        assert!(names.contains("shared"));
        assert!(!names.contains("orphaned"));
    }
}
