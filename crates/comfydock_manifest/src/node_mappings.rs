use indexmap::IndexMap;

use crate::{Manifest, ManifestError};

const NODE_MAPPINGS_TABLE: &str = "tool.comfydock.node_mappings";

/// View over `[tool.comfydock.node_mappings]`: workspace-wide resolved
/// mappings from a node type (or `type::signature` compound key) to a
/// package ID. These are written when a user confirms a choice and are
/// consulted before the global mappings table on later runs.
pub struct NodeMappings<'a> {
    manifest: &'a mut Manifest,
}

impl<'a> NodeMappings<'a> {
    pub(crate) fn new(manifest: &'a mut Manifest) -> Self {
        Self { manifest }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.manifest
            .document()
            .get_nested_table(NODE_MAPPINGS_TABLE)
            .ok()
            .and_then(|t| t.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn set(&mut self, key: &str, package_id: &str) -> Result<(), ManifestError> {
        self.manifest
            .document_mut()
            .get_or_insert_nested_table(NODE_MAPPINGS_TABLE)?
            .insert(key, toml_edit::value(package_id));
        tracing::debug!("saved node mapping '{key}' -> '{package_id}'");
        self.manifest.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<bool, ManifestError> {
        let removed = self
            .manifest
            .document_mut()
            .remove_from_table(NODE_MAPPINGS_TABLE, key)
            .is_some();
        if removed {
            self.manifest.save()?;
        }
        Ok(removed)
    }

    pub fn all(&self) -> IndexMap<String, String> {
        let mut mappings = IndexMap::new();
        if let Ok(table) = self.manifest.document().get_nested_table(NODE_MAPPINGS_TABLE) {
            for (key, item) in table.iter() {
                if let Some(package_id) = item.as_str() {
                    mappings.insert(key.to_string(), package_id.to_string());
                }
            }
        }
        mappings
    }
}
