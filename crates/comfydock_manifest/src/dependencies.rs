use indexmap::IndexMap;

use crate::{Manifest, ManifestError};

/// View over the `[dependency-groups]` table. Each installed node package
/// owns one group whose name is derived from the node identity (see
/// [`crate::nodes::NodeSpec::group_name`]).
pub struct Dependencies<'a> {
    manifest: &'a mut Manifest,
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(manifest: &'a mut Manifest) -> Self {
        Self { manifest }
    }

    /// All dependency groups with their requirement specifiers.
    pub fn get_groups(&self) -> IndexMap<String, Vec<String>> {
        let mut groups = IndexMap::new();
        if let Ok(table) = self.manifest.document().get_nested_table("dependency-groups") {
            for (name, item) in table.iter() {
                let specs = item
                    .as_array()
                    .map(|array| {
                        array
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                groups.insert(name.to_string(), specs);
            }
        }
        groups
    }

    /// Append `specs` to `group`, creating it when missing. Existing
    /// specifiers are left untouched so repeated adds are idempotent.
    pub fn add_to_group(&mut self, group: &str, specs: &[String]) -> Result<(), ManifestError> {
        let array = self
            .manifest
            .document_mut()
            .get_or_insert_toml_array_mut("dependency-groups", group)?;

        let mut added = 0usize;
        for spec in specs {
            let exists = array
                .iter()
                .any(|existing| existing.as_str() == Some(spec.as_str()));
            if !exists {
                array.push(spec.as_str());
                added += 1;
            }
        }
        tracing::debug!("added {added} specifier(s) to dependency group '{group}'");
        self.manifest.save()
    }

    /// Remove `group` entirely. Returns `false` when the group did not exist.
    pub fn remove_group(&mut self, group: &str) -> Result<bool, ManifestError> {
        let removed = self
            .manifest
            .document_mut()
            .remove_from_table("dependency-groups", group)
            .is_some();
        if removed {
            tracing::debug!("removed dependency group '{group}'");
            self.manifest.save()?;
        }
        Ok(removed)
    }
}
