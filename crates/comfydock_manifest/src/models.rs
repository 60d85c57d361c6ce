use indexmap::{IndexMap, IndexSet};
use toml_edit::InlineTable;

use crate::{Manifest, ManifestError};

const MODELS_TABLE: &str = "tool.comfydock.models";

/// Category of a globally tracked model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCategory {
    Required,
    Optional,
}

impl ModelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCategory::Required => "required",
            ModelCategory::Optional => "optional",
        }
    }

    pub const ALL: [ModelCategory; 2] = [ModelCategory::Required, ModelCategory::Optional];

    fn table(&self) -> String {
        format!("{MODELS_TABLE}.{}", self.as_str())
    }
}

/// A model in the environment-wide registry, keyed by short hash.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestModel {
    pub filename: String,
    pub size: u64,
    pub blake3: Option<String>,
    pub sha256: Option<String>,
    pub sources: Vec<String>,
}

impl ManifestModel {
    fn to_inline(&self) -> InlineTable {
        let mut table = InlineTable::new();
        table.insert("filename", self.filename.as_str().into());
        table.insert("size", (self.size as i64).into());
        if let Some(blake3) = &self.blake3 {
            table.insert("blake3", blake3.as_str().into());
        }
        if let Some(sha256) = &self.sha256 {
            table.insert("sha256", sha256.as_str().into());
        }
        if !self.sources.is_empty() {
            let mut array = toml_edit::Array::new();
            for source in &self.sources {
                array.push(source.as_str());
            }
            table.insert("sources", array.into());
        }
        table
    }

    fn from_inline(table: &InlineTable) -> Self {
        let get = |field: &str| {
            table
                .get(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        ManifestModel {
            filename: get("filename").unwrap_or_default(),
            size: table
                .get("size")
                .and_then(|v| v.as_integer())
                .unwrap_or_default() as u64,
            blake3: get("blake3"),
            sha256: get("sha256"),
            sources: table
                .get("sources")
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

/// View over `[tool.comfydock.models.required]` and `.optional`.
pub struct Models<'a> {
    manifest: &'a mut Manifest,
}

impl<'a> Models<'a> {
    pub(crate) fn new(manifest: &'a mut Manifest) -> Self {
        Self { manifest }
    }

    pub fn add_model(
        &mut self,
        hash: &str,
        model: &ManifestModel,
        category: ModelCategory,
    ) -> Result<(), ManifestError> {
        self.manifest
            .document_mut()
            .get_or_insert_nested_table(&category.table())?
            .insert(hash, toml_edit::value(model.to_inline()));
        tracing::debug!(
            "added {} model '{}' ({hash})",
            category.as_str(),
            model.filename
        );
        self.manifest.save()
    }

    /// Remove a model, from `category` when given, otherwise from whichever
    /// category currently holds it.
    pub fn remove_model(
        &mut self,
        hash: &str,
        category: Option<ModelCategory>,
    ) -> Result<bool, ManifestError> {
        let categories = match category {
            Some(category) => vec![category],
            None => ModelCategory::ALL.to_vec(),
        };
        for category in categories {
            if self
                .manifest
                .document_mut()
                .remove_from_table(&category.table(), hash)
                .is_some()
            {
                tracing::debug!("removed model {hash} from {}", category.as_str());
                self.manifest.save()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The category a model is tracked under, if any.
    pub fn has_model(&self, hash: &str) -> Option<ModelCategory> {
        ModelCategory::ALL.into_iter().find(|category| {
            self.manifest
                .document()
                .get_nested_table(&category.table())
                .ok()
                .and_then(|t| t.get(hash))
                .is_some()
        })
    }

    pub fn get_category(&self, category: ModelCategory) -> IndexMap<String, ManifestModel> {
        let mut models = IndexMap::new();
        if let Ok(table) = self.manifest.document().get_nested_table(&category.table()) {
            for (hash, item) in table.iter() {
                if let Some(inline) = item.as_value().and_then(|v| v.as_inline_table()) {
                    models.insert(hash.to_string(), ManifestModel::from_inline(inline));
                }
            }
        }
        models
    }

    pub fn get(&self, hash: &str) -> Option<ManifestModel> {
        ModelCategory::ALL.into_iter().find_map(|category| {
            self.manifest
                .document()
                .get_nested_table(&category.table())
                .ok()
                .and_then(|t| t.get(hash))
                .and_then(|item| item.as_value())
                .and_then(|v| v.as_inline_table())
                .map(ManifestModel::from_inline)
        })
    }

    pub fn all_hashes(&self) -> IndexSet<String> {
        ModelCategory::ALL
            .into_iter()
            .flat_map(|category| self.get_category(category).into_keys())
            .collect()
    }

    /// Merge metadata into an existing model entry. Returns `false` when the
    /// model is not tracked.
    pub fn update_model_metadata(
        &mut self,
        hash: &str,
        blake3: Option<&str>,
        sha256: Option<&str>,
        sources: Option<&[String]>,
    ) -> Result<bool, ManifestError> {
        let Some(category) = self.has_model(hash) else {
            return Ok(false);
        };
        let mut model = self.get(hash).expect("has_model implies get");
        if let Some(blake3) = blake3 {
            model.blake3 = Some(blake3.to_string());
        }
        if let Some(sha256) = sha256 {
            model.sha256 = Some(sha256.to_string());
        }
        if let Some(sources) = sources {
            for source in sources {
                if !model.sources.contains(source) {
                    model.sources.push(source.clone());
                }
            }
        }
        self.add_model(hash, &model, category)?;
        Ok(true)
    }
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

    fn model(filename: &str) -> ManifestModel {
        ManifestModel {
            filename: filename.to_string(),
            size: 1_234_567,
            ..ManifestModel::default()
        }
    }

    #[test]
    fn required_only_does_not_create_optional_section() {
        let (_dir, mut manifest) = manifest();
        manifest
            .models()
            .add_model("abc123", &model("test.safetensors"), ModelCategory::Required)
            .unwrap();

        let rendered = fs_err::read_to_string(manifest.path()).unwrap();
        assert!(rendered.contains("[tool.comfydock.models.required]"));
        assert!(!rendered.contains("optional"));

        let entry_line = rendered
            .lines()
            .find(|line| line.starts_with("abc123"))
            .expect("inline entry");
        assert!(entry_line.contains("filename"));
        assert!(entry_line.contains("size"));
    }

    #[test]
    fn has_model_reports_category() {
        let (_dir, mut manifest) = manifest();
        manifest
            .models()
            .add_model("req1", &model("a.safetensors"), ModelCategory::Required)
            .unwrap();
        manifest
            .models()
            .add_model("opt1", &model("b.safetensors"), ModelCategory::Optional)
            .unwrap();

        assert_eq!(manifest.models().has_model("req1"), Some(ModelCategory::Required));
        assert_eq!(manifest.models().has_model("opt1"), Some(ModelCategory::Optional));
        assert_eq!(manifest.models().has_model("ghost"), None);
        assert_eq!(manifest.models().all_hashes().len(), 2);
    }

    #[test]
    fn removing_all_models_cleans_sections() {
        let (_dir, mut manifest) = manifest();
        manifest
            .models()
            .add_model("h1", &model("a.safetensors"), ModelCategory::Required)
            .unwrap();
        manifest
            .models()
            .add_model("h2", &model("b.safetensors"), ModelCategory::Optional)
            .unwrap();

        assert!(manifest.models().remove_model("h1", None).unwrap());
        assert!(manifest.models().remove_model("h2", None).unwrap());

        let rendered = fs_err::read_to_string(manifest.path()).unwrap();
        assert!(!rendered.contains("[tool.comfydock.models"));
    }

    #[test]
    fn update_metadata_merges_hashes_and_sources() {
        let (_dir, mut manifest) = manifest();
        manifest
            .models()
            .add_model("h1", &model("a.safetensors"), ModelCategory::Required)
            .unwrap();

        let updated = manifest
            .models()
            .update_model_metadata(
                "h1",
                Some("blakeblake"),
                None,
                Some(&["https://example.com/a".to_string()]),
            )
            .unwrap();
        assert!(updated);

        let loaded = manifest.models().get("h1").unwrap();
        assert_eq!(loaded.blake3.as_deref(), Some("blakeblake"));
        assert_eq!(loaded.sources, vec!["https://example.com/a".to_string()]);
    }
}
