use std::path::Path;

use comfydock_manifest::{ModelStatus, WorkflowEntry};
use comfydock_model_index::{ModelRepository, ModelWithLocation};
use comfydock_registry::MatchType;
use comfydock_workflow::{LoaderTable, ModelRef};

use crate::CoreError;

/// A settled model resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResolution {
    pub reference: ModelRef,
    pub model: ModelWithLocation,
    pub match_type: MatchType,
    pub confidence: f32,
}

/// Outcome of the resolution chain for one reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelLookup {
    Resolved(ModelResolution),
    Ambiguous {
        reference: ModelRef,
        candidates: Vec<ModelWithLocation>,
    },
    NotFound {
        reference: ModelRef,
    },
}

impl ModelLookup {
    pub fn reference(&self) -> &ModelRef {
        match self {
            ModelLookup::Resolved(resolution) => &resolution.reference,
            ModelLookup::Ambiguous { reference, .. } => reference,
            ModelLookup::NotFound { reference } => reference,
        }
    }
}

/// Resolves workflow model references against the model index using a
/// prioritized strategy chain. Read-only: persisting an outcome is the
/// workflow manager's job.
pub struct ModelResolver<'a> {
    repository: &'a ModelRepository,
    loaders: LoaderTable,
}

impl<'a> ModelResolver<'a> {
    pub fn new(repository: &'a ModelRepository) -> Self {
        Self {
            repository,
            loaders: LoaderTable,
        }
    }

    /// Run the chain for one reference. `previous` is the workflow's
    /// persisted entry; a still-valid prior resolution for the same
    /// `(node_id, widget_index)` wins outright, which is what makes
    /// interrupted sessions resume instead of re-asking.
    pub fn resolve(
        &self,
        reference: &ModelRef,
        previous: Option<&WorkflowEntry>,
    ) -> Result<ModelLookup, CoreError> {
        // Priority 0: previous resolution from the manifest.
        if let Some(entry) = previous {
            if let Some(lookup) = self.try_previous_resolution(reference, entry)? {
                return Ok(lookup);
            }
        }

        // Priority 1: exact relative path.
        if let Some(model) = self.repository.find_by_exact_path(&reference.widget_value)? {
            tracing::debug!("exact path match for '{}'", reference.widget_value);
            return Ok(resolved(reference, model, MatchType::Exact, 1.0));
        }

        // Priority 2: reconstructed path for known loader node types.
        if self.loaders.is_loader(&reference.node_type) {
            for path in self
                .loaders
                .reconstruct_paths(&reference.node_type, &reference.widget_value)
            {
                if let Some(model) = self.repository.find_by_exact_path(&path)? {
                    tracing::debug!(
                        "reconstructed '{}' -> '{path}'",
                        reference.widget_value
                    );
                    return Ok(resolved(reference, model, MatchType::Reconstructed, 0.9));
                }
            }
        }

        // Priority 3: case-insensitive path match.
        let lowered = reference.widget_value.to_lowercase();
        let case_matches: Vec<ModelWithLocation> = self
            .repository
            .get_all_models()?
            .into_iter()
            .filter(|model| model.relative_path.to_lowercase() == lowered)
            .collect();
        if case_matches.len() == 1 {
            let model = case_matches.into_iter().next().expect("length checked");
            return Ok(resolved(reference, model, MatchType::CaseInsensitive, 0.8));
        }

        // Priority 4: filename-only match.
        let filename = Path::new(&reference.widget_value)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&reference.widget_value);
        let mut filename_matches: Vec<ModelWithLocation> = self
            .repository
            .find_by_filename(filename)?
            .into_iter()
            .filter(|model| model.filename == filename)
            .collect();
        match filename_matches.len() {
            0 => Ok(ModelLookup::NotFound {
                reference: reference.clone(),
            }),
            1 => {
                let model = filename_matches.remove(0);
                Ok(resolved(reference, model, MatchType::Filename, 0.7))
            }
            _ => Ok(ModelLookup::Ambiguous {
                reference: reference.clone(),
                candidates: filename_matches,
            }),
        }
    }

    fn try_previous_resolution(
        &self,
        reference: &ModelRef,
        entry: &WorkflowEntry,
    ) -> Result<Option<ModelLookup>, CoreError> {
        for model in entry.models.values() {
            if model.status != ModelStatus::Resolved {
                continue;
            }
            let Some(hash) = &model.hash else { continue };
            let covers = model.nodes.iter().any(|location| {
                location.node_id == reference.node_id
                    && location.widget_idx == reference.widget_index
            });
            if !covers {
                continue;
            }

            // The persisted hash must still be backed by the index;
            // otherwise a fresh resolution is needed.
            let mut found = self.repository.find_model_by_hash(hash)?;
            if found.is_empty() {
                tracing::debug!(
                    "persisted hash {hash} no longer indexed; re-resolving '{}'",
                    reference.widget_value
                );
                return Ok(None);
            }
            return Ok(Some(resolved(
                reference,
                found.remove(0),
                MatchType::WorkflowContext,
                1.0,
            )));
        }
        Ok(None)
    }
}

fn resolved(
    reference: &ModelRef,
    model: ModelWithLocation,
    match_type: MatchType,
    confidence: f32,
) -> ModelLookup {
    ModelLookup::Resolved(ModelResolution {
        reference: reference.clone(),
        model,
        match_type,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use comfydock_manifest::{NodeLocation, WorkflowModel};

    use super::*;

    fn reference(node_type: &str, value: &str) -> ModelRef {
        ModelRef {
            node_id: "4".to_string(),
            node_type: node_type.to_string(),
            widget_index: 0,
            widget_value: value.to_string(),
        }
    }

    fn repo_with(paths: &[&str]) -> (tempfile::TempDir, ModelRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModelRepository::new(dir.path().join("models.db")).unwrap();
        for (index, path) in paths.iter().enumerate() {
            let hash = format!("hash{index}");
            repo.ensure_model(&hash, 100 + index as u64, None, None).unwrap();
            let filename = std::path::Path::new(path)
                .file_name()
                .unwrap()
                .to_str()
                .unwrap();
            repo.add_location(&hash, path, filename, 1.0).unwrap();
        }
        (dir, repo)
    }

    #[test]
    fn exact_path_wins() {
        let (_dir, repo) = repo_with(&["checkpoints/sd15.safetensors"]);
        let resolver = ModelResolver::new(&repo);

        let lookup = resolver
            .resolve(&reference("CheckpointLoaderSimple", "checkpoints/sd15.safetensors"), None)
            .unwrap();
        let ModelLookup::Resolved(resolution) = lookup else {
            panic!("expected resolved");
        };
        assert_eq!(resolution.match_type, MatchType::Exact);
        assert_eq!(resolution.confidence, 1.0);
    }

    #[test]
    fn loader_path_is_reconstructed() {
        let (_dir, repo) = repo_with(&["checkpoints/sd15.safetensors"]);
        let resolver = ModelResolver::new(&repo);

        let lookup = resolver
            .resolve(&reference("CheckpointLoaderSimple", "sd15.safetensors"), None)
            .unwrap();
        let ModelLookup::Resolved(resolution) = lookup else {
            panic!("expected resolved");
        };
        assert_eq!(resolution.match_type, MatchType::Reconstructed);
        assert_eq!(resolution.model.relative_path, "checkpoints/sd15.safetensors");
    }

    #[test]
    fn case_insensitive_match() {
        let (_dir, repo) = repo_with(&["loras/Style.safetensors"]);
        let resolver = ModelResolver::new(&repo);

        let lookup = resolver
            .resolve(&reference("SomeCustomNode", "loras/style.safetensors"), None)
            .unwrap();
        let ModelLookup::Resolved(resolution) = lookup else {
            panic!("expected resolved");
        };
        assert_eq!(resolution.match_type, MatchType::CaseInsensitive);
    }

    #[test]
    fn filename_only_single_hit() {
        let (_dir, repo) = repo_with(&["loras/style/model.safetensors"]);
        let resolver = ModelResolver::new(&repo);

        let lookup = resolver
            .resolve(&reference("SomeCustomNode", "model.safetensors"), None)
            .unwrap();
        let ModelLookup::Resolved(resolution) = lookup else {
            panic!("expected resolved");
        };
        assert_eq!(resolution.match_type, MatchType::Filename);
        assert_eq!(resolution.confidence, 0.7);
        // The widget value is untouched; the index location is the target.
        assert_eq!(resolution.reference.widget_value, "model.safetensors");
    }

    #[test]
    fn filename_multiple_hits_are_ambiguous() {
        let (_dir, repo) = repo_with(&[
            "loras/a/model.safetensors",
            "loras/b/model.safetensors",
        ]);
        let resolver = ModelResolver::new(&repo);

        let lookup = resolver
            .resolve(&reference("SomeCustomNode", "model.safetensors"), None)
            .unwrap();
        let ModelLookup::Ambiguous { candidates, .. } = lookup else {
            panic!("expected ambiguous");
        };
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn nothing_matches_is_not_found() {
        let (_dir, repo) = repo_with(&[]);
        let resolver = ModelResolver::new(&repo);

        let lookup = resolver
            .resolve(&reference("SomeCustomNode", "ghost.safetensors"), None)
            .unwrap();
        assert!(matches!(lookup, ModelLookup::NotFound { .. }));
    }

    #[test]
    fn previous_resolution_takes_priority() {
        let (_dir, repo) = repo_with(&["checkpoints/other.safetensors"]);
        // Index the previously chosen model under a known hash.
        repo.ensure_model("chosen-hash", 5, None, None).unwrap();
        repo.add_location("chosen-hash", "checkpoints/chosen.safetensors", "chosen.safetensors", 1.0)
            .unwrap();

        let mut entry = WorkflowEntry::for_file("wf");
        entry.models.insert(
            "chosen-hash".to_string(),
            WorkflowModel {
                hash: Some("chosen-hash".to_string()),
                filename: "chosen.safetensors".to_string(),
                status: ModelStatus::Resolved,
                nodes: vec![NodeLocation {
                    node_id: "4".to_string(),
                    widget_idx: 0,
                    widget_value: "other.safetensors".to_string(),
                }],
                ..WorkflowModel::default()
            },
        );

        let resolver = ModelResolver::new(&repo);
        let lookup = resolver
            .resolve(&reference("CheckpointLoaderSimple", "other.safetensors"), Some(&entry))
            .unwrap();
        let ModelLookup::Resolved(resolution) = lookup else {
            panic!("expected resolved");
        };
        assert_eq!(resolution.model.hash, "chosen-hash");
        assert_eq!(resolution.match_type, MatchType::WorkflowContext);
    }

    #[test]
    fn stale_previous_hash_falls_through_to_fresh_resolution() {
        let (_dir, repo) = repo_with(&["checkpoints/other.safetensors"]);

        let mut entry = WorkflowEntry::for_file("wf");
        entry.models.insert(
            "gone-hash".to_string(),
            WorkflowModel {
                hash: Some("gone-hash".to_string()),
                filename: "gone.safetensors".to_string(),
                status: ModelStatus::Resolved,
                nodes: vec![NodeLocation {
                    node_id: "4".to_string(),
                    widget_idx: 0,
                    widget_value: "checkpoints/other.safetensors".to_string(),
                }],
                ..WorkflowModel::default()
            },
        );

        let resolver = ModelResolver::new(&repo);
        let lookup = resolver
            .resolve(
                &reference("CheckpointLoaderSimple", "checkpoints/other.safetensors"),
                Some(&entry),
            )
            .unwrap();
        let ModelLookup::Resolved(resolution) = lookup else {
            panic!("expected resolved");
        };
        assert_eq!(resolution.match_type, MatchType::Exact);
    }
}
