use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};

use comfydock_manifest::{
    Criticality, CustomNodeMapping, Manifest, ManifestModel, ModelCategory, ModelStatus,
    NodeLocation, WorkflowEntry, WorkflowModel,
};
use comfydock_model_index::{
    DownloadRequest, ModelDownloader, ModelRepository, ModelWithLocation,
};
use comfydock_registry::{MatchType, NodeMappings, ResolvedNodePackage};
use comfydock_workflow::{
    LoaderTable, ModelRef, NodeClassifier, Workflow, extract_model_refs, input_signature,
    node_key,
};

use crate::{
    CoreError, DownloadCallbacks, ModelLookup, ModelResolution, ModelResolver,
    strategies::{
        MissingModelChoice, ModelChoice, ModelResolutionStrategy, NodeChoice,
        NodeResolutionStrategy,
    },
};

/// Relationship between the active workflow file and its committed copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowSyncState {
    Synced,
    New,
    Modified,
    Deleted,
}

impl WorkflowSyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowSyncState::Synced => "synced",
            WorkflowSyncState::New => "new",
            WorkflowSyncState::Modified => "modified",
            WorkflowSyncState::Deleted => "deleted",
        }
    }
}

/// Read-only analysis of one workflow: its sync state, the custom node
/// types with their mapping candidates, and the initial model lookups.
#[derive(Debug)]
pub struct WorkflowAnalysis {
    pub name: String,
    pub path: PathBuf,
    pub sync_state: WorkflowSyncState,
    pub already_tracked: bool,
    pub builtin_count: usize,
    pub custom_node_types: Vec<String>,
    /// Node types the workflow's `custom_node_map` marks as not needed.
    pub optional_node_types: Vec<String>,
    pub node_candidates: IndexMap<String, Vec<ResolvedNodePackage>>,
    pub model_lookups: Vec<ModelLookup>,
    /// Node ids present in the current graph, for reconciliation.
    pub node_ids: IndexSet<String>,
}

/// One settled node resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResolved {
    pub node_type: String,
    pub package_id: String,
    pub rank: u32,
    pub match_type: MatchType,
}

/// The work list produced by [`WorkflowManager::resolve_workflow`]:
/// auto-settled items plus the ambiguous/unresolved remainder for the fix
/// loop.
#[derive(Debug, Default)]
pub struct ResolutionResult {
    pub workflow: String,
    pub nodes_resolved: Vec<NodeResolved>,
    pub nodes_ambiguous: Vec<(String, Vec<ResolvedNodePackage>)>,
    pub nodes_unresolved: Vec<String>,
    pub models_resolved: Vec<ModelResolution>,
    pub models_ambiguous: Vec<(ModelRef, Vec<ModelWithLocation>)>,
    pub models_unresolved: Vec<ModelRef>,
    node_ids: IndexSet<String>,
    present_types: IndexSet<String>,
    /// Every package id that any candidate of a present type points at;
    /// used to retain prior resolutions during reconciliation.
    justified_packages: IndexSet<String>,
}

impl ResolutionResult {
    pub fn has_issues(&self) -> bool {
        !self.nodes_ambiguous.is_empty()
            || !self.nodes_unresolved.is_empty()
            || !self.models_ambiguous.is_empty()
            || !self.models_unresolved.is_empty()
    }
}

/// Orchestrates per-workflow dependency resolution: pure analysis, an
/// auto-resolution pass, manifest writes, and the interactive fix loop.
///
/// The invariant the fix loop maintains is progressive persistence: every
/// positive decision is a complete manifest save before the next decision
/// is solicited, so a cancelled session loses nothing it already settled.
pub struct WorkflowManager<'a> {
    manifest: &'a mut Manifest,
    repository: &'a ModelRepository,
    mappings: &'a NodeMappings,
    auto_select_ambiguous: bool,
    active_dir: PathBuf,
    tracked_dir: PathBuf,
    models_dir: PathBuf,
}

impl<'a> WorkflowManager<'a> {
    pub fn new(
        manifest: &'a mut Manifest,
        repository: &'a ModelRepository,
        mappings: &'a NodeMappings,
        auto_select_ambiguous: bool,
        active_dir: impl Into<PathBuf>,
        tracked_dir: impl Into<PathBuf>,
        models_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manifest,
            repository,
            mappings,
            auto_select_ambiguous,
            active_dir: active_dir.into(),
            tracked_dir: tracked_dir.into(),
            models_dir: models_dir.into(),
        }
    }

    fn active_path(&self, name: &str) -> PathBuf {
        self.active_dir.join(format!("{name}.json"))
    }

    fn tracked_path(&self, name: &str) -> PathBuf {
        self.tracked_dir.join(format!("{name}.json"))
    }

    /// Workflow names present in the active workflows directory.
    pub fn list_active_workflows(&self) -> Result<Vec<String>, CoreError> {
        let mut names = Vec::new();
        if self.active_dir.is_dir() {
            for entry in fs_err::read_dir(&self.active_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Sync state of one workflow against its committed copy. Comparison is
    /// volatile-field insensitive.
    pub fn sync_state(&self, name: &str) -> Result<WorkflowSyncState, CoreError> {
        let active = self.active_path(name);
        let tracked = self.tracked_path(name);
        match (active.is_file(), tracked.is_file()) {
            (true, false) => Ok(WorkflowSyncState::New),
            (false, true) => Ok(WorkflowSyncState::Deleted),
            (false, false) => Err(CoreError::WorkflowNotFound(name.to_string())),
            (true, true) => {
                let active = Workflow::from_str(&fs_err::read_to_string(&active)?)?;
                let tracked = Workflow::from_str(&fs_err::read_to_string(&tracked)?)?;
                if active.is_equivalent_to(&tracked) {
                    Ok(WorkflowSyncState::Synced)
                } else {
                    Ok(WorkflowSyncState::Modified)
                }
            }
        }
    }

    /// Pure, read-only analysis: parse the workflow, classify its nodes,
    /// collect mapping candidates for every custom type, and run the model
    /// resolution chain for every extracted reference.
    pub fn analyze_workflow(&mut self, name: &str) -> Result<WorkflowAnalysis, CoreError> {
        let path = self.active_path(name);
        if !path.is_file() {
            return Err(CoreError::WorkflowNotFound(name.to_string()));
        }
        let workflow = Workflow::from_str(&fs_err::read_to_string(&path)?)?;

        let classifier = NodeClassifier::new();
        let classified = classifier.classify(&workflow);
        let custom_node_types = classifier.custom_node_types(&workflow);

        let entry = self.manifest.workflows().get(name);
        let workspace_mappings = self.manifest.node_mappings().all();

        let mut node_candidates = IndexMap::new();
        let mut optional_node_types = Vec::new();
        for node_type in &custom_node_types {
            let node = workflow
                .nodes
                .values()
                .find(|node| &node.r#type == node_type)
                .expect("type collected from this workflow");

            // Priority 1: the workflow's own overrides.
            match entry.as_ref().and_then(|e| e.custom_node_map.get(node_type)) {
                Some(CustomNodeMapping::Optional) => {
                    optional_node_types.push(node_type.clone());
                    continue;
                }
                Some(CustomNodeMapping::Package(package_id)) => {
                    node_candidates.insert(
                        node_type.clone(),
                        vec![ResolvedNodePackage {
                            package_id: package_id.clone(),
                            versions: Vec::new(),
                            rank: 1,
                            match_type: MatchType::CustomMapping,
                        }],
                    );
                    continue;
                }
                None => {}
            }

            // Priority 2: package id stamped into the node properties.
            if let Some(cnr_id) = node.cnr_id() {
                node_candidates.insert(
                    node_type.clone(),
                    vec![ResolvedNodePackage {
                        package_id: cnr_id.to_string(),
                        versions: Vec::new(),
                        rank: 1,
                        match_type: MatchType::WorkflowContext,
                    }],
                );
                continue;
            }

            // Priority 3: workspace-wide confirmed mappings.
            let workspace_hit = input_signature(node)
                .and_then(|signature| {
                    workspace_mappings.get(&node_key(node_type, &signature)).cloned()
                })
                .or_else(|| workspace_mappings.get(node_type.as_str()).cloned());
            if let Some(package_id) = workspace_hit {
                node_candidates.insert(
                    node_type.clone(),
                    vec![ResolvedNodePackage {
                        package_id,
                        versions: Vec::new(),
                        rank: 1,
                        match_type: MatchType::CustomMapping,
                    }],
                );
                continue;
            }

            // Priority 4..6: the global mappings table.
            node_candidates.insert(node_type.clone(), self.mappings.resolve_node(node));
        }

        let resolver = ModelResolver::new(self.repository);
        let mut model_lookups = Vec::new();
        for reference in extract_model_refs(&workflow, &LoaderTable) {
            model_lookups.push(resolver.resolve(&reference, entry.as_ref())?);
        }

        let sync_state = if self.tracked_path(name).is_file() {
            self.sync_state(name)?
        } else {
            WorkflowSyncState::New
        };

        tracing::info!(
            "analyzed workflow '{name}': {} custom type(s), {} model reference(s)",
            custom_node_types.len(),
            model_lookups.len()
        );
        Ok(WorkflowAnalysis {
            name: name.to_string(),
            path,
            sync_state,
            already_tracked: entry.is_some(),
            builtin_count: classified.builtin.len(),
            custom_node_types,
            optional_node_types,
            node_candidates,
            model_lookups,
            node_ids: workflow.nodes.keys().cloned().collect(),
        })
    }

    /// Auto-resolution pass. Settles exactly-unique candidates, prefers
    /// already-installed packages among ranked alternatives, and optionally
    /// auto-selects rank 1. Never prompts, never writes.
    pub fn resolve_workflow(&mut self, analysis: &WorkflowAnalysis) -> ResolutionResult {
        let installed: IndexSet<String> = {
            let nodes = self.manifest.nodes().get_existing();
            nodes
                .iter()
                .flat_map(|(identifier, spec)| {
                    let mut ids = vec![identifier.clone()];
                    if let Some(registry_id) = &spec.registry_id {
                        ids.push(registry_id.clone());
                    }
                    ids
                })
                .collect()
        };

        let mut result = ResolutionResult {
            workflow: analysis.name.clone(),
            node_ids: analysis.node_ids.clone(),
            present_types: analysis
                .custom_node_types
                .iter()
                .cloned()
                .chain(analysis.optional_node_types.iter().cloned())
                .collect(),
            ..ResolutionResult::default()
        };

        for (node_type, candidates) in &analysis.node_candidates {
            result
                .justified_packages
                .extend(candidates.iter().map(|c| c.package_id.clone()));

            match candidates.as_slice() {
                [] => result.nodes_unresolved.push(node_type.clone()),
                [only] => result.nodes_resolved.push(NodeResolved {
                    node_type: node_type.clone(),
                    package_id: only.package_id.clone(),
                    rank: only.rank,
                    match_type: only.match_type,
                }),
                many => {
                    // Installed packages beat rank; among installed, the
                    // best rank wins.
                    let best_installed = many
                        .iter()
                        .filter(|candidate| installed.contains(&candidate.package_id))
                        .min_by_key(|candidate| candidate.rank);
                    if let Some(chosen) = best_installed {
                        result.nodes_resolved.push(NodeResolved {
                            node_type: node_type.clone(),
                            package_id: chosen.package_id.clone(),
                            rank: chosen.rank,
                            match_type: chosen.match_type,
                        });
                        continue;
                    }

                    // Ranked registry alternatives auto-select; fuzzy hits
                    // never do, since their ranks are not comparable.
                    let ranked = many
                        .iter()
                        .all(|candidate| candidate.match_type != MatchType::Fuzzy);
                    if self.auto_select_ambiguous && ranked {
                        let best = &many[0];
                        result.nodes_resolved.push(NodeResolved {
                            node_type: node_type.clone(),
                            package_id: best.package_id.clone(),
                            rank: best.rank,
                            match_type: best.match_type,
                        });
                    } else {
                        result
                            .nodes_ambiguous
                            .push((node_type.clone(), many.to_vec()));
                    }
                }
            }
        }

        for lookup in &analysis.model_lookups {
            match lookup {
                ModelLookup::Resolved(resolution) => {
                    result.models_resolved.push(resolution.clone())
                }
                ModelLookup::Ambiguous {
                    reference,
                    candidates,
                } => result
                    .models_ambiguous
                    .push((reference.clone(), candidates.clone())),
                ModelLookup::NotFound { reference } => {
                    result.models_unresolved.push(reference.clone())
                }
            }
        }

        result
    }

    /// Write the auto-resolved items into the manifest, then reconcile the
    /// workflow entry against the current graph. Idempotent.
    pub fn apply_resolution(&mut self, result: &ResolutionResult) -> Result<(), CoreError> {
        for node in &result.nodes_resolved {
            self.manifest
                .workflows()
                .add_node_package(&result.workflow, &node.package_id)?;
            if node.match_type.is_user_intervention() {
                self.manifest
                    .node_mappings()
                    .set(&node.node_type, &node.package_id)?;
            }
        }

        for resolution in &result.models_resolved {
            self.persist_model_resolution(&result.workflow, resolution)?;
        }

        self.reconcile(result)?;
        Ok(())
    }

    /// The interactive fix loop. Each positive answer is persisted before
    /// the next item is presented; `Cancel` exits cleanly with the partial
    /// result.
    pub fn fix_resolution(
        &mut self,
        mut result: ResolutionResult,
        mut node_strategy: Option<&mut dyn NodeResolutionStrategy>,
        mut model_strategy: Option<&mut dyn ModelResolutionStrategy>,
    ) -> Result<ResolutionResult, CoreError> {
        let workflow = result.workflow.clone();

        if let Some(strategy) = node_strategy.as_deref_mut() {
            let ambiguous = std::mem::take(&mut result.nodes_ambiguous);
            let mut remaining_ambiguous = Vec::new();
            let mut cancelled = false;
            for (node_type, candidates) in ambiguous {
                if cancelled {
                    remaining_ambiguous.push((node_type, candidates));
                    continue;
                }
                match strategy.resolve_unknown(&node_type, &candidates) {
                    NodeChoice::Select(package_id) => {
                        self.persist_node_choice(&workflow, &node_type, &package_id)?;
                        result.nodes_resolved.push(NodeResolved {
                            node_type,
                            package_id,
                            rank: 1,
                            match_type: MatchType::UserConfirmed,
                        });
                    }
                    NodeChoice::Optional => {
                        self.manifest.workflows().set_custom_node_mapping(
                            &workflow,
                            &node_type,
                            CustomNodeMapping::Optional,
                        )?;
                    }
                    NodeChoice::Skip => remaining_ambiguous.push((node_type, candidates)),
                    NodeChoice::Cancel => {
                        tracing::info!("node resolution cancelled; partial progress is saved");
                        remaining_ambiguous.push((node_type, candidates));
                        cancelled = true;
                    }
                }
            }
            result.nodes_ambiguous = remaining_ambiguous;
            if cancelled {
                return Ok(result);
            }

            let unresolved = std::mem::take(&mut result.nodes_unresolved);
            let mut remaining_unresolved = Vec::new();
            let mut cancelled = false;
            for node_type in unresolved {
                if cancelled {
                    remaining_unresolved.push(node_type);
                    continue;
                }
                match strategy.resolve_unknown(&node_type, &[]) {
                    NodeChoice::Select(package_id) => {
                        self.persist_node_choice(&workflow, &node_type, &package_id)?;
                        result.nodes_resolved.push(NodeResolved {
                            node_type,
                            package_id,
                            rank: 1,
                            match_type: MatchType::UserConfirmed,
                        });
                    }
                    NodeChoice::Optional => {
                        self.manifest.workflows().set_custom_node_mapping(
                            &workflow,
                            &node_type,
                            CustomNodeMapping::Optional,
                        )?;
                    }
                    NodeChoice::Skip => remaining_unresolved.push(node_type),
                    NodeChoice::Cancel => {
                        tracing::info!("node resolution cancelled; partial progress is saved");
                        remaining_unresolved.push(node_type);
                        cancelled = true;
                    }
                }
            }
            result.nodes_unresolved = remaining_unresolved;
            if cancelled {
                return Ok(result);
            }
        }

        if let Some(strategy) = model_strategy.as_deref_mut() {
            let ambiguous = std::mem::take(&mut result.models_ambiguous);
            let mut remaining_ambiguous = Vec::new();
            let mut cancelled = false;
            for (reference, candidates) in ambiguous {
                if cancelled {
                    remaining_ambiguous.push((reference, candidates));
                    continue;
                }
                match strategy.resolve_ambiguous(&reference, &candidates) {
                    ModelChoice::Select(model) => {
                        let resolution = ModelResolution {
                            reference,
                            model,
                            match_type: MatchType::UserConfirmed,
                            confidence: 0.9,
                        };
                        self.persist_model_resolution(&workflow, &resolution)?;
                        result.models_resolved.push(resolution);
                    }
                    ModelChoice::Skip => remaining_ambiguous.push((reference, candidates)),
                    ModelChoice::Cancel => {
                        tracing::info!("model resolution cancelled; partial progress is saved");
                        remaining_ambiguous.push((reference, candidates));
                        cancelled = true;
                    }
                }
            }
            result.models_ambiguous = remaining_ambiguous;
            if cancelled {
                return Ok(result);
            }

            let unresolved = std::mem::take(&mut result.models_unresolved);
            let mut remaining_unresolved = Vec::new();
            let mut cancelled = false;
            for reference in unresolved {
                if cancelled {
                    remaining_unresolved.push(reference);
                    continue;
                }
                match strategy.handle_missing(&reference) {
                    MissingModelChoice::SelectPath(path) => {
                        match self.repository.find_by_exact_path(&path)? {
                            Some(model) => {
                                let resolution = ModelResolution {
                                    reference,
                                    model,
                                    match_type: MatchType::Manual,
                                    confidence: 1.0,
                                };
                                self.persist_model_resolution(&workflow, &resolution)?;
                                result.models_resolved.push(resolution);
                            }
                            None => {
                                tracing::warn!("selected path '{path}' is not in the model index");
                                remaining_unresolved.push(reference);
                            }
                        }
                    }
                    MissingModelChoice::Download { url, target_path } => {
                        self.persist_download_intent(&workflow, &reference, &url, &target_path)?;
                        // Intent persisted; the reference is no longer open
                        // work for this pass.
                    }
                    MissingModelChoice::Optional => {
                        self.persist_optional_model(&workflow, &reference)?;
                    }
                    MissingModelChoice::Skip => remaining_unresolved.push(reference),
                    MissingModelChoice::Cancel => {
                        tracing::info!("model resolution cancelled; partial progress is saved");
                        remaining_unresolved.push(reference);
                        cancelled = true;
                    }
                }
            }
            result.models_unresolved = remaining_unresolved;
            if cancelled {
                return Ok(result);
            }
        }

        Ok(result)
    }

    /// Drive pending download intents of a workflow through the downloader,
    /// upgrading each successful entry to `resolved` with its computed hash.
    pub fn process_download_intents(
        &mut self,
        name: &str,
        callbacks: &DownloadCallbacks,
    ) -> Result<usize, CoreError> {
        let intents: Vec<WorkflowModel> = self
            .manifest
            .workflows()
            .get_workflow_models(name)
            .into_iter()
            .filter(WorkflowModel::is_download_intent)
            .collect();
        if intents.is_empty() {
            return Ok(0);
        }

        if let Some(on_batch_start) = &callbacks.on_batch_start {
            on_batch_start(intents.len());
        }

        let downloader = ModelDownloader::new(self.repository, &self.models_dir);
        let total = intents.len();
        let mut completed = 0usize;
        for (index, intent) in intents.into_iter().enumerate() {
            let Some(relative_path) = intent.relative_path.clone() else {
                continue;
            };
            let Some(url) = intent.sources.first().cloned() else {
                continue;
            };
            if let Some(on_file_start) = &callbacks.on_file_start {
                on_file_start(&intent.filename, index, total);
            }

            let request = DownloadRequest {
                url: url.clone(),
                target_path: self.models_dir.join(&relative_path),
            };
            let progress = callbacks
                .on_file_progress
                .as_ref()
                .map(|f| f.as_ref() as &dyn Fn(u64, Option<u64>));
            match downloader.download(&request, progress) {
                Ok(model) => {
                    let resolved = WorkflowModel {
                        hash: Some(model.hash.clone()),
                        filename: model.filename.clone(),
                        size: Some(model.file_size),
                        category: category_of(&model.relative_path),
                        status: ModelStatus::Resolved,
                        criticality: intent.criticality,
                        sources: intent.sources.clone(),
                        relative_path: None,
                        nodes: intent.nodes.clone(),
                    };
                    self.ensure_model_in_registry(&model)?;
                    // The intent entry is keyed by filename; the resolved
                    // entry replaces it through the shared node location.
                    self.manifest.workflows().add_workflow_model(name, resolved)?;
                    completed += 1;
                    if let Some(on_file_complete) = &callbacks.on_file_complete {
                        on_file_complete(&model.filename, true, None);
                    }
                }
                Err(err) => {
                    tracing::warn!("download intent for '{}' failed: {err}", intent.filename);
                    if let Some(on_file_complete) = &callbacks.on_file_complete {
                        on_file_complete(&intent.filename, false, Some(&err.to_string()));
                    }
                }
            }
        }

        if let Some(on_batch_complete) = &callbacks.on_batch_complete {
            on_batch_complete(completed, total);
        }
        Ok(completed)
    }

    /// Remove `required` models no longer referenced by any tracked
    /// workflow. `optional` entries are user-curated and never pruned.
    pub fn clean_orphaned_models(&mut self) -> Result<usize, CoreError> {
        let referenced: IndexSet<String> = self
            .manifest
            .workflows()
            .get_all_with_resolutions()
            .values()
            .flat_map(|entry| entry.models.values())
            .filter_map(|model| model.hash.clone())
            .collect();

        let required = self.manifest.models().get_category(ModelCategory::Required);
        let mut removed = 0usize;
        for hash in required.keys() {
            if !referenced.contains(hash) {
                self.manifest
                    .models()
                    .remove_model(hash, Some(ModelCategory::Required))?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("removed {removed} orphaned model(s) from the required registry");
        }
        Ok(removed)
    }

    /// Copy every active workflow into the committed workflows directory
    /// and drop committed copies whose active file is gone. Returns the
    /// per-workflow action taken.
    pub fn copy_all_workflows(&mut self) -> Result<IndexMap<String, WorkflowSyncState>, CoreError> {
        fs_err::create_dir_all(&self.tracked_dir)?;
        let mut actions = IndexMap::new();

        for name in self.list_active_workflows()? {
            let state = self.sync_state(&name)?;
            if matches!(state, WorkflowSyncState::New | WorkflowSyncState::Modified) {
                fs_err::copy(self.active_path(&name), self.tracked_path(&name))?;
            }
            actions.insert(name, state);
        }

        // Committed copies without an active counterpart were deleted by
        // the user.
        if self.tracked_dir.is_dir() {
            for entry in fs_err::read_dir(&self.tracked_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
                else {
                    continue;
                };
                if !self.active_path(&name).is_file() {
                    fs_err::remove_file(&path)?;
                    self.manifest.workflows().remove(&name)?;
                    actions.insert(name, WorkflowSyncState::Deleted);
                }
            }
        }
        Ok(actions)
    }

    /// Overwrite the active workflow files with the committed copies
    /// (rollback step 6).
    pub fn restore_all_from_tracked(&self) -> Result<usize, CoreError> {
        fs_err::create_dir_all(&self.active_dir)?;
        let mut restored = 0usize;
        if self.tracked_dir.is_dir() {
            for entry in fs_err::read_dir(&self.tracked_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    let file_name = path.file_name().expect("file from read_dir");
                    fs_err::copy(&path, self.active_dir.join(file_name))?;
                    restored += 1;
                }
            }
        }
        Ok(restored)
    }

    // Write primitives. Each performs one complete manifest save.

    fn persist_node_choice(
        &mut self,
        workflow: &str,
        node_type: &str,
        package_id: &str,
    ) -> Result<(), CoreError> {
        self.manifest
            .workflows()
            .add_node_package(workflow, package_id)?;
        self.manifest.workflows().set_custom_node_mapping(
            workflow,
            node_type,
            CustomNodeMapping::Package(package_id.to_string()),
        )?;
        // A confirmed choice becomes a workspace-wide mapping for later
        // workflows.
        self.manifest.node_mappings().set(node_type, package_id)?;
        Ok(())
    }

    fn persist_model_resolution(
        &mut self,
        workflow: &str,
        resolution: &ModelResolution,
    ) -> Result<(), CoreError> {
        let model = &resolution.model;
        let sources = self.ensure_model_in_registry(model)?;

        let entry = WorkflowModel {
            hash: Some(model.hash.clone()),
            filename: model.filename.clone(),
            size: Some(model.file_size),
            category: category_of(&model.relative_path),
            status: ModelStatus::Resolved,
            criticality: Criticality::Flexible,
            sources,
            relative_path: None,
            nodes: vec![NodeLocation {
                node_id: resolution.reference.node_id.clone(),
                widget_idx: resolution.reference.widget_index,
                widget_value: resolution.reference.widget_value.clone(),
            }],
        };
        self.manifest.workflows().add_workflow_model(workflow, entry)?;
        Ok(())
    }

    fn persist_download_intent(
        &mut self,
        workflow: &str,
        reference: &ModelRef,
        url: &str,
        target_path: &str,
    ) -> Result<(), CoreError> {
        let filename = Path::new(target_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(target_path)
            .to_string();
        let entry = WorkflowModel {
            hash: None,
            filename,
            size: None,
            category: category_of(target_path),
            status: ModelStatus::Unresolved,
            criticality: Criticality::Flexible,
            sources: vec![url.to_string()],
            relative_path: Some(target_path.to_string()),
            nodes: vec![NodeLocation {
                node_id: reference.node_id.clone(),
                widget_idx: reference.widget_index,
                widget_value: reference.widget_value.clone(),
            }],
        };
        self.manifest.workflows().add_workflow_model(workflow, entry)?;
        tracing::info!("recorded download intent for '{target_path}'");
        Ok(())
    }

    fn persist_optional_model(
        &mut self,
        workflow: &str,
        reference: &ModelRef,
    ) -> Result<(), CoreError> {
        let filename = Path::new(&reference.widget_value)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&reference.widget_value)
            .to_string();
        let entry = WorkflowModel {
            hash: None,
            filename,
            size: None,
            category: None,
            status: ModelStatus::Unresolved,
            criticality: Criticality::Optional,
            sources: Vec::new(),
            relative_path: None,
            nodes: vec![NodeLocation {
                node_id: reference.node_id.clone(),
                widget_idx: reference.widget_index,
                widget_value: reference.widget_value.clone(),
            }],
        };
        self.manifest.workflows().add_workflow_model(workflow, entry)?;
        Ok(())
    }

    /// Make sure the model is present in the environment-wide registry with
    /// its known source URLs, and return those URLs so workflow entries can
    /// carry them too.
    fn ensure_model_in_registry(
        &mut self,
        model: &ModelWithLocation,
    ) -> Result<Vec<String>, CoreError> {
        let sources: Vec<String> = self
            .repository
            .get_sources(&model.hash)?
            .into_iter()
            .map(|source| source.url)
            .collect();

        if self.manifest.models().has_model(&model.hash).is_none() {
            self.manifest.models().add_model(
                &model.hash,
                &ManifestModel {
                    filename: model.filename.clone(),
                    size: model.file_size,
                    blake3: model.blake3_hash.clone(),
                    sha256: model.sha256_hash.clone(),
                    sources: sources.clone(),
                },
                ModelCategory::Required,
            )?;
        } else if !sources.is_empty() {
            self.manifest
                .models()
                .update_model_metadata(&model.hash, None, None, Some(&sources))?;
        }
        Ok(sources)
    }

    /// Drop state that no longer corresponds to the current graph: mapping
    /// overrides for vanished types, package ids nothing justifies anymore,
    /// and model entries whose node locations are all gone.
    fn reconcile(&mut self, result: &ResolutionResult) -> Result<(), CoreError> {
        let Some(mut entry) = self.manifest.workflows().get(&result.workflow) else {
            return Ok(());
        };

        entry
            .custom_node_map
            .retain(|node_type, _| result.present_types.contains(node_type));

        let kept: IndexSet<String> = result
            .nodes_resolved
            .iter()
            .map(|node| node.package_id.clone())
            .chain(entry.custom_node_map.values().filter_map(|m| match m {
                CustomNodeMapping::Package(id) => Some(id.clone()),
                CustomNodeMapping::Optional => None,
            }))
            .collect();
        entry.nodes.retain(|package_id| {
            kept.contains(package_id) || result.justified_packages.contains(package_id)
        });

        entry.models.retain(|_, model| {
            model
                .nodes
                .retain(|location| result.node_ids.contains(&location.node_id));
            !model.nodes.is_empty()
        });

        self.manifest.workflows().add(&result.workflow, &entry)?;
        self.clean_orphaned_models()?;
        Ok(())
    }
}

/// The models sub-directory a relative path sits under, e.g.
/// `checkpoints/sd15.safetensors` → `checkpoints`.
fn category_of(relative_path: &str) -> Option<String> {
    let path = Path::new(relative_path);
    let mut components = path.components();
    let first = components.next()?;
    // A bare filename has no category.
    components.next()?;
    Some(first.as_os_str().to_string_lossy().into_owned())
}
