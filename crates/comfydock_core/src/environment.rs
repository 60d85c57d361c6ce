use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::{IndexMap, IndexSet};

use comfydock_git::GitRepository;
use comfydock_manifest::{Manifest, NodeSource, NodeSpec};
use comfydock_model_index::ModelRepository;
use comfydock_registry::{NodeMappings, NodeService, scan_requirements};

use crate::{
    ComparisonStatus, ConflictRemediation, CoreError, DownloadCallbacks, EnvironmentStatus,
    GitStatusReport, ManifestDiff, NodeInstallCallbacks, NodeSyncOutcome, PackageManager,
    ResolutionResult, WorkflowManager, WorkflowStatusItem, WorkflowStatusReport,
    WorkflowSyncState,
    node_sync::sync_nodes_to_filesystem,
    strategies::{ModelResolutionStrategy, NodeResolutionStrategy, RollbackStrategy},
};

/// What happened to the node's directory when it was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFilesystemAction {
    Disabled,
    Deleted,
    Absent,
}

#[derive(Debug)]
pub struct NodeRemovalResult {
    pub identifier: String,
    pub name: String,
    pub source: NodeSource,
    pub filesystem_action: NodeFilesystemAction,
}

/// Accumulated outcome of an environment sync.
#[derive(Debug, Default)]
pub struct SyncResult {
    pub packages_synced: bool,
    pub nodes: NodeSyncOutcome,
    pub model_paths_configured: bool,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One ComfyUI environment: a checkout, a virtual environment, and a
/// versioned manifest directory. All state of record lives in the manifest;
/// this type reconciles the filesystem to it.
pub struct Environment {
    name: String,
    path: PathBuf,
    cec_path: PathBuf,
    comfyui_path: PathBuf,
    custom_nodes_path: PathBuf,
    models_link_path: PathBuf,
    active_workflows_path: PathBuf,
    tracked_workflows_path: PathBuf,
    models_dir: PathBuf,
    auto_select_ambiguous: bool,
    manifest: Manifest,
    git: GitRepository,
    model_repository: Arc<ModelRepository>,
    node_mappings: Arc<NodeMappings>,
    node_service: Arc<NodeService>,
    package_manager: Box<dyn PackageManager>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Environment {
    /// Open an existing environment, validating its invariant: the metadata
    /// directory exists, the manifest parses, and the ComfyUI checkout is
    /// present.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        models_dir: impl Into<PathBuf>,
        auto_select_ambiguous: bool,
        model_repository: Arc<ModelRepository>,
        node_mappings: Arc<NodeMappings>,
        node_service: Arc<NodeService>,
        package_manager: Box<dyn PackageManager>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let path = path.into();
        let cec_path = path.join(comfydock_consts::CEC_DIR);
        if !cec_path.is_dir() {
            return Err(CoreError::EnvironmentNotFound(name));
        }

        let manifest_path = cec_path.join(comfydock_consts::MANIFEST_FILE);
        let manifest =
            Manifest::from_path(&manifest_path).map_err(|err| CoreError::EnvironmentCorrupt {
                name: name.clone(),
                reason: err.to_string(),
            })?;

        let comfyui_path = path.join(comfydock_consts::COMFYUI_DIR);
        if !comfyui_path.is_dir() {
            return Err(CoreError::EnvironmentCorrupt {
                name,
                reason: "ComfyUI checkout is missing".to_string(),
            });
        }

        Ok(Self {
            custom_nodes_path: comfyui_path.join(comfydock_consts::CUSTOM_NODES_DIR),
            models_link_path: comfyui_path.join(comfydock_consts::MODELS_DIR),
            active_workflows_path: comfyui_path.join(comfydock_consts::ACTIVE_WORKFLOWS_DIR),
            tracked_workflows_path: cec_path.join(comfydock_consts::TRACKED_WORKFLOWS_DIR),
            git: GitRepository::new(&cec_path),
            name,
            path,
            cec_path,
            comfyui_path,
            models_dir: models_dir.into(),
            auto_select_ambiguous,
            manifest,
            model_repository,
            node_mappings,
            node_service,
            package_manager,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn comfyui_path(&self) -> &Path {
        &self.comfyui_path
    }

    pub fn custom_nodes_path(&self) -> &Path {
        &self.custom_nodes_path
    }

    pub fn manifest(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    pub fn git(&self) -> &GitRepository {
        &self.git
    }

    /// The resolution orchestrator, borrowing this environment's manifest.
    pub fn workflow_manager(&mut self) -> WorkflowManager<'_> {
        WorkflowManager::new(
            &mut self.manifest,
            self.model_repository.as_ref(),
            self.node_mappings.as_ref(),
            self.auto_select_ambiguous,
            &self.active_workflows_path,
            &self.tracked_workflows_path,
            &self.models_dir,
        )
    }

    // =====================================================
    // Status
    // =====================================================

    pub fn status(&mut self) -> Result<EnvironmentStatus, CoreError> {
        Ok(EnvironmentStatus {
            comparison: self.comparison_status()?,
            git: self.git_status()?,
            workflows: self.workflow_status()?,
        })
    }

    fn comparison_status(&mut self) -> Result<ComparisonStatus, CoreError> {
        let declared = self.manifest.nodes().get_existing();
        let declared_names: IndexSet<String> =
            declared.values().map(|spec| spec.name.clone()).collect();

        let mut installed_names: IndexSet<String> = IndexSet::new();
        if self.custom_nodes_path.is_dir() {
            for entry in fs_err::read_dir(&self.custom_nodes_path)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type()?.is_dir()
                    && !name.ends_with(comfydock_consts::DISABLED_SUFFIX)
                {
                    installed_names.insert(name);
                }
            }
        }

        let mut version_mismatches = Vec::new();
        for spec in declared.values() {
            if spec.source != NodeSource::Git {
                continue;
            }
            let (Some(declared_version), true) = (
                spec.version.as_deref(),
                installed_names.contains(&spec.name),
            ) else {
                continue;
            };
            let node_repo = GitRepository::new(self.custom_nodes_path.join(&spec.name));
            if let Some(installed_commit) = node_repo.head_commit() {
                if !installed_commit.starts_with(declared_version)
                    && !declared_version.starts_with(&installed_commit)
                {
                    version_mismatches.push((
                        spec.name.clone(),
                        declared_version.to_string(),
                        installed_commit,
                    ));
                }
            }
        }

        Ok(ComparisonStatus {
            missing_nodes: declared_names
                .difference(&installed_names)
                .cloned()
                .collect(),
            extra_nodes: installed_names
                .difference(&declared_names)
                .cloned()
                .collect(),
            version_mismatches,
            packages_in_sync: self.package_manager.is_in_sync().ok(),
        })
    }

    fn git_status(&mut self) -> Result<GitStatusReport, CoreError> {
        let has_changes = self.git.is_initialized() && self.git.has_uncommitted_changes()?;
        let manifest_diff = match self.committed_manifest() {
            Some(committed) => ManifestDiff::between(&committed, &self.manifest),
            None => ManifestDiff::default(),
        };
        let workflow_changes = if self.git.is_initialized() {
            self.git.get_workflow_changes()?
        } else {
            IndexMap::new()
        };
        Ok(GitStatusReport {
            has_changes,
            manifest_diff,
            workflow_changes,
        })
    }

    fn workflow_status(&mut self) -> Result<WorkflowStatusReport, CoreError> {
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
        let tracked_entries = self.manifest.workflows().get_all_with_resolutions();

        let mut names: IndexSet<String> = IndexSet::new();
        {
            let manager = self.workflow_manager();
            names.extend(manager.list_active_workflows()?);
        }
        names.extend(tracked_entries.keys().cloned());
        // Committed copies whose active file vanished still need a row.
        if self.tracked_workflows_path.is_dir() {
            for entry in fs_err::read_dir(&self.tracked_workflows_path)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                        names.insert(name.to_string());
                    }
                }
            }
        }

        let mut items = Vec::new();
        for name in names {
            let mut manager = self.workflow_manager();
            let state = match manager.sync_state(&name) {
                Ok(state) => state,
                Err(CoreError::WorkflowNotFound(_)) => WorkflowSyncState::Deleted,
                Err(err) => return Err(err),
            };

            let resolution = if state != WorkflowSyncState::Deleted {
                let analysis = manager.analyze_workflow(&name)?;
                Some(manager.resolve_workflow(&analysis))
            } else {
                None
            };

            let uninstalled_packages = tracked_entries
                .get(&name)
                .map(|entry| {
                    entry
                        .nodes
                        .iter()
                        .filter(|id| !installed.contains(id.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            items.push(WorkflowStatusItem {
                name,
                state,
                resolution,
                uninstalled_packages,
            });
        }
        Ok(WorkflowStatusReport { items })
    }

    /// Package IDs referenced by any workflow but not installed.
    pub fn get_uninstalled_nodes(&mut self) -> Vec<String> {
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
        let mut referenced: IndexSet<String> = IndexSet::new();
        for entry in self.manifest.workflows().get_all_with_resolutions().values() {
            referenced.extend(entry.nodes.iter().cloned());
        }
        referenced
            .into_iter()
            .filter(|id| !installed.contains(id))
            .collect()
    }

    // =====================================================
    // Sync & rollback
    // =====================================================

    /// Reconcile the filesystem to the manifest: packages through the
    /// package manager, node directories through the cache/downloader, and
    /// the models symlink to the global directory.
    pub fn sync(&mut self, dry_run: bool) -> Result<SyncResult, CoreError> {
        let mut result = SyncResult::default();
        tracing::info!("syncing environment '{}'", self.name);

        match self.package_manager.sync(true, dry_run) {
            Ok(_) => result.packages_synced = true,
            Err(err) => {
                tracing::error!("package sync failed: {err}");
                result.errors.push(format!("package sync failed: {err}"));
            }
        }

        if !dry_run {
            let expected = self.expected_nodes_by_name();
            let committed = self.committed_manifest();
            match sync_nodes_to_filesystem(
                &expected,
                &self.custom_nodes_path,
                &self.node_service,
                committed.as_ref(),
                &NodeInstallCallbacks::default(),
            ) {
                Ok(outcome) => {
                    result.errors.extend(outcome.errors.iter().cloned());
                    result.nodes = outcome;
                }
                Err(err) => result.errors.push(format!("node sync failed: {err}")),
            }

            match self.ensure_models_symlink() {
                Ok(()) => result.model_paths_configured = true,
                Err(err) => {
                    tracing::warn!("failed to configure models symlink: {err}");
                    result
                        .errors
                        .push(format!("model symlink configuration failed: {err}"));
                }
            }

            // Pending download intents are part of declared state; sync is
            // one of the passes that fulfills them.
            let tracked: Vec<String> = self
                .manifest
                .workflows()
                .get_all_with_resolutions()
                .into_keys()
                .collect();
            for name in tracked {
                if let Err(err) = self
                    .workflow_manager()
                    .process_download_intents(&name, &DownloadCallbacks::default())
                {
                    result
                        .errors
                        .push(format!("download intents for '{name}' failed: {err}"));
                }
            }
        }

        if result.success() {
            tracing::info!("environment '{}' synced", self.name);
        } else {
            tracing::warn!("sync finished with {} error(s)", result.errors.len());
        }
        Ok(result)
    }

    /// Checkpoint-style rollback: restore a labeled version (or discard
    /// uncommitted changes), reconcile nodes and the virtual environment,
    /// restore workflow files, and commit the restored state as a new
    /// version so history stays linear.
    pub fn rollback(
        &mut self,
        target: Option<&str>,
        force: bool,
        mut strategy: Option<&mut dyn RollbackStrategy>,
    ) -> Result<(), CoreError> {
        if !force {
            let git_changes = self.git.has_uncommitted_changes()?;
            let workflow_changes = self.has_workflow_file_changes()?;
            if git_changes || workflow_changes {
                match strategy.as_deref_mut() {
                    None => {
                        return Err(CoreError::UncommittedChanges {
                            git_changes,
                            workflow_changes,
                        });
                    }
                    Some(strategy) => {
                        if !strategy.confirm_destructive_rollback(git_changes, workflow_changes) {
                            return Err(CoreError::RollbackCancelled);
                        }
                    }
                }
            }
        }

        let old_nodes = self.manifest.nodes().get_existing();
        // Read the committed manifest before git moves anything; it is the
        // authoritative record for the dev-node disable policy.
        let committed = self.committed_manifest();

        let label = match target {
            Some(target) => {
                self.git.apply_version(target)?;
                target.to_string()
            }
            None => {
                self.git.discard_uncommitted()?;
                "HEAD".to_string()
            }
        };

        let had_changes = self.git.has_uncommitted_changes()?;
        self.manifest.reload()?;
        let new_nodes = self.manifest.nodes().get_existing();
        tracing::info!(
            "rollback to {label}: {} -> {} node(s)",
            old_nodes.len(),
            new_nodes.len()
        );

        let expected = self.expected_nodes_by_name();
        sync_nodes_to_filesystem(
            &expected,
            &self.custom_nodes_path,
            &self.node_service,
            committed.as_ref(),
            &NodeInstallCallbacks::default(),
        )?;

        self.package_manager.sync(true, false)?;
        self.workflow_manager().restore_all_from_tracked()?;

        if had_changes {
            self.git.commit_all(&format!("Rollback to {label}"))?;
            tracing::info!("rollback complete: created new version from {label}");
        } else {
            tracing::info!("rollback complete: already at {label}");
        }
        Ok(())
    }

    pub fn get_versions(&self, limit: usize) -> Result<Vec<comfydock_git::Version>, CoreError> {
        Ok(self.git.get_version_history(limit)?)
    }

    pub fn has_committable_changes(&mut self) -> Result<bool, CoreError> {
        Ok(self.git.has_uncommitted_changes()? || self.has_workflow_file_changes()?)
    }

    /// Copy workflow files into the metadata directory and commit
    /// everything.
    pub fn commit(&mut self, message: Option<&str>) -> Result<bool, CoreError> {
        self.workflow_manager().copy_all_workflows()?;
        Ok(self
            .git
            .commit_all(message.unwrap_or("Committing all changes"))?)
    }

    // =====================================================
    // Workflow resolution
    // =====================================================

    /// The full resolution pipeline for one workflow: analyze, auto-resolve,
    /// persist, and optionally run the interactive fix loop. The fix loop
    /// persists every positive decision immediately, so cancelling it keeps
    /// all settled work.
    pub fn resolve_workflow(
        &mut self,
        name: &str,
        node_strategy: Option<&mut dyn NodeResolutionStrategy>,
        model_strategy: Option<&mut dyn ModelResolutionStrategy>,
        fix: bool,
    ) -> Result<ResolutionResult, CoreError> {
        let mut manager = self.workflow_manager();
        let analysis = manager.analyze_workflow(name)?;
        let result = manager.resolve_workflow(&analysis);
        manager.apply_resolution(&result)?;

        if fix && result.has_issues() {
            return manager.fix_resolution(result, node_strategy, model_strategy);
        }
        Ok(result)
    }

    /// Fetch every pending download intent of `name`.
    pub fn process_download_intents(
        &mut self,
        name: &str,
        callbacks: &DownloadCallbacks,
    ) -> Result<usize, CoreError> {
        self.workflow_manager().process_download_intents(name, callbacks)
    }

    /// Stop tracking a workflow. The active ComfyUI copy is preserved.
    pub fn untrack_workflow(&mut self, name: &str) -> Result<bool, CoreError> {
        let removed = self.manifest.workflows().remove(name)?;
        let tracked = self
            .tracked_workflows_path
            .join(format!("{name}.json"));
        if tracked.is_file() {
            fs_err::remove_file(&tracked)?;
        }
        self.workflow_manager().clean_orphaned_models()?;
        Ok(removed)
    }

    // =====================================================
    // Node management
    // =====================================================

    /// Add a node package: resolve it, record it in the manifest with its
    /// dependency group, and materialize it under custom_nodes.
    pub fn add_node(
        &mut self,
        identifier: &str,
        development: bool,
        force: bool,
    ) -> Result<NodeSpec, CoreError> {
        if development {
            return self.add_development_node(identifier, force);
        }

        let package = self.node_service.prepare_node(identifier)?;
        let spec = package.spec.clone();
        self.check_node_conflict(&spec, force)?;

        self.manifest.nodes().add(&spec, None)?;
        if !package.requirements.is_empty() {
            self.manifest
                .dependencies()
                .add_to_group(&spec.group_name(), &package.requirements)?;
        }

        let target = self.custom_nodes_path.join(&spec.name);
        if !target.exists() {
            self.node_service.download_node(&spec, &target)?;
        }
        self.package_manager.sync(true, false)?;
        tracing::info!("added node '{}'", spec.identifier());
        Ok(spec)
    }

    fn add_development_node(&mut self, name: &str, force: bool) -> Result<NodeSpec, CoreError> {
        let node_dir = self.custom_nodes_path.join(name);
        if !node_dir.is_dir() {
            return Err(CoreError::Registry(
                comfydock_registry::RegistryError::NotFound(format!(
                    "no directory named '{name}' under custom_nodes"
                )),
            ));
        }
        let spec = NodeSpec::development(name);
        self.check_node_conflict(&spec, force)?;

        self.manifest.nodes().add(&spec, None)?;
        let requirements = scan_requirements(&node_dir);
        if !requirements.is_empty() {
            self.manifest
                .dependencies()
                .add_to_group(&spec.group_name(), &requirements)?;
            self.package_manager.sync(true, false)?;
        }
        tracing::info!("added development node '{name}'");
        Ok(spec)
    }

    fn check_node_conflict(&mut self, spec: &NodeSpec, force: bool) -> Result<(), CoreError> {
        if force {
            return Ok(());
        }
        let existing = self.manifest.nodes().get_existing();
        let conflicting = existing
            .iter()
            .find(|(identifier, other)| {
                identifier.as_str() == spec.identifier() || other.name == spec.name
            })
            .map(|(identifier, _)| identifier.clone());
        let Some(identifier) = conflicting else {
            return Ok(());
        };

        Err(CoreError::NodeConflict {
            remediations: vec![
                ConflictRemediation {
                    description: "remove the existing node first".to_string(),
                    command: format!("comfydock node remove {identifier}"),
                },
                ConflictRemediation {
                    description: "replace it in place".to_string(),
                    command: format!("comfydock node add {} --force", spec.identifier()),
                },
                ConflictRemediation {
                    description: "keep the local copy as a development node".to_string(),
                    command: format!("comfydock node add {} --dev", spec.name),
                },
            ],
            identifier,
        })
    }

    /// Remove a node: manifest entry, dependency group, orphaned uv
    /// sources, and the directory (disabled for development nodes, deleted
    /// otherwise).
    pub fn remove_node(&mut self, identifier: &str) -> Result<NodeRemovalResult, CoreError> {
        let Some(spec) = self.manifest.nodes().remove(identifier)? else {
            return Err(CoreError::Registry(
                comfydock_registry::RegistryError::NotFound(identifier.to_string()),
            ));
        };
        self.manifest
            .uv_settings()
            .cleanup_orphaned_sources(&spec.dependency_sources)?;

        let node_dir = self.custom_nodes_path.join(&spec.name);
        let filesystem_action = if !node_dir.is_dir() {
            NodeFilesystemAction::Absent
        } else if spec.is_development() {
            let disabled = self.custom_nodes_path.join(format!(
                "{}{}",
                spec.name,
                comfydock_consts::DISABLED_SUFFIX
            ));
            if disabled.exists() {
                fs_err::remove_dir_all(&disabled)?;
            }
            fs_err::rename(&node_dir, &disabled)?;
            NodeFilesystemAction::Disabled
        } else {
            fs_err::remove_dir_all(&node_dir)?;
            NodeFilesystemAction::Deleted
        };

        tracing::info!("removed node '{identifier}'");
        Ok(NodeRemovalResult {
            identifier: identifier.to_string(),
            name: spec.name,
            source: spec.source,
            filesystem_action,
        })
    }

    // =====================================================
    // Constraints
    // =====================================================

    pub fn add_constraint(&mut self, spec: &str) -> Result<(), CoreError> {
        Ok(self.manifest.uv_settings().add_constraint(spec)?)
    }

    pub fn remove_constraint(&mut self, package_name: &str) -> Result<bool, CoreError> {
        Ok(self.manifest.uv_settings().remove_constraint(package_name)?)
    }

    pub fn list_constraints(&mut self) -> Vec<String> {
        self.manifest.uv_settings().get_constraints()
    }

    // =====================================================
    // Internals
    // =====================================================

    fn expected_nodes_by_name(&mut self) -> IndexMap<String, NodeSpec> {
        self.manifest
            .nodes()
            .get_existing()
            .into_values()
            .map(|spec| (spec.name.clone(), spec))
            .collect()
    }

    /// The manifest as of the last commit, when there is one.
    fn committed_manifest(&self) -> Option<Manifest> {
        let contents = self
            .git
            .show_file("HEAD", comfydock_consts::MANIFEST_FILE)
            .ok()?;
        Manifest::from_str_at(
            &self.cec_path.join(comfydock_consts::MANIFEST_FILE),
            &contents,
        )
        .ok()
    }

    fn has_workflow_file_changes(&mut self) -> Result<bool, CoreError> {
        let manager = self.workflow_manager();
        for name in manager.list_active_workflows()? {
            if manager.sync_state(&name)? != WorkflowSyncState::Synced {
                return Ok(true);
            }
        }
        // Tracked copies whose active file vanished count as changes too.
        if self.tracked_workflows_path.is_dir() {
            for entry in fs_err::read_dir(&self.tracked_workflows_path)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    if !self
                        .active_workflows_path
                        .join(format!("{name}.json"))
                        .is_file()
                    {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// The ComfyUI models directory is a symlink into the shared global
    /// models directory; environments never own model files.
    fn ensure_models_symlink(&self) -> Result<(), std::io::Error> {
        if self.models_link_path.is_symlink() {
            return Ok(());
        }
        if self.models_link_path.is_dir() {
            // A checkout ships an empty models tree; only replace it when
            // it really is empty.
            let is_empty = fs_err::read_dir(&self.models_link_path)?.next().is_none();
            if !is_empty {
                return Err(std::io::Error::other(format!(
                    "{} exists and is not empty",
                    self.models_link_path.display()
                )));
            }
            fs_err::remove_dir(&self.models_link_path)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&self.models_dir, &self.models_link_path)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_dir(&self.models_dir, &self.models_link_path)?;
        Ok(())
    }
}
