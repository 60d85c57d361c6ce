use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;

use comfydock_git::WorkflowChange;
use comfydock_manifest::Manifest;

/// Manifest-vs-filesystem comparison.
#[derive(Debug, Clone, Default)]
pub struct ComparisonStatus {
    /// Declared in the manifest but not installed under custom_nodes.
    pub missing_nodes: Vec<String>,
    /// Installed but not declared.
    pub extra_nodes: Vec<String>,
    /// `(name, declared, installed)` where the installed git commit does
    /// not match the declared pin.
    pub version_mismatches: Vec<(String, String, String)>,
    /// Whether the virtual environment matches the lock file; `None` when
    /// the package manager could not be consulted.
    pub packages_in_sync: Option<bool>,
}

impl ComparisonStatus {
    pub fn is_clean(&self) -> bool {
        self.missing_nodes.is_empty()
            && self.extra_nodes.is_empty()
            && self.version_mismatches.is_empty()
            && self.packages_in_sync.unwrap_or(true)
    }
}

/// Typed diff between the committed and working-tree manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub dependencies_added: Vec<String>,
    pub dependencies_removed: Vec<String>,
    pub constraints_added: Vec<String>,
    pub constraints_removed: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_removed.is_empty()
            && self.dependencies_added.is_empty()
            && self.dependencies_removed.is_empty()
            && self.constraints_added.is_empty()
            && self.constraints_removed.is_empty()
    }

    /// Diff two parsed manifests (committed first).
    pub fn between(committed: &Manifest, current: &Manifest) -> ManifestDiff {
        let mut committed = committed.clone();
        let mut current = current.clone();

        let committed_nodes: IndexSet<String> =
            committed.nodes().get_existing().into_keys().collect();
        let current_nodes: IndexSet<String> = current.nodes().get_existing().into_keys().collect();

        let flatten = |manifest: &mut Manifest| -> IndexSet<String> {
            manifest
                .dependencies()
                .get_groups()
                .into_iter()
                .flat_map(|(group, specs)| {
                    specs
                        .into_iter()
                        .map(move |spec| format!("{group}: {spec}"))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        let committed_deps = flatten(&mut committed);
        let current_deps = flatten(&mut current);

        let committed_constraints: IndexSet<String> =
            committed.uv_settings().get_constraints().into_iter().collect();
        let current_constraints: IndexSet<String> =
            current.uv_settings().get_constraints().into_iter().collect();

        ManifestDiff {
            nodes_added: current_nodes.difference(&committed_nodes).cloned().collect(),
            nodes_removed: committed_nodes.difference(&current_nodes).cloned().collect(),
            dependencies_added: current_deps.difference(&committed_deps).cloned().collect(),
            dependencies_removed: committed_deps.difference(&current_deps).cloned().collect(),
            constraints_added: current_constraints
                .difference(&committed_constraints)
                .cloned()
                .collect(),
            constraints_removed: committed_constraints
                .difference(&current_constraints)
                .cloned()
                .collect(),
        }
    }
}

/// Git-side status: uncommitted changes plus the typed manifest diff.
#[derive(Debug, Clone, Default)]
pub struct GitStatusReport {
    pub has_changes: bool,
    pub manifest_diff: ManifestDiff,
    pub workflow_changes: IndexMap<String, WorkflowChange>,
}

/// Per-workflow state attached to an environment status.
#[derive(Debug)]
pub struct WorkflowStatusItem {
    pub name: String,
    pub state: crate::WorkflowSyncState,
    pub resolution: Option<crate::ResolutionResult>,
    /// Packages the workflow requires that are not installed in the
    /// manifest: the real installation set, not the resolver's
    /// intermediate.
    pub uninstalled_packages: Vec<String>,
}

#[derive(Debug, Default)]
pub struct WorkflowStatusReport {
    pub items: Vec<WorkflowStatusItem>,
}

impl WorkflowStatusReport {
    pub fn has_changes(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.state != crate::WorkflowSyncState::Synced)
    }

    pub fn names_with_state(&self, state: crate::WorkflowSyncState) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| item.state == state)
            .map(|item| item.name.as_str())
            .collect()
    }

    pub fn summary(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("{} ({})", item.name, item.state.as_str()))
            .join(", ")
    }
}

/// The full three-part environment status.
#[derive(Debug)]
pub struct EnvironmentStatus {
    pub comparison: ComparisonStatus,
    pub git: GitStatusReport,
    pub workflows: WorkflowStatusReport,
}

impl EnvironmentStatus {
    pub fn is_clean(&self) -> bool {
        self.comparison.is_clean() && !self.git.has_changes && !self.workflows.has_changes()
    }
}
