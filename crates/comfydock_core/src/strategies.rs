use comfydock_model_index::ModelWithLocation;
use comfydock_registry::ResolvedNodePackage;
use comfydock_workflow::ModelRef;

/// Outcome of asking a strategy about an unknown or ambiguous node type.
/// Cancellation is a value, not an error: the fix loop exits cleanly at the
/// item boundary and everything decided so far is already on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChoice {
    /// Install this package for the node type.
    Select(String),
    /// The node is optional; record it as not needed.
    Optional,
    /// Leave unresolved for now.
    Skip,
    Cancel,
}

/// Outcome of asking a strategy to pick among ambiguous model candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChoice {
    Select(ModelWithLocation),
    Skip,
    Cancel,
}

/// Outcome of asking a strategy about a model with no index match.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingModelChoice {
    /// Map to an indexed model by its relative path.
    SelectPath(String),
    /// Record a download intent: fetch `url` to `target_path` later.
    Download { url: String, target_path: String },
    /// The model is optional for this workflow.
    Optional,
    Skip,
    Cancel,
}

/// Decides node-type resolutions the resolver could not settle on its own.
pub trait NodeResolutionStrategy {
    fn resolve_unknown(&mut self, node_type: &str, candidates: &[ResolvedNodePackage])
    -> NodeChoice;

    /// Confirm installation of a package right before it happens.
    fn confirm_install(&mut self, _package_id: &str, _node_type: &str) -> bool {
        true
    }
}

/// Decides model resolutions the strategy chain could not settle.
pub trait ModelResolutionStrategy {
    fn resolve_ambiguous(
        &mut self,
        reference: &ModelRef,
        candidates: &[ModelWithLocation],
    ) -> ModelChoice;

    fn handle_missing(&mut self, reference: &ModelRef) -> MissingModelChoice;
}

/// Confirms destructive operations during rollback.
pub trait RollbackStrategy {
    fn confirm_destructive_rollback(&mut self, git_changes: bool, workflow_changes: bool) -> bool;
}

/// Picks the best-ranked candidate without asking; skips items it cannot
/// decide.
#[derive(Debug, Default)]
pub struct AutoNodeStrategy;

impl NodeResolutionStrategy for AutoNodeStrategy {
    fn resolve_unknown(
        &mut self,
        _node_type: &str,
        candidates: &[ResolvedNodePackage],
    ) -> NodeChoice {
        match candidates.first() {
            Some(best) => NodeChoice::Select(best.package_id.clone()),
            None => NodeChoice::Skip,
        }
    }
}

/// Picks the first candidate; leaves missing models alone.
#[derive(Debug, Default)]
pub struct AutoModelStrategy;

impl ModelResolutionStrategy for AutoModelStrategy {
    fn resolve_ambiguous(
        &mut self,
        _reference: &ModelRef,
        candidates: &[ModelWithLocation],
    ) -> ModelChoice {
        match candidates.first() {
            Some(first) => ModelChoice::Select(first.clone()),
            None => ModelChoice::Skip,
        }
    }

    fn handle_missing(&mut self, _reference: &ModelRef) -> MissingModelChoice {
        MissingModelChoice::Skip
    }
}

/// Declines every decision; useful for non-interactive status paths that
/// must never mutate anything.
#[derive(Debug, Default)]
pub struct SilentStrategy;

impl NodeResolutionStrategy for SilentStrategy {
    fn resolve_unknown(&mut self, _: &str, _: &[ResolvedNodePackage]) -> NodeChoice {
        NodeChoice::Skip
    }
}

impl ModelResolutionStrategy for SilentStrategy {
    fn resolve_ambiguous(&mut self, _: &ModelRef, _: &[ModelWithLocation]) -> ModelChoice {
        ModelChoice::Skip
    }

    fn handle_missing(&mut self, _: &ModelRef) -> MissingModelChoice {
        MissingModelChoice::Skip
    }
}

/// Confirms rollbacks unconditionally (the `--force` path).
#[derive(Debug, Default)]
pub struct ForceRollback;

impl RollbackStrategy for ForceRollback {
    fn confirm_destructive_rollback(&mut self, _: bool, _: bool) -> bool {
        true
    }
}
