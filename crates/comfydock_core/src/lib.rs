//! The comfygit core engine: reproducible ComfyUI environments described by
//! a declarative manifest, versioned in git, with workflow dependencies
//! resolved against the shared model index and the node ecosystem.
//!
//! The crate is a library invoked by drivers (a CLI is one); it hosts no
//! server and prompts for nothing itself; interaction happens through the
//! strategy traits, and progress through callback records.

mod callbacks;
mod environment;
mod error;
mod factory;
mod node_sync;
mod resolver;
mod status;
mod strategies;
mod uv;
mod workflow_manager;
mod workspace;

pub use callbacks::{DownloadCallbacks, NodeInstallCallbacks};
pub use environment::{
    Environment, NodeFilesystemAction, NodeRemovalResult, SyncResult,
};
pub use error::{ConflictRemediation, CoreError};
pub use factory::CreateOptions;
pub use node_sync::{NodeSyncOutcome, sync_nodes_to_filesystem};
pub use resolver::{ModelLookup, ModelResolution, ModelResolver};
pub use status::{
    ComparisonStatus, EnvironmentStatus, GitStatusReport, ManifestDiff, WorkflowStatusItem,
    WorkflowStatusReport,
};
pub use strategies::{
    AutoModelStrategy, AutoNodeStrategy, ForceRollback, MissingModelChoice, ModelChoice,
    ModelResolutionStrategy, NodeChoice, NodeResolutionStrategy, RollbackStrategy, SilentStrategy,
};
pub use uv::{PackageManager, SyncReport, UvClient};
pub use workflow_manager::{
    NodeResolved, ResolutionResult, WorkflowAnalysis, WorkflowManager, WorkflowSyncState,
};
pub use workspace::{Workspace, WorkspacePaths};
