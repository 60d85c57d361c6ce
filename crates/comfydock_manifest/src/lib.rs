//! The declarative manifest of a ComfyUI environment.
//!
//! One `pyproject.toml` per environment is the source of truth for installed
//! node packages, tracked workflows with their resolution state, the model
//! registry, uv configuration and workspace-wide node mappings: everything
//! reserved under the `tool.comfydock` namespace. This crate owns parsing,
//! typed access and format-preserving mutation of that file.

mod dependencies;
mod document;
mod error;
mod manifest;
mod models;
mod node_mappings;
mod nodes;
mod uv_settings;
mod workflows;

pub use dependencies::Dependencies;
pub use document::TomlDocument;
pub use error::{ManifestError, TomlError};
pub use manifest::Manifest;
pub use models::{ManifestModel, ModelCategory, Models};
pub use node_mappings::NodeMappings;
pub use nodes::{NodeSource, NodeSpec, Nodes};
pub use uv_settings::{
    PackageIndex, PackageSource, UrlWithMarker, UvSettings, extract_package_name,
};
pub use workflows::{
    Criticality, CustomNodeMapping, ModelStatus, NodeLocation, WorkflowEntry, WorkflowModel,
    Workflows,
};
