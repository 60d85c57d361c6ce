//! Parsing and classification of ComfyUI workflow documents.
//!
//! The parser normalizes the two on-disk node shapes (array and mapping)
//! into string-keyed nodes, the classifier separates builtin from custom
//! node types, and the loader table maps stock loader nodes to the model
//! directories they read from. Input signatures computed here form the
//! compound keys of the global node-mappings table.

mod builtin_nodes;
mod classifier;
mod error;
mod graph;
mod loaders;
mod refs;
mod signature;

pub use builtin_nodes::BUILTIN_NODE_TYPES;
pub use classifier::{ClassifiedNodes, NodeClassifier};
pub use error::WorkflowError;
pub use graph::{Link, NodeInput, Workflow, WorkflowNode};
pub use loaders::{LoaderTable, infer_category, looks_like_model};
pub use refs::{ModelRef, extract_model_refs};
pub use signature::{TYPE_ONLY_SIGNATURE, input_signature, node_key};
