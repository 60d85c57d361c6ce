use std::collections::HashSet;

use crate::{Workflow, WorkflowNode, builtin_nodes::BUILTIN_NODE_TYPES};

/// Nodes of a workflow partitioned into builtins and customs.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedNodes<'a> {
    pub builtin: Vec<&'a WorkflowNode>,
    pub custom: Vec<&'a WorkflowNode>,
}

/// Splits workflow nodes into builtin ComfyUI nodes and custom nodes.
#[derive(Debug)]
pub struct NodeClassifier {
    builtin: HashSet<&'static str>,
}

impl Default for NodeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeClassifier {
    pub fn new() -> Self {
        Self {
            builtin: BUILTIN_NODE_TYPES.iter().copied().collect(),
        }
    }

    pub fn is_builtin(&self, node_type: &str) -> bool {
        self.builtin.contains(node_type)
    }

    pub fn classify<'a>(&self, workflow: &'a Workflow) -> ClassifiedNodes<'a> {
        let mut result = ClassifiedNodes::default();
        for node in workflow.nodes.values() {
            if self.is_builtin(&node.r#type) {
                result.builtin.push(node);
            } else {
                result.custom.push(node);
            }
        }
        result
    }

    /// The distinct custom node types of a workflow, in graph order.
    pub fn custom_node_types(&self, workflow: &Workflow) -> Vec<String> {
        let mut seen = HashSet::new();
        workflow
            .nodes
            .values()
            .filter(|node| !self.is_builtin(&node.r#type))
            .filter(|node| seen.insert(node.r#type.clone()))
            .map(|node| node.r#type.clone())
            .collect()
    }
}
