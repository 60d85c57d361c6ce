use crate::WorkflowNode;

/// Length of the hex digest used in compound mapping keys.
const SIGNATURE_LEN: usize = 8;

/// Canonical fingerprint of a node's input schema: every input contributes
/// `name:type:binding` where the binding says whether the input is linked,
/// widget-backed, or free. Inputs are serialized in their declared order;
/// the frontend keeps that order stable for a given node implementation.
pub fn input_signature(node: &WorkflowNode) -> Option<String> {
    if node.inputs.is_empty() {
        return None;
    }
    let mut descriptor = String::new();
    for input in &node.inputs {
        let binding = if input.link.is_some() {
            'L'
        } else if input.widget.is_some() {
            'W'
        } else {
            'N'
        };
        descriptor.push_str(&input.name);
        descriptor.push(':');
        descriptor.push_str(&input.r#type);
        descriptor.push(':');
        descriptor.push(binding);
        descriptor.push(';');
    }
    let digest = blake3::hash(descriptor.as_bytes());
    Some(digest.to_hex()[..SIGNATURE_LEN].to_string())
}

/// Compound key into the node-mappings table: `NodeType::<signature>`, or
/// `NodeType::_` for a type-only entry.
pub fn node_key(node_type: &str, signature: &str) -> String {
    format!("{node_type}::{signature}")
}

pub const TYPE_ONLY_SIGNATURE: &str = "_";

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::Workflow;

    use super::*;

    fn node_with_inputs(inputs: serde_json::Value) -> WorkflowNode {
        let workflow = Workflow::from_json(json!({
            "nodes": [{"id": 1, "type": "NodeX", "inputs": inputs}]
        }))
        .unwrap();
        workflow.nodes["1"].clone()
    }

    #[test]
    fn signature_is_stable() {
        let inputs = json!([
            {"name": "image", "type": "IMAGE", "link": 5},
            {"name": "strength", "type": "FLOAT", "widget": {"name": "strength"}}
        ]);
        let a = input_signature(&node_with_inputs(inputs.clone())).unwrap();
        let b = input_signature(&node_with_inputs(inputs)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), SIGNATURE_LEN);
    }

    #[test]
    fn signature_distinguishes_schemas() {
        let linked = node_with_inputs(json!([{"name": "image", "type": "IMAGE", "link": 5}]));
        let widget = node_with_inputs(json!([
            {"name": "image", "type": "IMAGE", "widget": {"name": "image"}}
        ]));
        assert_ne!(input_signature(&linked), input_signature(&widget));
    }

    #[test]
    fn no_inputs_means_no_signature() {
        let node = node_with_inputs(json!([]));
        assert_eq!(input_signature(&node), None);
    }

    #[test]
    fn compound_key_format() {
        assert_eq!(node_key("NodeX", "ab12cd34"), "NodeX::ab12cd34");
        assert_eq!(node_key("NodeX", TYPE_ONLY_SIGNATURE), "NodeX::_");
    }
}
