use crate::{LoaderTable, Workflow, loaders::looks_like_model};

/// A model reference found in a workflow: the node, the widget slot, and
/// the literal widget value as authored. The widget value is the shareable
/// reference and is never rewritten by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub node_id: String,
    pub node_type: String,
    pub widget_index: usize,
    pub widget_value: String,
}

/// Extract every model reference from a workflow.
///
/// Known loader nodes contribute their model widget (the two-widget
/// `CheckpointLoader` contributes both slots); other nodes contribute every
/// widget value that looks like a model file.
pub fn extract_model_refs(workflow: &Workflow, loaders: &LoaderTable) -> Vec<ModelRef> {
    let mut refs = Vec::new();

    for node in workflow.nodes.values() {
        let make = |widget_index: usize, widget_value: &str| ModelRef {
            node_id: node.id.clone(),
            node_type: node.r#type.clone(),
            widget_index,
            widget_value: widget_value.to_string(),
        };

        if node.r#type == "CheckpointLoader" {
            // Slot 0 is the config, slot 1 the checkpoint in the legacy
            // loader; both are file references.
            for index in 0..2 {
                if let Some(value) = node.widgets_values.get(index).and_then(|v| v.as_str()) {
                    if !value.trim().is_empty() {
                        refs.push(make(index, value));
                    }
                }
            }
        } else if loaders.is_loader(&node.r#type) {
            let index = loaders
                .widget_index(&node.r#type)
                .expect("loader table entry has a widget index");
            if let Some(value) = node.widgets_values.get(index).and_then(|v| v.as_str()) {
                if !value.trim().is_empty() {
                    refs.push(make(index, value));
                }
            }
        } else {
            for (index, value) in node.widgets_values.iter().enumerate() {
                if looks_like_model(value) {
                    refs.push(make(index, value.as_str().unwrap_or_default()));
                }
            }
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn loader_widgets_are_extracted() {
        let workflow = Workflow::from_json(json!({
            "nodes": [
                {"id": 4, "type": "CheckpointLoaderSimple", "widgets_values": ["sd15.safetensors"]},
                {"id": 5, "type": "LoraLoader", "widgets_values": ["style.safetensors", 1.0, 1.0]}
            ]
        }))
        .unwrap();

        let refs = extract_model_refs(&workflow, &LoaderTable);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].widget_value, "sd15.safetensors");
        assert_eq!(refs[1].node_id, "5");
        assert_eq!(refs[1].widget_index, 0);
    }

    #[test]
    fn custom_nodes_match_by_extension() {
        let workflow = Workflow::from_json(json!({
            "nodes": [
                {"id": 9, "type": "SomeCustomLoader",
                 "widgets_values": ["models/special.gguf", 0.5, "not-a-model"]}
            ]
        }))
        .unwrap();

        let refs = extract_model_refs(&workflow, &LoaderTable);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].widget_index, 0);
        assert_eq!(refs[0].widget_value, "models/special.gguf");
    }

    #[test]
    fn dual_widget_checkpoint_loader_contributes_both_slots() {
        let workflow = Workflow::from_json(json!({
            "nodes": [
                {"id": 1, "type": "CheckpointLoader",
                 "widgets_values": ["v1-inference.yaml", "sd15.ckpt"]}
            ]
        }))
        .unwrap();

        let refs = extract_model_refs(&workflow, &LoaderTable);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].widget_index, 0);
        assert_eq!(refs[1].widget_index, 1);
    }

    #[test]
    fn empty_widget_values_are_skipped() {
        let workflow = Workflow::from_json(json!({
            "nodes": [
                {"id": 1, "type": "LoraLoader", "widgets_values": ["", 1.0, 1.0]}
            ]
        }))
        .unwrap();

        assert!(extract_model_refs(&workflow, &LoaderTable).is_empty());
    }
}
