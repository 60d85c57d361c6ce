use indexmap::IndexMap;
use serde_json::Value;

use crate::WorkflowError;

/// One declared input of a workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInput {
    pub name: String,
    pub r#type: String,
    pub link: Option<i64>,
    /// Present when the input is backed by a widget instead of a link.
    pub widget: Option<Value>,
}

/// A node of the serialized graph. Ids are normalized to strings at the
/// parsing edge; all downstream comparisons use the string form.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    pub r#type: String,
    pub widgets_values: Vec<Value>,
    pub inputs: Vec<NodeInput>,
    pub properties: Value,
}

impl WorkflowNode {
    /// The registry package id ComfyUI stamps into node properties when it
    /// knows the providing package.
    pub fn cnr_id(&self) -> Option<&str> {
        self.properties.get("cnr_id").and_then(Value::as_str)
    }
}

/// A link row: `[id, source_node, source_slot, target_node, target_slot, type]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: i64,
    pub source_node: String,
    pub source_slot: i64,
    pub target_node: String,
    pub target_slot: i64,
    pub r#type: String,
}

/// A parsed workflow document. The raw JSON value is retained so that
/// volatile-field-insensitive comparison does not lose unknown fields.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub nodes: IndexMap<String, WorkflowNode>,
    pub links: Vec<Link>,
    raw: Value,
}

impl Workflow {
    /// Parse a ComfyUI workflow document. Tolerates both storage shapes for
    /// `nodes`: an array of node objects, or a mapping keyed by id.
    pub fn from_json(raw: Value) -> Result<Self, WorkflowError> {
        let mut nodes = IndexMap::new();
        match raw.get("nodes") {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(node) = parse_node(item, None) {
                        nodes.insert(node.id.clone(), node);
                    }
                }
            }
            Some(Value::Object(map)) => {
                for (id, item) in map {
                    if let Some(node) = parse_node(item, Some(id)) {
                        nodes.insert(node.id.clone(), node);
                    }
                }
            }
            _ => {}
        }

        let links = raw
            .get("links")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(parse_link).collect())
            .unwrap_or_default();

        Ok(Workflow { nodes, links, raw })
    }

    pub fn from_str(contents: &str) -> Result<Self, WorkflowError> {
        Self::from_json(serde_json::from_str(contents)?)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn node_types(&self) -> indexmap::IndexSet<&str> {
        self.nodes.values().map(|n| n.r#type.as_str()).collect()
    }

    /// A copy of the document with volatile metadata removed: the revision
    /// counter, the viewport offset, the frontend version, and seed widgets
    /// whose control widget says `randomize`. Two workflows are considered
    /// equivalent when their normalized forms are equal.
    pub fn normalized(&self) -> Value {
        let mut value = self.raw.clone();
        if let Some(object) = value.as_object_mut() {
            object.remove("revision");
            if let Some(extra) = object.get_mut("extra").and_then(Value::as_object_mut) {
                extra.remove("ds");
                extra.remove("frontendVersion");
            }
            if let Some(Value::Array(nodes)) = object.get_mut("nodes") {
                for node in nodes {
                    normalize_seed_widgets(node);
                }
            } else if let Some(Value::Object(nodes)) = object.get_mut("nodes") {
                for node in nodes.values_mut() {
                    normalize_seed_widgets(node);
                }
            }
        }
        value
    }

    pub fn is_equivalent_to(&self, other: &Workflow) -> bool {
        self.normalized() == other.normalized()
    }
}

fn parse_node(item: &Value, fallback_id: Option<&str>) -> Option<WorkflowNode> {
    let object = item.as_object()?;
    let id = match object.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => fallback_id?.to_string(),
    };
    let r#type = object
        .get("type")
        .or_else(|| object.get("class_type"))
        .and_then(Value::as_str)?
        .to_string();

    let widgets_values = object
        .get("widgets_values")
        .or_else(|| object.get("widget_values"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let inputs = object
        .get("inputs")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|input| {
                    let input = input.as_object()?;
                    Some(NodeInput {
                        name: input.get("name")?.as_str()?.to_string(),
                        r#type: input
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        link: input.get("link").and_then(Value::as_i64),
                        widget: input.get("widget").cloned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(WorkflowNode {
        id,
        r#type,
        widgets_values,
        inputs,
        properties: object.get("properties").cloned().unwrap_or(Value::Null),
    })
}

fn parse_link(row: &Value) -> Option<Link> {
    let row = row.as_array()?;
    let node_id = |value: &Value| match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    };
    Some(Link {
        id: row.first()?.as_i64()?,
        source_node: node_id(row.get(1)?)?,
        source_slot: row.get(2)?.as_i64().unwrap_or(0),
        target_node: node_id(row.get(3)?)?,
        target_slot: row.get(4)?.as_i64().unwrap_or(0),
        r#type: row
            .get(5)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

const SEED_CONTROL_VALUES: [&str; 4] = ["randomize", "fixed", "increment", "decrement"];

/// Seeds driven by a `randomize` control widget are not meaningful content;
/// zero them so that re-saves do not read as edits. Fixed seeds stay.
fn normalize_seed_widgets(node: &mut Value) {
    let Some(widgets) = node.get_mut("widgets_values").and_then(Value::as_array_mut) else {
        return;
    };
    let mut randomized_seed_slots = Vec::new();
    for (index, value) in widgets.iter().enumerate() {
        if index == 0 {
            continue;
        }
        let is_control = value
            .as_str()
            .is_some_and(|s| SEED_CONTROL_VALUES.contains(&s));
        if is_control && value.as_str() == Some("randomize") && widgets[index - 1].is_number() {
            randomized_seed_slots.push(index - 1);
        }
    }
    for slot in randomized_seed_slots {
        widgets[slot] = Value::from(0);
    }
}
