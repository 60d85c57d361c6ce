use indexmap::IndexMap;
use toml_edit::{InlineTable, Item, Table, Value};

use crate::{Manifest, ManifestError};

const WORKFLOWS_TABLE: &str = "tool.comfydock.workflows";

/// Resolution state of a per-workflow model entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelStatus {
    Resolved,
    #[default]
    Unresolved,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Resolved => "resolved",
            ModelStatus::Unresolved => "unresolved",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "resolved" => ModelStatus::Resolved,
            _ => ModelStatus::Unresolved,
        }
    }
}

/// How much a workflow needs a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criticality {
    Required,
    #[default]
    Flexible,
    Optional,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Required => "required",
            Criticality::Flexible => "flexible",
            Criticality::Optional => "optional",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "required" => Criticality::Required,
            "optional" => Criticality::Optional,
            _ => Criticality::Flexible,
        }
    }
}

/// The place in the workflow graph a model entry was extracted from. The
/// `widget_value` is the literal string as authored in the workflow; it is
/// never rewritten by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation {
    pub node_id: String,
    pub widget_idx: usize,
    pub widget_value: String,
}

impl NodeLocation {
    fn to_inline(&self) -> InlineTable {
        let mut table = InlineTable::new();
        table.insert("node_id", self.node_id.as_str().into());
        table.insert("widget_idx", (self.widget_idx as i64).into());
        table.insert("widget_value", self.widget_value.as_str().into());
        table
    }

    fn from_inline(table: &InlineTable) -> Option<Self> {
        Some(NodeLocation {
            node_id: table.get("node_id")?.as_str()?.to_string(),
            widget_idx: table.get("widget_idx")?.as_integer()? as usize,
            widget_value: table.get("widget_value")?.as_str()?.to_string(),
        })
    }
}

/// A per-workflow model requirement. Resolved entries are keyed by the model
/// short hash; unresolved entries are keyed by filename so a later
/// resolution that picks a different filename for the same node location
/// replaces rather than duplicates them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowModel {
    pub hash: Option<String>,
    pub filename: String,
    pub size: Option<u64>,
    pub category: Option<String>,
    pub status: ModelStatus,
    pub criticality: Criticality,
    pub sources: Vec<String>,
    /// Target path for a pending download intent.
    pub relative_path: Option<String>,
    pub nodes: Vec<NodeLocation>,
}

impl WorkflowModel {
    pub fn key(&self) -> &str {
        self.hash.as_deref().unwrap_or(&self.filename)
    }

    pub fn is_download_intent(&self) -> bool {
        self.status == ModelStatus::Unresolved && !self.sources.is_empty()
    }

    fn to_inline(&self) -> InlineTable {
        let mut table = InlineTable::new();
        table.insert("filename", self.filename.as_str().into());
        if let Some(size) = self.size {
            table.insert("size", (size as i64).into());
        }
        if let Some(category) = &self.category {
            table.insert("category", category.as_str().into());
        }
        table.insert("status", self.status.as_str().into());
        table.insert("criticality", self.criticality.as_str().into());
        if !self.sources.is_empty() {
            let mut array = toml_edit::Array::new();
            for source in &self.sources {
                array.push(source.as_str());
            }
            table.insert("sources", array.into());
        }
        if let Some(relative_path) = &self.relative_path {
            table.insert("relative_path", relative_path.as_str().into());
        }
        let mut nodes = toml_edit::Array::new();
        for location in &self.nodes {
            nodes.push(Value::from(location.to_inline()));
        }
        table.insert("nodes", nodes.into());
        table
    }

    fn from_inline(key: &str, table: &InlineTable) -> Self {
        let get = |field: &str| {
            table
                .get(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let status = get("status")
            .map(|s| ModelStatus::parse(&s))
            .unwrap_or_default();
        WorkflowModel {
            hash: (status == ModelStatus::Resolved).then(|| key.to_string()),
            filename: get("filename").unwrap_or_else(|| key.to_string()),
            size: table
                .get("size")
                .and_then(|v| v.as_integer())
                .map(|v| v as u64),
            category: get("category"),
            status,
            criticality: get("criticality")
                .map(|s| Criticality::parse(&s))
                .unwrap_or_default(),
            sources: table
                .get("sources")
                .and_then(|v| v.as_array())
                .map(|array| {
                    array
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            relative_path: get("relative_path"),
            nodes: table
                .get("nodes")
                .and_then(|v| v.as_array())
                .map(|array| {
                    array
                        .iter()
                        .filter_map(|v| v.as_inline_table().and_then(NodeLocation::from_inline))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn shares_location_with(&self, other: &Self) -> bool {
        self.nodes.iter().any(|a| {
            other
                .nodes
                .iter()
                .any(|b| a.node_id == b.node_id && a.widget_idx == b.widget_idx)
        })
    }
}

/// A per-workflow override for one node type: either an explicit package
/// choice, or `false` meaning "optional, not needed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomNodeMapping {
    Package(String),
    Optional,
}

/// One tracked workflow as persisted under
/// `[tool.comfydock.workflows.<name>]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowEntry {
    /// Path of the committed copy, relative to the metadata directory.
    pub file: String,
    /// Package IDs this workflow requires.
    pub nodes: Vec<String>,
    pub custom_node_map: IndexMap<String, CustomNodeMapping>,
    pub models: IndexMap<String, WorkflowModel>,
}

impl WorkflowEntry {
    pub fn for_file(name: &str) -> Self {
        WorkflowEntry {
            file: format!("{}/{name}.json", comfydock_consts::TRACKED_WORKFLOWS_DIR),
            ..WorkflowEntry::default()
        }
    }
}

/// View over `[tool.comfydock.workflows]`.
pub struct Workflows<'a> {
    manifest: &'a mut Manifest,
}

impl<'a> Workflows<'a> {
    pub(crate) fn new(manifest: &'a mut Manifest) -> Self {
        Self { manifest }
    }

    fn workflow_table(&self, name: &str) -> Option<&dyn toml_edit::TableLike> {
        self.manifest
            .document()
            .get_nested_table(WORKFLOWS_TABLE)
            .ok()
            .and_then(|t| t.get(name))
            .and_then(|item| item.as_table_like())
    }

    /// Write the full entry for `name`, replacing any previous state.
    pub fn add(&mut self, name: &str, entry: &WorkflowEntry) -> Result<(), ManifestError> {
        let mut table = Table::new();
        table.insert("file", toml_edit::value(&entry.file));
        if !entry.nodes.is_empty() {
            let mut nodes = toml_edit::Array::new();
            for package_id in &entry.nodes {
                nodes.push(package_id.as_str());
            }
            table.insert("nodes", toml_edit::value(nodes));
        }
        if !entry.custom_node_map.is_empty() {
            let mut map = InlineTable::new();
            for (node_type, mapping) in &entry.custom_node_map {
                let value: Value = match mapping {
                    CustomNodeMapping::Package(package_id) => package_id.as_str().into(),
                    CustomNodeMapping::Optional => false.into(),
                };
                map.insert(node_type.as_str(), value);
            }
            table.insert("custom_node_map", toml_edit::value(map));
        }
        if !entry.models.is_empty() {
            let mut models = Table::new();
            models.set_implicit(true);
            for (key, model) in &entry.models {
                models.insert(key, toml_edit::value(model.to_inline()));
            }
            table.insert("models", Item::Table(models));
        }

        self.manifest
            .document_mut()
            .get_or_insert_nested_table(WORKFLOWS_TABLE)?
            .insert(name, Item::Table(table));
        tracing::debug!("wrote workflow entry '{name}'");
        self.manifest.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<bool, ManifestError> {
        let removed = self
            .manifest
            .document_mut()
            .remove_from_table(WORKFLOWS_TABLE, name)
            .is_some();
        if removed {
            tracing::info!("removed tracked workflow '{name}'");
            self.manifest.save()?;
        }
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<WorkflowEntry> {
        let table = self.workflow_table(name)?;
        Some(parse_entry(table))
    }

    /// All tracked workflows with their persisted resolution state.
    pub fn get_all_with_resolutions(&self) -> IndexMap<String, WorkflowEntry> {
        let mut workflows = IndexMap::new();
        if let Ok(table) = self.manifest.document().get_nested_table(WORKFLOWS_TABLE) {
            for (name, item) in table.iter() {
                if let Some(entry) = item.as_table_like() {
                    workflows.insert(name.to_string(), parse_entry(entry));
                }
            }
        }
        workflows
    }

    pub fn get_workflow_models(&self, name: &str) -> Vec<WorkflowModel> {
        self.get(name)
            .map(|entry| entry.models.into_values().collect())
            .unwrap_or_default()
    }

    /// Append `package_id` to the workflow's `nodes` list. Idempotent; the
    /// workflow entry is created when missing.
    pub fn add_node_package(&mut self, name: &str, package_id: &str) -> Result<(), ManifestError> {
        let mut entry = self.get(name).unwrap_or_else(|| WorkflowEntry::for_file(name));
        if !entry.nodes.iter().any(|id| id == package_id) {
            entry.nodes.push(package_id.to_string());
        }
        self.add(name, &entry)
    }

    /// Record a per-workflow node-type override.
    pub fn set_custom_node_mapping(
        &mut self,
        name: &str,
        node_type: &str,
        mapping: CustomNodeMapping,
    ) -> Result<(), ManifestError> {
        let mut entry = self.get(name).unwrap_or_else(|| WorkflowEntry::for_file(name));
        entry
            .custom_node_map
            .insert(node_type.to_string(), mapping);
        self.add(name, &entry)
    }

    /// Insert a model entry, replacing any entry (under any key) that covers
    /// one of the same `(node_id, widget_idx)` locations. This is the write
    /// primitive of progressive persistence: one call, one complete save.
    pub fn add_workflow_model(
        &mut self,
        name: &str,
        model: WorkflowModel,
    ) -> Result<(), ManifestError> {
        let mut entry = self.get(name).unwrap_or_else(|| WorkflowEntry::for_file(name));

        let mut merged_locations = model.nodes.clone();
        entry.models.retain(|_, existing| {
            if existing.shares_location_with(&model) {
                // Keep locations from the replaced entry that the new entry
                // does not itself cover (same model used by several nodes).
                for location in &existing.nodes {
                    let covered = merged_locations
                        .iter()
                        .any(|l| l.node_id == location.node_id && l.widget_idx == location.widget_idx);
                    let same_key = existing.key() == model.key();
                    if !covered && same_key {
                        merged_locations.push(location.clone());
                    }
                }
                false
            } else {
                true
            }
        });

        // A model already present under the same key absorbs the new
        // locations instead of losing its previous ones.
        if let Some(existing) = entry.models.shift_remove(model.key()) {
            for location in existing.nodes {
                let covered = merged_locations
                    .iter()
                    .any(|l| l.node_id == location.node_id && l.widget_idx == location.widget_idx);
                if !covered {
                    merged_locations.push(location);
                }
            }
        }

        let mut model = model;
        model.nodes = merged_locations;
        entry.models.insert(model.key().to_string(), model);
        self.add(name, &entry)
    }
}

fn parse_entry(table: &dyn toml_edit::TableLike) -> WorkflowEntry {
    let mut entry = WorkflowEntry {
        file: table
            .get("file")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        ..WorkflowEntry::default()
    };

    if let Some(nodes) = table.get("nodes").and_then(|v| v.as_array()) {
        entry.nodes = nodes
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }

    if let Some(map) = table.get("custom_node_map").and_then(|v| v.as_table_like()) {
        for (node_type, item) in map.iter() {
            let mapping = match item.as_value() {
                Some(Value::Boolean(flag)) if !*flag.value() => CustomNodeMapping::Optional,
                Some(value) => match value.as_str() {
                    Some(package_id) => CustomNodeMapping::Package(package_id.to_string()),
                    None => continue,
                },
                None => continue,
            };
            entry.custom_node_map.insert(node_type.to_string(), mapping);
        }
    }

    if let Some(models) = table.get("models").and_then(|v| v.as_table_like()) {
        for (key, item) in models.iter() {
            if let Some(model_table) = item.as_value().and_then(|v| v.as_inline_table()) {
                entry
                    .models
                    .insert(key.to_string(), WorkflowModel::from_inline(key, model_table));
            }
        }
    }

    entry
}
