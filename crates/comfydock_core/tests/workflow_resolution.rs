//! Resolution pipeline behavior: auto-resolution, ranked selection,
//! user overrides, optional nodes, and idempotent re-runs.

mod common;

use serde_json::json;

use comfydock_core::{
    ModelChoice, MissingModelChoice, ModelResolutionStrategy, NodeChoice, NodeResolutionStrategy,
};
use comfydock_manifest::{CustomNodeMapping, ModelStatus};
use comfydock_model_index::ModelWithLocation;
use comfydock_registry::ResolvedNodePackage;
use comfydock_workflow::ModelRef;

use common::{TestEnv, node, simple_mappings, workflow_json};

#[test]
fn fresh_auto_resolution_records_the_package() {
    let mut test_env = TestEnv::builder().mappings(simple_mappings()).build();
    test_env.save_workflow(
        "basic",
        &workflow_json(vec![
            node(1, "LoadImage", json!(["photo.png"])),
            node(2, "NodeX", json!([])),
        ]),
    );

    let result = test_env
        .env
        .resolve_workflow("basic", None, None, false)
        .unwrap();

    assert_eq!(result.nodes_resolved.len(), 1);
    assert_eq!(result.nodes_resolved[0].package_id, "pkg-a");
    assert!(result.nodes_unresolved.is_empty());

    let entry = test_env.env.manifest().workflows().get("basic").unwrap();
    assert_eq!(entry.nodes, vec!["pkg-a".to_string()]);
    // No override was needed, so no custom_node_map entry is written.
    assert!(entry.custom_node_map.is_empty());
}

#[test]
fn multi_candidate_mapping_auto_selects_rank_one() {
    let mappings = json!({
        "version": "2025.10.10",
        "mappings": {
            "NodeX::_": [
                {"package_id": "pkg-rank1", "versions": [], "rank": 1},
                {"package_id": "pkg-rank2", "versions": [], "rank": 2}
            ]
        },
        "packages": {
            "pkg-rank1": {"versions": {}},
            "pkg-rank2": {"versions": {}}
        },
        "stats": {}
    });
    let mut test_env = TestEnv::builder().mappings(mappings).build();
    test_env.save_workflow("wf", &workflow_json(vec![node(1, "NodeX", json!([]))]));

    let result = test_env.env.resolve_workflow("wf", None, None, false).unwrap();

    assert_eq!(result.nodes_resolved.len(), 1);
    assert_eq!(result.nodes_resolved[0].package_id, "pkg-rank1");
    assert_eq!(result.nodes_resolved[0].rank, 1);
    assert!(result.nodes_ambiguous.is_empty());
}

#[test]
fn installed_package_beats_better_rank() {
    let mappings = json!({
        "version": "2025.10.10",
        "mappings": {
            "NodeX::_": [
                {"package_id": "pkg-popular", "versions": [], "rank": 1},
                {"package_id": "pkg-installed", "versions": [], "rank": 2}
            ]
        },
        "packages": {
            "pkg-popular": {"versions": {}},
            "pkg-installed": {"versions": {}}
        },
        "stats": {}
    });
    let mut test_env = TestEnv::builder().mappings(mappings).build();

    // The rank-2 package is already installed in this environment.
    test_env
        .env
        .manifest()
        .nodes()
        .add(
            &comfydock_manifest::NodeSpec {
                name: "pkg-installed".to_string(),
                registry_id: Some("pkg-installed".to_string()),
                source: comfydock_manifest::NodeSource::Registry,
                ..Default::default()
            },
            None,
        )
        .unwrap();

    test_env.save_workflow("wf", &workflow_json(vec![node(1, "NodeX", json!([]))]));
    let result = test_env.env.resolve_workflow("wf", None, None, false).unwrap();

    assert_eq!(result.nodes_resolved.len(), 1);
    assert_eq!(result.nodes_resolved[0].package_id, "pkg-installed");
}

#[test]
fn auto_select_disabled_reports_ambiguity() {
    let mappings = json!({
        "version": "2025.10.10",
        "mappings": {
            "NodeX::_": [
                {"package_id": "pkg-1", "versions": [], "rank": 1},
                {"package_id": "pkg-2", "versions": [], "rank": 2}
            ]
        },
        "packages": {"pkg-1": {"versions": {}}, "pkg-2": {"versions": {}}},
        "stats": {}
    });
    let mut test_env = TestEnv::builder()
        .mappings(mappings)
        .auto_select_ambiguous(false)
        .build();
    test_env.save_workflow("wf", &workflow_json(vec![node(1, "NodeX", json!([]))]));

    let result = test_env.env.resolve_workflow("wf", None, None, false).unwrap();

    assert!(result.nodes_resolved.is_empty());
    assert_eq!(result.nodes_ambiguous.len(), 1);
    assert_eq!(result.nodes_ambiguous[0].1.len(), 2);
}

struct PickSecond;

impl NodeResolutionStrategy for PickSecond {
    fn resolve_unknown(&mut self, _: &str, candidates: &[ResolvedNodePackage]) -> NodeChoice {
        match candidates.get(1) {
            Some(second) => NodeChoice::Select(second.package_id.clone()),
            None => NodeChoice::Skip,
        }
    }
}

#[test]
fn user_override_is_written_to_custom_node_map_and_node_mappings() {
    let mappings = json!({
        "version": "2025.10.10",
        "mappings": {
            "NodeX::_": [
                {"package_id": "pkg-a", "versions": [], "rank": 1},
                {"package_id": "pkg-b", "versions": [], "rank": 2}
            ]
        },
        "packages": {"pkg-a": {"versions": {}}, "pkg-b": {"versions": {}}},
        "stats": {}
    });
    let mut test_env = TestEnv::builder()
        .mappings(mappings)
        .auto_select_ambiguous(false)
        .build();
    test_env.save_workflow("wf", &workflow_json(vec![node(1, "NodeX", json!([]))]));

    let mut strategy = PickSecond;
    let result = test_env
        .env
        .resolve_workflow("wf", Some(&mut strategy), None, true)
        .unwrap();

    assert_eq!(result.nodes_resolved.len(), 1);
    assert_eq!(result.nodes_resolved[0].package_id, "pkg-b");

    let entry = test_env.env.manifest().workflows().get("wf").unwrap();
    assert!(entry.nodes.contains(&"pkg-b".to_string()));
    assert_eq!(
        entry.custom_node_map.get("NodeX"),
        Some(&CustomNodeMapping::Package("pkg-b".to_string()))
    );
    // The confirmed choice became a workspace-wide mapping.
    assert_eq!(
        test_env.env.manifest().node_mappings().get("NodeX").as_deref(),
        Some("pkg-b")
    );
}

struct MarkOptional;

impl NodeResolutionStrategy for MarkOptional {
    fn resolve_unknown(&mut self, _: &str, _: &[ResolvedNodePackage]) -> NodeChoice {
        NodeChoice::Optional
    }
}

#[test]
fn optional_node_is_recorded_as_false_and_not_reprompted() {
    let mut test_env = TestEnv::builder().mappings(simple_mappings()).build();
    test_env.save_workflow("wf", &workflow_json(vec![node(1, "NodeY", json!([]))]));

    let mut strategy = MarkOptional;
    test_env
        .env
        .resolve_workflow("wf", Some(&mut strategy), None, true)
        .unwrap();

    let entry = test_env.env.manifest().workflows().get("wf").unwrap();
    assert_eq!(
        entry.custom_node_map.get("NodeY"),
        Some(&CustomNodeMapping::Optional)
    );
    assert!(entry.nodes.is_empty());

    // A re-run sees the override and has nothing left to ask.
    let rerun = test_env.env.resolve_workflow("wf", None, None, false).unwrap();
    assert!(rerun.nodes_unresolved.is_empty());
    assert!(rerun.nodes_ambiguous.is_empty());
}

#[test]
fn filename_match_keys_entry_by_hash_and_keeps_widget_value() {
    let mut test_env = TestEnv::new();
    let hash = test_env.index_model("loras/style/model.safetensors", b"lora weights");

    test_env.save_workflow(
        "wf",
        &workflow_json(vec![node(4, "SomeCustomLoader", json!(["model.safetensors"]))]),
    );

    let result = test_env.env.resolve_workflow("wf", None, None, false).unwrap();
    assert_eq!(result.models_resolved.len(), 1);
    assert_eq!(
        result.models_resolved[0].match_type,
        comfydock_registry::MatchType::Filename
    );

    let entry = test_env.env.manifest().workflows().get("wf").unwrap();
    let model = entry.models.get(&hash).expect("keyed by short hash");
    assert_eq!(model.status, ModelStatus::Resolved);
    assert_eq!(model.nodes.len(), 1);
    // The literal widget value is the shareable reference; it is never
    // rewritten by resolution.
    assert_eq!(model.nodes[0].widget_value, "model.safetensors");

    // The model also landed in the environment-wide registry.
    assert!(test_env.env.manifest().models().has_model(&hash).is_some());
}

#[test]
fn resolution_is_idempotent() {
    let mut test_env = TestEnv::builder().mappings(simple_mappings()).build();
    test_env.index_model("checkpoints/sd15.safetensors", b"checkpoint");
    test_env.save_workflow(
        "wf",
        &workflow_json(vec![
            node(1, "NodeX", json!([])),
            node(4, "CheckpointLoaderSimple", json!(["sd15.safetensors"])),
        ]),
    );

    test_env.env.resolve_workflow("wf", None, None, false).unwrap();
    let first = test_env.manifest_contents();

    test_env.env.resolve_workflow("wf", None, None, false).unwrap();
    let second = test_env.manifest_contents();

    assert_eq!(first, second);
}

#[test]
fn reconciliation_removes_entries_for_vanished_nodes() {
    let mut test_env = TestEnv::builder().mappings(simple_mappings()).build();
    test_env.index_model("checkpoints/sd15.safetensors", b"checkpoint");
    test_env.save_workflow(
        "wf",
        &workflow_json(vec![
            node(1, "NodeX", json!([])),
            node(4, "CheckpointLoaderSimple", json!(["sd15.safetensors"])),
        ]),
    );
    test_env.env.resolve_workflow("wf", None, None, false).unwrap();

    let entry = test_env.env.manifest().workflows().get("wf").unwrap();
    assert_eq!(entry.nodes, vec!["pkg-a".to_string()]);
    assert_eq!(entry.models.len(), 1);

    // The user deletes both nodes from the graph and saves again.
    test_env.save_workflow("wf", &workflow_json(vec![node(9, "LoadImage", json!(["x.png"]))]));
    test_env.env.resolve_workflow("wf", None, None, false).unwrap();

    let entry = test_env.env.manifest().workflows().get("wf").unwrap();
    assert!(entry.nodes.is_empty());
    assert!(entry.custom_node_map.is_empty());
    assert!(entry.models.is_empty());

    // Orphan cleanup also dropped the model from the required registry.
    assert!(test_env.env.manifest().models().all_hashes().is_empty());
}

struct NeverCalled;

impl ModelResolutionStrategy for NeverCalled {
    fn resolve_ambiguous(&mut self, _: &ModelRef, _: &[ModelWithLocation]) -> ModelChoice {
        panic!("strategy must not be consulted for already-persisted resolutions");
    }

    fn handle_missing(&mut self, _: &ModelRef) -> MissingModelChoice {
        panic!("strategy must not be consulted for already-persisted resolutions");
    }
}

#[test]
fn persisted_resolutions_are_not_asked_again() {
    let mut test_env = TestEnv::new();
    test_env.index_model("loras/a/model.safetensors", b"weights a");
    let hash_b = test_env.index_model("loras/b/model.safetensors", b"weights b");

    test_env.save_workflow(
        "wf",
        &workflow_json(vec![node(4, "SomeCustomLoader", json!(["model.safetensors"]))]),
    );

    // First pass: ambiguous; a strategy picks the second candidate.
    struct PickB;
    impl ModelResolutionStrategy for PickB {
        fn resolve_ambiguous(
            &mut self,
            _: &ModelRef,
            candidates: &[ModelWithLocation],
        ) -> ModelChoice {
            let chosen = candidates
                .iter()
                .find(|m| m.relative_path.starts_with("loras/b/"))
                .expect("candidate b present");
            ModelChoice::Select(chosen.clone())
        }
        fn handle_missing(&mut self, _: &ModelRef) -> MissingModelChoice {
            MissingModelChoice::Skip
        }
    }
    let mut strategy = PickB;
    test_env
        .env
        .resolve_workflow("wf", None, Some(&mut strategy), true)
        .unwrap();

    let entry = test_env.env.manifest().workflows().get("wf").unwrap();
    assert!(entry.models.contains_key(&hash_b));

    // Second pass: the persisted choice short-circuits the chain.
    let mut never = NeverCalled;
    let rerun = test_env
        .env
        .resolve_workflow("wf", None, Some(&mut never), true)
        .unwrap();
    assert_eq!(rerun.models_resolved.len(), 1);
    assert_eq!(rerun.models_resolved[0].model.hash, hash_b);
}
