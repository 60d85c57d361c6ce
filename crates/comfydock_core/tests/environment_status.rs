//! Environment status: manifest-vs-filesystem comparison, typed git diffs,
//! and per-workflow states with uninstalled-package counts.

mod common;

use serde_json::json;

use comfydock_core::WorkflowSyncState;
use comfydock_manifest::{NodeSource, NodeSpec};

use common::{TestEnv, node, simple_mappings, workflow_json};

#[test]
fn missing_and_extra_nodes_are_reported() {
    let mut test_env = TestEnv::new();

    test_env
        .env
        .manifest()
        .nodes()
        .add(
            &NodeSpec {
                name: "declared-but-missing".to_string(),
                source: NodeSource::Registry,
                ..NodeSpec::default()
            },
            None,
        )
        .unwrap();
    let stray = test_env.env.custom_nodes_path().join("stray-dir");
    fs_err::create_dir_all(&stray).unwrap();

    let status = test_env.env.status().unwrap();
    assert_eq!(
        status.comparison.missing_nodes,
        vec!["declared-but-missing".to_string()]
    );
    assert_eq!(status.comparison.extra_nodes, vec!["stray-dir".to_string()]);
    assert!(!status.comparison.is_clean());
}

#[test]
fn disabled_directories_are_not_extra() {
    let mut test_env = TestEnv::new();
    fs_err::create_dir_all(test_env.env.custom_nodes_path().join("wip.disabled")).unwrap();

    let status = test_env.env.status().unwrap();
    assert!(status.comparison.extra_nodes.is_empty());
}

#[test]
fn manifest_diff_tracks_uncommitted_node_additions() {
    let mut test_env = TestEnv::new();
    test_env
        .env
        .manifest()
        .nodes()
        .add(
            &NodeSpec {
                name: "fresh-node".to_string(),
                source: NodeSource::Registry,
                ..NodeSpec::default()
            },
            None,
        )
        .unwrap();

    let status = test_env.env.status().unwrap();
    assert!(status.git.has_changes);
    assert_eq!(status.git.manifest_diff.nodes_added, vec!["fresh-node".to_string()]);

    // Committing clears both the flag and the diff.
    test_env.env.commit(Some("add fresh-node")).unwrap();
    let status = test_env.env.status().unwrap();
    assert!(!status.git.has_changes);
    assert!(status.git.manifest_diff.is_empty());
}

#[test]
fn workflow_states_cover_new_modified_synced_and_deleted() {
    let mut test_env = TestEnv::new();

    test_env.save_workflow("stable", &workflow_json(vec![node(1, "LoadImage", json!(["a.png"]))]));
    test_env.save_workflow("editable", &workflow_json(vec![node(1, "LoadImage", json!(["a.png"]))]));
    test_env.save_workflow("doomed", &workflow_json(vec![node(1, "LoadImage", json!(["a.png"]))]));
    test_env.env.commit(Some("track three workflows")).unwrap();

    // Modify one, delete one, add a brand new one.
    test_env.save_workflow("editable", &workflow_json(vec![node(1, "LoadImage", json!(["b.png"]))]));
    fs_err::remove_file(
        test_env
            .env
            .comfyui_path()
            .join("user/default/workflows/doomed.json"),
    )
    .unwrap();
    test_env.save_workflow("fresh", &workflow_json(vec![node(1, "LoadImage", json!(["c.png"]))]));

    let status = test_env.env.status().unwrap();
    let state_of = |name: &str| {
        status
            .workflows
            .items
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.state)
    };
    assert_eq!(state_of("stable"), Some(WorkflowSyncState::Synced));
    assert_eq!(state_of("editable"), Some(WorkflowSyncState::Modified));
    assert_eq!(state_of("doomed"), Some(WorkflowSyncState::Deleted));
    assert_eq!(state_of("fresh"), Some(WorkflowSyncState::New));
    assert!(status.workflows.has_changes());
}

#[test]
fn volatile_only_changes_read_as_synced() {
    let mut test_env = TestEnv::new();
    let mut workflow = workflow_json(vec![node(3, "KSampler", json!([42, "randomize", 20]))]);
    test_env.save_workflow("wf", &workflow);
    test_env.env.commit(Some("track wf")).unwrap();

    // A re-save bumps the revision, moves the viewport, and rerolls the
    // randomized seed, none of which is a content change.
    workflow["revision"] = json!(7);
    workflow["extra"] = json!({"ds": {"offset": [120.5, -33.0]}, "frontendVersion": "1.16.0"});
    workflow["nodes"][0]["widgets_values"] = json!([777777, "randomize", 20]);
    test_env.save_workflow("wf", &workflow);

    let status = test_env.env.status().unwrap();
    assert_eq!(status.workflows.items[0].state, WorkflowSyncState::Synced);
}

#[test]
fn uninstalled_packages_compare_against_the_manifest_not_the_resolver() {
    let mut test_env = TestEnv::builder().mappings(simple_mappings()).build();
    test_env.save_workflow("wf", &workflow_json(vec![node(1, "NodeX", json!([]))]));
    test_env.env.resolve_workflow("wf", None, None, false).unwrap();

    // Resolved but not installed: the workflow references pkg-a, the
    // manifest's node table does not have it.
    let status = test_env.env.status().unwrap();
    let item = status
        .workflows
        .items
        .iter()
        .find(|item| item.name == "wf")
        .unwrap();
    assert_eq!(item.uninstalled_packages, vec!["pkg-a".to_string()]);
    assert_eq!(test_env.env.get_uninstalled_nodes(), vec!["pkg-a".to_string()]);

    // Installing the package clears the count.
    test_env
        .env
        .manifest()
        .nodes()
        .add(
            &NodeSpec {
                name: "pkg-a".to_string(),
                registry_id: Some("pkg-a".to_string()),
                source: NodeSource::Registry,
                ..NodeSpec::default()
            },
            None,
        )
        .unwrap();
    let status = test_env.env.status().unwrap();
    let item = status
        .workflows
        .items
        .iter()
        .find(|item| item.name == "wf")
        .unwrap();
    assert!(item.uninstalled_packages.is_empty());
    assert!(test_env.env.get_uninstalled_nodes().is_empty());
}
