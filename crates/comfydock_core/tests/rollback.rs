//! Checkpoint rollback: the target version is restored into the working
//! tree, reconciled, and committed as a new version, keeping history linear.

mod common;

use serde_json::json;

use comfydock_core::{CoreError, ForceRollback};
use comfydock_manifest::{NodeSource, NodeSpec};

use common::{TestEnv, node, workflow_json};

fn registry_node(name: &str) -> NodeSpec {
    NodeSpec {
        name: name.to_string(),
        registry_id: Some(name.to_string()),
        version: Some("1.0".to_string()),
        source: NodeSource::Registry,
        ..NodeSpec::default()
    }
}

#[test]
fn rollback_restores_manifest_and_appends_a_version() {
    let mut test_env = TestEnv::new();

    // v1 is the initial commit from environment creation. Build v2 and v3.
    test_env
        .env
        .manifest()
        .nodes()
        .add(&registry_node("node-v2"), None)
        .unwrap();
    test_env.env.commit(Some("add node-v2")).unwrap();

    test_env
        .env
        .manifest()
        .nodes()
        .add(&registry_node("node-v3"), None)
        .unwrap();
    test_env.env.commit(Some("add node-v3")).unwrap();

    let versions = test_env.env.get_versions(10).unwrap();
    assert_eq!(versions.len(), 3);

    test_env.env.rollback(Some("v1"), false, None).unwrap();

    // The manifest matches v1 again: no nodes.
    assert!(test_env.env.manifest().nodes().get_existing().is_empty());

    // Rollback itself became history.
    let versions = test_env.env.get_versions(10).unwrap();
    assert_eq!(versions.len(), 4);
    assert_eq!(versions[3].label, "v4");
    assert_eq!(versions[3].message, "Rollback to v1");

    // v4's manifest equals v1's manifest.
    let v1 = test_env.env.git().show_file("v1", "pyproject.toml").unwrap();
    let v4 = test_env.env.git().show_file("v4", "pyproject.toml").unwrap();
    assert_eq!(v1, v4);

    // The restored lock state was synced into the virtual environment.
    let calls = test_env.uv_calls.lock().unwrap();
    assert!(calls.iter().any(|call| call.contains("dry_run=false")));
}

#[test]
fn rollback_restores_workflow_files() {
    let mut test_env = TestEnv::new();

    test_env.save_workflow("wf", &workflow_json(vec![node(1, "LoadImage", json!(["a.png"]))]));
    test_env.env.commit(Some("track workflow")).unwrap();

    // The user mangles the active copy after committing.
    test_env.save_workflow("wf", &workflow_json(vec![node(1, "LoadImage", json!(["b.png"]))]));

    test_env.env.rollback(None, true, None).unwrap();

    let active = fs_err::read_to_string(
        test_env
            .env
            .comfyui_path()
            .join("user/default/workflows/wf.json"),
    )
    .unwrap();
    assert!(active.contains("a.png"));
    assert!(!active.contains("b.png"));
}

#[test]
fn rollback_refuses_uncommitted_changes_without_force_or_strategy() {
    let mut test_env = TestEnv::new();
    test_env
        .env
        .manifest()
        .nodes()
        .add(&registry_node("node-v2"), None)
        .unwrap();
    test_env.env.commit(Some("add node")).unwrap();

    // Dirty the manifest without committing.
    test_env
        .env
        .manifest()
        .uv_settings()
        .add_constraint("numpy<2")
        .unwrap();

    let err = test_env.env.rollback(Some("v1"), false, None).unwrap_err();
    assert!(matches!(err, CoreError::UncommittedChanges { .. }));

    // A confirming strategy unblocks it.
    let mut strategy = ForceRollback;
    test_env
        .env
        .rollback(Some("v1"), false, Some(&mut strategy))
        .unwrap();
    assert!(test_env.env.manifest().nodes().get_existing().is_empty());
}

#[test]
fn rollback_to_current_state_commits_nothing() {
    let mut test_env = TestEnv::new();
    test_env
        .env
        .manifest()
        .nodes()
        .add(&registry_node("node-v2"), None)
        .unwrap();
    test_env.env.commit(Some("add node")).unwrap();

    let before = test_env.env.get_versions(10).unwrap().len();
    // Discarding with nothing uncommitted is a no-op.
    test_env.env.rollback(None, true, None).unwrap();
    let after = test_env.env.get_versions(10).unwrap().len();
    assert_eq!(before, after);
}

#[test]
fn rollback_removes_node_directories_not_in_target_version() {
    let mut test_env = TestEnv::new();

    // v2 declares a node and materializes its directory by hand.
    test_env
        .env
        .manifest()
        .nodes()
        .add(&registry_node("stray-pack"), None)
        .unwrap();
    let node_dir = test_env.env.custom_nodes_path().join("stray-pack");
    fs_err::create_dir_all(&node_dir).unwrap();
    fs_err::write(node_dir.join("__init__.py"), "x").unwrap();
    test_env.env.commit(Some("add stray-pack")).unwrap();

    test_env.env.rollback(Some("v1"), true, None).unwrap();

    // v1 had no nodes, so the directory is gone (registry nodes are
    // deleted, not disabled; the cache covers recovery).
    assert!(!node_dir.exists());
}
