#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use comfydock_core::{
    CoreError, CreateOptions, Environment, PackageManager, SyncReport, Workspace,
};

/// Package-manager double: records calls, changes nothing.
pub struct FakePackageManager {
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl PackageManager for FakePackageManager {
    fn sync(&self, all_groups: bool, dry_run: bool) -> Result<SyncReport, CoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("sync all_groups={all_groups} dry_run={dry_run}"));
        Ok(SyncReport {
            changed: false,
            output: String::new(),
        })
    }
}

/// A workspace with one environment, a fake package manager, and a local
/// stand-in ComfyUI checkout. Everything lives in one temp directory.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub workspace: Workspace,
    pub env: Environment,
    pub uv_calls: Arc<Mutex<Vec<String>>>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder {
            mappings: None,
            auto_select_ambiguous: true,
        }
    }

    /// Path of the active workflows directory inside the checkout.
    fn active_workflows_dir(&self) -> std::path::PathBuf {
        self.env.comfyui_path().join("user/default/workflows")
    }

    /// Simulate the ComfyUI frontend saving a workflow document.
    pub fn save_workflow(&self, name: &str, workflow: &Value) {
        let dir = self.active_workflows_dir();
        fs_err::create_dir_all(&dir).unwrap();
        fs_err::write(
            dir.join(format!("{name}.json")),
            serde_json::to_string_pretty(workflow).unwrap(),
        )
        .unwrap();
    }

    /// Put a small file into the global models directory and index it.
    /// Returns its short hash.
    pub fn index_model(&self, relative_path: &str, contents: &[u8]) -> String {
        let models_dir = self.workspace.models_directory().to_path_buf();
        let absolute = models_dir.join(relative_path);
        fs_err::create_dir_all(absolute.parent().unwrap()).unwrap();
        fs_err::write(&absolute, contents).unwrap();
        self.workspace
            .model_repository()
            .index_file(&models_dir, relative_path)
            .unwrap()
    }

    pub fn add_model_source(&self, hash: &str, url: &str) {
        self.workspace
            .model_repository()
            .add_source(hash, comfydock_model_index::SourceType::detect(url), url, None)
            .unwrap();
    }

    pub fn manifest_contents(&self) -> String {
        let path = self
            .env
            .path()
            .join(".cec")
            .join("pyproject.toml");
        fs_err::read_to_string(path).unwrap()
    }
}

pub struct TestEnvBuilder {
    mappings: Option<Value>,
    auto_select_ambiguous: bool,
}

impl TestEnvBuilder {
    pub fn mappings(mut self, mappings: Value) -> Self {
        self.mappings = Some(mappings);
        self
    }

    pub fn auto_select_ambiguous(mut self, enabled: bool) -> Self {
        self.auto_select_ambiguous = enabled;
        self
    }

    pub fn build(self) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("workspace");

        {
            let mut workspace = Workspace::init(&root, None).unwrap();
            if !self.auto_select_ambiguous {
                workspace.config_mut().auto_select_ambiguous = false;
                workspace.save_config().unwrap();
            }
            if let Some(mappings) = &self.mappings {
                let path = workspace.paths().node_mappings_file();
                fs_err::create_dir_all(path.parent().unwrap()).unwrap();
                fs_err::write(&path, serde_json::to_string(mappings).unwrap()).unwrap();
            }
        }

        // Re-open so the mappings table and config are picked up.
        let workspace = Workspace::open(&root).unwrap();

        // A tiny local checkout stands in for the real ComfyUI clone.
        let checkout = dir.path().join("comfyui-checkout");
        fs_err::create_dir_all(&checkout).unwrap();
        fs_err::write(checkout.join("main.py"), "print('comfyui')").unwrap();

        let options = CreateOptions {
            comfyui_source: Some(checkout),
            ..CreateOptions::default()
        };
        workspace.create_environment("test-env", &options).unwrap();

        let uv_calls = Arc::new(Mutex::new(Vec::new()));
        let env = workspace
            .environment_with_package_manager(
                "test-env",
                Box::new(FakePackageManager {
                    calls: uv_calls.clone(),
                }),
            )
            .unwrap();

        TestEnv {
            dir,
            workspace,
            env,
            uv_calls,
        }
    }
}

/// A minimal node-mappings table for resolution tests.
pub fn simple_mappings() -> Value {
    json!({
        "version": "2025.10.10",
        "generated_at": "2025-10-10T00:00:00Z",
        "stats": {"packages": 1, "signatures": 1},
        "mappings": {
            "NodeX::_": [
                {"package_id": "pkg-a", "versions": ["1.0"], "rank": 1}
            ]
        },
        "packages": {
            "pkg-a": {
                "display_name": "Package A",
                "repository": "https://github.com/test/pkg-a",
                "versions": {"1.0": {"download_url": "https://dl.example/pkg-a-1.0.zip"}}
            }
        }
    })
}

/// A workflow document with the given nodes.
pub fn workflow_json(nodes: Vec<Value>) -> Value {
    json!({
        "id": "test-workflow",
        "revision": 0,
        "last_node_id": 10,
        "last_link_id": 0,
        "nodes": nodes,
        "links": [],
        "groups": [],
        "config": {},
        "extra": {},
        "version": 0.4
    })
}

pub fn node(id: u32, node_type: &str, widgets: Value) -> Value {
    json!({
        "id": id,
        "type": node_type,
        "pos": [id * 50, 0],
        "widgets_values": widgets,
        "properties": {},
        "inputs": [],
        "outputs": []
    })
}
