pub const TOOL_NAMESPACE: &str = "comfydock";
pub const TOOL_TABLE_PREFIX: &str = "tool.comfydock";

pub const CEC_DIR: &str = ".cec";
pub const MANIFEST_FILE: &str = "pyproject.toml";
pub const LOCK_FILE: &str = "uv.lock";
pub const PYTHON_VERSION_FILE: &str = ".python-version";
pub const TRACKED_WORKFLOWS_DIR: &str = "workflows";

pub const COMFYUI_DIR: &str = "ComfyUI";
pub const CUSTOM_NODES_DIR: &str = "custom_nodes";
pub const MODELS_DIR: &str = "models";
pub const VENV_DIR: &str = ".venv";
/// Where the ComfyUI frontend saves workflow documents, relative to the
/// ComfyUI checkout.
pub const ACTIVE_WORKFLOWS_DIR: &str = "user/default/workflows";

pub const METADATA_DIR: &str = ".metadata";
pub const WORKSPACE_CONFIG_FILE: &str = "workspace.json";
pub const CACHE_DIR: &str = "comfydock_cache";
pub const LOGS_DIR: &str = "logs";
pub const ENVIRONMENTS_DIR: &str = "environments";

pub const MODEL_INDEX_DB: &str = "models.db";
pub const NODE_CACHE_DIR: &str = "custom_nodes";
pub const API_CACHE_DIR: &str = "api_cache";
pub const NODE_MAPPINGS_FILE: &str = "node_mappings.json";

pub const DEFAULT_COMFYUI_REPO: &str = "https://github.com/comfyanonymous/ComfyUI";
pub const DEFAULT_REGISTRY_URL: &str = "https://api.comfy.org";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Suffix appended to a custom-node directory that is disabled instead of
/// deleted during filesystem sync.
pub const DISABLED_SUFFIX: &str = ".disabled";

/// uv source names that must never be removed by orphan cleanup.
pub const PROTECTED_SOURCES: &[&str] = &["pytorch-cuda", "pytorch-cpu", "torch-cpu", "torch-cuda"];

/// Fallback git identity when neither the environment nor the OS provides one.
pub const DEFAULT_GIT_AUTHOR: &str = "ComfyDock User";
pub const DEFAULT_GIT_EMAIL: &str = "user@comfydock.local";

/// File extensions that mark a widget value as a model reference.
pub const MODEL_EXTENSIONS: &[&str] = &[
    ".safetensors",
    ".ckpt",
    ".pt",
    ".pth",
    ".bin",
    ".gguf",
    ".sft",
    ".onnx",
];
