use serde_json::Value;

/// Directory and widget conventions for the stock model-loader nodes.
/// `directories` lists the base directories (under the models root) the
/// loader reads from; `widget_index` is the widget slot holding the model
/// path.
#[derive(Debug, Clone)]
pub struct LoaderSpec {
    pub node_type: &'static str,
    pub directories: &'static [&'static str],
    pub widget_index: usize,
}

const LOADERS: &[LoaderSpec] = &[
    LoaderSpec { node_type: "CheckpointLoaderSimple", directories: &["checkpoints"], widget_index: 0 },
    LoaderSpec { node_type: "CheckpointLoader", directories: &["checkpoints"], widget_index: 0 },
    LoaderSpec { node_type: "unCLIPCheckpointLoader", directories: &["checkpoints"], widget_index: 0 },
    LoaderSpec { node_type: "LoraLoader", directories: &["loras"], widget_index: 0 },
    LoaderSpec { node_type: "LoraLoaderModelOnly", directories: &["loras"], widget_index: 0 },
    LoaderSpec { node_type: "VAELoader", directories: &["vae"], widget_index: 0 },
    LoaderSpec { node_type: "CLIPLoader", directories: &["clip", "text_encoders"], widget_index: 0 },
    LoaderSpec { node_type: "DualCLIPLoader", directories: &["clip", "text_encoders"], widget_index: 0 },
    LoaderSpec { node_type: "CLIPVisionLoader", directories: &["clip_vision"], widget_index: 0 },
    LoaderSpec { node_type: "ControlNetLoader", directories: &["controlnet"], widget_index: 0 },
    LoaderSpec { node_type: "DiffControlNetLoader", directories: &["controlnet"], widget_index: 0 },
    LoaderSpec { node_type: "UNETLoader", directories: &["unet", "diffusion_models"], widget_index: 0 },
    LoaderSpec { node_type: "UpscaleModelLoader", directories: &["upscale_models"], widget_index: 0 },
    LoaderSpec { node_type: "StyleModelLoader", directories: &["style_models"], widget_index: 0 },
    LoaderSpec { node_type: "GLIGENLoader", directories: &["gligen"], widget_index: 0 },
    LoaderSpec { node_type: "HypernetworkLoader", directories: &["hypernetworks"], widget_index: 0 },
    LoaderSpec { node_type: "PhotoMakerLoader", directories: &["photomaker"], widget_index: 0 },
];

/// Lookup table over the stock loader conventions.
#[derive(Debug, Clone, Default)]
pub struct LoaderTable;

impl LoaderTable {
    fn spec(&self, node_type: &str) -> Option<&'static LoaderSpec> {
        LOADERS.iter().find(|spec| spec.node_type == node_type)
    }

    pub fn is_loader(&self, node_type: &str) -> bool {
        self.spec(node_type).is_some()
    }

    pub fn widget_index(&self, node_type: &str) -> Option<usize> {
        self.spec(node_type).map(|spec| spec.widget_index)
    }

    pub fn directories(&self, node_type: &str) -> &'static [&'static str] {
        self.spec(node_type).map(|spec| spec.directories).unwrap_or(&[])
    }

    /// Candidate full relative paths for a widget value, reconstructed from
    /// the loader's base directories. When the value already starts with a
    /// base directory, the stripped form is also a candidate.
    pub fn reconstruct_paths(&self, node_type: &str, widget_value: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for directory in self.directories(node_type) {
            let prefix = format!("{directory}/");
            if let Some(stripped) = widget_value.strip_prefix(&prefix) {
                candidates.push(stripped.to_string());
            } else {
                candidates.push(format!("{directory}/{widget_value}"));
            }
        }
        candidates
    }
}

/// Does this widget value look like a model file reference?
pub fn looks_like_model(value: &Value) -> bool {
    let Some(text) = value.as_str() else {
        return false;
    };
    let lowered = text.to_lowercase();
    comfydock_consts::MODEL_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(ext))
}

/// Infer a models sub-directory from a filename, used when a download has
/// no loader context. Falls back to the generic models directory.
pub fn infer_category(filename: &str) -> &'static str {
    let lowered = filename.to_lowercase();
    if lowered.contains("lora") || lowered.contains("lycoris") {
        "loras"
    } else if lowered.contains("vae") {
        "vae"
    } else if lowered.contains("controlnet") || lowered.contains("control_") {
        "controlnet"
    } else if lowered.contains("upscale")
        || lowered.contains("esrgan")
        || lowered.contains("ultrasharp")
    {
        "upscale_models"
    } else if lowered.contains("embedding") || lowered.contains("textual_inversion") {
        "embeddings"
    } else if lowered.contains("inpaint") || lowered.ends_with(".ckpt") {
        "checkpoints"
    } else {
        "models"
    }
}
