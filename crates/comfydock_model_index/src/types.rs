use serde_json::Value;

/// Host family a model source URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Civitai,
    HuggingFace,
    Custom,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Civitai => "civitai",
            SourceType::HuggingFace => "huggingface",
            SourceType::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "civitai" => SourceType::Civitai,
            "huggingface" => SourceType::HuggingFace,
            _ => SourceType::Custom,
        }
    }

    /// Detect the host family from a URL.
    pub fn detect(url: &str) -> Self {
        let lowered = url.to_lowercase();
        if lowered.contains("civitai.com") {
            SourceType::Civitai
        } else if lowered.contains("huggingface.co") || lowered.contains("hf.co") {
            SourceType::HuggingFace
        } else {
            SourceType::Custom
        }
    }
}

/// A model row joined with one of its filesystem locations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWithLocation {
    pub hash: String,
    pub file_size: u64,
    pub blake3_hash: Option<String>,
    pub sha256_hash: Option<String>,
    pub relative_path: String,
    pub filename: String,
    pub mtime: f64,
    pub last_seen: i64,
    pub metadata: Value,
}

/// One filesystem location of a model, relative to the global models
/// directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLocation {
    pub model_hash: String,
    pub relative_path: String,
    pub filename: String,
    pub mtime: f64,
    pub last_seen: i64,
}

/// A recorded download source of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSource {
    pub source_type: SourceType,
    pub url: String,
    pub metadata: Value,
    pub added_time: i64,
}

/// Index statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub total_models: u64,
    pub total_locations: u64,
    pub total_sources: u64,
}
