use serde::{Deserialize, Serialize};

/// A node package as returned by the registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub latest_version: Option<RegistryNodeVersion>,
}

/// One published version of a registry node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryNodeVersion {
    pub version: String,
    #[serde(default, alias = "downloadUrl")]
    pub download_url: Option<String>,
    #[serde(default)]
    pub deprecated: Option<bool>,
}

/// Repository metadata from the hosting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub clone_url: Option<String>,
    #[serde(default)]
    pub latest_commit: Option<String>,
    #[serde(default)]
    pub latest_release: Option<String>,
}

/// How a workflow node type was matched to something installable or to a
/// model. One tagging enum serves both resolvers so results stay uniform
/// for drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Reconstructed,
    CaseInsensitive,
    Filename,
    Fuzzy,
    TypeOnly,
    CustomMapping,
    WorkflowContext,
    UserConfirmed,
    Manual,
    DownloadIntent,
    Ambiguous,
    NotFound,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Reconstructed => "reconstructed",
            MatchType::CaseInsensitive => "case_insensitive",
            MatchType::Filename => "filename",
            MatchType::Fuzzy => "fuzzy",
            MatchType::TypeOnly => "type_only",
            MatchType::CustomMapping => "custom_mapping",
            MatchType::WorkflowContext => "workflow_context",
            MatchType::UserConfirmed => "user_confirmed",
            MatchType::Manual => "manual",
            MatchType::DownloadIntent => "download_intent",
            MatchType::Ambiguous => "ambiguous",
            MatchType::NotFound => "not_found",
        }
    }

    /// Whether this match came from an explicit user decision and should be
    /// persisted as a workspace-wide node mapping.
    pub fn is_user_intervention(&self) -> bool {
        matches!(self, MatchType::UserConfirmed | MatchType::Manual)
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
