use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use comfydock_config::WorkspaceConfig;
use comfydock_model_index::ModelRepository;
use comfydock_registry::{ApiCache, NodeMappings, NodeService};

use crate::{
    CoreError, CreateOptions, Environment, PackageManager, UvClient,
    factory::create_environment_on_disk,
};

/// The on-disk layout of a workspace.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub metadata: PathBuf,
    pub cache: PathBuf,
    pub logs: PathBuf,
    pub environments: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            metadata: root.join(comfydock_consts::METADATA_DIR),
            cache: root.join(comfydock_consts::CACHE_DIR),
            logs: root.join(comfydock_consts::LOGS_DIR),
            environments: root.join(comfydock_consts::ENVIRONMENTS_DIR),
            root,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        WorkspaceConfig::config_path(&self.metadata)
    }

    pub fn model_index_db(&self) -> PathBuf {
        self.cache.join(comfydock_consts::MODEL_INDEX_DB)
    }

    pub fn node_cache_dir(&self) -> PathBuf {
        self.cache.join(comfydock_consts::NODE_CACHE_DIR)
    }

    pub fn api_cache_dir(&self) -> PathBuf {
        self.cache.join(comfydock_consts::API_CACHE_DIR)
    }

    pub fn node_mappings_file(&self) -> PathBuf {
        self.node_cache_dir()
            .join(comfydock_consts::NODE_MAPPINGS_FILE)
    }

    /// The workspace exists iff its metadata directory does.
    pub fn exists(&self) -> bool {
        self.metadata.is_dir()
    }
}

/// A workspace: the directory owning environments, the shared model index,
/// the shared caches, and the workspace configuration.
pub struct Workspace {
    paths: WorkspacePaths,
    config: WorkspaceConfig,
    model_repository: Arc<ModelRepository>,
    api_cache: Arc<ApiCache>,
    node_mappings: Arc<NodeMappings>,
    node_service: Arc<NodeService>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.paths.root)
            .finish()
    }
}

impl Workspace {
    /// Create the workspace layout and default configuration at `root`.
    /// Re-initializing an existing workspace preserves its config.
    pub fn init(
        root: impl Into<PathBuf>,
        models_directory: Option<PathBuf>,
    ) -> Result<Self, CoreError> {
        let paths = WorkspacePaths::new(root);
        fs_err::create_dir_all(&paths.metadata)?;
        fs_err::create_dir_all(&paths.cache)?;
        fs_err::create_dir_all(&paths.logs)?;
        fs_err::create_dir_all(&paths.environments)?;

        let config_file = paths.config_file();
        let config = if config_file.is_file() {
            WorkspaceConfig::load(&config_file)?
        } else {
            let models_directory =
                models_directory.unwrap_or_else(|| paths.root.join(comfydock_consts::MODELS_DIR));
            fs_err::create_dir_all(&models_directory)?;
            let config = WorkspaceConfig::new(models_directory);
            config.save(&config_file)?;
            config
        };

        Self::from_parts(paths, config)
    }

    /// Open an existing workspace.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let paths = WorkspacePaths::new(root);
        if !paths.exists() {
            return Err(CoreError::WorkspaceNotFound {
                path: paths.root.clone(),
            });
        }
        // The cache directory exists whenever the workspace does.
        fs_err::create_dir_all(&paths.cache)?;
        let config = WorkspaceConfig::load(&paths.config_file())?;
        Self::from_parts(paths, config)
    }

    fn from_parts(paths: WorkspacePaths, config: WorkspaceConfig) -> Result<Self, CoreError> {
        let model_repository = Arc::new(ModelRepository::new(paths.model_index_db())?);
        let api_cache = Arc::new(ApiCache::new(
            paths.api_cache_dir().join("api_cache.db"),
        )?);

        let mappings_file = paths.node_mappings_file();
        let node_mappings = if mappings_file.is_file() {
            match NodeMappings::load(&mappings_file) {
                Ok(mappings) => Arc::new(mappings),
                Err(err) => {
                    tracing::warn!("could not load node mappings: {err}");
                    Arc::new(NodeMappings::empty())
                }
            }
        } else {
            tracing::debug!("no node mappings table at {}", mappings_file.display());
            Arc::new(NodeMappings::empty())
        };

        let node_service = Arc::new(NodeService::new(
            paths.node_cache_dir(),
            Some(api_cache.clone()),
        ));

        Ok(Self {
            paths,
            config,
            model_repository,
            api_cache,
            node_mappings,
            node_service,
        })
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WorkspaceConfig {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<(), CoreError> {
        Ok(self.config.save(&self.paths.config_file())?)
    }

    pub fn models_directory(&self) -> &Path {
        &self.config.models_directory
    }

    pub fn model_repository(&self) -> &Arc<ModelRepository> {
        &self.model_repository
    }

    pub fn api_cache(&self) -> &Arc<ApiCache> {
        &self.api_cache
    }

    pub fn node_mappings(&self) -> &Arc<NodeMappings> {
        &self.node_mappings
    }

    pub fn node_service(&self) -> &Arc<NodeService> {
        &self.node_service
    }

    /// Names of all environments in the workspace.
    pub fn list_environments(&self) -> Result<Vec<String>, CoreError> {
        let mut names = Vec::new();
        if self.paths.environments.is_dir() {
            for entry in fs_err::read_dir(&self.paths.environments)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn environment_path(&self, name: &str) -> PathBuf {
        self.paths.environments.join(name)
    }

    /// Create a new environment and open it.
    pub fn create_environment(
        &self,
        name: &str,
        options: &CreateOptions,
    ) -> Result<Environment, CoreError> {
        let env_path = self.environment_path(name);
        create_environment_on_disk(name, &env_path, options)?;
        self.environment(name)
    }

    /// Open an environment with the production package manager.
    pub fn environment(&self, name: &str) -> Result<Environment, CoreError> {
        let env_path = self.environment_path(name);
        let cec_path = env_path.join(comfydock_consts::CEC_DIR);
        let package_manager = UvClient::new(&cec_path, env_path.join(comfydock_consts::VENV_DIR))
            .with_cache_dir(self.paths.cache.join("uv"));
        self.environment_with_package_manager(name, Box::new(package_manager))
    }

    /// Open an environment with an injected package manager (the seam tests
    /// and embedders use).
    pub fn environment_with_package_manager(
        &self,
        name: &str,
        package_manager: Box<dyn PackageManager>,
    ) -> Result<Environment, CoreError> {
        Environment::open(
            name,
            self.environment_path(name),
            &self.config.models_directory,
            self.config.auto_select_ambiguous,
            self.model_repository.clone(),
            self.node_mappings.clone(),
            self.node_service.clone(),
            package_manager,
        )
    }

    /// Delete an environment directory wholesale. The shared model library
    /// is untouched; environments only ever reference it.
    pub fn delete_environment(&mut self, name: &str) -> Result<(), CoreError> {
        let env_path = self.environment_path(name);
        if !env_path.is_dir() {
            return Err(CoreError::EnvironmentNotFound(name.to_string()));
        }
        fs_err::remove_dir_all(&env_path)?;
        if self.config.active_environment.as_deref() == Some(name) {
            self.config.active_environment = None;
            self.save_config()?;
        }
        tracing::info!("deleted environment '{name}'");
        Ok(())
    }
}
