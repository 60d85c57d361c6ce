use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;

use comfydock_manifest::{Manifest, NodeSpec};
use comfydock_registry::NodeService;

use crate::{CoreError, NodeInstallCallbacks};

/// What a node filesystem sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSyncOutcome {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    pub disabled: Vec<String>,
    pub errors: Vec<String>,
}

/// Reconcile the custom-nodes directory with the expected node set
/// (manifest state, keyed by directory name).
///
/// Extra directories recorded as development nodes in the last committed
/// manifest are disabled (renamed `<name>.disabled`, backing up a previous
/// `.disabled` twin with a timestamp); anything else is deleted, since the node
/// cache makes recovery free. Missing nodes are restored from the cache or
/// downloaded.
pub fn sync_nodes_to_filesystem(
    expected: &IndexMap<String, NodeSpec>,
    custom_nodes_dir: &Path,
    service: &NodeService,
    committed_manifest: Option<&Manifest>,
    callbacks: &NodeInstallCallbacks,
) -> Result<NodeSyncOutcome, CoreError> {
    fs_err::create_dir_all(custom_nodes_dir)?;
    let mut outcome = NodeSyncOutcome::default();

    let mut existing: Vec<String> = Vec::new();
    for entry in fs_err::read_dir(custom_nodes_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() && !name.ends_with(comfydock_consts::DISABLED_SUFFIX) {
            existing.push(name);
        }
    }

    // Extra directories: present on disk, absent from the manifest.
    for name in &existing {
        if expected.contains_key(name) {
            continue;
        }
        let node_path = custom_nodes_dir.join(name);
        if is_committed_dev_node(committed_manifest, name) {
            let disabled_path =
                custom_nodes_dir.join(format!("{name}{}", comfydock_consts::DISABLED_SUFFIX));
            if disabled_path.exists() {
                let stamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let backup = custom_nodes_dir.join(format!(
                    "{name}{}.{stamp}",
                    comfydock_consts::DISABLED_SUFFIX
                ));
                fs_err::rename(&disabled_path, &backup)?;
                tracing::info!("backed up previous disabled copy to {}", backup.display());
            }
            fs_err::rename(&node_path, &disabled_path)?;
            tracing::info!("disabled development node '{name}'");
            outcome.disabled.push(name.clone());
        } else {
            fs_err::remove_dir_all(&node_path)?;
            tracing::info!("removed node '{name}' (recoverable from cache)");
            outcome.removed.push(name.clone());
        }
    }

    // Missing nodes: expected but not on disk.
    let missing: Vec<(&String, &NodeSpec)> = expected
        .iter()
        .filter(|(name, _)| !custom_nodes_dir.join(name.as_str()).exists())
        .collect();
    if let Some(on_batch_start) = &callbacks.on_batch_start {
        on_batch_start(missing.len());
    }
    let total = missing.len();
    for (index, (name, spec)) in missing.into_iter().enumerate() {
        if spec.is_development() {
            // Development code only exists locally; nothing to fetch.
            tracing::warn!("development node '{name}' expected but missing from filesystem");
            continue;
        }
        if let Some(on_node_start) = &callbacks.on_node_start {
            on_node_start(name, index, total);
        }
        let target = custom_nodes_dir.join(name.as_str());
        match service.download_node(spec, &target) {
            Ok(()) => {
                outcome.installed.push(name.clone());
                if let Some(on_node_complete) = &callbacks.on_node_complete {
                    on_node_complete(name, true, None);
                }
            }
            Err(err) => {
                tracing::warn!("could not install node '{name}': {err}");
                outcome.errors.push(format!("{name}: {err}"));
                if let Some(on_node_complete) = &callbacks.on_node_complete {
                    on_node_complete(name, false, Some(&err.to_string()));
                }
            }
        }
    }

    tracing::debug!(
        "node sync finished: {} installed, {} removed, {} disabled",
        outcome.installed.len(),
        outcome.removed.len(),
        outcome.disabled.len()
    );
    Ok(outcome)
}

/// The last committed manifest is the authoritative record of whether a
/// directory held a development node; the working-tree manifest may already
/// have been rewritten by the operation that triggered the sync.
fn is_committed_dev_node(committed_manifest: Option<&Manifest>, name: &str) -> bool {
    let Some(manifest) = committed_manifest else {
        return false;
    };
    let mut manifest = manifest.clone();
    manifest
        .nodes()
        .get_existing()
        .values()
        .any(|spec| spec.name == name && spec.is_development())
}

#[cfg(test)]
mod tests {
    use comfydock_manifest::NodeSource;

    use super::*;

    fn service(dir: &Path) -> NodeService {
        NodeService::new(dir.join("node-cache"), None)
    }

    fn committed(with_dev_node: Option<&str>) -> Manifest {
        let mut contents = String::from(
            "[project]\nname = \"t\"\nversion = \"0.1.0\"\ndependencies = []\n",
        );
        if let Some(name) = with_dev_node {
            contents.push_str(&format!(
                "\n[tool.comfydock.nodes.{name}]\nname = \"{name}\"\nversion = \"dev\"\nsource = \"development\"\n"
            ));
        }
        Manifest::from_str_at(Path::new("/nonexistent/pyproject.toml"), &contents).unwrap()
    }

    #[test]
    fn extra_registry_node_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let custom_nodes = dir.path().join("custom_nodes");
        fs_err::create_dir_all(custom_nodes.join("stray-node")).unwrap();
        fs_err::write(custom_nodes.join("stray-node/__init__.py"), "x").unwrap();

        let outcome = sync_nodes_to_filesystem(
            &IndexMap::new(),
            &custom_nodes,
            &service(dir.path()),
            Some(&committed(None)),
            &NodeInstallCallbacks::default(),
        )
        .unwrap();

        assert_eq!(outcome.removed, vec!["stray-node".to_string()]);
        assert!(!custom_nodes.join("stray-node").exists());
    }

    #[test]
    fn extra_dev_node_is_disabled_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let custom_nodes = dir.path().join("custom_nodes");
        fs_err::create_dir_all(custom_nodes.join("my-wip")).unwrap();
        fs_err::write(custom_nodes.join("my-wip/__init__.py"), "work").unwrap();

        let outcome = sync_nodes_to_filesystem(
            &IndexMap::new(),
            &custom_nodes,
            &service(dir.path()),
            Some(&committed(Some("my-wip"))),
            &NodeInstallCallbacks::default(),
        )
        .unwrap();

        assert_eq!(outcome.disabled, vec!["my-wip".to_string()]);
        assert!(!custom_nodes.join("my-wip").exists());
        assert!(custom_nodes.join("my-wip.disabled/__init__.py").exists());
    }

    #[test]
    fn existing_disabled_twin_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let custom_nodes = dir.path().join("custom_nodes");
        fs_err::create_dir_all(custom_nodes.join("my-wip")).unwrap();
        fs_err::create_dir_all(custom_nodes.join("my-wip.disabled")).unwrap();
        fs_err::write(custom_nodes.join("my-wip.disabled/old.py"), "old").unwrap();

        sync_nodes_to_filesystem(
            &IndexMap::new(),
            &custom_nodes,
            &service(dir.path()),
            Some(&committed(Some("my-wip"))),
            &NodeInstallCallbacks::default(),
        )
        .unwrap();

        let backups: Vec<String> = fs_err::read_dir(&custom_nodes)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("my-wip.disabled."))
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(custom_nodes.join("my-wip.disabled").exists());
    }

    #[test]
    fn missing_node_restores_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let custom_nodes = dir.path().join("custom_nodes");
        let service = service(dir.path());

        let spec = NodeSpec {
            name: "cached-node".to_string(),
            registry_id: Some("cached-node".to_string()),
            version: Some("1.0".to_string()),
            source: NodeSource::Registry,
            ..NodeSpec::default()
        };
        // Pre-populate the cache so no network is needed.
        let staged = dir.path().join("staged");
        fs_err::create_dir_all(&staged).unwrap();
        fs_err::write(staged.join("__init__.py"), "node").unwrap();
        service.node_cache().store(&spec, &staged).unwrap();

        let mut expected = IndexMap::new();
        expected.insert("cached-node".to_string(), spec);

        let outcome = sync_nodes_to_filesystem(
            &expected,
            &custom_nodes,
            &service,
            None,
            &NodeInstallCallbacks::default(),
        )
        .unwrap();

        assert_eq!(outcome.installed, vec!["cached-node".to_string()]);
        assert!(custom_nodes.join("cached-node/__init__.py").exists());
    }

    #[test]
    fn missing_dev_node_is_only_warned_about() {
        let dir = tempfile::tempdir().unwrap();
        let custom_nodes = dir.path().join("custom_nodes");

        let mut expected = IndexMap::new();
        expected.insert("wip".to_string(), NodeSpec::development("wip"));

        let outcome = sync_nodes_to_filesystem(
            &expected,
            &custom_nodes,
            &service(dir.path()),
            None,
            &NodeInstallCallbacks::default(),
        )
        .unwrap();

        assert!(outcome.installed.is_empty());
        assert!(outcome.errors.is_empty());
    }
}
