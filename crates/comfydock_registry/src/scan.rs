use std::path::Path;

/// Python requirement specifiers declared by a node package, collected from
/// the standard places: `requirements.txt` and the `[project]` dependencies
/// of `pyproject.toml`.
pub fn scan_requirements(node_dir: &Path) -> Vec<String> {
    let mut requirements = Vec::new();

    let requirements_txt = node_dir.join("requirements.txt");
    if requirements_txt.is_file() {
        if let Ok(contents) = fs_err::read_to_string(&requirements_txt) {
            for line in contents.lines() {
                let line = line.split('#').next().unwrap_or("").trim();
                if line.is_empty() || line.starts_with('-') {
                    continue;
                }
                requirements.push(line.to_string());
            }
        }
    }

    let pyproject = node_dir.join("pyproject.toml");
    if pyproject.is_file() {
        if let Ok(contents) = fs_err::read_to_string(&pyproject) {
            if let Ok(document) = contents.parse::<toml_edit::DocumentMut>() {
                let dependencies = document
                    .get("project")
                    .and_then(|p| p.get("dependencies"))
                    .and_then(|d| d.as_array());
                if let Some(dependencies) = dependencies {
                    for value in dependencies {
                        if let Some(spec) = value.as_str() {
                            let spec = spec.trim();
                            if !spec.is_empty() && !requirements.iter().any(|r| r == spec) {
                                requirements.push(spec.to_string());
                            }
                        }
                    }
                }
            }
        }
    }

    requirements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_from_requirements_txt_and_pyproject() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(
            dir.path().join("requirements.txt"),
            "# deps\nnumpy>=1.26\nopencv-python  # vision\n\n-r extra.txt\n--index-url https://x\n",
        )
        .unwrap();
        fs_err::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"node\"\ndependencies = [\"numpy>=1.26\", \"pillow>=10\"]\n",
        )
        .unwrap();

        let requirements = scan_requirements(dir.path());
        assert_eq!(
            requirements,
            vec![
                "numpy>=1.26".to_string(),
                "opencv-python".to_string(),
                "pillow>=10".to_string(),
            ]
        );
    }

    #[test]
    fn missing_files_scan_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_requirements(dir.path()).is_empty());
    }
}
