//! Reading manifests and group-membership exports from disk.
//!
//! Manifest paths may be files or directories. Directories are walked
//! recursively, in file-name order, for `.yaml`, `.yml` and `.json` files.
//! YAML files may hold several `---`-separated documents; empty documents
//! are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use rbacguard_domain::model::{GroupMembershipRecord, Manifest, PolicyInput};

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Error type for reading input files.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input path not found: {path}")]
    NotFound { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads all manifests and membership records into a single input.
pub fn read_policy_input(
    manifest_paths: &[PathBuf],
    membership_paths: &[PathBuf],
) -> Result<PolicyInput, InputError> {
    Ok(PolicyInput {
        manifests: read_manifests(manifest_paths)?,
        memberships: read_memberships(membership_paths)?,
    })
}

/// Reads every manifest under `paths`, in a stable order.
pub fn read_manifests(paths: &[PathBuf]) -> Result<Vec<Manifest>, InputError> {
    let mut manifests = Vec::new();
    for file in collect_files(paths)? {
        let text = read_file(&file)?;
        let before = manifests.len();
        if is_json(&file) {
            let manifest: Manifest = serde_json::from_str(&text).map_err(|source| InputError::Json {
                path: file.display().to_string(),
                source,
            })?;
            manifests.push(manifest);
        } else {
            manifests.extend(parse_yaml_documents(&file, &text)?);
        }
        debug!(path = %file.display(), documents = manifests.len() - before, "read manifest file");
    }
    Ok(manifests)
}

/// Reads membership exports. Each file holds a list of records.
pub fn read_memberships(paths: &[PathBuf]) -> Result<Vec<GroupMembershipRecord>, InputError> {
    let mut records = Vec::new();
    for file in paths {
        let text = read_file(file)?;
        let parsed: Vec<GroupMembershipRecord> = if is_json(file) {
            serde_json::from_str(&text).map_err(|source| InputError::Json {
                path: file.display().to_string(),
                source,
            })?
        } else {
            serde_yaml::from_str(&text).map_err(|source| yaml_error(file, source))?
        };
        debug!(path = %file.display(), records = parsed.len(), "read membership file");
        records.extend(parsed);
    }
    Ok(records)
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, InputError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(InputError::NotFound {
                path: path.display().to_string(),
            });
        }
        // An explicitly named file is read whatever its extension.
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && has_manifest_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn read_file(path: &Path) -> Result<String, InputError> {
    fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_yaml_documents(path: &Path, text: &str) -> Result<Vec<Manifest>, InputError> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document).map_err(|source| yaml_error(path, source))?;
        if value.is_null() {
            continue;
        }
        manifests.push(serde_yaml::from_value(value).map_err(|source| yaml_error(path, source))?);
    }
    Ok(manifests)
}

fn yaml_error(path: &Path, source: serde_yaml::Error) -> InputError {
    InputError::Yaml {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    const ROLE_AND_BINDING: &str = r#"
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: view
  namespace: ns1
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get"]
---
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: view
  namespace: ns1
roleRef:
  kind: Role
  name: view
subjects:
  - kind: User
    name: alice
"#;

    #[test]
    fn test_multi_document_yaml_skips_empty_documents() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "rbac.yaml", ROLE_AND_BINDING);

        let manifests = read_manifests(&[file]).unwrap();
        let kinds: Vec<_> = manifests.iter().map(|m| m.kind.as_deref()).collect();
        assert_eq!(kinds, vec![Some("Role"), Some("RoleBinding")]);
    }

    #[test]
    fn test_directory_walk_is_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "b/role.json",
            r#"{"kind": "ClusterRole", "metadata": {"name": "from-json"}}"#,
        );
        write(dir.path(), "a/rbac.yml", ROLE_AND_BINDING);
        write(dir.path(), "a/README.md", "not a manifest");

        let manifests = read_manifests(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = manifests
            .iter()
            .map(|m| m.metadata.name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["view", "view", "from-json"]);
    }

    #[test]
    fn test_missing_path_is_reported() {
        let err = read_manifests(&[PathBuf::from("/nonexistent/manifests")]).unwrap_err();
        assert!(matches!(err, InputError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_yaml_names_the_file() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "broken.yaml", "kind: [unterminated");
        let err = read_manifests(&[file]).unwrap_err();
        assert!(matches!(err, InputError::Yaml { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_membership_files_in_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        let yaml = write(
            dir.path(),
            "groups.yaml",
            "- group: dev\n  members:\n    - kind: User\n      name: alice\n",
        );
        let json = write(
            dir.path(),
            "groups.json",
            r#"[{"group": "ops", "members": [{"kind": "Group", "name": "dev"}]}]"#,
        );

        let records = read_memberships(&[yaml, json]).unwrap();
        let groups: Vec<_> = records.iter().map(|r| r.group.as_deref()).collect();
        assert_eq!(groups, vec![Some("dev"), Some("ops")]);
        assert_eq!(records[1].members[0].kind.as_deref(), Some("Group"));
    }
}
