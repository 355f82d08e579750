//! The manifest: desired resources as TOML tables
//!
//! ```toml
//! [project_membership.alice]
//! project = "42"
//! user_id = 7
//! access_level = "developer"
//! ```
//!
//! Each top-level table is a resource kind; each entry inside it is one named
//! resource, addressed as `kind.name`.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid name regex"));

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("unknown resource kind '{kind}' (known kinds: {})", labkit::KINDS.join(", "))]
    UnknownKind { kind: String },

    #[error("'{kind}' must be a table of named resources")]
    KindNotATable { kind: String },

    #[error("[{kind}.{name}] must be a table")]
    NotATable { kind: String, name: String },

    #[error("invalid resource name '{name}' in [{kind}]: use letters, digits, '_' or '-'")]
    InvalidName { kind: String, name: String },
}

/// One declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: String,
    pub name: String,
    pub attributes: toml::Table,
}

impl Entry {
    pub fn address(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, Entry>,
}

impl Manifest {
    /// Load a manifest; a missing file is an empty manifest
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            log::debug!("No manifest at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            ManifestError::Parse { source, .. } => ManifestError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let root: toml::Table = toml::from_str(content).map_err(|source| ManifestError::Parse {
            path: "<manifest>".to_string(),
            source,
        })?;

        let mut entries = BTreeMap::new();
        for (kind, resources) in root {
            if !labkit::KINDS.contains(&kind.as_str()) {
                return Err(ManifestError::UnknownKind { kind });
            }
            let toml::Value::Table(resources) = resources else {
                return Err(ManifestError::KindNotATable { kind });
            };
            for (name, attributes) in resources {
                if !NAME_PATTERN.is_match(&name) {
                    return Err(ManifestError::InvalidName { kind, name });
                }
                let toml::Value::Table(attributes) = attributes else {
                    return Err(ManifestError::NotATable { kind, name });
                };
                let entry = Entry {
                    kind: kind.clone(),
                    name,
                    attributes,
                };
                entries.insert(entry.address(), entry);
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, address: &str) -> Option<&Entry> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// Entries in address order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[project_membership.alice]
project = "42"
user_id = 7
access_level = "developer"

[group_variable.deploy_env]
group = "acme"
key = "DEPLOY_ENV"
value = "production"
protected = true
"#;

    #[test]
    fn test_parse_addresses() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.len(), 2);
        let addresses: Vec<String> = manifest.entries().map(Entry::address).collect();
        assert_eq!(
            addresses,
            vec!["group_variable.deploy_env", "project_membership.alice"]
        );

        let alice = manifest.get("project_membership.alice").unwrap();
        assert_eq!(alice.kind, "project_membership");
        assert_eq!(
            alice.attributes.get("user_id").and_then(toml::Value::as_integer),
            Some(7)
        );
    }

    #[test]
    fn test_unknown_kind() {
        let err = Manifest::parse("[project_member.alice]\nproject = \"42\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownKind { ref kind } if kind == "project_member"));
        assert!(err.to_string().contains("project_membership"));
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            Manifest::parse("user = 3\n").unwrap_err(),
            ManifestError::KindNotATable { .. }
        ));
        assert!(matches!(
            Manifest::parse("[user]\nalice = \"x\"\n").unwrap_err(),
            ManifestError::NotATable { .. }
        ));
        assert!(matches!(
            Manifest::parse("[user.\"al ice\"]\nusername = \"x\"\n").unwrap_err(),
            ManifestError::InvalidName { .. }
        ));
    }

    #[test]
    fn test_load_missing_and_broken() {
        let dir = TempDir::new().unwrap();
        let missing = Manifest::load(&dir.path().join("gitform.toml")).unwrap();
        assert!(missing.is_empty());

        let path = dir.path().join("broken.toml");
        fs::write(&path, "[user.alice\n").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
