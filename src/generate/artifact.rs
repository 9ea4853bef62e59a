//! On-disk layout of generated schema artifacts.
//!
//! ```text
//! <out>/manifest.json
//! <out>/<type dir>/index.json
//! <out>/<type dir>/v<version>.json
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::version_key;
use crate::discriminator::DiscriminatorTree;
use crate::schema::TypeSchema;

/// Bumped whenever the artifact format or synthesis output changes, so
/// stale output is regenerated even when the catalog is unchanged.
pub const GENERATOR_VERSION: &str = "nodeflow-schema/1";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub generator_version: String,
    pub content_hash: String,
    pub schema: TypeSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeIndex {
    pub node_type: String,
    pub default_version: f64,
    pub versions: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub version: f64,
    pub file: String,
    pub discriminators: DiscriminatorTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub generator_version: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_prefix: Option<String>,
    /// Every type with output in the directory. Types not listed here are
    /// not loaded, whatever files exist.
    pub node_types: Vec<String>,
}

/// SHA-256 over the catalog bytes, the generator version and the package
/// prefix override, hex encoded.
pub fn content_hash(catalog: &[u8], package_prefix: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(catalog);
    hasher.update(GENERATOR_VERSION.as_bytes());
    if let Some(prefix) = package_prefix {
        hasher.update(b"\0prefix=");
        hasher.update(prefix.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Directory name of a node type: `acme.helpdesk` -> `acme.helpdesk`,
/// with anything outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn type_dir_name(node_type: &str) -> String {
    node_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `v1.json`, `v2_1.json`
pub fn artifact_file_name(version: f64) -> String {
    format!("v{}.json", version_key(version).replace('.', "_"))
}

pub fn type_dir(out_dir: &Path, node_type: &str) -> PathBuf {
    out_dir.join(type_dir_name(node_type))
}

pub fn artifact_path(out_dir: &Path, node_type: &str, version: f64) -> PathBuf {
    type_dir(out_dir, node_type).join(artifact_file_name(version))
}

pub fn index_path(out_dir: &Path, node_type: &str) -> PathBuf {
    type_dir(out_dir, node_type).join(INDEX_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(artifact_file_name(1.0), "v1.json");
        assert_eq!(artifact_file_name(2.1), "v2_1.json");
        assert_eq!(type_dir_name("@acme/nodes.agent"), "_acme_nodes.agent");
    }

    #[test]
    fn hash_depends_on_content_and_prefix() {
        let a = content_hash(b"[]", None);
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash(b"[]", None));
        assert_ne!(a, content_hash(b"[ ]", None));
        assert_ne!(a, content_hash(b"[]", Some("corp")));
        assert_ne!(content_hash(b"[]", Some("corp")), content_hash(b"[]", Some("acme")));
    }
}
