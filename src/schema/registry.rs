//! Schema resolution: lazily compiled, cached schemas behind an explicit
//! registry context.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{Catalog, version_key};
use crate::generate::artifact::{self, Artifact, MANIFEST_FILE, Manifest, TypeIndex};

use super::compiled::{NodeConfig, TypeSchema};
use super::shape::{SchemaError, SchemaErrorCode};
use super::synth;

/// Where schemas come from: compiled on demand from a catalog, or read from
/// a directory of generated artifacts.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    Catalog(Arc<Catalog>),
    Directory(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub valid: bool,
    pub errors: Vec<SchemaError>,
}

impl Resolution {
    fn from_errors(errors: Vec<SchemaError>) -> Self {
        Resolution {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Entries are only ever added; a missing schema is cached as `None`.
#[derive(Debug)]
pub struct SchemaRegistry {
    source: SchemaSource,
    schemas: DashMap<(String, String), Option<Arc<TypeSchema>>>,
    default_versions: DashMap<String, Option<f64>>,
    /// Types the directory's manifest lists, read once.
    listed: OnceLock<HashSet<String>>,
}

impl SchemaRegistry {
    pub fn new(source: SchemaSource) -> Self {
        SchemaRegistry {
            source,
            schemas: DashMap::new(),
            default_versions: DashMap::new(),
            listed: OnceLock::new(),
        }
    }

    pub fn from_catalog(catalog: impl Into<Arc<Catalog>>) -> Self {
        SchemaRegistry::new(SchemaSource::Catalog(catalog.into()))
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        SchemaRegistry::new(SchemaSource::Directory(dir.into()))
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// Switch to another artifact directory, dropping everything cached.
    pub fn repoint(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        debug!(dir = %dir.display(), "repointing schema registry");
        self.source = SchemaSource::Directory(dir);
        self.schemas.clear();
        self.default_versions.clear();
        self.listed = OnceLock::new();
    }

    /// The compiled schema of a type at a version, if one is known.
    pub fn schema(&self, node_type: &str, version: f64) -> Option<Arc<TypeSchema>> {
        let key = (node_type.to_string(), version_key(version));
        if let Some(hit) = self.schemas.get(&key) {
            return hit.clone();
        }
        let loaded = self.load(node_type, version).map(Arc::new);
        debug!(node_type, version, found = loaded.is_some(), "schema cache miss");
        self.schemas.entry(key).or_insert(loaded).clone()
    }

    /// Version assumed for an instance that does not state one.
    pub fn default_version(&self, node_type: &str) -> Option<f64> {
        if let Some(hit) = self.default_versions.get(node_type) {
            return *hit;
        }
        let version = match &self.source {
            SchemaSource::Catalog(catalog) => catalog.latest(node_type).map(|s| s.latest_version()),
            SchemaSource::Directory(dir) => self
                .is_listed(dir, node_type)
                .then(|| read_index(dir, node_type))
                .flatten()
                .map(|i| i.default_version),
        };
        *self
            .default_versions
            .entry(node_type.to_string())
            .or_insert(version)
    }

    /// Judge a node configuration. Unknown types resolve as valid: there is
    /// nothing to hold them to.
    pub fn resolve(
        &self,
        node_type: &str,
        version: f64,
        config: NodeConfig<'_>,
        strict: bool,
    ) -> Resolution {
        let Some(schema) = self.schema(node_type, version) else {
            return Resolution::from_errors(Vec::new());
        };
        let mut errors = schema.validate(config, strict);
        enrich_unknown_kinds(&schema, &mut errors);
        Resolution::from_errors(errors)
    }

    fn load(&self, node_type: &str, version: f64) -> Option<TypeSchema> {
        match &self.source {
            SchemaSource::Catalog(catalog) => catalog
                .find(node_type, version)
                .map(|spec| synth::compile_type(spec, version)),
            SchemaSource::Directory(dir) => self
                .is_listed(dir, node_type)
                .then(|| read_artifact(dir, node_type, version))
                .flatten(),
        }
    }

    /// Files of types the manifest does not list are leftovers; a directory
    /// without a readable manifest holds no types.
    fn is_listed(&self, dir: &Path, node_type: &str) -> bool {
        self.listed
            .get_or_init(|| {
                read_manifest(dir)
                    .map(|m| m.node_types.into_iter().collect())
                    .unwrap_or_default()
            })
            .contains(node_type)
    }
}

fn enrich_unknown_kinds(schema: &TypeSchema, errors: &mut [SchemaError]) {
    if schema.accepted_capabilities.is_empty() {
        return;
    }
    let accepted: Vec<&str> = schema
        .accepted_capabilities
        .iter()
        .map(|c| c.kind.as_str())
        .collect();
    for error in errors
        .iter_mut()
        .filter(|e| e.code == SchemaErrorCode::UnknownKey && e.path.starts_with("subnodes."))
    {
        error.message = format!(
            "{}; '{}' accepts: {}",
            error.message,
            schema.node_type,
            accepted.join(", ")
        );
    }
}

/// A missing artifact is silent; an unreadable one is logged. Both mean the
/// type has no schema.
fn read_artifact(dir: &Path, node_type: &str, version: f64) -> Option<TypeSchema> {
    let path = artifact::artifact_path(dir, node_type, version);
    let bytes = read_optional(&path)?;
    match serde_json::from_slice::<Artifact>(&bytes) {
        Ok(artifact) => Some(artifact.schema),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring corrupt schema artifact");
            None
        }
    }
}

fn read_manifest(dir: &Path) -> Option<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = read_optional(&path)?;
    match serde_json::from_slice(&bytes) {
        Ok(manifest) => Some(manifest),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring corrupt schema manifest");
            None
        }
    }
}

fn read_index(dir: &Path, node_type: &str) -> Option<TypeIndex> {
    let path = artifact::index_path(dir, node_type);
    let bytes = read_optional(&path)?;
    match serde_json::from_slice(&bytes) {
        Ok(index) => Some(index),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring corrupt schema index");
            None
        }
    }
}

fn read_optional(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(error) if error.kind() == ErrorKind::NotFound => None,
        Err(error) => {
            warn!(path = %path.display(), %error, "unreadable schema artifact");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn registry() -> SchemaRegistry {
        let catalog = Catalog::from_json(
            r#"[{
                "name": "acme.agent",
                "version": 1,
                "properties": [{ "name": "prompt", "type": "string", "required": true }],
                "inputs": { "capabilities": [{ "kind": "ai_languageModel" }] }
            }]"#,
            None,
        )
        .unwrap();
        SchemaRegistry::from_catalog(catalog)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unknown_type_is_valid() {
        let reg = registry();
        let p = Map::new();
        let res = reg.resolve("acme.nope", 1.0, NodeConfig { parameters: &p, subnodes: None }, true);
        assert!(res.valid);
    }

    #[test]
    fn schemas_are_cached() {
        let reg = registry();
        let a = reg.schema("acme.agent", 1.0).unwrap();
        let b = reg.schema("acme.agent", 1.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.default_version("acme.agent"), Some(1.0));
    }

    #[test]
    fn unknown_subnode_kind_lists_accepted_kinds() {
        let reg = registry();
        let p = params(json!({ "prompt": "hi" }));
        let subnodes = json!({ "ai_tool": [] });
        let res = reg.resolve(
            "acme.agent",
            1.0,
            NodeConfig {
                parameters: &p,
                subnodes: Some(&subnodes),
            },
            false,
        );
        assert!(!res.valid);
        assert_eq!(res.errors[0].path, "subnodes.ai_tool");
        assert!(res.errors[0].message.contains("accepts: ai_languageModel"));
    }

    #[test]
    fn strict_mode_flags_undeclared_parameters() {
        let reg = registry();
        let p = params(json!({ "prompt": "hi", "temperature": 1 }));
        let config = NodeConfig {
            parameters: &p,
            subnodes: None,
        };
        assert!(reg.resolve("acme.agent", 1.0, config, false).valid);
        let res = reg.resolve("acme.agent", 1.0, config, true);
        assert_eq!(res.errors[0].path, "parameters.temperature");
    }
}
