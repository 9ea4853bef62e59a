//! Node-type catalog: loading, namespacing and lookup.

pub mod types;
pub mod version;

pub use types::*;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::CatalogError;

/// Supplies node-type metadata to the graph checks that need it
/// (input-slot bounds and capability mismatches).
pub trait NodeTypeProvider {
    fn node_type(&self, name: &str, version: f64) -> Option<Arc<NodeTypeSpec>>;

    /// Version assumed for instances that do not state one.
    fn default_version(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// An ordered, immutable collection of node-type records.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    specs: Vec<Arc<NodeTypeSpec>>,
    by_name: HashMap<String, Vec<usize>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Packaged {
        package: String,
        nodes: Vec<NodeTypeSpec>,
    },
    Bare(Vec<NodeTypeSpec>),
}

impl Catalog {
    /// Build a catalog from already-parsed records. Unqualified names get
    /// `package_prefix` prepended.
    pub fn new(
        specs: Vec<NodeTypeSpec>,
        package_prefix: Option<&str>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Catalog::default();
        for mut spec in specs {
            if let Some(prefix) = package_prefix {
                spec.name = qualify(&spec.name, prefix);
            }
            catalog.insert(spec)?;
        }
        Ok(catalog)
    }

    /// Parse catalog JSON: a bare array of records, or `{package, nodes}`.
    /// An explicit `package_prefix` overrides the one embedded in the file.
    pub fn from_json(json: &str, package_prefix: Option<&str>) -> Result<Self, CatalogError> {
        Catalog::from_slice(json.as_bytes(), package_prefix)
    }

    pub fn from_slice(bytes: &[u8], package_prefix: Option<&str>) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_slice(bytes).map_err(CatalogError::Parse)?;
        match file {
            CatalogFile::Packaged { package, nodes } => {
                Catalog::new(nodes, Some(package_prefix.unwrap_or(&package)))
            }
            CatalogFile::Bare(nodes) => Catalog::new(nodes, package_prefix),
        }
    }

    pub fn load(path: &Path, package_prefix: Option<&str>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Catalog::from_json(&json, package_prefix)
    }

    fn insert(&mut self, spec: NodeTypeSpec) -> Result<(), CatalogError> {
        for version in spec.versions() {
            if self.find(&spec.name, version).is_some() {
                return Err(CatalogError::Duplicate {
                    name: spec.name.clone(),
                    version: version_key(version),
                });
            }
        }
        let idx = self.specs.len();
        self.by_name.entry(spec.name.clone()).or_default().push(idx);
        self.specs.push(Arc::new(spec));
        Ok(())
    }

    pub fn find(&self, name: &str, version: f64) -> Option<&Arc<NodeTypeSpec>> {
        self.by_name
            .get(name)?
            .iter()
            .map(|&i| &self.specs[i])
            .find(|s| s.covers_version(version))
    }

    /// The record holding the highest declared version of `name`.
    pub fn latest(&self, name: &str) -> Option<&Arc<NodeTypeSpec>> {
        self.by_name.get(name)?.iter().map(|&i| &self.specs[i]).max_by(|a, b| {
            a.latest_version().total_cmp(&b.latest_version())
        })
    }

    pub fn specs(&self) -> impl Iterator<Item = &Arc<NodeTypeSpec>> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl NodeTypeProvider for Catalog {
    fn node_type(&self, name: &str, version: f64) -> Option<Arc<NodeTypeSpec>> {
        self.find(name, version).cloned()
    }

    fn default_version(&self, name: &str) -> Option<f64> {
        self.latest(name).map(|s| s.latest_version())
    }
}

fn qualify(name: &str, prefix: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
