//! Build-time generation of schema artifacts from a catalog.
//!
//! Output is skipped when the manifest in the output directory already
//! carries the catalog's content hash. Otherwise the type directories the
//! previous manifest lists are removed and everything is written afresh, so
//! types dropped from the catalog leave nothing behind.

pub mod artifact;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{Catalog, NodeTypeSpec};
use crate::error::{CatalogError, GenerateError};
use crate::schema::compile_type;

use artifact::{
    Artifact, GENERATOR_VERSION, IndexEntry, MANIFEST_FILE, Manifest, TypeIndex,
};

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub out_dir: PathBuf,
    pub package_prefix: Option<String>,
    pub batch_size: usize,
}

impl GeneratorConfig {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        GeneratorConfig {
            out_dir: out_dir.into(),
            package_prefix: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_package_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.package_prefix = Some(prefix.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub content_hash: String,
    /// `true` when existing output was already current.
    pub skipped: bool,
    pub node_types: usize,
    pub artifacts: usize,
}

/// Whether `out_dir` holds output generated from content hashing to `hash`.
pub fn is_up_to_date(out_dir: &Path, hash: &str) -> bool {
    read_manifest(out_dir)
        .is_some_and(|m| m.content_hash == hash && m.generator_version == GENERATOR_VERSION)
}

/// The manifest of a generated directory, if there is a readable one.
pub fn read_manifest(out_dir: &Path) -> Option<Manifest> {
    fs::read(out_dir.join(MANIFEST_FILE))
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

/// Read a catalog file and generate artifacts for it.
pub fn generate_from_file(
    catalog_path: &Path,
    config: &GeneratorConfig,
) -> Result<GenerationReport, GenerateError> {
    let bytes = fs::read(catalog_path).map_err(|source| CatalogError::Io {
        path: catalog_path.to_path_buf(),
        source,
    })?;
    generate_catalog(&bytes, config)
}

/// Generate one artifact per (type, version), an index per type and the
/// manifest. A catalog that cannot be parsed aborts the run.
pub fn generate_catalog(
    catalog_bytes: &[u8],
    config: &GeneratorConfig,
) -> Result<GenerationReport, GenerateError> {
    let hash = artifact::content_hash(catalog_bytes, config.package_prefix.as_deref());
    if is_up_to_date(&config.out_dir, &hash) {
        info!(out_dir = %config.out_dir.display(), hash = %hash, "schema artifacts are up to date");
        return Ok(GenerationReport {
            content_hash: hash,
            skipped: true,
            node_types: 0,
            artifacts: 0,
        });
    }

    let catalog = Catalog::from_slice(catalog_bytes, config.package_prefix.as_deref())?;
    clear_previous_output(&config.out_dir)?;
    let specs: Vec<&NodeTypeSpec> = catalog.specs().map(|s| s.as_ref()).collect();

    let mut indexes: IndexMap<String, TypeIndex> = IndexMap::new();
    let mut artifacts = 0;
    for (batch_no, batch) in specs.chunks(config.batch_size.max(1)).enumerate() {
        debug!(batch = batch_no, size = batch.len(), "generating batch");
        for spec in batch {
            let entries = write_versions(&config.out_dir, spec, &hash)?;
            artifacts += entries.len();
            let index = indexes.entry(spec.name.clone()).or_insert_with(|| TypeIndex {
                node_type: spec.name.clone(),
                default_version: spec.latest_version(),
                versions: Vec::new(),
            });
            index.default_version = index.default_version.max(spec.latest_version());
            index.versions.extend(entries);
        }
    }

    for (node_type, index) in &mut indexes {
        index.versions.sort_by(|a, b| a.version.total_cmp(&b.version));
        write_json(&artifact::index_path(&config.out_dir, node_type), &*index, node_type)?;
    }

    let manifest = Manifest {
        generator_version: GENERATOR_VERSION.to_string(),
        content_hash: hash.clone(),
        package_prefix: config.package_prefix.clone(),
        node_types: indexes.keys().cloned().collect(),
    };
    write_json(&config.out_dir.join(MANIFEST_FILE), &manifest, "manifest")?;

    info!(
        out_dir = %config.out_dir.display(),
        node_types = indexes.len(),
        artifacts,
        "generated schema artifacts"
    );
    Ok(GenerationReport {
        content_hash: hash,
        skipped: false,
        node_types: indexes.len(),
        artifacts,
    })
}

/// Remove the manifest first, then every type directory it listed.
fn clear_previous_output(out_dir: &Path) -> Result<(), GenerateError> {
    let Some(previous) = read_manifest(out_dir) else {
        return Ok(());
    };
    remove_if_present(&out_dir.join(MANIFEST_FILE), false)?;
    for node_type in &previous.node_types {
        remove_if_present(&artifact::type_dir(out_dir, node_type), true)?;
    }
    debug!(removed = previous.node_types.len(), "cleared previous schema artifacts");
    Ok(())
}

fn remove_if_present(path: &Path, dir: bool) -> Result<(), GenerateError> {
    let removed = if dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Err(source) if source.kind() != ErrorKind::NotFound => Err(GenerateError::Write {
            path: path.to_path_buf(),
            source,
        }),
        _ => Ok(()),
    }
}

/// Compile and write every version one record declares.
fn write_versions(
    out_dir: &Path,
    spec: &NodeTypeSpec,
    hash: &str,
) -> Result<Vec<IndexEntry>, GenerateError> {
    let mut entries = Vec::new();
    for version in spec.versions() {
        let schema = compile_type(spec, version);
        entries.push(IndexEntry {
            version,
            file: artifact::artifact_file_name(version),
            discriminators: schema.discriminators.clone(),
        });
        let envelope = Artifact {
            generator_version: GENERATOR_VERSION.to_string(),
            content_hash: hash.to_string(),
            schema,
        };
        write_json(
            &artifact::artifact_path(out_dir, &spec.name, version),
            &envelope,
            &spec.name,
        )?;
    }
    Ok(entries)
}

fn write_json<T: Serialize>(path: &Path, value: &T, node_type: &str) -> Result<(), GenerateError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| GenerateError::Serialize {
        node_type: node_type.to_string(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| GenerateError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| GenerateError::Write {
        path: path.to_path_buf(),
        source,
    })
}
