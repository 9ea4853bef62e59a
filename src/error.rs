//! Hard failures. Validation itself never fails; these cover the inputs it
//! cannot interpret at all and the build-time generation step.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a node-type catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("node type '{name}' version {version} is declared more than once")]
    Duplicate { name: String, version: String },
}

/// Errors raised when a workflow document cannot be interpreted.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to parse workflow JSON: {0}")]
    Parse(#[source] serde_json::Error),
}

/// Errors raised by the build-time artifact generator.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize artifact for '{node_type}': {source}")]
    Serialize {
        node_type: String,
        #[source]
        source: serde_json::Error,
    },
}
