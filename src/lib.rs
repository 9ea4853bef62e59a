pub mod catalog;
pub mod discriminator;
pub mod display;
pub mod error;
pub mod expression;
pub mod generate;
pub mod schema;
pub mod validate;
pub mod wasm;
pub mod workflow;

pub use catalog::{Catalog, NodeTypeProvider};
pub use error::{CatalogError, GenerateError, WorkflowError};
pub use schema::{SchemaRegistry, TypeSchema};
pub use validate::{ValidationOptions, ValidationResult, validate_json, validate_workflow};
