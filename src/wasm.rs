//! WASM entry points for browser use.

use std::sync::Arc;

use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;

use crate::catalog::Catalog;
use crate::schema::{NodeConfig, SchemaError, SchemaRegistry};
use crate::validate::{self, ValidationOptions, ValidationResult};

/// Validate a workflow JSON against a catalog JSON.
/// `options_json` may be empty for the defaults.
/// Returns `{status: "result", ...ValidationResult}` or `{status: "errors", errors}`.
#[wasm_bindgen]
pub fn validate_workflow(workflow_json: &str, catalog_json: &str, options_json: &str) -> JsValue {
    let result = validate_workflow_inner(workflow_json, catalog_json, options_json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn validate_workflow_inner(
    workflow_json: &str,
    catalog_json: &str,
    options_json: &str,
) -> WasmOutcome<ValidationResult> {
    let catalog = match Catalog::from_json(catalog_json, None) {
        Ok(c) => Arc::new(c),
        Err(e) => return WasmOutcome::failed("catalog", e),
    };
    let options = if options_json.trim().is_empty() {
        ValidationOptions::default()
    } else {
        match serde_json::from_str::<ValidationOptions>(options_json) {
            Ok(o) => o,
            Err(e) => return WasmOutcome::failed("options", e),
        }
    };

    let registry = SchemaRegistry::from_catalog(catalog.clone());
    match validate::validate_json(workflow_json, &registry, Some(catalog.as_ref()), &options) {
        Ok(result) => WasmOutcome::Result(result),
        Err(e) => WasmOutcome::failed("workflow", e),
    }
}

/// Resolve one node configuration (`{parameters, subnodes?}`) against the
/// schema of `node_type` at `version`.
#[wasm_bindgen]
pub fn resolve_node(
    catalog_json: &str,
    node_type: &str,
    version: f64,
    config_json: &str,
    strict: bool,
) -> JsValue {
    let result = resolve_node_inner(catalog_json, node_type, version, config_json, strict);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn resolve_node_inner(
    catalog_json: &str,
    node_type: &str,
    version: f64,
    config_json: &str,
    strict: bool,
) -> WasmOutcome<ResolutionDto> {
    let catalog = match Catalog::from_json(catalog_json, None) {
        Ok(c) => c,
        Err(e) => return WasmOutcome::failed("catalog", e),
    };
    let config = match serde_json::from_str::<ConfigDto>(config_json) {
        Ok(c) => c,
        Err(e) => return WasmOutcome::failed("config", e),
    };

    let registry = SchemaRegistry::from_catalog(catalog);
    let resolution = registry.resolve(
        node_type,
        version,
        NodeConfig {
            parameters: &config.parameters,
            subnodes: config.subnodes.as_ref(),
        },
        strict,
    );
    WasmOutcome::Result(ResolutionDto {
        valid: resolution.valid,
        errors: resolution.errors,
    })
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(serde::Serialize, serde::Deserialize)]
struct ErrorDto {
    input: String,
    message: String,
}

#[derive(serde::Deserialize)]
struct ConfigDto {
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    subnodes: Option<Value>,
}

#[derive(serde::Serialize)]
struct ResolutionDto {
    valid: bool,
    errors: Vec<SchemaError>,
}

#[derive(serde::Serialize)]
#[serde(tag = "status")]
enum WasmOutcome<T> {
    #[serde(rename = "result")]
    Result(T),
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}

impl<T> WasmOutcome<T> {
    fn failed(input: &str, error: impl std::fmt::Display) -> Self {
        WasmOutcome::Errors {
            errors: vec![ErrorDto {
                input: input.into(),
                message: error.to_string(),
            }],
        }
    }
}
