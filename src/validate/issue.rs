//! Validation issues and the aggregated result.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    NoTrigger,
    DisconnectedNode,
    InvalidInputIndex,
    InvalidConnection,
    InvalidParameter,
    UnsupportedCapabilityInput,
    CapabilitySourceMismatch,
    InvalidExpressionPath,
    PartialExpressionPath,
    UnknownNodeReference,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::NoTrigger => "NO_TRIGGER",
            IssueCode::DisconnectedNode => "DISCONNECTED_NODE",
            IssueCode::InvalidInputIndex => "INVALID_INPUT_INDEX",
            IssueCode::InvalidConnection => "INVALID_CONNECTION",
            IssueCode::InvalidParameter => "INVALID_PARAMETER",
            IssueCode::UnsupportedCapabilityInput => "UNSUPPORTED_CAPABILITY_INPUT",
            IssueCode::CapabilitySourceMismatch => "CAPABILITY_SOURCE_MISMATCH",
            IssueCode::InvalidExpressionPath => "INVALID_EXPRESSION_PATH",
            IssueCode::PartialExpressionPath => "PARTIAL_EXPRESSION_PATH",
            IssueCode::UnknownNodeReference => "UNKNOWN_NODE_REFERENCE",
        }
    }

    pub fn level(self) -> ViolationLevel {
        match self {
            IssueCode::NoTrigger
            | IssueCode::DisconnectedNode
            | IssueCode::InvalidInputIndex
            | IssueCode::InvalidConnection
            | IssueCode::PartialExpressionPath => ViolationLevel::Minor,
            IssueCode::InvalidParameter
            | IssueCode::UnsupportedCapabilityInput
            | IssueCode::CapabilitySourceMismatch
            | IssueCode::InvalidExpressionPath
            | IssueCode::UnknownNodeReference => ViolationLevel::Major,
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationLevel {
    Minor,
    Major,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_level: Option<ViolationLevel>,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.node_name, &self.parameter_path) {
            (Some(node), Some(path)) => {
                write!(f, "[{}] {} (node '{}', {})", self.code, self.message, node, path)
            }
            (Some(node), None) => write!(f, "[{}] {} (node '{}')", self.code, self.message, node),
            _ => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl ValidationIssue {
    pub fn graph(code: IssueCode, message: impl Into<String>) -> Self {
        ValidationIssue {
            code,
            message: message.into(),
            node_name: None,
            parameter_path: None,
            violation_level: Some(code.level()),
        }
    }

    pub fn node(code: IssueCode, node: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            node_name: Some(node.to_string()),
            ..ValidationIssue::graph(code, message)
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.parameter_path = Some(path.into());
        self
    }
}

/// `valid` reflects `errors` only; everything this crate finds is a warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn warnings_with(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.warnings.iter().filter(move |w| w.code == code)
    }
}
