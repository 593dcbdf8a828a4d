//! Graph validation phase.
//!
//! Validation never fails and never mutates: it returns every finding as a
//! [`Diagnostic`], in priority order. Node-id uniqueness, edge integrity and
//! acyclicity gate the later checks, since those assume a well-formed graph.

pub mod node_rules;
pub mod ports;
pub mod structural;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parse::graph::GraphModel;
use crate::parse::types::{Node, Pipeline};
use crate::schema::SchemaRegistry;

// =============================================================================
// DIAGNOSTICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    DuplicateNodeId,
    UnknownNodeReference,
    PortFanIn,
    CycleDetected,
    NoTrigger,
    TriggerHasIncoming,
    UnreachableSubgraph,
    NoEffectReachable,
    UnknownKind,
    CategoryMismatch,
    MissingRequiredField,
    InvalidFieldType,
    InvalidFieldValue,
    UnknownField,
    UnknownPort,
    PortTypeMismatch,
    // Raised by the generator.
    UnresolvedBinding,
    ContradictoryGuard,
    CrossTriggerInput,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::DuplicateNodeId => "duplicate-node-id",
            DiagnosticCode::UnknownNodeReference => "unknown-node-reference",
            DiagnosticCode::PortFanIn => "port-fan-in",
            DiagnosticCode::CycleDetected => "cycle-detected",
            DiagnosticCode::NoTrigger => "no-trigger",
            DiagnosticCode::TriggerHasIncoming => "trigger-has-incoming",
            DiagnosticCode::UnreachableSubgraph => "unreachable-subgraph",
            DiagnosticCode::NoEffectReachable => "no-effect-reachable",
            DiagnosticCode::UnknownKind => "unknown-kind",
            DiagnosticCode::CategoryMismatch => "category-mismatch",
            DiagnosticCode::MissingRequiredField => "missing-required-field",
            DiagnosticCode::InvalidFieldType => "invalid-field-type",
            DiagnosticCode::InvalidFieldValue => "invalid-field-value",
            DiagnosticCode::UnknownField => "unknown-field",
            DiagnosticCode::UnknownPort => "unknown-port",
            DiagnosticCode::PortTypeMismatch => "port-type-mismatch",
            DiagnosticCode::UnresolvedBinding => "unresolved-binding",
            DiagnosticCode::ContradictoryGuard => "contradictory-guard",
            DiagnosticCode::CrossTriggerInput => "cross-trigger-input",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            node_id: None,
            nodes: Vec::new(),
            field: None,
            port: None,
        }
    }

    pub fn at(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}[{}]: {}", level, self.code, self.message)
    }
}

/// True when no diagnostic has error severity.
pub fn is_compilable(diagnostics: &[Diagnostic]) -> bool {
    !diagnostics.iter().any(Diagnostic::is_error)
}

/// Validator diagnostics followed by generator warnings not already present.
pub fn merge_warnings(
    mut diagnostics: Vec<Diagnostic>,
    generated: Vec<Diagnostic>,
) -> Vec<Diagnostic> {
    for warning in generated {
        if !diagnostics.contains(&warning) {
            diagnostics.push(warning);
        }
    }
    diagnostics
}

// =============================================================================
// VALIDATOR
// =============================================================================

pub struct Validator<'a> {
    schemas: &'a SchemaRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(schemas: &'a SchemaRegistry) -> Self {
        Self { schemas }
    }

    /// Run every check on `pipeline`.
    pub fn validate(&self, pipeline: &Pipeline) -> Vec<Diagnostic> {
        let graph = GraphModel::build(pipeline);
        let mut diagnostics = Vec::new();

        structural::check_unique_ids(&graph, &mut diagnostics);
        if !diagnostics.is_empty() {
            return diagnostics;
        }

        structural::check_references(&graph, &mut diagnostics);
        if !diagnostics.is_empty() {
            return diagnostics;
        }
        structural::check_fan_in(pipeline, &mut diagnostics);

        let before = diagnostics.len();
        structural::check_acyclic(&graph, &mut diagnostics);
        if diagnostics.len() > before {
            return diagnostics;
        }

        structural::check_triggers(pipeline, &graph, self.schemas, &mut diagnostics);

        for node in &pipeline.nodes {
            node_rules::check_node(node, self.schemas, &mut diagnostics);
        }

        ports::check_ports(pipeline, self.schemas, &mut diagnostics);

        diagnostics
    }

    /// Per-node schema checks only; used while a single node is being edited.
    pub fn validate_node(&self, node: &Node) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        node_rules::check_node(node, self.schemas, &mut diagnostics);
        diagnostics
    }
}

/// Validate against the built-in kinds.
pub fn validate(pipeline: &Pipeline) -> Vec<Diagnostic> {
    Validator::new(&SchemaRegistry::builtin()).validate(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diagnostic_wire_shape() {
        let d = Diagnostic::error(DiagnosticCode::UnknownNodeReference, "missing").at("n99");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(
            v,
            json!({
                "severity": "error",
                "code": "unknown-node-reference",
                "message": "missing",
                "nodeId": "n99",
            })
        );
    }

    #[test]
    fn warnings_keep_pipeline_compilable() {
        let diags = vec![Diagnostic::warning(DiagnosticCode::UnknownField, "x")];
        assert!(is_compilable(&diags));
        let diags = vec![Diagnostic::error(DiagnosticCode::NoTrigger, "x")];
        assert!(!is_compilable(&diags));
    }

    #[test]
    fn merged_warnings_keep_order_and_drop_repeats() {
        let island = Diagnostic::warning(DiagnosticCode::UnreachableSubgraph, "island");
        let guard = Diagnostic::warning(DiagnosticCode::ContradictoryGuard, "never").at("f");
        let merged = merge_warnings(
            vec![island.clone()],
            vec![guard.clone(), island.clone(), guard.clone()],
        );
        assert_eq!(merged, vec![island, guard]);
    }

    #[test]
    fn code_strings_match_serde() {
        let code = DiagnosticCode::CrossTriggerInput;
        assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
    }
}
