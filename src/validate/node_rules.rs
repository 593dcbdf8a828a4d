//! Per-node configuration validation against the kind schema.

use crate::parse::types::Node;
use crate::schema::{FieldIssue, SchemaRegistry};

use super::{Diagnostic, DiagnosticCode};

pub fn check_node(node: &Node, schemas: &SchemaRegistry, diagnostics: &mut Vec<Diagnostic>) {
    let Some(schema) = schemas.get(&node.kind) else {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticCode::UnknownKind,
                format!("Node '{}' has unknown kind '{}'", node.id, node.kind),
            )
            .at(node.id.clone()),
        );
        return;
    };

    if schema.category != node.category {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticCode::CategoryMismatch,
                format!(
                    "Kind '{}' belongs to category '{}', node '{}' says '{}'",
                    node.kind, schema.category, node.id, node.category
                ),
            )
            .at(node.id.clone()),
        );
    }

    for issue in schema.field_issues(node) {
        diagnostics.push(issue_to_diagnostic(node, &issue));
    }
}

fn issue_to_diagnostic(node: &Node, issue: &FieldIssue) -> Diagnostic {
    let diagnostic = match issue {
        FieldIssue::Missing { field } => Diagnostic::error(
            DiagnosticCode::MissingRequiredField,
            format!("Node '{}' is missing required field '{}'", node.id, field),
        ),
        FieldIssue::InvalidType { field, reason } => Diagnostic::error(
            DiagnosticCode::InvalidFieldType,
            format!("Field '{}' of node '{}': {}", field, node.id, reason),
        ),
        FieldIssue::InvalidValue { field, reason } => Diagnostic::error(
            DiagnosticCode::InvalidFieldValue,
            format!("Field '{}' of node '{}': {}", field, node.id, reason),
        ),
        FieldIssue::Unknown { field } => Diagnostic::warning(
            DiagnosticCode::UnknownField,
            format!(
                "Field '{}' is not used by kind '{}' and will be ignored",
                field, node.kind
            ),
        ),
    };
    diagnostic.at(node.id.clone()).with_field(issue.field())
}
