//! Edge port existence and type compatibility.

use crate::parse::types::Pipeline;
use crate::schema::SchemaRegistry;

use super::{Diagnostic, DiagnosticCode};

pub fn check_ports(
    pipeline: &Pipeline,
    schemas: &SchemaRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for edge in &pipeline.edges {
        let (Some(source), Some(target)) =
            (pipeline.node(&edge.source), pipeline.node(&edge.target))
        else {
            continue;
        };
        // Already reported as trigger-has-incoming.
        if target.category.is_trigger() {
            continue;
        }

        let source_port = schemas.get(&source.kind).map(|s| s.output(&edge.source_port));
        let target_port = schemas.get(&target.kind).map(|s| s.input(&edge.target_port));

        if let Some(None) = source_port {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownPort,
                    format!(
                        "Kind '{}' has no output port '{}' (edge {})",
                        source.kind, edge.source_port, edge
                    ),
                )
                .at(source.id.clone())
                .with_port(edge.source_port.clone()),
            );
        }
        if let Some(None) = target_port {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownPort,
                    format!(
                        "Kind '{}' has no input port '{}' (edge {})",
                        target.kind, edge.target_port, edge
                    ),
                )
                .at(target.id.clone())
                .with_port(edge.target_port.clone()),
            );
        }

        if let (Some(Some(from)), Some(Some(to))) = (source_port, target_port) {
            if !to.ty.accepts(from.ty) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticCode::PortTypeMismatch,
                        format!(
                            "Edge {} connects a {} output to a {} input",
                            edge, from.ty, to.ty
                        ),
                    )
                    .at(target.id.clone())
                    .with_port(edge.target_port.clone())
                    .with_nodes(vec![source.id.clone(), target.id.clone()]),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::types::{Edge, Node, NodeCategory};

    fn run(p: &Pipeline) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        check_ports(p, &SchemaRegistry::builtin(), &mut out);
        out
    }

    #[test]
    fn control_into_number_is_rejected() {
        let mut p = Pipeline::new("p", "");
        p.nodes.push(Node::new("c", NodeCategory::Logic, "condition"));
        p.nodes
            .push(Node::new("f", NodeCategory::Capability, "http-fetch"));
        p.edges.push(Edge::new("c", "true", "f", "url"));
        let diags = run(&p);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::PortTypeMismatch);
        assert_eq!(diags[0].node_id.as_deref(), Some("f"));
    }

    #[test]
    fn missing_ports_reported_on_both_ends() {
        let mut p = Pipeline::new("p", "");
        p.nodes.push(Node::new("t", NodeCategory::Trigger, "cron-trigger"));
        p.nodes.push(Node::new("l", NodeCategory::Logic, "log"));
        p.edges.push(Edge::new("t", "tick", "l", "input"));
        let diags = run(&p);
        let ports: Vec<_> = diags.iter().map(|d| d.port.as_deref().unwrap()).collect();
        assert_eq!(ports, vec!["tick", "input"]);
    }
}
