//! Graph-level structural checks.

use std::collections::{BTreeMap, BTreeSet};

use crate::parse::graph::GraphModel;
use crate::parse::types::Pipeline;
use crate::schema::SchemaRegistry;

use super::{Diagnostic, DiagnosticCode};

pub fn check_unique_ids(graph: &GraphModel, diagnostics: &mut Vec<Diagnostic>) {
    for id in graph.duplicate_ids() {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticCode::DuplicateNodeId,
                format!("Node id '{}' is used more than once", id),
            )
            .at(id.clone()),
        );
    }
}

/// One diagnostic per missing endpoint, reported at the missing id.
pub fn check_references(graph: &GraphModel, diagnostics: &mut Vec<Diagnostic>) {
    for edge in graph.dangling_edges() {
        for (role, id) in [("source", &edge.source), ("target", &edge.target)] {
            if !graph.contains(id) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticCode::UnknownNodeReference,
                        format!("Edge {} references unknown {} node '{}'", edge, role, id),
                    )
                    .at(id.clone()),
                );
            }
        }
    }
}

/// A target port accepts at most one incoming edge.
pub fn check_fan_in(pipeline: &Pipeline, diagnostics: &mut Vec<Diagnostic>) {
    let mut feeds: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
    for edge in &pipeline.edges {
        feeds
            .entry((edge.target.as_str(), edge.target_port.as_str()))
            .or_default()
            .push(edge.source.as_str());
    }

    for ((target, port), sources) in feeds {
        if sources.len() > 1 {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::PortFanIn,
                    format!(
                        "Port '{}' of node '{}' has {} incoming edges",
                        port,
                        target,
                        sources.len()
                    ),
                )
                .at(target)
                .with_port(port)
                .with_nodes(sources.into_iter().map(String::from).collect()),
            );
        }
    }
}

pub fn check_acyclic(graph: &GraphModel, diagnostics: &mut Vec<Diagnostic>) {
    if let Err(cycle) = graph.topological_order() {
        diagnostics.push(
            Diagnostic::error(DiagnosticCode::CycleDetected, cycle.to_string())
                .with_nodes(cycle.nodes),
        );
    }
}

pub fn check_triggers(
    pipeline: &Pipeline,
    graph: &GraphModel,
    schemas: &SchemaRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let triggers: Vec<&str> = pipeline.triggers().map(|n| n.id.as_str()).collect();
    if triggers.is_empty() {
        diagnostics.push(Diagnostic::error(
            DiagnosticCode::NoTrigger,
            "Pipeline must contain at least one trigger node",
        ));
        return;
    }

    for id in &triggers {
        let incoming = graph.incoming(id);
        if !incoming.is_empty() {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::TriggerHasIncoming,
                    format!(
                        "Trigger node '{}' must not have incoming edges, found {}",
                        id,
                        incoming.len()
                    ),
                )
                .at(*id)
                .with_nodes(incoming.into_iter().map(|l| l.peer).collect()),
            );
        }
    }

    let is_trigger = |id: &str| pipeline.node(id).is_some_and(|n| n.category.is_trigger());
    let scoped: BTreeSet<String> = triggers
        .iter()
        .flat_map(|t| graph.trigger_scope(t, is_trigger))
        .collect();
    for component in graph.components() {
        let orphans: Vec<String> = component
            .into_iter()
            .filter(|id| !scoped.contains(id))
            .collect();
        if let Some(first) = orphans.first() {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::UnreachableSubgraph,
                    format!(
                        "{} node(s) starting at '{}' do not run for any trigger",
                        orphans.len(),
                        first
                    ),
                )
                .at(first.clone())
                .with_nodes(orphans),
            );
        }
    }

    let reachable: BTreeSet<String> = triggers
        .iter()
        .flat_map(|t| graph.reachable_from(t))
        .collect();
    let has_effect = pipeline
        .nodes
        .iter()
        .any(|n| reachable.contains(&n.id) && schemas.is_effect(&n.kind));
    if !has_effect {
        diagnostics.push(Diagnostic::warning(
            DiagnosticCode::NoEffectReachable,
            "No trigger reaches a node with an observable effect",
        ));
    }
}
