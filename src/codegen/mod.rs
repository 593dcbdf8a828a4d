//! Codegen pass: validated pipeline → CRE TypeScript workflow.
//!
//! Public API: [`CodeGenerator::compile`]. Output is deterministic: the same
//! pipeline id and version always yield byte-identical code.

pub mod bindings;
pub mod emitters;
mod handler;
mod imports;
pub mod registry;
mod trigger;
pub mod value_expr;
mod writer;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use bindings::{BindingContext, ChainRegistry};
pub use registry::{EmitInputs, EmitterRegistry, Fragment, GuardTerm, NodeEmitter, TriggerHook};

use crate::error::CompileError;
use crate::parse::graph::GraphModel;
use crate::parse::types::{Node, Pipeline};
use crate::schema::{KindSchema, SchemaRegistry};
use crate::validate::Diagnostic;
use handler::HandlerEmitter;
use value_expr::{binding_var_name, comment_text};
use writer::CodeWriter;

/// The code produced for one pipeline version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedWorkflow {
    pub pipeline_id: String,
    pub pipeline_version: u64,
    pub code: String,
    pub warnings: Vec<Diagnostic>,
}

pub struct CodeGenerator {
    schemas: SchemaRegistry,
    emitters: EmitterRegistry,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(SchemaRegistry::builtin(), EmitterRegistry::builtin())
    }
}

impl CodeGenerator {
    pub fn new(schemas: SchemaRegistry, emitters: EmitterRegistry) -> Self {
        Self { schemas, emitters }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Add a node kind: its schema and the emitter that renders it.
    pub fn register(&mut self, schema: KindSchema, emitter: impl NodeEmitter + 'static) {
        self.emitters.register(schema.kind, emitter);
        self.schemas.register(schema);
    }

    /// Generate workflow code for `pipeline`.
    ///
    /// Expects a pipeline without validation errors; structural problems
    /// that would make the output unrunnable are still reported as
    /// [`CompileError`]s rather than emitted.
    pub fn compile(
        &self,
        pipeline: &Pipeline,
        bindings: &BindingContext<'_>,
    ) -> Result<GeneratedWorkflow, CompileError> {
        let graph = GraphModel::build(pipeline);
        let order = graph.topological_order()?;

        let mut nodes: BTreeMap<&str, &Node> = BTreeMap::new();
        for node in &pipeline.nodes {
            nodes.entry(node.id.as_str()).or_insert(node);
        }

        let triggers: Vec<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|id| nodes.get(id).is_some_and(|n| n.category.is_trigger()))
            .collect();
        if triggers.is_empty() {
            return Err(CompileError::NoTrigger);
        }

        for id in &order {
            if let Some(node) = nodes.get(id.as_str()) {
                if !self.emitters.contains(&node.kind) {
                    return Err(CompileError::UnsupportedKind {
                        node_id: node.id.clone(),
                        kind: node.kind.clone(),
                    });
                }
            }
        }

        let vars = assign_vars(pipeline);
        let critical = self.critical_nodes(&graph, &nodes, &triggers);

        let mut w = CodeWriter::new();
        w.comment(&format!(
            "Generated by pipeline-compiler for pipeline \"{}\" at version {}. Do not edit.",
            comment_text(&pipeline.id),
            pipeline.version
        ));
        w.blank();
        imports::emit_imports(&mut w);
        w.blank();
        w.line("type Config = Record<string, never>;");
        w.blank();
        imports::emit_prelude(&mut w);
        w.blank();

        let mut emitter = HandlerEmitter {
            nodes: &nodes,
            graph: &graph,
            order: &order,
            vars: &vars,
            critical: &critical,
            schemas: &self.schemas,
            emitters: &self.emitters,
            bindings,
            warnings: Vec::new(),
        };
        let mut handlers = Vec::with_capacity(triggers.len());
        for trigger_id in &triggers {
            handlers.push(emitter.emit(trigger_id, &mut w)?);
            w.blank();
        }
        let warnings = emitter.warnings;

        trigger::emit_init_and_main(&handlers, &mut w);

        tracing::debug!(
            pipeline_id = %pipeline.id,
            version = pipeline.version,
            handlers = handlers.len(),
            warnings = warnings.len(),
            "compiled pipeline"
        );

        Ok(GeneratedWorkflow {
            pipeline_id: pipeline.id.clone(),
            pipeline_version: pipeline.version,
            code: w.finish(),
            warnings,
        })
    }

    /// Nodes reachable from a trigger that can also reach an effect node.
    fn critical_nodes(
        &self,
        graph: &GraphModel,
        nodes: &BTreeMap<&str, &Node>,
        triggers: &[&str],
    ) -> BTreeSet<String> {
        let reachable: BTreeSet<String> = triggers
            .iter()
            .flat_map(|t| graph.reachable_from(t))
            .collect();
        let feeds_effect: BTreeSet<String> = reachable
            .iter()
            .filter(|id| {
                nodes
                    .get(id.as_str())
                    .is_some_and(|n| self.schemas.is_effect(&n.kind))
            })
            .flat_map(|id| graph.ancestors(id))
            .collect();
        reachable.intersection(&feeds_effect).cloned().collect()
    }
}

/// Compile with the built-in kinds.
pub fn compile(
    pipeline: &Pipeline,
    bindings: &BindingContext<'_>,
) -> Result<GeneratedWorkflow, CompileError> {
    CodeGenerator::default().compile(pipeline, bindings)
}

/// Unique variable per node id, assigned in declaration order.
fn assign_vars(pipeline: &Pipeline) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut taken = BTreeSet::new();
    for node in &pipeline.nodes {
        if vars.contains_key(&node.id) {
            continue;
        }
        let base = binding_var_name(&node.id);
        let mut var = base.clone();
        let mut n = 2;
        while taken.contains(&var) {
            var = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(var.clone());
        vars.insert(node.id.clone(), var);
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::types::NodeCategory;

    #[test]
    fn colliding_ids_get_distinct_vars() {
        let mut p = Pipeline::new("p", "");
        p.nodes.push(Node::new("a-b", NodeCategory::Logic, "log"));
        p.nodes.push(Node::new("a_b", NodeCategory::Logic, "log"));
        p.nodes.push(Node::new("a.b", NodeCategory::Logic, "log"));
        let vars = assign_vars(&p);
        assert_eq!(vars["a-b"], "step_a_b");
        assert_eq!(vars["a_b"], "step_a_b_2");
        assert_eq!(vars["a.b"], "step_a_b_3");
    }
}
