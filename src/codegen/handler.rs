//! Emit one handler function per trigger.
//!
//! A handler contains the trigger's reachable nodes plus their non-trigger
//! ancestors, in global topological order. Nodes fed through a control port
//! (or downstream of one) are wrapped in an `if` on the accumulated guard.

use std::collections::{BTreeMap, BTreeSet};

use super::bindings::{self, BindingContext, Resolution};
use super::registry::{EmitInputs, EmitterRegistry, Fragment, GuardTerm, TriggerHook};
use super::writer::CodeWriter;
use crate::error::CompileError;
use crate::parse::graph::GraphModel;
use crate::parse::types::Node;
use crate::schema::{BindingSpec, SchemaRegistry};
use crate::validate::{Diagnostic, DiagnosticCode};

/// Name and registration of an emitted handler.
pub struct EmittedHandler {
    pub name: String,
    pub hook: TriggerHook,
}

pub struct HandlerEmitter<'a> {
    pub nodes: &'a BTreeMap<&'a str, &'a Node>,
    pub graph: &'a GraphModel,
    pub order: &'a [String],
    pub vars: &'a BTreeMap<String, String>,
    /// Nodes on some trigger → effect path.
    pub critical: &'a BTreeSet<String>,
    pub schemas: &'a SchemaRegistry,
    pub emitters: &'a EmitterRegistry,
    pub bindings: &'a BindingContext<'a>,
    pub warnings: Vec<Diagnostic>,
}

/// Per-handler emission state.
struct Scope {
    members: BTreeSet<String>,
    outputs: BTreeMap<String, BTreeMap<String, String>>,
    control: BTreeMap<String, BTreeMap<String, GuardTerm>>,
    guards: BTreeMap<String, BTreeSet<GuardTerm>>,
}

impl<'a> HandlerEmitter<'a> {
    fn var(&self, id: &str) -> String {
        self.vars
            .get(id)
            .cloned()
            .unwrap_or_else(|| super::value_expr::binding_var_name(id))
    }

    fn warn(&mut self, diagnostic: Diagnostic) {
        if !self.warnings.contains(&diagnostic) {
            self.warnings.push(diagnostic);
        }
    }

    /// Nodes belonging to `trigger_id`'s handler.
    fn members(&self, trigger_id: &str) -> BTreeSet<String> {
        self.graph.trigger_scope(trigger_id, |id| {
            self.nodes.get(id).is_some_and(|n| n.category.is_trigger())
        })
    }

    pub fn emit(
        &mut self,
        trigger_id: &str,
        w: &mut CodeWriter,
    ) -> Result<EmittedHandler, CompileError> {
        let trigger_var = self.var(trigger_id);
        let name = format!(
            "on_{}",
            trigger_var.strip_prefix("step_").unwrap_or(&trigger_var)
        );

        let mut scope = Scope {
            members: self.members(trigger_id),
            outputs: BTreeMap::new(),
            control: BTreeMap::new(),
            guards: BTreeMap::new(),
        };

        let mut body = w.nested();
        let mut hook = None;
        let mut index = 0;

        for id in self.order {
            if !scope.members.contains(id) {
                continue;
            }
            let Some(node) = self.nodes.get(id.as_str()).copied() else {
                continue;
            };
            index += 1;

            let fragment = self.emit_node(node, trigger_id, &mut scope)?;
            if id == trigger_id {
                hook = fragment.trigger.clone();
            }

            if index > 1 {
                body.blank();
            }
            body.comment(&format!("[{}] {} ({})", index, node.id, node.kind));
            let guard = scope.guards.get(id).cloned().unwrap_or_default();
            write_fragment(&mut body, &self.var(id), &fragment, &guard);

            scope.outputs.insert(id.clone(), fragment.outputs);
            scope.control.insert(id.clone(), fragment.control);
        }
        body.blank();
        body.line("return \"ok\";");

        let hook = hook.ok_or_else(|| CompileError::MissingTriggerHook {
            node_id: trigger_id.to_string(),
        })?;

        w.block_open(&format!(
            "const {} = (runtime: Runtime<Config>, payload: {}): string =>",
            name, hook.payload_type
        ));
        w.append(body);
        w.block_close_semi();

        Ok(EmittedHandler { name, hook })
    }

    fn emit_node(
        &mut self,
        node: &Node,
        trigger_id: &str,
        scope: &mut Scope,
    ) -> Result<Fragment, CompileError> {
        let mut inputs = EmitInputs {
            var: self.var(&node.id),
            ..Default::default()
        };
        let mut guard: BTreeSet<GuardTerm> = BTreeSet::new();

        for link in self.graph.incoming(&node.id) {
            if !scope.members.contains(&link.peer) {
                self.warn(
                    Diagnostic::warning(
                        DiagnosticCode::CrossTriggerInput,
                        format!(
                            "Input '{}' of node '{}' comes from '{}', which does not run for trigger '{}'; it will be undefined",
                            link.local_port, node.id, link.peer, trigger_id
                        ),
                    )
                    .at(node.id.clone())
                    .with_port(link.local_port.clone())
                    .with_nodes(vec![link.peer.clone(), trigger_id.to_string()]),
                );
                inputs.ports.insert(link.local_port, "undefined".into());
                continue;
            }

            let expr = scope
                .outputs
                .get(&link.peer)
                .and_then(|outs| outs.get(&link.peer_port))
                .cloned()
                .ok_or_else(|| CompileError::MissingOutput {
                    node_id: link.peer.clone(),
                    port: link.peer_port.clone(),
                })?;
            inputs.ports.insert(link.local_port, expr);

            if let Some(upstream) = scope.guards.get(&link.peer) {
                guard.extend(upstream.iter().cloned());
            }
            if let Some(term) = scope
                .control
                .get(&link.peer)
                .and_then(|c| c.get(&link.peer_port))
            {
                guard.insert(term.clone());
            }
        }

        if guard
            .iter()
            .any(|t| !t.negated && guard.contains(&GuardTerm::unless(t.var.clone())))
        {
            self.warn(
                Diagnostic::warning(
                    DiagnosticCode::ContradictoryGuard,
                    format!(
                        "Node '{}' requires both branches of the same condition and will never run",
                        node.id
                    ),
                )
                .at(node.id.clone()),
            );
        }
        scope.guards.insert(node.id.clone(), guard);

        let schemas = self.schemas;
        if let Some(schema) = schemas.get(&node.kind) {
            for spec in &schema.bindings {
                self.bind(node, spec, &mut inputs)?;
            }
        }

        let emitter = self
            .emitters
            .get(&node.kind)
            .ok_or_else(|| CompileError::UnsupportedKind {
                node_id: node.id.clone(),
                kind: node.kind.clone(),
            })?;
        emitter.emit(node, &inputs)
    }

    fn bind(
        &mut self,
        node: &Node,
        spec: &BindingSpec,
        inputs: &mut EmitInputs,
    ) -> Result<(), CompileError> {
        let port = match spec {
            BindingSpec::Chain { port, .. } | BindingSpec::Contract { port, .. } => *port,
            BindingSpec::Secret { .. } => None,
        };
        let port_expr = port.and_then(|p| inputs.port(p)).map(str::to_string);

        match bindings::resolve(spec, node, port_expr.as_deref(), self.bindings) {
            Resolution::Resolved(expr) => {
                inputs.bindings.insert(spec.name().to_string(), expr);
            }
            Resolution::Skipped => {}
            Resolution::Unresolved(detail) => {
                if self.critical.contains(&node.id) {
                    return Err(CompileError::UnresolvedBinding {
                        node_id: node.id.clone(),
                        binding: spec.kind_label().to_string(),
                        detail,
                    });
                }
                let message = format!(
                    "{} binding of node '{}' cannot be resolved: {}",
                    spec.kind_label(),
                    node.id,
                    detail
                );
                self.warn(
                    Diagnostic::warning(DiagnosticCode::UnresolvedBinding, message.clone())
                        .at(node.id.clone()),
                );
                inputs
                    .bindings
                    .insert(spec.name().to_string(), bindings::placeholder_expr(&message));
            }
        }
        Ok(())
    }
}

fn write_fragment(w: &mut CodeWriter, var: &str, fragment: &Fragment, guard: &BTreeSet<GuardTerm>) {
    if guard.is_empty() {
        w.lines(fragment.setup.as_slice());
        if let Some(value) = &fragment.value {
            w.line(&format!("const {} = {};", var, value));
        }
        w.lines(fragment.effects.as_slice());
        return;
    }

    if fragment.value.is_some() {
        w.line(&format!("let {}: any;", var));
    }
    let condition: Vec<String> = guard.iter().map(GuardTerm::render).collect();
    w.block_open(&format!("if ({})", condition.join(" && ")));
    w.lines(fragment.setup.as_slice());
    if let Some(value) = &fragment.value {
        w.line(&format!("{} = {};", var, value));
    }
    w.lines(fragment.effects.as_slice());
    w.block_close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_fragment_hoists_var() {
        let mut w = CodeWriter::new();
        let fragment = Fragment::new().with_value("compute()").effect("notify();");
        let guard: BTreeSet<_> = [GuardTerm::when("step_c"), GuardTerm::unless("step_d")]
            .into_iter()
            .collect();
        write_fragment(&mut w, "step_x", &fragment, &guard);
        assert_eq!(
            w.finish(),
            "let step_x: any;\nif (step_c && !step_d) {\n  step_x = compute();\n  notify();\n}\n"
        );
    }

    #[test]
    fn unguarded_fragment_is_const() {
        let mut w = CodeWriter::new();
        let fragment = Fragment::new().setup("// note").with_value("1");
        write_fragment(&mut w, "step_x", &fragment, &BTreeSet::new());
        assert_eq!(w.finish(), "// note\nconst step_x = 1;\n");
    }
}
