//! Emitter strategy table: node kind → [`NodeEmitter`].
//!
//! An emitter is a pure function from a node and its resolved inputs to a
//! [`Fragment`]. The generator core never inspects `kind` itself.

use std::collections::BTreeMap;

use crate::error::CompileError;
use crate::parse::types::Node;

/// Everything an emitter sees besides the node itself.
#[derive(Debug, Clone, Default)]
pub struct EmitInputs {
    /// Variable the fragment's value is assigned to.
    pub var: String,
    /// Connected input ports → producer expressions.
    pub ports: BTreeMap<String, String>,
    /// Binding name → resolved (or placeholder) expression.
    pub bindings: BTreeMap<String, String>,
}

impl EmitInputs {
    pub fn port(&self, name: &str) -> Option<&str> {
        self.ports.get(name).map(String::as_str)
    }

    /// The expression feeding `name`, or `undefined` when unconnected.
    pub fn port_or_undefined(&self, name: &str) -> &str {
        self.port(name).unwrap_or("undefined")
    }

    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }
}

/// One boolean term of an execution guard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GuardTerm {
    pub var: String,
    pub negated: bool,
}

impl GuardTerm {
    pub fn when(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            negated: false,
        }
    }

    pub fn unless(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            negated: true,
        }
    }

    pub fn render(&self) -> String {
        if self.negated {
            format!("!{}", self.var)
        } else {
            self.var.clone()
        }
    }
}

/// How a trigger node registers its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHook {
    /// Expression producing the trigger capability, evaluated in `initWorkflow`.
    pub capability: String,
    /// SDK type of the handler's payload parameter.
    pub payload_type: String,
}

/// The code one node contributes to a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub setup: Vec<String>,
    /// Assigned to the node's variable when present.
    pub value: Option<String>,
    pub effects: Vec<String>,
    /// Output port → expression readable by downstream nodes.
    pub outputs: BTreeMap<String, String>,
    /// Control output port → guard term for nodes fed by that port.
    pub control: BTreeMap<String, GuardTerm>,
    pub trigger: Option<TriggerHook>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, expr: impl Into<String>) -> Self {
        self.value = Some(expr.into());
        self
    }

    pub fn setup(mut self, line: impl Into<String>) -> Self {
        self.setup.push(line.into());
        self
    }

    pub fn effect(mut self, line: impl Into<String>) -> Self {
        self.effects.push(line.into());
        self
    }

    pub fn output(mut self, port: impl Into<String>, expr: impl Into<String>) -> Self {
        self.outputs.insert(port.into(), expr.into());
        self
    }

    pub fn control(mut self, port: impl Into<String>, term: GuardTerm) -> Self {
        self.control.insert(port.into(), term);
        self
    }

    pub fn trigger(mut self, hook: TriggerHook) -> Self {
        self.trigger = Some(hook);
        self
    }
}

pub trait NodeEmitter: Send + Sync {
    fn emit(&self, node: &Node, inputs: &EmitInputs) -> Result<Fragment, CompileError>;
}

impl<F> NodeEmitter for F
where
    F: Fn(&Node, &EmitInputs) -> Result<Fragment, CompileError> + Send + Sync,
{
    fn emit(&self, node: &Node, inputs: &EmitInputs) -> Result<Fragment, CompileError> {
        self(node, inputs)
    }
}

#[derive(Default)]
pub struct EmitterRegistry {
    emitters: BTreeMap<String, Box<dyn NodeEmitter>>,
}

impl EmitterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        super::emitters::register_builtin(&mut registry);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, emitter: impl NodeEmitter + 'static) {
        self.emitters.insert(kind.into(), Box::new(emitter));
    }

    pub fn get(&self, kind: &str) -> Option<&dyn NodeEmitter> {
        self.emitters.get(kind).map(|e| e.as_ref())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.emitters.contains_key(kind)
    }
}
