//! Per-kind node schemas.
//!
//! A [`KindSchema`] describes everything the validator and generator need to
//! know about a node kind: its category, config fields, ports, binding
//! requirements and whether it has an externally visible effect. New kinds are
//! added by registering a schema (and an emitter in `crate::codegen`); neither
//! the validator nor the generator core changes.

mod builtin;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::parse::types::{Node, NodeCategory, NodeState};

// =============================================================================
// FIELD TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// JSON number or a numeric string.
    Number,
    /// Non-negative integer, JSON number or numeric string.
    Integer,
    Boolean,
    /// `0x` followed by 40 hex digits.
    Address,
    AddressList,
    Url,
    /// Five or six whitespace-separated cron fields.
    Cron,
    Enum(&'static [&'static str]),
    /// Name of a stored secret.
    SecretName,
    ChainName,
    /// Any JSON value.
    Json,
    StringList,
    Any,
}

impl FieldType {
    /// Check `value` against this type. `Err` carries a short reason.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            FieldType::String | FieldType::ChainName => expect_str(value).map(|_| ()),
            FieldType::Number => match value {
                Value::Number(_) => Ok(()),
                Value::String(s) if s.trim().parse::<f64>().is_ok() => Ok(()),
                _ => Err("expected a number".into()),
            },
            FieldType::Integer => match value {
                Value::Number(n) if n.is_u64() => Ok(()),
                Value::String(s) if s.trim().parse::<u64>().is_ok() => Ok(()),
                _ => Err("expected a non-negative integer".into()),
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("expected true or false".into()),
            },
            FieldType::Address => {
                let s = expect_str(value)?;
                if is_address(s) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not a 0x-prefixed 20-byte address", s))
                }
            }
            FieldType::AddressList => {
                let items = value
                    .as_array()
                    .ok_or_else(|| "expected a list of addresses".to_string())?;
                for item in items {
                    FieldType::Address.check(item)?;
                }
                Ok(())
            }
            FieldType::Url => {
                let s = expect_str(value)?;
                if s.starts_with("http://") || s.starts_with("https://") {
                    Ok(())
                } else {
                    Err(format!("'{}' is not an http(s) URL", s))
                }
            }
            FieldType::Cron => {
                let s = expect_str(value)?;
                let fields = s.split_whitespace().count();
                if fields == 5 || fields == 6 {
                    Ok(())
                } else {
                    Err(format!(
                        "cron expression must have 5 or 6 fields, found {}",
                        fields
                    ))
                }
            }
            FieldType::Enum(allowed) => {
                let s = expect_str(value)?;
                if allowed.contains(&s) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of: {}", s, allowed.join(", ")))
                }
            }
            FieldType::SecretName => {
                let s = expect_str(value)?;
                if s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    Ok(())
                } else {
                    Err(format!(
                        "secret name '{}' may only contain letters, digits, '_' and '-'",
                        s
                    ))
                }
            }
            FieldType::StringList => match value {
                Value::Array(items) if items.iter().all(Value::is_string) => Ok(()),
                _ => Err("expected a list of strings".into()),
            },
            FieldType::Json | FieldType::Any => Ok(()),
        }
    }
}

fn expect_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| "expected a string".to_string())
}

pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// A value counts as missing when absent, null, or a blank string.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Extra per-kind check run after the type check. Returns a reason on failure.
pub type Constraint = fn(&Value) -> Option<String>;

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub constraint: Option<Constraint>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
            constraint: None,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            constraint: None,
        }
    }

    pub const fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

// =============================================================================
// PORTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Any,
    /// Branch selection; carries the upstream value but also gates execution.
    Control,
    Bool,
    Number,
    String,
    Address,
    Json,
    /// A chain client handle.
    Chain,
    /// A contract address handle.
    Contract,
}

impl PortType {
    /// Whether an edge from a `source`-typed port may feed this port.
    pub fn accepts(self, source: PortType) -> bool {
        use PortType::*;
        if self == source || self == Any {
            return true;
        }
        match (source, self) {
            (Control, _) => false,
            (_, Chain) | (_, Contract) => false,
            (Any, _) => true,
            (Address, String) => true,
            (Number | String | Bool, Json) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortType::Any => "any",
            PortType::Control => "control",
            PortType::Bool => "bool",
            PortType::Number => "number",
            PortType::String => "string",
            PortType::Address => "address",
            PortType::Json => "json",
            PortType::Chain => "chain",
            PortType::Contract => "contract",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub name: &'static str,
    pub ty: PortType,
}

impl PortSpec {
    pub const fn new(name: &'static str, ty: PortType) -> Self {
        Self { name, ty }
    }
}

// =============================================================================
// BINDINGS
// =============================================================================

/// An external resource a node needs resolved at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSpec {
    /// Named secret taken from `field`. Skipped when the field is unset.
    Secret {
        name: &'static str,
        field: &'static str,
    },
    /// Chain client, from a connected `port` or else the chain name in `field`.
    Chain {
        name: &'static str,
        field: &'static str,
        port: Option<&'static str>,
    },
    /// Contract address, from a connected `port` or else `field`.
    Contract {
        name: &'static str,
        field: &'static str,
        port: Option<&'static str>,
    },
}

impl BindingSpec {
    pub fn name(&self) -> &'static str {
        match self {
            BindingSpec::Secret { name, .. }
            | BindingSpec::Chain { name, .. }
            | BindingSpec::Contract { name, .. } => name,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            BindingSpec::Secret { .. } => "secret",
            BindingSpec::Chain { .. } => "chain",
            BindingSpec::Contract { .. } => "contract",
        }
    }
}

// =============================================================================
// KIND SCHEMA
// =============================================================================

#[derive(Debug, Clone)]
pub struct KindSchema {
    pub kind: &'static str,
    pub category: NodeCategory,
    pub fields: Vec<FieldSpec>,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    pub bindings: Vec<BindingSpec>,
    /// Writes on-chain or otherwise leaves a trace outside the run.
    pub effect: bool,
    pub description: &'static str,
}

impl KindSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Check `node.config` against the field specs, in declaration order,
    /// followed by unknown fields in key order.
    pub fn field_issues(&self, node: &Node) -> Vec<FieldIssue> {
        let mut issues = Vec::new();

        for spec in &self.fields {
            let value = node.config.get(spec.name);
            if is_missing(value) {
                if spec.required {
                    issues.push(FieldIssue::Missing { field: spec.name });
                }
                continue;
            }
            let Some(value) = value else { continue };
            if let Err(reason) = spec.ty.check(value) {
                issues.push(FieldIssue::InvalidType {
                    field: spec.name,
                    reason,
                });
                continue;
            }
            if let Some(reason) = spec.constraint.and_then(|c| c(value)) {
                issues.push(FieldIssue::InvalidValue {
                    field: spec.name,
                    reason,
                });
            }
        }

        for key in node.config.keys() {
            if self.field(key).is_none() {
                issues.push(FieldIssue::Unknown { field: key.clone() });
            }
        }

        issues
    }
}

/// A problem with one config field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIssue {
    Missing { field: &'static str },
    InvalidType { field: &'static str, reason: String },
    InvalidValue { field: &'static str, reason: String },
    /// Not declared by the kind. Never blocks readiness.
    Unknown { field: String },
}

impl FieldIssue {
    pub fn field(&self) -> &str {
        match self {
            FieldIssue::Missing { field }
            | FieldIssue::InvalidType { field, .. }
            | FieldIssue::InvalidValue { field, .. } => field,
            FieldIssue::Unknown { field } => field,
        }
    }

    pub fn is_blocking(&self) -> bool {
        !matches!(self, FieldIssue::Unknown { .. })
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    kinds: BTreeMap<&'static str, KindSchema>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in kind.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for schema in builtin::schemas() {
            registry.register(schema);
        }
        registry
    }

    /// Add or replace the schema for `schema.kind`.
    pub fn register(&mut self, schema: KindSchema) {
        self.kinds.insert(schema.kind, schema);
    }

    pub fn get(&self, kind: &str) -> Option<&KindSchema> {
        self.kinds.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindSchema> {
        self.kinds.values()
    }

    pub fn is_effect(&self, kind: &str) -> bool {
        self.get(kind).is_some_and(|s| s.effect)
    }

    /// Readiness of `node` given its config and previous state.
    ///
    /// A node whose kind needs no fields is ready with an empty config; a
    /// node that was ready stays in error until it is valid again, even when
    /// its config is cleared.
    pub fn derive_state(&self, node: &Node) -> NodeState {
        let valid = match self.get(&node.kind) {
            Some(schema) if schema.category == node.category => {
                !schema.field_issues(node).iter().any(FieldIssue::is_blocking)
            }
            _ => false,
        };
        let empty = node.config.values().all(|v| is_missing(Some(v)));
        match (valid, node.state) {
            (true, _) => NodeState::Ready,
            (false, NodeState::Ready | NodeState::Error) => NodeState::Error,
            (false, _) if empty => NodeState::Draft,
            (false, _) => NodeState::Configured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_compatibility() {
        assert!(PortType::Json.accepts(PortType::Number));
        assert!(PortType::String.accepts(PortType::Address));
        assert!(PortType::Number.accepts(PortType::Any));
        assert!(PortType::Any.accepts(PortType::Control));
        assert!(!PortType::Number.accepts(PortType::Control));
        assert!(!PortType::Chain.accepts(PortType::Any));
        assert!(!PortType::Address.accepts(PortType::String));
    }

    #[test]
    fn address_check() {
        let ok = json!("0x00000000000000000000000000000000000000aB");
        assert!(FieldType::Address.check(&ok).is_ok());
        assert!(FieldType::Address.check(&json!("0x123")).is_err());
        assert!(FieldType::Address.check(&json!(12)).is_err());
    }

    #[test]
    fn cron_field_count() {
        assert!(FieldType::Cron.check(&json!("*/5 * * * *")).is_ok());
        assert!(FieldType::Cron.check(&json!("0 */5 * * * *")).is_ok());
        assert!(FieldType::Cron.check(&json!("* *")).is_err());
    }

    #[test]
    fn numeric_strings_count_as_numbers() {
        assert!(FieldType::Integer.check(&json!("500000")).is_ok());
        assert!(FieldType::Integer.check(&json!("-1")).is_err());
        assert!(FieldType::Number.check(&json!("1.5")).is_ok());
    }

    #[test]
    fn derive_state_transitions() {
        let registry = SchemaRegistry::builtin();
        let mut node = Node::new("c", NodeCategory::Trigger, "cron-trigger");
        assert_eq!(registry.derive_state(&node), NodeState::Draft);

        node.config.insert("schedule".into(), json!("bad"));
        assert_eq!(registry.derive_state(&node), NodeState::Configured);

        node.config.insert("schedule".into(), json!("*/5 * * * *"));
        assert_eq!(registry.derive_state(&node), NodeState::Ready);

        node.state = NodeState::Ready;
        node.config.insert("schedule".into(), json!("bad"));
        assert_eq!(registry.derive_state(&node), NodeState::Error);

        node.state = NodeState::Error;
        node.config.insert("schedule".into(), json!("0 0 * * *"));
        assert_eq!(registry.derive_state(&node), NodeState::Ready);

        node.state = NodeState::Ready;
        node.config.clear();
        assert_eq!(registry.derive_state(&node), NodeState::Error);
    }

    #[test]
    fn kind_without_required_fields_is_ready_when_empty() {
        let registry = SchemaRegistry::builtin();
        let node = Node::new("p", NodeCategory::Logic, "json-parse");
        assert_eq!(registry.derive_state(&node), NodeState::Ready);
    }

    #[test]
    fn unknown_fields_do_not_block_readiness() {
        let registry = SchemaRegistry::builtin();
        let node = Node::new("c", NodeCategory::Trigger, "cron-trigger")
            .with_field("schedule", "*/5 * * * *")
            .with_field("colour", "blue");
        assert_eq!(registry.derive_state(&node), NodeState::Ready);
    }
}
