//! Pipeline document types.
//!
//! These types are the serde target for the editor's pipeline JSON and the
//! in-memory model that the validator and generator borrow read-only.
//! Kind-specific knowledge (fields, ports, bindings) lives in `crate::schema`;
//! a node here is just its identity, tags and raw config.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EditError;
use crate::schema::SchemaRegistry;

// =============================================================================
// PIPELINE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Incremented on every structural change.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.category.is_trigger())
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), EditError> {
        if self.node(&node.id).is_some() {
            return Err(EditError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        self.bump();
        Ok(())
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node, EditError> {
        let pos = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| EditError::UnknownNode(id.to_string()))?;
        let node = self.nodes.remove(pos);
        self.edges.retain(|e| e.source != id && e.target != id);
        self.bump();
        Ok(node)
    }

    /// Add an edge. Both endpoints must exist and the target port must be free.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), EditError> {
        for id in [&edge.source, &edge.target] {
            if self.node(id).is_none() {
                return Err(EditError::UnknownNode(id.clone()));
            }
        }
        if self
            .edges
            .iter()
            .any(|e| e.target == edge.target && e.target_port == edge.target_port)
        {
            return Err(EditError::PortOccupied {
                node_id: edge.target,
                port: edge.target_port,
            });
        }
        self.edges.push(edge);
        self.bump();
        Ok(())
    }

    pub fn remove_edge(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<Edge, EditError> {
        let pos = self
            .edges
            .iter()
            .position(|e| {
                e.source == source
                    && e.source_port == source_port
                    && e.target == target
                    && e.target_port == target_port
            })
            .ok_or_else(|| EditError::UnknownEdge {
                from: source.to_string(),
                from_port: source_port.to_string(),
                to: target.to_string(),
                to_port: target_port.to_string(),
            })?;
        let edge = self.edges.remove(pos);
        self.bump();
        Ok(edge)
    }

    /// Replace a node's config and re-derive its state. Returns the new state.
    pub fn update_config(
        &mut self,
        id: &str,
        config: Map<String, Value>,
        schemas: &SchemaRegistry,
    ) -> Result<NodeState, EditError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| EditError::UnknownNode(id.to_string()))?;
        node.config = config;
        node.state = schemas.derive_state(node);
        let state = node.state;
        self.bump();
        Ok(state)
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub category: NodeCategory,
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, category: NodeCategory, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            kind: kind.into(),
            config: Map::new(),
            state: NodeState::Draft,
            label: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.config.get(name).filter(|v| !v.is_null())
    }

    /// A non-empty string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeCategory {
    Trigger,
    Capability,
    Logic,
    Contract,
    ChainConfig,
}

impl NodeCategory {
    pub fn is_trigger(self) -> bool {
        matches!(self, NodeCategory::Trigger)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeCategory::Trigger => "trigger",
            NodeCategory::Capability => "capability",
            NodeCategory::Logic => "logic",
            NodeCategory::Contract => "contract",
            NodeCategory::ChainConfig => "chain-config",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of a node's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// No config fields set yet.
    #[default]
    Draft,
    /// Some fields set, not all required fields valid.
    Configured,
    /// Every required field present and type-valid.
    Ready,
    /// Was ready, then an edit made it invalid.
    Error,
}

// =============================================================================
// EDGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source, self.source_port, self.target, self.target_port
        )
    }
}
