//! Error types shared across the compiler, runner and service layers.
//!
//! Graph defects are never errors: the validator reports them as
//! [`Diagnostic`] values. The types here cover the conditions that abort the
//! call that requested an action.

use crate::parse::graph::CycleError;
use crate::validate::{Diagnostic, Severity};

/// The pipeline document could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to parse pipeline JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::Json(_) => "P001",
        }
    }
}

/// An edit to a pipeline was rejected; the pipeline is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    #[error("node '{0}' does not exist")]
    UnknownNode(String),

    #[error("port '{port}' of node '{node_id}' already has an incoming edge")]
    PortOccupied { node_id: String, port: String },

    #[error("edge {from}.{from_port} -> {to}.{to_port} does not exist")]
    UnknownEdge {
        from: String,
        from_port: String,
        to: String,
        to_port: String,
    },
}

/// Code generation could not produce runnable output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("pipeline has no trigger node")]
    NoTrigger,

    #[error("node '{node_id}' has unsupported kind '{kind}'")]
    UnsupportedKind { node_id: String, kind: String },

    #[error("{binding} binding of node '{node_id}' cannot be resolved: {detail}")]
    UnresolvedBinding {
        node_id: String,
        binding: String,
        detail: String,
    },

    #[error("emitter for node '{node_id}' did not produce output port '{port}'")]
    MissingOutput { node_id: String, port: String },

    #[error("trigger node '{node_id}' produced no trigger registration")]
    MissingTriggerHook { node_id: String },
}

impl CompileError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Cycle(_) => "cycle-detected",
            CompileError::NoTrigger => "no-trigger",
            CompileError::UnsupportedKind { .. } => "unsupported-kind",
            CompileError::UnresolvedBinding { .. } => "unresolved-binding",
            CompileError::MissingOutput { .. } => "missing-output",
            CompileError::MissingTriggerHook { .. } => "missing-trigger-hook",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            CompileError::Cycle(_) | CompileError::NoTrigger => None,
            CompileError::UnsupportedKind { node_id, .. }
            | CompileError::UnresolvedBinding { node_id, .. }
            | CompileError::MissingOutput { node_id, .. }
            | CompileError::MissingTriggerHook { node_id } => Some(node_id),
        }
    }
}

/// A simulation request violated a runner precondition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("simulation already running for pipeline '{pipeline_id}'")]
    Conflict {
        pipeline_id: String,
        session_id: String,
    },

    #[error("simulation session '{0}' not found")]
    SessionNotFound(String),
}

/// Failures of the request surface exposed to the editor.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("simulation session '{0}' not found")]
    SessionNotFound(String),

    #[error("pipeline failed validation with {} error(s)", error_count(.diagnostics))]
    ValidationFailed { diagnostics: Vec<Diagnostic> },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("simulation already running for pipeline '{pipeline_id}'")]
    Conflict {
        pipeline_id: String,
        session_id: String,
    },
}

impl From<SimulationError> for ServiceError {
    fn from(e: SimulationError) -> Self {
        match e {
            SimulationError::Conflict {
                pipeline_id,
                session_id,
            } => ServiceError::Conflict {
                pipeline_id,
                session_id,
            },
            SimulationError::SessionNotFound(id) => ServiceError::SessionNotFound(id),
        }
    }
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count()
}
