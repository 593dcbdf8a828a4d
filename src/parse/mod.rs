//! Parse phase: JSON → pipeline types + graph arena.

pub mod graph;
pub mod types;

pub use graph::{CycleError, GraphModel, Link};
pub use types::*;

use crate::error::ParseError;

/// Deserialize a pipeline JSON string.
pub fn parse(json: &str) -> Result<Pipeline, ParseError> {
    Ok(serde_json::from_str::<Pipeline>(json)?)
}

/// Parse JSON and build the graph in one step.
pub fn parse_and_build(json: &str) -> Result<(Pipeline, GraphModel), ParseError> {
    let pipeline = parse(json)?;
    let graph = GraphModel::build(&pipeline);
    Ok((pipeline, graph))
}
