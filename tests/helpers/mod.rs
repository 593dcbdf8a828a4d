#![allow(dead_code)]

use std::time::Duration;

use pipeline_compiler::logs::{LogEvent, LogStream, Subscription};
use pipeline_compiler::parse::{self, Edge, Node, NodeCategory, Pipeline};
use pipeline_compiler::simulation::SimulationConfig;
use serde_json::Value;

// =============================================================================
// Pipeline builders
// =============================================================================

/// Scenario: http-trigger → http-fetch → data-transform → condition → evm-write.
pub fn linear_pipeline() -> Pipeline {
    parse::parse(include_str!("../fixtures/scenario_linear.json")).expect("fixture parses")
}

pub fn node(id: &str, category: NodeCategory, kind: &str, fields: &[(&str, Value)]) -> Node {
    fields
        .iter()
        .fold(Node::new(id, category, kind), |n, (k, v)| n.with_field(*k, v.clone()))
}

pub fn edge(source: &str, source_port: &str, target: &str, target_port: &str) -> Edge {
    Edge::new(source, source_port, target, target_port)
}

pub fn pipeline(id: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Pipeline {
    let mut p = Pipeline::new(id, id);
    p.nodes = nodes;
    p.edges = edges;
    p
}

pub fn cron(id: &str) -> Node {
    node(id, NodeCategory::Trigger, "cron-trigger", &[("schedule", "*/5 * * * *".into())])
}

pub fn log_node(id: &str, message: &str) -> Node {
    node(id, NodeCategory::Logic, "log", &[("message", message.into())])
}

/// cron → log: the smallest compilable pipeline.
pub fn minimal_pipeline(id: &str) -> Pipeline {
    pipeline(
        id,
        vec![cron("tick"), log_node("say", "tick")],
        vec![edge("tick", "event", "say", "in")],
    )
}

// =============================================================================
// Simulation
// =============================================================================

/// Runs generated code with `sh`, so tests control the program output by
/// handing the runner a shell script as "code".
pub fn shell_config(timeout_ms: u64) -> SimulationConfig {
    SimulationConfig {
        program: "sh".into(),
        args: vec!["{entry}".into()],
        entry_file: "main.sh".into(),
        timeout_ms,
        retention_ms: 2_000,
        ..Default::default()
    }
}

/// Every event until the stream ends, failing the test if it stalls.
pub async fn collect(mut subscription: Subscription) -> Vec<LogEvent> {
    tokio::time::timeout(Duration::from_secs(10), async move {
        let mut events = Vec::new();
        while let Some(event) = subscription.recv().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("log stream did not complete")
}

pub fn stdout_lines(events: &[LogEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            LogEvent::Log { stream, line } if *stream == LogStream::Stdout => Some(line.clone()),
            _ => None,
        })
        .collect()
}
