//! End-to-end: JSON document → validate → compile → simulate → log stream.

mod helpers;

use helpers::*;
use pipeline_compiler::logs::{LogEvent, TerminalReason};
use pipeline_compiler::parse;
use pipeline_compiler::secrets::StaticSecretResolver;
use pipeline_compiler::service::{InMemoryPipelineStore, WorkflowService};
use pipeline_compiler::simulation::{SimulationConfig, SimulationRunner};
use pipeline_compiler::validate;

#[test]
fn linear_document_validates_and_compiles() {
    let json = include_str!("fixtures/scenario_linear.json");
    let pipeline = parse::parse(json).unwrap();
    assert!(validate::validate(&pipeline).is_empty());

    let store = InMemoryPipelineStore::new();
    store.insert(pipeline);
    let service = WorkflowService::new(
        store,
        StaticSecretResolver::new(),
        SimulationRunner::default(),
    );

    let out = service.compile("price-relay").unwrap();
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    assert_eq!(out.pipeline_id, "price-relay");
    assert_eq!(out.code.matches("// [").count(), 5);

    let wire = serde_json::to_value(&out).unwrap();
    assert_eq!(wire["pipelineVersion"], 3);
    assert_eq!(wire["warnings"], serde_json::json!([]));
}

#[tokio::test]
#[cfg(unix)]
async fn linear_document_simulates_to_completion() {
    let pipeline = parse::parse(include_str!("fixtures/scenario_linear.json")).unwrap();
    let store = InMemoryPipelineStore::new();
    store.insert(pipeline);

    // Stand-in simulator: report how many fragments the generated file holds.
    let config = SimulationConfig {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            "grep -c '// \\[' \"$1\"".into(),
            "sh".into(),
            "{entry}".into(),
        ],
        timeout_ms: 10_000,
        ..Default::default()
    };
    let service = WorkflowService::new(store, StaticSecretResolver::new(), SimulationRunner::new(config));

    let session_id = service.simulate("price-relay").unwrap();
    let events = collect(service.subscribe(&session_id).unwrap()).await;
    assert_eq!(stdout_lines(&events), vec!["5"]);
    assert_eq!(
        events.last(),
        Some(&LogEvent::Complete {
            success: true,
            exit_code: Some(0),
            reason: TerminalReason::Exited
        })
    );
}
