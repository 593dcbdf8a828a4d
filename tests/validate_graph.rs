//! Integration tests for graph and node validation.

mod helpers;

use helpers::*;
use pipeline_compiler::parse::{self, NodeCategory};
use pipeline_compiler::validate::{self, DiagnosticCode, Severity, is_compilable};
use serde_json::json;

fn codes(diagnostics: &[validate::Diagnostic]) -> Vec<DiagnosticCode> {
    diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn linear_pipeline_is_clean() {
    let diagnostics = validate::validate(&linear_pipeline());
    assert!(diagnostics.is_empty(), "expected no diagnostics, got: {:?}", diagnostics);
}

#[test]
fn unknown_edge_target_is_the_only_report() {
    let p = parse::parse(include_str!("fixtures/dangling_edge.json")).unwrap();
    let diagnostics = validate::validate(&p);
    let v = serde_json::to_value(&diagnostics).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 1, "{}", v);
    assert_eq!(v[0]["code"], "unknown-node-reference");
    assert_eq!(v[0]["nodeId"], "n99");
    assert_eq!(v[0]["severity"], "error");
}

#[test]
fn cycle_is_the_only_report() {
    let p = parse::parse(include_str!("fixtures/cycle.json")).unwrap();
    let diagnostics = validate::validate(&p);
    assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
    assert_eq!(diagnostics[0].code, DiagnosticCode::CycleDetected);
    assert_eq!(diagnostics[0].nodes, vec!["trigger", "A", "B"]);
}

#[test]
fn duplicate_ids_stop_validation() {
    let p = pipeline("dup", vec![cron("x"), log_node("x", "again")], vec![]);
    let diagnostics = validate::validate(&p);
    assert_eq!(codes(&diagnostics), vec![DiagnosticCode::DuplicateNodeId]);
}

#[test]
fn missing_trigger() {
    let p = pipeline("none", vec![log_node("l", "hello")], vec![]);
    let diagnostics = validate::validate(&p);
    assert!(codes(&diagnostics).contains(&DiagnosticCode::NoTrigger), "{:?}", diagnostics);
    assert!(!is_compilable(&diagnostics));
}

#[test]
fn fan_in_does_not_hide_other_errors() {
    let p = pipeline(
        "fan",
        vec![
            cron("a"),
            cron("b"),
            node("l", NodeCategory::Logic, "log", &[]),
        ],
        vec![edge("a", "event", "l", "in"), edge("b", "event", "l", "in")],
    );
    let diagnostics = validate::validate(&p);
    let found = codes(&diagnostics);
    assert!(found.contains(&DiagnosticCode::PortFanIn), "{:?}", found);
    assert!(found.contains(&DiagnosticCode::MissingRequiredField), "{:?}", found);
    let fan = diagnostics.iter().find(|d| d.code == DiagnosticCode::PortFanIn).unwrap();
    assert_eq!(fan.node_id.as_deref(), Some("l"));
    assert_eq!(fan.port.as_deref(), Some("in"));
}

#[test]
fn trigger_with_incoming_edge() {
    let p = pipeline(
        "in",
        vec![cron("t"), cron("u"), log_node("l", "x")],
        vec![edge("t", "event", "u", "in"), edge("u", "event", "l", "in")],
    );
    let diagnostics = validate::validate(&p);
    let d = diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::TriggerHasIncoming)
        .expect("trigger-has-incoming");
    assert_eq!(d.node_id.as_deref(), Some("u"));
    assert_eq!(d.nodes, vec!["t"]);
}

#[test]
fn disconnected_island_is_a_warning() {
    let mut p = minimal_pipeline("island");
    p.nodes.push(log_node("stray", "unused"));
    let diagnostics = validate::validate(&p);
    assert_eq!(codes(&diagnostics), vec![DiagnosticCode::UnreachableSubgraph]);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(diagnostics[0].nodes, vec!["stray"]);
    assert!(is_compilable(&diagnostics));
}

#[test]
fn node_fed_only_by_a_shared_source_is_reported() {
    // tok feeds both r (which t reaches) and d (which no trigger reaches).
    let token = "0x2222222222222222222222222222222222222222";
    let p = pipeline(
        "sidecar",
        vec![
            cron("t"),
            node("tok", NodeCategory::Contract, "erc20-token", &[("address", token.into())]),
            node(
                "r",
                NodeCategory::Capability,
                "evm-read",
                &[
                    ("chainName", "ethereum-testnet-sepolia".into()),
                    ("functionName", "totalSupply".into()),
                ],
            ),
            log_node("e", "supply"),
            log_node("d", "left behind"),
        ],
        vec![
            edge("t", "event", "r", "in"),
            edge("tok", "contract", "r", "contract"),
            edge("r", "result", "e", "in"),
            edge("tok", "address", "d", "in"),
        ],
    );
    let diagnostics = validate::validate(&p);
    assert_eq!(codes(&diagnostics), vec![DiagnosticCode::UnreachableSubgraph]);
    assert_eq!(diagnostics[0].node_id.as_deref(), Some("d"));
    assert_eq!(diagnostics[0].nodes, vec!["d"]);
    assert!(is_compilable(&diagnostics));
}

#[test]
fn pipeline_without_effects_is_a_warning() {
    let p = pipeline(
        "quiet",
        vec![
            cron("t"),
            node("x", NodeCategory::Logic, "data-transform", &[("expression", "input".into())]),
        ],
        vec![edge("t", "event", "x", "in")],
    );
    let diagnostics = validate::validate(&p);
    assert_eq!(codes(&diagnostics), vec![DiagnosticCode::NoEffectReachable]);
}

#[test]
fn port_problems_name_the_offending_end() {
    let p = pipeline(
        "ports",
        vec![
            cron("t"),
            node(
                "w",
                NodeCategory::Capability,
                "evm-write",
                &[
                    ("contractAddress", "0x1111111111111111111111111111111111111111".into()),
                    ("gasLimit", 100000.into()),
                ],
            ),
            log_node("l", "x"),
        ],
        vec![edge("t", "event", "w", "chain"), edge("t", "nope", "l", "in")],
    );
    let diagnostics = validate::validate(&p);

    let mismatch = diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::PortTypeMismatch)
        .expect("port-type-mismatch");
    assert_eq!(mismatch.node_id.as_deref(), Some("w"));
    assert_eq!(mismatch.nodes, vec!["t", "w"]);

    let unknown = diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::UnknownPort)
        .expect("unknown-port");
    assert_eq!(unknown.node_id.as_deref(), Some("t"));
    assert_eq!(unknown.port.as_deref(), Some("nope"));
}

#[test]
fn field_ceilings_are_enforced() {
    let addresses = vec!["0x2222222222222222222222222222222222222222"; 6];
    let p = pipeline(
        "limits",
        vec![
            node(
                "t",
                NodeCategory::Trigger,
                "evm-log-trigger",
                &[
                    ("chainName", "ethereum-mainnet".into()),
                    ("contractAddresses", json!(addresses)),
                    ("eventSignature", "Transfer(address,address,uint256)".into()),
                ],
            ),
            node(
                "w",
                NodeCategory::Capability,
                "evm-write",
                &[
                    ("chainName", "ethereum-mainnet".into()),
                    ("contractAddress", "0x1111111111111111111111111111111111111111".into()),
                    ("gasLimit", 9_000_000.into()),
                ],
            ),
        ],
        vec![edge("t", "log", "w", "in")],
    );
    let diagnostics = validate::validate(&p);
    let fields: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::InvalidFieldValue)
        .map(|d| (d.node_id.as_deref().unwrap(), d.field.as_deref().unwrap()))
        .collect();
    assert_eq!(fields, vec![("t", "contractAddresses"), ("w", "gasLimit")]);
}

#[test]
fn unknown_kind_and_wrong_category() {
    let p = pipeline(
        "kinds",
        vec![
            cron("t"),
            node("m", NodeCategory::Logic, "teleport", &[]),
            node("c", NodeCategory::Capability, "condition", &[("operator", "exists".into())]),
            log_node("l", "x"),
        ],
        vec![
            edge("t", "event", "m", "in"),
            edge("t", "event", "c", "in"),
            edge("c", "true", "l", "in"),
        ],
    );
    let diagnostics = validate::validate(&p);
    let found = codes(&diagnostics);
    assert!(found.contains(&DiagnosticCode::UnknownKind), "{:?}", found);
    assert!(found.contains(&DiagnosticCode::CategoryMismatch), "{:?}", found);
}

#[test]
fn unknown_field_alone_keeps_pipeline_compilable() {
    let mut p = minimal_pipeline("extra");
    p.nodes[1].config.insert("colour".into(), json!("blue"));
    let diagnostics = validate::validate(&p);
    assert_eq!(codes(&diagnostics), vec![DiagnosticCode::UnknownField]);
    assert_eq!(diagnostics[0].field.as_deref(), Some("colour"));
    assert!(is_compilable(&diagnostics));
}
