//! Integration tests for the graph model and pipeline edits.

mod helpers;

use helpers::*;
use pipeline_compiler::error::EditError;
use pipeline_compiler::parse::{self, GraphModel, NodeCategory, NodeState};
use pipeline_compiler::schema::SchemaRegistry;
use serde_json::json;

#[test]
fn linear_fixture_orders_along_the_chain() {
    let (_, graph) = parse::parse_and_build(include_str!("fixtures/scenario_linear.json")).unwrap();
    let order = graph.topological_order().unwrap();
    assert_eq!(order, vec!["trigger", "fetch", "transform", "check", "write"]);
}

#[test]
fn cycle_is_reported_starting_at_first_declared_node() {
    let (_, graph) = parse::parse_and_build(include_str!("fixtures/cycle.json")).unwrap();
    let err = graph.topological_order().unwrap_err();
    assert_eq!(err.nodes, vec!["trigger", "A", "B"]);
    assert_eq!(err.to_string(), "pipeline contains a cycle: trigger -> A -> B");
}

#[test]
fn dangling_edge_is_kept_out_of_the_arena() {
    let (_, graph) = parse::parse_and_build(include_str!("fixtures/dangling_edge.json")).unwrap();
    assert!(graph.contains("n1"));
    assert!(!graph.contains("n99"));
    assert_eq!(graph.dangling_edges().len(), 1);
    assert_eq!(graph.dangling_edges()[0].target, "n99");
    assert!(graph.outgoing("n1").is_empty());
}

#[test]
fn every_edge_points_forward_in_topological_order() {
    let p = pipeline(
        "diamond",
        vec![
            cron("t"),
            node("b", NodeCategory::Logic, "data-transform", &[("expression", "1".into())]),
            node("a", NodeCategory::Logic, "data-transform", &[("expression", "2".into())]),
            log_node("z", "done"),
        ],
        vec![
            edge("t", "event", "a", "in"),
            edge("t", "event", "b", "in"),
            edge("a", "value", "z", "in"),
            edge("b", "value", "z", "in"),
        ],
    );
    let graph = GraphModel::build(&p);
    let order = graph.topological_order().unwrap();
    // Ties broken by id.
    assert_eq!(order, vec!["t", "a", "b", "z"]);
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    for e in &p.edges {
        assert!(position(&e.source) < position(&e.target), "{}", e);
    }
}

#[test]
fn reachability_and_components() {
    let p = pipeline(
        "split",
        vec![cron("t"), log_node("l", "x"), log_node("island", "y")],
        vec![edge("t", "event", "l", "in")],
    );
    let graph = GraphModel::build(&p);
    assert_eq!(graph.reachable_from("t").into_iter().collect::<Vec<_>>(), vec!["l", "t"]);
    assert_eq!(graph.ancestors("l").into_iter().collect::<Vec<_>>(), vec!["l", "t"]);
    assert_eq!(graph.components().len(), 2);
    let link = graph.input("l", "in").unwrap();
    assert_eq!(link.peer, "t");
    assert_eq!(link.peer_port, "event");
}

#[test]
fn edits_bump_version_and_reject_conflicts() {
    let mut p = minimal_pipeline("edit");
    assert_eq!(p.version, 0);

    p.add_node(log_node("extra", "again")).unwrap();
    assert_eq!(p.version, 1);
    assert_eq!(
        p.add_node(log_node("extra", "dup")),
        Err(EditError::DuplicateNode("extra".into()))
    );

    assert_eq!(
        p.add_edge(edge("tick", "event", "say", "in")),
        Err(EditError::PortOccupied {
            node_id: "say".into(),
            port: "in".into()
        })
    );
    assert_eq!(
        p.add_edge(edge("tick", "event", "ghost", "in")),
        Err(EditError::UnknownNode("ghost".into()))
    );
    p.add_edge(edge("tick", "event", "extra", "in")).unwrap();
    assert_eq!(p.version, 2);

    p.remove_node("tick").unwrap();
    assert!(p.edges.is_empty());
    assert_eq!(p.version, 3);
    assert!(p.remove_edge("tick", "event", "say", "in").is_err());
    assert_eq!(p.version, 3);
}

#[test]
fn config_updates_derive_node_state() {
    let schemas = SchemaRegistry::builtin();
    let mut p = minimal_pipeline("state");

    let state = p
        .update_config(
            "tick",
            json!({"schedule": "0 0 * * *"}).as_object().unwrap().clone(),
            &schemas,
        )
        .unwrap();
    assert_eq!(state, NodeState::Ready);

    let state = p
        .update_config("tick", json!({"schedule": "whenever"}).as_object().unwrap().clone(), &schemas)
        .unwrap();
    assert_eq!(state, NodeState::Error);

    let state = p
        .update_config("tick", json!({"schedule": ""}).as_object().unwrap().clone(), &schemas)
        .unwrap();
    assert_eq!(state, NodeState::Error);
}

#[test]
fn clearing_a_ready_node_is_an_error_not_a_draft() {
    let schemas = SchemaRegistry::builtin();
    let mut p = minimal_pipeline("cleared");

    let state = p
        .update_config("tick", json!({"schedule": "*/5 * * * *"}).as_object().unwrap().clone(), &schemas)
        .unwrap();
    assert_eq!(state, NodeState::Ready);

    let state = p.update_config("tick", Default::default(), &schemas).unwrap();
    assert_eq!(state, NodeState::Error);
}

#[test]
fn never_ready_node_goes_back_to_draft() {
    let schemas = SchemaRegistry::builtin();
    let mut p = minimal_pipeline("fresh");

    let state = p
        .update_config("say", json!({"level": "info"}).as_object().unwrap().clone(), &schemas)
        .unwrap();
    assert_eq!(state, NodeState::Configured);

    let state = p.update_config("say", Default::default(), &schemas).unwrap();
    assert_eq!(state, NodeState::Draft);
}
