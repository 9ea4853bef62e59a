//! Integration tests for graph-level structural checks and schema
//! conformance reporting.

mod helpers;

use helpers::*;
use nodeflow_schema::schema::SchemaRegistry;
use nodeflow_schema::validate::{
    IssueCode, ValidationOptions, ViolationLevel, validate_json, validate_workflow,
};
use nodeflow_schema::workflow::parse_workflow;
use serde_json::json;

#[test]
fn support_workflow_passes() {
    let json = include_str!("fixtures/support_agent.json");
    let workflow = parse_workflow(json).expect("Should parse");
    let result = validate(&workflow);
    assert!(result.valid);
    assert!(result.warnings.is_empty(), "Expected no warnings, got: {:?}", result.warnings);
}

#[test]
fn no_trigger() {
    let wf = workflow(
        vec![node("Create", "acme.helpdesk", json!({ "title": "x" }))],
        json!({}),
    );
    let result = validate(&wf);
    assert!(codes(&result).contains(&IssueCode::NoTrigger), "Should flag no trigger: {:?}", result.warnings);
    assert!(result.valid, "structural findings are warnings");

    let found = with_code(&result, IssueCode::NoTrigger);
    assert_eq!(found[0].node_name, None);
    assert_eq!(found[0].violation_level, Some(ViolationLevel::Minor));
}

#[test]
fn options_silence_structural_checks() {
    let wf = workflow(
        vec![node("Create", "acme.helpdesk", json!({ "title": "x" }))],
        json!({}),
    );
    let options = ValidationOptions {
        allow_no_trigger: true,
        allow_disconnected_nodes: true,
        ..ValidationOptions::default()
    };
    let result = validate_with(&wf, &options);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn disconnected_node_excludes_triggers_notes_and_suppliers() {
    let mut connections = main_edges(&[("Start", "Agent")]);
    add_capability_edge(&mut connections, "Model", "ai_languageModel", "Agent");
    let wf = workflow(
        vec![
            trigger(),
            node("Agent", "acme.agent", json!({ "prompt": "hi" })),
            node("Model", "acme.chatModel", json!({})),
            node("Note", "acme.stickyNote", json!({ "content": "todo" })),
            node("Orphan", "acme.set", json!({})),
        ],
        connections,
    );
    let result = validate(&wf);
    let disconnected: Vec<_> = with_code(&result, IssueCode::DisconnectedNode)
        .into_iter()
        .filter_map(|w| w.node_name.as_deref())
        .collect();
    assert_eq!(disconnected, vec!["Orphan"]);
    assert_eq!(result.warnings.len(), 1, "{:?}", result.warnings);
}

#[test]
fn input_index_beyond_declared_slots() {
    let wf = workflow(
        vec![trigger(), node("Merge", "acme.merge", json!({}))],
        json!({
            "Start": { "main": [[
                { "node": "Merge", "type": "main", "index": 0 },
                { "node": "Merge", "type": "main", "index": 2 }
            ]] }
        }),
    );
    let result = validate(&wf);
    let found = with_code(&result, IssueCode::InvalidInputIndex);
    assert_eq!(found.len(), 1, "{:?}", result.warnings);
    assert_eq!(found[0].node_name.as_deref(), Some("Merge"));
    assert!(found[0].message.contains("targets input 2"), "{}", found[0].message);
}

#[test]
fn input_index_needs_type_metadata() {
    let wf = workflow(
        vec![trigger(), node("Merge", "acme.merge", json!({}))],
        json!({ "Start": { "main": [[{ "node": "Merge", "type": "main", "index": 5 }]] } }),
    );
    let registry = registry();
    let result = validate_workflow(&wf, &registry, None, &ValidationOptions::default());
    assert!(
        !codes(&result).contains(&IssueCode::InvalidInputIndex),
        "{:?}",
        result.warnings
    );
}

#[test]
fn input_index_unchecked_when_count_is_undeclared() {
    let wf = workflow(
        vec![trigger(), node("Build", "acme.set", json!({}))],
        json!({ "Start": { "main": [[{ "node": "Build", "type": "main", "index": 3 }]] } }),
    );
    let result = validate(&wf);
    assert!(
        !codes(&result).contains(&IssueCode::InvalidInputIndex),
        "{:?}",
        result.warnings
    );
}

#[test]
fn connection_to_unknown_node() {
    let wf = workflow(
        vec![trigger(), node("Create", "acme.helpdesk", json!({ "title": "x" }))],
        json!({
            "Start": { "main": [[
                { "node": "Create", "type": "main", "index": 0 },
                { "node": "Ghost", "type": "main", "index": 0 }
            ]] },
            "Phantom": { "main": [[{ "node": "Create", "type": "main", "index": 0 }]] }
        }),
    );
    let result = validate(&wf);
    let found = with_code(&result, IssueCode::InvalidConnection);
    assert_eq!(found.len(), 2, "{:?}", result.warnings);
    assert_eq!(found[0].node_name.as_deref(), Some("Start"));
    assert!(found[0].message.contains("'Ghost'"));
    assert_eq!(found[1].node_name, None);
    assert!(found[1].message.contains("'Phantom'"));
}

#[test]
fn schema_failures_become_parameter_warnings() {
    let wf = workflow(
        vec![
            trigger(),
            node("Create", "acme.helpdesk", json!({ "operation": "create", "priority": "urgent" })),
        ],
        main_edges(&[("Start", "Create")]),
    );
    let result = validate(&wf);
    assert!(result.valid);
    let found = with_code(&result, IssueCode::InvalidParameter);
    let paths: Vec<_> = found.iter().filter_map(|w| w.parameter_path.as_deref()).collect();
    assert_eq!(paths, vec!["parameters.title", "parameters.priority"]);
    assert!(found.iter().all(|w| w.node_name.as_deref() == Some("Create")));
    assert!(found.iter().all(|w| w.violation_level == Some(ViolationLevel::Major)));
}

#[test]
fn schema_check_can_be_disabled() {
    let wf = workflow(
        vec![trigger(), node("Create", "acme.helpdesk", json!({}))],
        main_edges(&[("Start", "Create")]),
    );
    let options = ValidationOptions {
        validate_schema: false,
        ..ValidationOptions::default()
    };
    let result = validate_with(&wf, &options);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn strict_mode_reports_undeclared_parameters() {
    let wf = workflow(
        vec![
            trigger(),
            node("Notify", "acme.slack", json!({ "channel": "C1", "text": "hi", "emoji": ":wave:" })),
        ],
        main_edges(&[("Start", "Notify")]),
    );
    assert!(validate(&wf).warnings.is_empty());

    let options = ValidationOptions {
        strict_mode: true,
        ..ValidationOptions::default()
    };
    let result = validate_with(&wf, &options);
    let found = with_code(&result, IssueCode::InvalidParameter);
    assert_eq!(found.len(), 1, "{:?}", result.warnings);
    assert_eq!(found[0].parameter_path.as_deref(), Some("parameters.emoji"));
}

#[test]
fn unknown_node_types_are_not_judged() {
    let wf = workflow(
        vec![trigger(), node("Custom", "community.widget", json!({ "anything": [1, 2, 3] }))],
        main_edges(&[("Start", "Custom")]),
    );
    let result = validate(&wf);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn unparseable_document_is_the_only_hard_failure() {
    let registry = SchemaRegistry::from_catalog(catalog());
    let err = validate_json("{ \"connections\": {} }", &registry, None, &ValidationOptions::default());
    assert!(err.is_err());

    let ok = validate_json(
        r#"{ "nodes": [{ "name": "A", "type": "acme.set" }], "connections": { "A": { "main": [[{ "node": "B" }]] } } }"#,
        &registry,
        None,
        &ValidationOptions::default(),
    )
    .expect("Should validate despite problems");
    assert!(ok.valid);
    assert!(codes(&ok).contains(&IssueCode::InvalidConnection));
}
