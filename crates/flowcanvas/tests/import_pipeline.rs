//! End-to-end import pipeline tests: source text in, positioned and
//! validated workflow out.

use flowcanvas::{
    ImportError, LayoutConfig, NodeType, Workflow, WorkflowImporter, CONDITIONAL_TARGET,
};

const RESEARCH_SOURCE: &str = r#""""Research assistant that searches the web and summarizes findings."""
from typing import TypedDict

from langgraph.graph import StateGraph


class ResearchState(TypedDict):
    query: str
    results: list
    summary: str


def search_web(state):
    return {"results": run_search(state["query"])}


def summarize_results(state):
    return {"summary": condense(state["results"])}


def create_research_graph():
    graph = StateGraph(ResearchState)
    graph.add_node("search", search_web)
    graph.add_node("summarize", summarize_results)
    graph.add_node("respond", build_response)
    graph.add_edge("search", "summarize")
    graph.add_edge("summarize", "respond")
    graph.set_entry_point("search")
    return graph.compile()
"#;

fn import(algorithm: &str) -> Workflow {
    WorkflowImporter::new()
        .import_from_code(RESEARCH_SOURCE, algorithm)
        .unwrap()
}

#[test]
fn extracts_three_nodes_and_two_edges() {
    let workflow = import("hierarchical");
    assert_eq!(workflow.name, "research");
    assert_eq!(
        workflow.description,
        "Research assistant that searches the web and summarizes findings."
    );
    assert_eq!(workflow.entry_point, "search");

    let ids: Vec<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["search", "summarize", "respond"]);
    assert_eq!(workflow.edges.len(), 2);
    assert_eq!(workflow.edges[0].from, "search");
    assert_eq!(workflow.edges[0].to, "summarize");
    assert_eq!(workflow.edges[1].from, "summarize");
    assert_eq!(workflow.edges[1].to, "respond");
}

#[test]
fn infers_node_types_and_state_schema() {
    let workflow = import("hierarchical");
    assert_eq!(workflow.get_node("search").unwrap().node_type, NodeType::Tool);
    assert_eq!(
        workflow.get_node("summarize").unwrap().node_type,
        NodeType::Llm
    );
    assert_eq!(
        workflow.get_node("respond").unwrap().node_type,
        NodeType::Llm
    );

    let fields: Vec<&str> = workflow.state_schema.keys().map(String::as_str).collect();
    assert_eq!(fields, vec!["query", "results", "summary"]);
    assert_eq!(
        workflow.state_schema.get("results").map(String::as_str),
        Some("list")
    );
}

#[test]
fn hierarchical_layout_centers_single_node_layers() {
    let workflow = import("hierarchical");
    let config = LayoutConfig::default();
    let center_x = (config.canvas_width - config.spacing_x) / 2.0;
    let y0 = config.margin + config.node_height / 2.0;

    for (depth, id) in ["search", "summarize", "respond"].iter().enumerate() {
        let position = workflow.get_node(id).unwrap().position.unwrap();
        assert_eq!(position.x, center_x);
        assert_eq!(position.y, y0 + depth as f64 * config.spacing_y);
    }
}

#[test]
fn unknown_algorithm_raises() {
    let err = WorkflowImporter::new()
        .import_from_code(RESEARCH_SOURCE, "spiral")
        .unwrap_err();
    assert!(matches!(err, ImportError::UnknownAlgorithm(name) if name == "spiral"));
}

#[test]
fn malformed_source_raises_parse_error() {
    let err = WorkflowImporter::new()
        .import_from_code("def broken(:\n    pass\n", "hierarchical")
        .unwrap_err();
    assert!(matches!(err, ImportError::Parse { .. }));
}

#[test]
fn validate_passes_on_imported_workflow() {
    let importer = WorkflowImporter::new();
    let workflow = importer
        .import_from_code(RESEARCH_SOURCE, "hierarchical")
        .unwrap();
    let report = importer.validate(&workflow);
    assert!(report.valid);
    assert!(report.errors.is_empty());
}

#[test]
fn serde_round_trip_preserves_node_order() {
    let workflow = import("grid");
    let text = serde_json::to_string_pretty(&workflow).unwrap();
    let back: Workflow = serde_json::from_str(&text).unwrap();
    assert_eq!(back, workflow);
    let ids: Vec<&str> = back.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["search", "summarize", "respond"]);
}

#[test]
fn seeded_force_layout_is_reproducible() {
    let config = LayoutConfig {
        seed: Some(99),
        ..LayoutConfig::default()
    };
    let importer = WorkflowImporter::with_layout_config(config);
    let first = importer
        .import_from_code(RESEARCH_SOURCE, "force")
        .unwrap();
    let second = importer
        .import_from_code(RESEARCH_SOURCE, "force")
        .unwrap();
    assert_eq!(first.nodes, second.nodes);
}

#[test]
fn conditional_edges_survive_the_pipeline() {
    let source = r#"
graph.add_node("triage", classify_ticket)
graph.add_node("billing_agent", handle_billing)
graph.add_conditional_edges("triage", pick_route, {"billing": "billing_agent"})
graph.set_entry_point("triage")
"#;
    let importer = WorkflowImporter::new();
    let workflow = importer.import_from_code(source, "hierarchical").unwrap();
    assert_eq!(workflow.edges.len(), 1);
    assert_eq!(workflow.edges[0].to, CONDITIONAL_TARGET);
    assert_eq!(
        workflow.edges[0].condition.as_deref(),
        Some("route_via_pick_route")
    );

    // The sentinel target is not a node, but validation stays clean.
    let report = importer.validate(&workflow);
    assert!(report.valid);
    assert!(!report.warnings.iter().any(|w| w.contains("unknown target")));
}

#[test]
fn dot_export_lists_every_node_and_edge() {
    let workflow = import("hierarchical");
    let dot = workflow.to_dot();
    for id in ["search", "summarize", "respond"] {
        assert!(dot.contains(&format!("\"{id}\"")));
    }
    assert_eq!(dot.matches("->").count(), workflow.edges.len());
}
