//! Workflow extraction from parsed source
//!
//! Recognizes the builder vocabulary — node registration, edge
//! registration, conditional-edge registration and entry-point setting —
//! and reconstructs the abstract workflow without running any code.

use crate::model::{
    CONDITIONAL_TARGET, NodeType, Workflow, WorkflowEdge, WorkflowNode,
};
use crate::parser::{CallSite, SyntaxTree};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Builder vocabulary recognized in source.
pub const NODE_CALL: &str = "add_node";
pub const EDGE_CALL: &str = "add_edge";
pub const CONDITIONAL_EDGE_CALL: &str = "add_conditional_edges";
pub const ENTRY_POINT_CALL: &str = "set_entry_point";

/// Workflow-name resolution tables.
const CREATION_PREFIX: &str = "create_";
const NAME_SUFFIXES: &[&str] = &["_graph", "_workflow", "_agent"];
const PLACEHOLDER_NAMES: &[&str] = &["graph", "agent", "workflow"];
const WORKFLOW_VAR_SUFFIXES: &[&str] = &["graph", "workflow", "agent"];
const FALLBACK_NAME: &str = "imported_workflow";
const FALLBACK_DESCRIPTION: &str = "Imported workflow";

/// State-schema resolution tables.
const STATE_NAME_MARKER: &str = "State";
const STATE_BASE_MARKERS: &[&str] = &["TypedDict", "BaseModel", "MessagesState", "AgentState"];

/// Node-type inference table: first keyword hit wins, in table order.
const TYPE_KEYWORDS: &[(NodeType, &[&str])] = &[
    (
        NodeType::Tool,
        &["tool", "search", "fetch", "scrape", "lookup", "api"],
    ),
    (
        NodeType::Llm,
        &["llm", "agent", "chat", "model", "generate", "summar", "respond"],
    ),
    (
        NodeType::Conditional,
        &["conditional", "branch", "route", "decide", "check"],
    ),
    (
        NodeType::Approval,
        &["approval", "approve", "review", "human"],
    ),
];

/// Fallback entry point when the source never sets one.
const DEFAULT_ENTRY_POINT: &str = "start";

/// Reconstructs the abstract workflow from a parsed syntax tree.
pub struct GraphExtractor;

impl GraphExtractor {
    /// Extract the workflow model. Zero builder calls is not an error;
    /// the result is a structurally valid empty workflow.
    pub fn extract(tree: &SyntaxTree) -> Workflow {
        let mut workflow = Workflow::new(&resolve_name(tree));
        workflow.description = tree
            .docstring()
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());
        workflow.state_schema = resolve_state_schema(tree);

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut entry_point: Option<String> = None;

        // One pass over every call keeps nodes and edges in source order.
        for call in tree.find_calls(None) {
            match call.function.as_str() {
                NODE_CALL => {
                    if let Some(node) = resolve_node(&call) {
                        if seen_ids.insert(node.id.clone()) {
                            debug!(node = %node.id, node_type = %node.node_type, "registered node");
                            workflow.nodes.push(node);
                        } else {
                            warn!(node = %node.id, line = call.line, "duplicate node id ignored");
                        }
                    }
                }
                EDGE_CALL => {
                    if let (Some(from), Some(to)) = (
                        call.args.first().and_then(Value::name),
                        call.args.get(1).and_then(Value::name),
                    ) {
                        workflow.edges.push(WorkflowEdge::new(from, to));
                    } else {
                        warn!(line = call.line, "edge call with unresolvable endpoints skipped");
                    }
                }
                CONDITIONAL_EDGE_CALL => {
                    if let Some(from) = call.args.first().and_then(Value::name) {
                        // Branch targets are chosen at run time; the
                        // sentinel target records that explicitly.
                        let router = call
                            .args
                            .get(1)
                            .and_then(Value::name)
                            .unwrap_or("router");
                        workflow.edges.push(WorkflowEdge::conditional(
                            from,
                            CONDITIONAL_TARGET,
                            &format!("route_via_{}", router),
                        ));
                    } else {
                        warn!(line = call.line, "conditional edge with unresolvable source skipped");
                    }
                }
                ENTRY_POINT_CALL => {
                    if entry_point.is_none() {
                        entry_point = call
                            .args
                            .first()
                            .and_then(Value::name)
                            .map(str::to_string);
                    }
                }
                _ => {}
            }
        }

        workflow.entry_point =
            entry_point.unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());
        debug!(
            name = %workflow.name,
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            "extraction complete"
        );
        workflow
    }
}

/// Node-registration call → node. The first positional argument must
/// resolve to a string or identifier; otherwise the call is skipped.
fn resolve_node(call: &CallSite) -> Option<WorkflowNode> {
    let id = match call.args.first().and_then(Value::name) {
        Some(id) => id.to_string(),
        None => {
            warn!(line = call.line, "node call without a resolvable id skipped");
            return None;
        }
    };

    let handler = call.args.get(1);
    let mut config: IndexMap<String, Value> = IndexMap::new();
    if let Some(handler) = handler {
        config.insert("handler".to_string(), handler.clone());
    }
    for (key, value) in &call.kwargs {
        config.insert(key.clone(), value.clone());
    }

    let node_type = infer_node_type(&id, handler.and_then(|h| h.name()));
    Some(WorkflowNode::new(&id, node_type).with_config(config))
}

/// Best-effort type inference by case-insensitive keyword substring
/// match over the node id and handler name. Falls back to `custom`,
/// surfaced later as a validation warning.
fn infer_node_type(id: &str, handler: Option<&str>) -> NodeType {
    let haystack = format!("{} {}", id, handler.unwrap_or("")).to_lowercase();
    for (node_type, keywords) in TYPE_KEYWORDS {
        if keywords.iter().any(|keyword| haystack.contains(keyword)) {
            return *node_type;
        }
    }
    NodeType::Custom
}

/// Workflow-name resolution, in priority order: creation-prefixed
/// function name, then workflow-suffixed variable name, then a
/// deterministic fallback.
fn resolve_name(tree: &SyntaxTree) -> String {
    for function in tree.find_function_defs() {
        if let Some(remainder) = function.name.strip_prefix(CREATION_PREFIX) {
            let candidate = strip_name_suffixes(remainder);
            if !candidate.is_empty() && !PLACEHOLDER_NAMES.contains(&candidate) {
                return candidate.to_string();
            }
        }
    }
    for assignment in tree.find_assignments(None) {
        let variable = assignment.variable.as_str();
        if PLACEHOLDER_NAMES.contains(&variable) {
            continue;
        }
        if WORKFLOW_VAR_SUFFIXES
            .iter()
            .any(|suffix| variable.ends_with(suffix))
        {
            let candidate = strip_name_suffixes(variable);
            if !candidate.is_empty() && !PLACEHOLDER_NAMES.contains(&candidate) {
                return candidate.to_string();
            }
        }
    }
    FALLBACK_NAME.to_string()
}

fn strip_name_suffixes(name: &str) -> &str {
    for suffix in NAME_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

/// First class whose name carries the state marker or whose bases include
/// a recognized marker base. Absence yields an empty schema, which is a
/// validation warning rather than an error.
fn resolve_state_schema(tree: &SyntaxTree) -> IndexMap<String, String> {
    for class in tree.find_class_defs() {
        let name_matches = class.name.contains(STATE_NAME_MARKER);
        let base_matches = class.bases.iter().any(|base| {
            STATE_BASE_MARKERS
                .iter()
                .any(|marker| base == marker || base.ends_with(&format!(".{}", marker)))
        });
        if name_matches || base_matches {
            return class.fields.into_iter().collect();
        }
    }
    IndexMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SourceParser;

    fn extract(src: &str) -> Workflow {
        GraphExtractor::extract(&SourceParser::parse(src).unwrap())
    }

    const RESEARCH: &str = r#""""Research assistant."""
from typing import TypedDict


class ResearchState(TypedDict):
    query: str
    summary: str


def create_research_graph():
    graph = StateGraph(ResearchState)
    graph.add_node("search", search_web)
    graph.add_node("summarize", summarize_results)
    graph.add_node("respond", respond_fn)
    graph.add_edge("search", "summarize")
    graph.add_edge("summarize", "respond")
    graph.set_entry_point("search")
    return graph.compile()
"#;

    #[test]
    fn test_extracts_nodes_in_first_seen_order() {
        let workflow = extract(RESEARCH);
        let ids: Vec<_> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["search", "summarize", "respond"]);
        assert_eq!(workflow.edges.len(), 2);
        assert_eq!(workflow.entry_point, "search");
    }

    #[test]
    fn test_name_from_creation_function() {
        let workflow = extract(RESEARCH);
        assert_eq!(workflow.name, "research");
        assert_eq!(workflow.description, "Research assistant.");
    }

    #[test]
    fn test_name_from_workflow_variable() {
        let src = "support_workflow = StateGraph(dict)\n";
        assert_eq!(extract(src).name, "support");
    }

    #[test]
    fn test_name_falls_back_when_placeholder() {
        let src = "def create_graph():\n    graph = StateGraph(dict)\n";
        assert_eq!(extract(src).name, FALLBACK_NAME);
    }

    #[test]
    fn test_state_schema_from_marker_class() {
        let workflow = extract(RESEARCH);
        assert_eq!(workflow.state_schema.get("query").map(String::as_str), Some("str"));
        assert_eq!(workflow.state_schema.len(), 2);
    }

    #[test]
    fn test_node_type_inference() {
        assert_eq!(infer_node_type("search", None), NodeType::Tool);
        assert_eq!(infer_node_type("summarize", None), NodeType::Llm);
        assert_eq!(infer_node_type("route_next", None), NodeType::Conditional);
        assert_eq!(infer_node_type("human_review", None), NodeType::Approval);
        assert_eq!(infer_node_type("step_three", None), NodeType::Custom);
        // Handler names contribute signal when the id is generic.
        assert_eq!(infer_node_type("step_one", Some("call_llm")), NodeType::Llm);
        // Table order decides: tool keywords win over llm keywords.
        assert_eq!(infer_node_type("search_agent", None), NodeType::Tool);
    }

    #[test]
    fn test_conditional_edge_uses_sentinel_target() {
        let src = "g.add_node(\"triage\", triage_fn)\n\
                   g.add_conditional_edges(\"triage\", pick_route, {\"a\": \"x\"})\n";
        let workflow = extract(src);
        assert_eq!(workflow.edges.len(), 1);
        assert_eq!(workflow.edges[0].to, CONDITIONAL_TARGET);
        assert_eq!(
            workflow.edges[0].condition.as_deref(),
            Some("route_via_pick_route")
        );
    }

    #[test]
    fn test_chained_registrations_keep_source_order() {
        let src =
            "graph.add_node(\"alpha\", fa).add_node(\"beta\", fb).add_edge(\"alpha\", \"beta\")\n";
        let workflow = extract(src);
        let ids: Vec<_> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(workflow.edges.len(), 1);
    }

    #[test]
    fn test_duplicate_node_ids_keep_first() {
        let src = "g.add_node(\"a\", first)\ng.add_node(\"a\", second)\n";
        let workflow = extract(src);
        assert_eq!(workflow.nodes.len(), 1);
        assert_eq!(
            workflow.nodes[0].config.get("handler"),
            Some(&Value::Identifier("first".to_string()))
        );
    }

    #[test]
    fn test_node_kwargs_become_config() {
        let src = "g.add_node(\"search\", search_fn, max_results=5, provider=\"brave\")\n";
        let workflow = extract(src);
        let config = &workflow.nodes[0].config;
        assert_eq!(config.get("max_results"), Some(&Value::from(5i64)));
        assert_eq!(config.get("provider"), Some(&Value::from("brave")));
    }

    #[test]
    fn test_empty_source_yields_empty_workflow() {
        let workflow = extract("x = 1\n");
        assert!(workflow.nodes.is_empty());
        assert!(workflow.edges.is_empty());
        assert_eq!(workflow.entry_point, DEFAULT_ENTRY_POINT);
        assert!(workflow.state_schema.is_empty());
    }

    #[test]
    fn test_unresolvable_node_id_is_skipped() {
        let src = "g.add_node(make_id(), fn)\ng.add_node(\"ok\", fn)\n";
        let workflow = extract(src);
        assert_eq!(workflow.nodes.len(), 1);
        assert_eq!(workflow.nodes[0].id, "ok");
    }
}
