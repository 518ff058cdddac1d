//! Workflow import pipeline
//!
//! Ties the pieces together: parse source text, extract the workflow,
//! run the layout engine and merge positions back. Validation is a
//! separate, non-throwing classification pass over the finished
//! document.

use crate::error::ImportResult;
use crate::extract::GraphExtractor;
use crate::layout::{LayoutAlgorithm, LayoutConfig, LayoutEngine};
use crate::model::{CONDITIONAL_TARGET, NodeType, Workflow};
use crate::parser::SourceParser;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of [`WorkflowImporter::validate`]. Never raised; errors and
/// warnings are collected and classified.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Imports workflows from builder source text.
#[derive(Debug, Clone, Default)]
pub struct WorkflowImporter {
    layout: LayoutEngine,
}

impl WorkflowImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout_config(config: LayoutConfig) -> Self {
        Self {
            layout: LayoutEngine::with_config(config),
        }
    }

    /// Parse, extract and lay out a workflow from source text. Fails
    /// fast on malformed source or an unknown algorithm name.
    pub fn import_from_code(&self, source: &str, algorithm: &str) -> ImportResult<Workflow> {
        let algorithm: LayoutAlgorithm = algorithm.parse()?;
        let tree = SourceParser::parse(source)?;
        let mut workflow = GraphExtractor::extract(&tree);
        workflow.nodes = self.layout.layout(
            &workflow.nodes,
            &workflow.edges,
            algorithm,
            &workflow.entry_point,
        );
        workflow
            .metadata
            .insert("source".to_string(), "imported".into());
        workflow.metadata.insert(
            "layout_algorithm".to_string(),
            algorithm.as_str().into(),
        );
        debug!(
            workflow = %workflow.name,
            nodes = workflow.node_count(),
            edges = workflow.edge_count(),
            "import complete"
        );
        Ok(workflow)
    }

    /// Read a source file and delegate to [`import_from_code`].
    ///
    /// [`import_from_code`]: WorkflowImporter::import_from_code
    pub fn import_from_file(
        &self,
        path: impl AsRef<Path>,
        algorithm: &str,
    ) -> ImportResult<Workflow> {
        let source = std::fs::read_to_string(path)?;
        self.import_from_code(&source, algorithm)
    }

    /// Classify structural problems in a finished workflow. Missing
    /// names and positions are errors; everything recoverable by a
    /// renderer is a warning.
    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if workflow.name.is_empty() {
            errors.push("workflow has no name".to_string());
        }
        for node in &workflow.nodes {
            if node.position.is_none() {
                errors.push(format!("node '{}' has no position", node.id));
            }
        }

        if workflow.nodes.is_empty() {
            warnings.push("workflow has no nodes".to_string());
        }
        if workflow.state_schema.is_empty() {
            warnings.push("workflow has no state schema".to_string());
        }
        for node in &workflow.nodes {
            if node.node_type == NodeType::Custom {
                warnings.push(format!(
                    "node '{}' has no recognized type, treated as custom",
                    node.id
                ));
            }
        }

        let ids: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &workflow.edges {
            if !ids.contains(edge.from.as_str()) {
                warnings.push(format!(
                    "edge references unknown source node '{}'",
                    edge.from
                ));
            }
            // Conditional edges carry a sentinel target on purpose.
            if edge.to != CONDITIONAL_TARGET && !ids.contains(edge.to.as_str()) {
                warnings.push(format!(
                    "edge references unknown target node '{}'",
                    edge.to
                ));
            }
        }

        if !errors.is_empty() {
            warn!(errors = errors.len(), "workflow failed validation");
        }
        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::model::{Position, WorkflowEdge, WorkflowNode};
    use std::io::Write;

    const SOURCE: &str = r#""""Support triage bot."""


class TriageState(TypedDict):
    ticket: str
    route: str


def create_triage_graph():
    graph = StateGraph(TriageState)
    graph.add_node("classify", classify_ticket)
    graph.add_node("search_kb", search_knowledge_base)
    graph.add_node("respond", generate_response)
    graph.add_edge("classify", "search_kb")
    graph.add_edge("search_kb", "respond")
    graph.set_entry_point("classify")
    return graph.compile()
"#;

    #[test]
    fn test_import_from_code_positions_every_node() {
        let importer = WorkflowImporter::new();
        let workflow = importer.import_from_code(SOURCE, "hierarchical").unwrap();
        assert_eq!(workflow.name, "triage");
        assert_eq!(workflow.node_count(), 3);
        assert!(workflow.nodes.iter().all(|n| n.position.is_some()));
        assert_eq!(
            workflow.metadata.get("source").and_then(|v| v.as_str()),
            Some("imported")
        );
        assert_eq!(
            workflow
                .metadata
                .get("layout_algorithm")
                .and_then(|v| v.as_str()),
            Some("hierarchical")
        );
    }

    #[test]
    fn test_unknown_algorithm_is_rejected_before_parsing() {
        let importer = WorkflowImporter::new();
        let err = importer.import_from_code(SOURCE, "spiral").unwrap_err();
        assert!(matches!(err, ImportError::UnknownAlgorithm(name) if name == "spiral"));
    }

    #[test]
    fn test_malformed_source_is_a_parse_error() {
        let importer = WorkflowImporter::new();
        let err = importer
            .import_from_code("graph.add_node(\"a\",\n", "grid")
            .unwrap_err();
        assert!(matches!(err, ImportError::Parse { .. }));
    }

    #[test]
    fn test_import_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SOURCE.as_bytes()).unwrap();
        let importer = WorkflowImporter::new();
        let workflow = importer.import_from_file(file.path(), "grid").unwrap();
        assert_eq!(workflow.node_count(), 3);
    }

    #[test]
    fn test_validate_accepts_imported_workflow() {
        let importer = WorkflowImporter::new();
        let workflow = importer.import_from_code(SOURCE, "hierarchical").unwrap();
        let report = importer.validate(&workflow);
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_validate_flags_missing_positions() {
        let mut workflow = Workflow::new("w");
        workflow
            .nodes
            .push(WorkflowNode::new("a", NodeType::Tool));
        let report = WorkflowImporter::new().validate(&workflow);
        assert!(!report.valid);
        assert!(report.errors[0].contains("'a'"));
    }

    #[test]
    fn test_validate_dangling_edge_is_a_warning() {
        let mut workflow = Workflow::new("w");
        let mut node = WorkflowNode::new("a", NodeType::Tool);
        node.position = Some(Position::new(0.0, 0.0));
        workflow.nodes.push(node);
        workflow.edges.push(WorkflowEdge::new("a", "ghost"));
        let report = WorkflowImporter::new().validate(&workflow);
        assert!(report.valid);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("unknown target node 'ghost'")));
    }

    #[test]
    fn test_validate_conditional_sentinel_is_exempt() {
        let mut workflow = Workflow::new("w");
        let mut node = WorkflowNode::new("a", NodeType::Conditional);
        node.position = Some(Position::new(0.0, 0.0));
        workflow.nodes.push(node);
        workflow.edges.push(WorkflowEdge::conditional(
            "a",
            CONDITIONAL_TARGET,
            "route_via_pick",
        ));
        let report = WorkflowImporter::new().validate(&workflow);
        assert!(report.valid);
        assert!(!report
            .warnings
            .iter()
            .any(|w| w.contains("unknown target")));
    }
}
