//! FlowCanvas — code⇄visual round-trip core for workflow graphs
//!
//! Statically parses source text that builds a workflow through a small
//! builder vocabulary (`add_node`, `add_edge`, `add_conditional_edges`,
//! `set_entry_point`), reconstructs the abstract [`Workflow`] model and
//! computes 2D canvas coordinates for every node. The source is never
//! executed.
//!
//! ```
//! use flowcanvas::WorkflowImporter;
//!
//! let source = r#"
//! graph.add_node("search", search_web)
//! graph.add_node("respond", generate_answer)
//! graph.add_edge("search", "respond")
//! graph.set_entry_point("search")
//! "#;
//!
//! let importer = WorkflowImporter::new();
//! let workflow = importer.import_from_code(source, "hierarchical").unwrap();
//! assert_eq!(workflow.node_count(), 2);
//! assert!(workflow.nodes.iter().all(|n| n.position.is_some()));
//! ```

pub mod error;
pub mod extract;
pub mod import;
pub mod layout;
pub mod model;
pub mod parser;
pub mod value;

pub use error::{ImportError, ImportReport, ImportResult, IntoImportReport};
pub use extract::GraphExtractor;
pub use import::{ValidationReport, WorkflowImporter};
pub use layout::{LayoutAlgorithm, LayoutConfig, LayoutEngine};
pub use model::{
    CONDITIONAL_TARGET, NodeType, Position, Workflow, WorkflowEdge, WorkflowNode,
};
pub use parser::{SourceParser, SyntaxTree};
pub use value::Value;
