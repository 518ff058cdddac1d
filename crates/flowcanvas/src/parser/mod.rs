//! Static source analysis
//!
//! Builds a syntax tree from builder source text and answers structural
//! queries: call sites, class definitions, assignments, imports and
//! literal-value extraction. The source is never executed.

mod ast;
mod lexer;
mod parse;

use crate::error::ImportResult;
use crate::value::Value;
use ast::{Expr, ExprKind, Module, Span, Stmt, StmtKind};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// A call site found in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Callee name: a bare identifier or the final segment of an
    /// attribute chain (`graph.add_node` → `add_node`).
    pub function: String,
    /// Positional arguments, statically extracted
    pub args: Vec<Value>,
    /// Keyword arguments, statically extracted, in source order
    pub kwargs: IndexMap<String, Value>,
    pub line: u32,
}

/// A class definition found in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    /// Base classes as source text
    pub bases: Vec<String>,
    pub docstring: Option<String>,
    /// Annotated fields of the class body: `(name, annotation source)`
    pub fields: Vec<(String, String)>,
    pub line: u32,
}

/// A simple-name assignment found in the source. Destructuring and
/// attribute targets are not tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentInfo {
    pub variable: String,
    pub value: Value,
    pub line: u32,
}

/// A function definition found in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub line: u32,
}

/// Parser entry points.
pub struct SourceParser;

impl SourceParser {
    /// Parse source text into a queryable syntax tree.
    pub fn parse(source: &str) -> ImportResult<SyntaxTree> {
        let module = parse::parse_module(source)?;
        Ok(SyntaxTree {
            source: source.to_string(),
            module,
        })
    }

    /// Read a file and parse its contents.
    pub fn parse_file(path: impl AsRef<Path>) -> ImportResult<SyntaxTree> {
        let source = fs::read_to_string(path)?;
        Self::parse(&source)
    }
}

/// A parsed module plus the original source, ready for structural queries.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    module: Module,
}

impl SyntaxTree {
    /// The module's top-level docstring.
    pub fn docstring(&self) -> Option<&str> {
        self.module.docstring.as_deref()
    }

    /// Every call expression, in source order, optionally filtered by
    /// callee name.
    pub fn find_calls(&self, name: Option<&str>) -> Vec<CallSite> {
        let mut calls = Vec::new();
        collect_calls_stmts(&self.module.body, &mut calls);
        calls
            .into_iter()
            .filter_map(|expr| {
                let ExprKind::Call { func, args, kwargs } = &expr.kind else {
                    return None;
                };
                let function = callee_name(func)
                    .unwrap_or_else(|| self.text(func.span).trim().to_string());
                if let Some(wanted) = name {
                    if function != wanted {
                        return None;
                    }
                }
                let args = args.iter().map(|arg| self.extract_value(arg)).collect();
                let kwargs = kwargs
                    .iter()
                    .map(|(key, value)| (key.clone(), self.extract_value(value)))
                    .collect();
                Some(CallSite {
                    function,
                    args,
                    kwargs,
                    line: expr.line,
                })
            })
            .collect()
    }

    /// Every class definition, at any nesting depth, in source order.
    pub fn find_class_defs(&self) -> Vec<ClassInfo> {
        let mut classes = Vec::new();
        self.collect_classes(&self.module.body, &mut classes);
        classes
    }

    /// Simple-name assignments, optionally filtered by variable name.
    pub fn find_assignments(&self, name: Option<&str>) -> Vec<AssignmentInfo> {
        let mut assignments = Vec::new();
        self.collect_assignments(&self.module.body, &mut assignments);
        match name {
            Some(wanted) => assignments
                .into_iter()
                .filter(|a| a.variable == wanted)
                .collect(),
            None => assignments,
        }
    }

    /// Every function definition, at any nesting depth, in source order.
    pub fn find_function_defs(&self) -> Vec<FunctionInfo> {
        let mut functions = Vec::new();
        collect_functions(&self.module.body, &mut functions);
        functions
    }

    /// Imported module paths (`import a.b` → `a.b`, `from m import x` →
    /// `m.x`).
    pub fn imports(&self) -> Vec<String> {
        let mut imports = Vec::new();
        collect_imports(&self.module.body, &mut imports);
        imports
    }

    /// Reduce an expression to a [`Value`] without executing anything.
    fn extract_value(&self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Str(text) => Value::Literal(serde_json::Value::String(text.clone())),
            ExprKind::Number(text) => number_literal(text)
                .unwrap_or_else(|| Value::Unresolved(text.clone())),
            ExprKind::Bool(b) => Value::Literal(serde_json::Value::Bool(*b)),
            ExprKind::NoneLit => Value::Literal(serde_json::Value::Null),
            ExprKind::Name(name) => Value::Identifier(name.clone()),
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                Value::Sequence(items.iter().map(|item| self.extract_value(item)).collect())
            }
            ExprKind::Dict(entries) => {
                let mut extracted = Vec::new();
                for (key, value) in entries {
                    let key = self.extract_value(key);
                    if key.is_unresolved() {
                        // Entries with unextractable keys are dropped.
                        continue;
                    }
                    extracted.push((key, self.extract_value(value)));
                }
                Value::Mapping(extracted)
            }
            ExprKind::Call { func, .. } => {
                Value::Unresolved(format!("{}(...)", self.text(func.span).trim()))
            }
            _ => Value::Unresolved(self.text(expr.span).trim().to_string()),
        }
    }

    fn text(&self, span: Span) -> &str {
        let end = span.end.min(self.source.len());
        let start = span.start.min(end);
        &self.source[start..end]
    }

    fn collect_classes(&self, stmts: &[Stmt], out: &mut Vec<ClassInfo>) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::ClassDef {
                    name,
                    bases,
                    docstring,
                    body,
                    ..
                } => {
                    let mut fields = Vec::new();
                    for member in body {
                        if let StmtKind::AnnAssign {
                            target:
                                Expr {
                                    kind: ExprKind::Name(field),
                                    ..
                                },
                            annotation,
                            ..
                        } = &member.kind
                        {
                            fields.push((
                                field.clone(),
                                self.text(annotation.span).trim().to_string(),
                            ));
                        }
                    }
                    out.push(ClassInfo {
                        name: name.clone(),
                        bases: bases
                            .iter()
                            .map(|base| self.text(base.span).trim().to_string())
                            .collect(),
                        docstring: docstring.clone(),
                        fields,
                        line: stmt.line,
                    });
                    self.collect_classes(body, out);
                }
                other => {
                    for nested in nested_bodies(other) {
                        self.collect_classes(nested, out);
                    }
                }
            }
        }
    }

    fn collect_assignments(&self, stmts: &[Stmt], out: &mut Vec<AssignmentInfo>) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Assign { targets, value } => {
                    for target in targets {
                        if let ExprKind::Name(variable) = &target.kind {
                            out.push(AssignmentInfo {
                                variable: variable.clone(),
                                value: self.extract_value(value),
                                line: stmt.line,
                            });
                        }
                    }
                }
                StmtKind::AnnAssign {
                    target:
                        Expr {
                            kind: ExprKind::Name(variable),
                            ..
                        },
                    value: Some(value),
                    ..
                } => {
                    out.push(AssignmentInfo {
                        variable: variable.clone(),
                        value: self.extract_value(value),
                        line: stmt.line,
                    });
                }
                other => {
                    for nested in nested_bodies(other) {
                        self.collect_assignments(nested, out);
                    }
                }
            }
        }
    }
}

/// Final callee name of a call expression, when it has one.
fn callee_name(func: &Expr) -> Option<String> {
    match &func.kind {
        ExprKind::Name(name) => Some(name.clone()),
        ExprKind::Attribute { attr, .. } => Some(attr.clone()),
        _ => None,
    }
}

fn number_literal(text: &str) -> Option<Value> {
    let cleaned = text.replace('_', "");
    if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .ok()
            .map(|n| Value::Literal(serde_json::Value::Number(n.into())));
    }
    if let Ok(int) = cleaned.parse::<i64>() {
        return Some(Value::Literal(serde_json::Value::Number(int.into())));
    }
    let float: f64 = cleaned.parse().ok()?;
    serde_json::Number::from_f64(float).map(|n| Value::Literal(serde_json::Value::Number(n)))
}

/// Child statement lists of a compound statement.
fn nested_bodies(kind: &StmtKind) -> Vec<&[Stmt]> {
    match kind {
        StmtKind::FunctionDef { body, .. } => vec![body],
        StmtKind::ClassDef { body, .. } => vec![body],
        StmtKind::If { bodies, .. } => bodies.iter().map(|b| b.as_slice()).collect(),
        StmtKind::For { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
            vec![body, orelse]
        }
        StmtKind::With { body, .. } => vec![body],
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let mut all: Vec<&[Stmt]> = vec![body];
            all.extend(handlers.iter().map(|h| h.as_slice()));
            all.push(orelse);
            all.push(finalbody);
            all
        }
        _ => Vec::new(),
    }
}

fn collect_functions(stmts: &[Stmt], out: &mut Vec<FunctionInfo>) {
    for stmt in stmts {
        if let StmtKind::FunctionDef { name, body, .. } = &stmt.kind {
            out.push(FunctionInfo {
                name: name.clone(),
                line: stmt.line,
            });
            collect_functions(body, out);
        } else {
            for nested in nested_bodies(&stmt.kind) {
                collect_functions(nested, out);
            }
        }
    }
}

fn collect_imports(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Import { modules } => out.extend(modules.iter().cloned()),
            StmtKind::ImportFrom { module, names } => {
                for name in names {
                    if module.is_empty() {
                        out.push(name.clone());
                    } else {
                        out.push(format!("{}.{}", module, name));
                    }
                }
            }
            other => {
                for nested in nested_bodies(other) {
                    collect_imports(nested, out);
                }
            }
        }
    }
}

fn collect_calls_stmts<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a Expr>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Expr(expr) => collect_calls_expr(expr, out),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    collect_calls_expr(target, out);
                }
                collect_calls_expr(value, out);
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                collect_calls_expr(target, out);
                collect_calls_expr(annotation, out);
                if let Some(value) = value {
                    collect_calls_expr(value, out);
                }
            }
            StmtKind::AugAssign { target, value } => {
                collect_calls_expr(target, out);
                collect_calls_expr(value, out);
            }
            StmtKind::FunctionDef {
                params,
                decorators,
                body,
                ..
            } => {
                for expr in decorators.iter().chain(params.iter()) {
                    collect_calls_expr(expr, out);
                }
                collect_calls_stmts(body, out);
            }
            StmtKind::ClassDef {
                bases,
                decorators,
                body,
                ..
            } => {
                for expr in decorators.iter().chain(bases.iter()) {
                    collect_calls_expr(expr, out);
                }
                collect_calls_stmts(body, out);
            }
            StmtKind::If { tests, bodies } => {
                for test in tests {
                    collect_calls_expr(test, out);
                }
                for body in bodies {
                    collect_calls_stmts(body, out);
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                collect_calls_expr(target, out);
                collect_calls_expr(iter, out);
                collect_calls_stmts(body, out);
                collect_calls_stmts(orelse, out);
            }
            StmtKind::While { test, body, orelse } => {
                collect_calls_expr(test, out);
                collect_calls_stmts(body, out);
                collect_calls_stmts(orelse, out);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    collect_calls_expr(item, out);
                }
                collect_calls_stmts(body, out);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_calls_stmts(body, out);
                for handler in handlers {
                    collect_calls_stmts(handler, out);
                }
                collect_calls_stmts(orelse, out);
                collect_calls_stmts(finalbody, out);
            }
            StmtKind::Return(value) | StmtKind::Raise(value) => {
                if let Some(value) = value {
                    collect_calls_expr(value, out);
                }
            }
            StmtKind::Assert { test, message } => {
                collect_calls_expr(test, out);
                if let Some(message) = message {
                    collect_calls_expr(message, out);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    collect_calls_expr(target, out);
                }
            }
            StmtKind::Import { .. } | StmtKind::ImportFrom { .. } | StmtKind::Pass => {}
        }
    }
}

fn collect_calls_expr<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match &expr.kind {
        ExprKind::Attribute { value, .. } => collect_calls_expr(value, out),
        ExprKind::Call { func, args, kwargs } => {
            // Callee first: in a chained call like `g.a(..).b(..)` the
            // inner call appears earlier in source than the outer one.
            collect_calls_expr(func, out);
            out.push(expr);
            for arg in args {
                collect_calls_expr(arg, out);
            }
            for (_, value) in kwargs {
                collect_calls_expr(value, out);
            }
        }
        ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) => {
            for item in items {
                collect_calls_expr(item, out);
            }
        }
        ExprKind::Dict(entries) => {
            for (key, value) in entries {
                collect_calls_expr(key, out);
                collect_calls_expr(value, out);
            }
        }
        ExprKind::Subscript { value, index } => {
            collect_calls_expr(value, out);
            collect_calls_expr(index, out);
        }
        ExprKind::BinOp { left, right, .. } => {
            collect_calls_expr(left, out);
            collect_calls_expr(right, out);
        }
        ExprKind::UnaryOp { operand, .. } => collect_calls_expr(operand, out),
        ExprKind::IfExp { body, test, orelse } => {
            collect_calls_expr(body, out);
            collect_calls_expr(test, out);
            collect_calls_expr(orelse, out);
        }
        ExprKind::Lambda { body } => collect_calls_expr(body, out),
        ExprKind::Starred { value, .. } => collect_calls_expr(value, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""""Research assistant workflow."""
from langgraph.graph import StateGraph, END
from typing import TypedDict


class ResearchState(TypedDict):
    """Shared state."""
    query: str
    results: list[str]
    summary: str


def create_research_graph():
    graph = StateGraph(ResearchState)
    graph.add_node("search", search_web, max_results=5)
    graph.add_node("summarize", summarize_results)
    graph.add_edge("search", "summarize")
    graph.set_entry_point("search")
    return graph.compile()
"#;

    #[test]
    fn test_find_calls_filtered() {
        let tree = SourceParser::parse(SAMPLE).unwrap();
        let calls = tree.find_calls(Some("add_node"));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[0].as_str(), Some("search"));
        assert_eq!(calls[0].args[1].as_identifier(), Some("search_web"));
        assert_eq!(
            calls[0].kwargs.get("max_results"),
            Some(&Value::Literal(serde_json::json!(5)))
        );
        assert!(calls[0].line < calls[1].line);
    }

    #[test]
    fn test_find_calls_unfiltered_includes_nested() {
        let tree = SourceParser::parse(SAMPLE).unwrap();
        let calls = tree.find_calls(None);
        let names: Vec<_> = calls.iter().map(|c| c.function.as_str()).collect();
        assert!(names.contains(&"StateGraph"));
        assert!(names.contains(&"compile"));
    }

    #[test]
    fn test_find_calls_chained_in_source_order() {
        // Builders return self, so registrations are often chained.
        let tree =
            SourceParser::parse("graph.add_node(\"alpha\", fa).add_node(\"beta\", fb)\n").unwrap();
        let calls = tree.find_calls(Some("add_node"));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[0].as_str(), Some("alpha"));
        assert_eq!(calls[1].args[0].as_str(), Some("beta"));
    }

    #[test]
    fn test_find_class_defs() {
        let tree = SourceParser::parse(SAMPLE).unwrap();
        let classes = tree.find_class_defs();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "ResearchState");
        assert_eq!(classes[0].bases, vec!["TypedDict".to_string()]);
        assert_eq!(classes[0].docstring.as_deref(), Some("Shared state."));
        assert_eq!(
            classes[0].fields,
            vec![
                ("query".to_string(), "str".to_string()),
                ("results".to_string(), "list[str]".to_string()),
                ("summary".to_string(), "str".to_string()),
            ]
        );
    }

    #[test]
    fn test_find_assignments() {
        let tree = SourceParser::parse(SAMPLE).unwrap();
        let assignments = tree.find_assignments(Some("graph"));
        assert_eq!(assignments.len(), 1);
        assert_eq!(
            assignments[0].value,
            Value::Unresolved("StateGraph(...)".to_string())
        );
    }

    #[test]
    fn test_imports() {
        let tree = SourceParser::parse(SAMPLE).unwrap();
        let imports = tree.imports();
        assert!(imports.contains(&"langgraph.graph.StateGraph".to_string()));
        assert!(imports.contains(&"typing.TypedDict".to_string()));
    }

    #[test]
    fn test_docstring() {
        let tree = SourceParser::parse(SAMPLE).unwrap();
        assert_eq!(tree.docstring(), Some("Research assistant workflow."));
    }

    #[test]
    fn test_value_extraction_rules() {
        let src = "f([1, \"two\"], {\"a\": 1, g(): 2}, h(x), y + 1)\n";
        let tree = SourceParser::parse(src).unwrap();
        let call = &tree.find_calls(Some("f"))[0];
        assert_eq!(
            call.args[0],
            Value::Sequence(vec![
                Value::Literal(serde_json::json!(1)),
                Value::Literal(serde_json::json!("two")),
            ])
        );
        // The g() key cannot be extracted, so its entry is dropped.
        assert_eq!(
            call.args[1],
            Value::Mapping(vec![(
                Value::Literal(serde_json::json!("a")),
                Value::Literal(serde_json::json!(1)),
            )])
        );
        assert_eq!(call.args[2], Value::Unresolved("h(...)".to_string()));
        assert_eq!(call.args[3], Value::Unresolved("y + 1".to_string()));
    }

    #[test]
    fn test_parse_error_no_partial_tree() {
        let result = SourceParser::parse("def broken(:\n    pass\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_file_missing_is_io_error() {
        let err = SourceParser::parse_file("/nonexistent/workflow.py").unwrap_err();
        assert!(matches!(err, crate::error::ImportError::Io(_)));
    }
}
