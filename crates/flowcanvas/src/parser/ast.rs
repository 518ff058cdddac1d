//! Syntax tree for builder source text
//!
//! A deliberately small statement/expression tree: just enough structure to
//! answer the analyzer's queries. Every expression carries its byte span so
//! unresolvable constructs can be reported as source text.

/// Byte range of a node in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// String literal (adjacent literals already concatenated)
    Str(String),
    /// Numeric literal, raw text
    Number(String),
    Bool(bool),
    NoneLit,
    /// Bare name
    Name(String),
    /// `value.attr`
    Attribute { value: Box<Expr>, attr: String },
    /// `func(args, kw=..)`
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    /// Dict literal as key/value pairs
    Dict(Vec<(Expr, Expr)>),
    /// Set literal
    Set(Vec<Expr>),
    /// `value[index]`
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// Binary operation; operator text kept only for rendering
    BinOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp { op: String, operand: Box<Expr> },
    /// `body if test else orelse`
    IfExp {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// `lambda ...: body`
    Lambda { body: Box<Expr> },
    /// `*value` / `**value` in call arguments
    Starred { value: Box<Expr>, double: bool },
    /// Anything the parser walked over without building structure
    /// (comprehensions, slices); the span still covers it.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`
    Assign { targets: Vec<Expr>, value: Expr },
    /// `target: annotation [= value]`
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    /// `target op= value`
    AugAssign { target: Expr, value: Expr },
    /// `import a.b, c` — dotted module paths
    Import { modules: Vec<String> },
    /// `from module import a, b`
    ImportFrom { module: String, names: Vec<String> },
    FunctionDef {
        name: String,
        /// Parameter annotations and defaults, kept for call walking
        params: Vec<Expr>,
        decorators: Vec<Expr>,
        body: Vec<Stmt>,
    },
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        decorators: Vec<Expr>,
        docstring: Option<String>,
        body: Vec<Stmt>,
    },
    If {
        tests: Vec<Expr>,
        /// One body per test, plus a trailing else body when present
        bodies: Vec<Vec<Stmt>>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    With { items: Vec<Expr>, body: Vec<Stmt> },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Vec<Stmt>>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Raise(Option<Expr>),
    Assert { test: Expr, message: Option<Expr> },
    Delete(Vec<Expr>),
    Pass,
}

/// A parsed source module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub docstring: Option<String>,
}
