//! Recursive-descent parser over the token stream
//!
//! Builds the [`Module`] tree. The grammar covers the statement and
//! expression forms builder source files actually use; constructs with no
//! structural meaning for the analyzer (comprehensions, slices) are walked
//! over and kept as opaque spans.

use super::ast::{Expr, ExprKind, Module, Span, Stmt, StmtKind};
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{ImportError, ImportResult};

const AUG_OPS: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@=",
];

/// Binary operator levels, lowest precedence first. Comparison, boolean and
/// power operators are handled separately.
const BINOP_LEVELS: &[&[&str]] = &[
    &["|"],
    &["^"],
    &["&"],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "//", "%", "@"],
];

const COMPARE_OPS: &[&str] = &["==", "!=", "<", "<=", ">", ">="];

pub fn parse_module(src: &str) -> ImportResult<Module> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.check_eof() {
        parser.parse_statement(&mut body)?;
    }
    let docstring = match body.first() {
        Some(Stmt {
            kind: StmtKind::Expr(Expr {
                kind: ExprKind::Str(text),
                ..
            }),
            ..
        }) => Some(text.clone()),
        _ => None,
    };
    Ok(Module { body, docstring })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn check_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn check_name(&self, name: &str) -> bool {
        self.peek().is_name(name)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_name(&mut self, name: &str) -> bool {
        if self.check_name(name) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> ImportResult<Token> {
        if self.check_op(op) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(&format!("expected '{}'", op)))
        }
    }

    fn expect_any_name(&mut self) -> ImportResult<(String, Token)> {
        match self.peek().kind.clone() {
            TokenKind::Name(name) => {
                let token = self.bump();
                Ok((name, token))
            }
            _ => Err(self.unexpected("expected a name")),
        }
    }

    fn unexpected(&self, context: &str) -> ImportError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Name(n) => format!("'{}'", n),
            TokenKind::Number(n) => format!("number '{}'", n),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Op(o) => format!("'{}'", o),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        };
        ImportError::parse(token.line, token.column, format!("{}, found {}", context, found))
    }

    fn expect_statement_end(&mut self) -> ImportResult<()> {
        match self.peek().kind {
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("expected end of statement")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> ImportResult<()> {
        let line = self.peek().line;
        if self.check_op("@") {
            return self.parse_decorated(out);
        }
        if self.check_name("async") {
            // `async` is transparent for static analysis.
            self.bump();
        }
        match self.peek().kind.clone() {
            TokenKind::Name(name) => match name.as_str() {
                "def" => {
                    let stmt = self.parse_function_def(Vec::new())?;
                    out.push(stmt);
                    Ok(())
                }
                "class" => {
                    let stmt = self.parse_class_def(Vec::new())?;
                    out.push(stmt);
                    Ok(())
                }
                "if" => {
                    let stmt = self.parse_if()?;
                    out.push(stmt);
                    Ok(())
                }
                "for" => {
                    let stmt = self.parse_for()?;
                    out.push(stmt);
                    Ok(())
                }
                "while" => {
                    let stmt = self.parse_while()?;
                    out.push(stmt);
                    Ok(())
                }
                "with" => {
                    let stmt = self.parse_with()?;
                    out.push(stmt);
                    Ok(())
                }
                "try" => {
                    let stmt = self.parse_try()?;
                    out.push(stmt);
                    Ok(())
                }
                _ => self.parse_simple_line(out),
            },
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Indent => Err(ImportError::parse(line, self.peek().column, "unexpected indent")),
            _ => self.parse_simple_line(out),
        }
    }

    fn parse_decorated(&mut self, out: &mut Vec<Stmt>) -> ImportResult<()> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.parse_expr()?);
            self.expect_statement_end()?;
        }
        self.eat_name("async");
        if self.check_name("def") {
            let stmt = self.parse_function_def(decorators)?;
            out.push(stmt);
            Ok(())
        } else if self.check_name("class") {
            let stmt = self.parse_class_def(decorators)?;
            out.push(stmt);
            Ok(())
        } else {
            Err(self.unexpected("expected 'def' or 'class' after decorator"))
        }
    }

    /// One physical line of simple statements, `;`-separated.
    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> ImportResult<()> {
        loop {
            let stmt = self.parse_simple_statement()?;
            out.push(stmt);
            if self.eat_op(";") {
                if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_statement_end()
    }

    fn parse_simple_statement(&mut self) -> ImportResult<Stmt> {
        let line = self.peek().line;
        if let TokenKind::Name(name) = self.peek().kind.clone() {
            match name.as_str() {
                "return" => {
                    self.bump();
                    let value = if self.at_expr_start() {
                        Some(self.parse_expr_list()?)
                    } else {
                        None
                    };
                    return Ok(Stmt {
                        kind: StmtKind::Return(value),
                        line,
                    });
                }
                "raise" => {
                    self.bump();
                    let value = if self.at_expr_start() {
                        let exc = self.parse_expr()?;
                        if self.eat_name("from") {
                            self.parse_expr()?;
                        }
                        Some(exc)
                    } else {
                        None
                    };
                    return Ok(Stmt {
                        kind: StmtKind::Raise(value),
                        line,
                    });
                }
                "pass" | "break" | "continue" => {
                    self.bump();
                    return Ok(Stmt {
                        kind: StmtKind::Pass,
                        line,
                    });
                }
                "global" | "nonlocal" => {
                    self.bump();
                    loop {
                        self.expect_any_name()?;
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                    return Ok(Stmt {
                        kind: StmtKind::Pass,
                        line,
                    });
                }
                "del" => {
                    self.bump();
                    let mut targets = vec![self.parse_expr()?];
                    while self.eat_op(",") {
                        targets.push(self.parse_expr()?);
                    }
                    return Ok(Stmt {
                        kind: StmtKind::Delete(targets),
                        line,
                    });
                }
                "assert" => {
                    self.bump();
                    let test = self.parse_expr()?;
                    let message = if self.eat_op(",") {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    return Ok(Stmt {
                        kind: StmtKind::Assert { test, message },
                        line,
                    });
                }
                "import" => return self.parse_import(line),
                "from" => return self.parse_from_import(line),
                _ => {}
            }
        }
        self.parse_assignment_or_expr(line)
    }

    fn parse_import(&mut self, line: u32) -> ImportResult<Stmt> {
        self.bump();
        let mut modules = Vec::new();
        loop {
            modules.push(self.parse_dotted_name()?);
            if self.eat_name("as") {
                self.expect_any_name()?;
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::Import { modules },
            line,
        })
    }

    fn parse_from_import(&mut self, line: u32) -> ImportResult<Stmt> {
        self.bump();
        let mut module = String::new();
        while self.eat_op(".") || self.eat_op("...") {
            // Relative import levels carry no module text.
        }
        if matches!(self.peek().kind, TokenKind::Name(ref n) if n != "import") {
            module = self.parse_dotted_name()?;
        }
        if !self.eat_name("import") {
            return Err(self.unexpected("expected 'import'"));
        }
        let mut names = Vec::new();
        if self.eat_op("*") {
            names.push("*".to_string());
        } else {
            let parenthesized = self.eat_op("(");
            loop {
                let (name, _) = self.expect_any_name()?;
                if self.eat_name("as") {
                    self.expect_any_name()?;
                }
                names.push(name);
                if !self.eat_op(",") {
                    break;
                }
                if parenthesized && self.check_op(")") {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
        }
        Ok(Stmt {
            kind: StmtKind::ImportFrom { module, names },
            line,
        })
    }

    fn parse_dotted_name(&mut self) -> ImportResult<String> {
        let (first, _) = self.expect_any_name()?;
        let mut name = first;
        while self.check_op(".") && matches!(self.peek_at(1).kind, TokenKind::Name(_)) {
            self.bump();
            let (segment, _) = self.expect_any_name()?;
            name.push('.');
            name.push_str(&segment);
        }
        Ok(name)
    }

    fn parse_assignment_or_expr(&mut self, line: u32) -> ImportResult<Stmt> {
        let first = self.parse_expr_list()?;

        if self.check_op(":") {
            // Annotated assignment: `target: annotation [= value]`
            self.bump();
            let annotation = self.parse_expr()?;
            let value = if self.eat_op("=") {
                Some(self.parse_expr_list()?)
            } else {
                None
            };
            return Ok(Stmt {
                kind: StmtKind::AnnAssign {
                    target: first,
                    annotation,
                    value,
                },
                line,
            });
        }

        if self.check_op("=") {
            let mut targets = vec![first];
            let value = loop {
                self.expect_op("=")?;
                let next = self.parse_expr_list()?;
                if self.check_op("=") {
                    targets.push(next);
                } else {
                    break next;
                }
            };
            return Ok(Stmt {
                kind: StmtKind::Assign { targets, value },
                line,
            });
        }

        for op in AUG_OPS {
            if self.check_op(op) {
                self.bump();
                let value = self.parse_expr_list()?;
                return Ok(Stmt {
                    kind: StmtKind::AugAssign {
                        target: first,
                        value,
                    },
                    line,
                });
            }
        }

        Ok(Stmt {
            kind: StmtKind::Expr(first),
            line,
        })
    }

    // ------------------------------------------------------------------
    // Compound statements
    // ------------------------------------------------------------------

    fn parse_suite(&mut self) -> ImportResult<Vec<Stmt>> {
        self.expect_op(":")?;
        let mut body = Vec::new();
        if matches!(self.peek().kind, TokenKind::Newline) {
            self.bump();
            if !matches!(self.peek().kind, TokenKind::Indent) {
                return Err(self.unexpected("expected an indented block"));
            }
            self.bump();
            while !matches!(self.peek().kind, TokenKind::Dedent | TokenKind::Eof) {
                self.parse_statement(&mut body)?;
            }
            if matches!(self.peek().kind, TokenKind::Dedent) {
                self.bump();
            }
        } else {
            // Inline suite: `def f(): return 1`
            self.parse_simple_line(&mut body)?;
        }
        Ok(body)
    }

    fn parse_function_def(&mut self, decorators: Vec<Expr>) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // def
        let (name, _) = self.expect_any_name()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        while !self.check_op(")") {
            if self.eat_op("*") || self.eat_op("**") || self.eat_op("/") {
                self.eat_op(",");
                continue;
            }
            if matches!(self.peek().kind, TokenKind::Name(_)) {
                self.bump();
            } else {
                return Err(self.unexpected("expected a parameter name"));
            }
            if self.eat_op(":") {
                params.push(self.parse_expr()?);
            }
            if self.eat_op("=") {
                params.push(self.parse_expr()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.parse_expr()?;
        }
        let body = self.parse_suite()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef {
                name,
                params,
                decorators,
                body,
            },
            line,
        })
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // class
        let (name, _) = self.expect_any_name()?;
        let mut bases = Vec::new();
        if self.eat_op("(") {
            while !self.check_op(")") {
                // `metaclass=...` style keywords are not bases.
                if matches!(self.peek().kind, TokenKind::Name(_))
                    && self.peek_at(1).is_op("=")
                {
                    self.bump();
                    self.bump();
                    self.parse_expr()?;
                } else {
                    bases.push(self.parse_expr()?);
                }
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(")")?;
        }
        let body = self.parse_suite()?;
        let docstring = match body.first() {
            Some(Stmt {
                kind: StmtKind::Expr(Expr {
                    kind: ExprKind::Str(text),
                    ..
                }),
                ..
            }) => Some(text.clone()),
            _ => None,
        };
        Ok(Stmt {
            kind: StmtKind::ClassDef {
                name,
                bases,
                decorators,
                docstring,
                body,
            },
            line,
        })
    }

    fn parse_if(&mut self) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // if
        let mut tests = vec![self.parse_expr()?];
        let mut bodies = vec![self.parse_suite()?];
        loop {
            if self.check_name("elif") {
                self.bump();
                tests.push(self.parse_expr()?);
                bodies.push(self.parse_suite()?);
            } else if self.check_name("else") {
                self.bump();
                bodies.push(self.parse_suite()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { tests, bodies },
            line,
        })
    }

    fn parse_for(&mut self) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // for
        let target = self.parse_target_list()?;
        if !self.eat_name("in") {
            return Err(self.unexpected("expected 'in'"));
        }
        let iter = self.parse_expr_list()?;
        let body = self.parse_suite()?;
        let orelse = if self.check_name("else") {
            self.bump();
            self.parse_suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            line,
        })
    }

    fn parse_while(&mut self) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // while
        let test = self.parse_expr()?;
        let body = self.parse_suite()?;
        let orelse = if self.check_name("else") {
            self.bump();
            self.parse_suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::While { test, body, orelse },
            line,
        })
    }

    fn parse_with(&mut self) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // with
        let mut items = Vec::new();
        loop {
            items.push(self.parse_expr()?);
            if self.eat_name("as") {
                self.parse_target_list()?;
            }
            if !self.eat_op(",") {
                break;
            }
        }
        let body = self.parse_suite()?;
        Ok(Stmt {
            kind: StmtKind::With { items, body },
            line,
        })
    }

    fn parse_try(&mut self) -> ImportResult<Stmt> {
        let line = self.peek().line;
        self.bump(); // try
        let body = self.parse_suite()?;
        let mut handlers = Vec::new();
        while self.check_name("except") {
            self.bump();
            if self.at_expr_start() {
                self.parse_expr()?;
                if self.eat_name("as") {
                    self.expect_any_name()?;
                }
            }
            handlers.push(self.parse_suite()?);
        }
        let orelse = if self.check_name("else") {
            self.bump();
            self.parse_suite()?
        } else {
            Vec::new()
        };
        let finalbody = if self.check_name("finally") {
            self.bump();
            self.parse_suite()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.unexpected("expected 'except' or 'finally'"));
        }
        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            line,
        })
    }

    /// Assignment/loop targets: names, attributes, subscripts, tuples and
    /// starred forms. Binary operators never appear here, which keeps the
    /// `for x in xs` keyword unambiguous.
    fn parse_target_list(&mut self) -> ImportResult<Expr> {
        let first = self.parse_target()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let start = first.span;
        let line = first.line;
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.at_expr_start() {
                break;
            }
            items.push(self.parse_target()?);
        }
        let span = start.to(items.last().map(|e| e.span).unwrap_or(start));
        Ok(Expr {
            kind: ExprKind::Tuple(items),
            span,
            line,
        })
    }

    fn parse_target(&mut self) -> ImportResult<Expr> {
        if self.check_op("*") {
            let star = self.bump();
            let inner = self.parse_postfix()?;
            let span = Span::new(star.start, inner.span.end);
            let line = star.line;
            return Ok(Expr {
                kind: ExprKind::Starred {
                    value: Box::new(inner),
                    double: false,
                },
                span,
                line,
            });
        }
        if self.check_op("(") || self.check_op("[") {
            // Nested unpacking target
            return self.parse_atom();
        }
        self.parse_postfix()
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn at_expr_start(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Name(name) => !matches!(
                name.as_str(),
                "import" | "as" | "in" | "is" | "and" | "or" | "if" | "else" | "for"
            ),
            TokenKind::Number(_) | TokenKind::Str(_) => true,
            TokenKind::Op(op) => {
                matches!(op.as_str(), "(" | "[" | "{" | "*" | "**" | "-" | "+" | "~" | "...")
            }
            _ => false,
        }
    }

    /// Comma-separated expression list; two or more items form a tuple.
    fn parse_expr_list(&mut self) -> ImportResult<Expr> {
        let first = self.parse_expr()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let start = first.span;
        let line = first.line;
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.at_expr_start() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        let span = start.to(items.last().map(|e| e.span).unwrap_or(start));
        Ok(Expr {
            kind: ExprKind::Tuple(items),
            span,
            line,
        })
    }

    fn parse_expr(&mut self) -> ImportResult<Expr> {
        if self.check_name("lambda") {
            return self.parse_lambda();
        }
        let value = self.parse_or()?;
        if self.check_op(":=") {
            self.bump();
            let rhs = self.parse_expr()?;
            let span = value.span.to(rhs.span);
            let line = value.line;
            return Ok(Expr {
                kind: ExprKind::BinOp {
                    op: ":=".to_string(),
                    left: Box::new(value),
                    right: Box::new(rhs),
                },
                span,
                line,
            });
        }
        if self.check_name("if") {
            self.bump();
            let test = self.parse_or()?;
            if !self.eat_name("else") {
                return Err(self.unexpected("expected 'else' in conditional expression"));
            }
            let orelse = self.parse_expr()?;
            let span = value.span.to(orelse.span);
            let line = value.line;
            return Ok(Expr {
                kind: ExprKind::IfExp {
                    body: Box::new(value),
                    test: Box::new(test),
                    orelse: Box::new(orelse),
                },
                span,
                line,
            });
        }
        Ok(value)
    }

    fn parse_lambda(&mut self) -> ImportResult<Expr> {
        let start = self.bump(); // lambda
        while !self.check_op(":") && !self.check_eof() {
            if matches!(self.peek().kind, TokenKind::Name(_)) {
                self.bump();
            } else if self.eat_op("*") || self.eat_op("**") || self.eat_op(",") {
                continue;
            } else if self.eat_op("=") {
                self.parse_expr()?;
            } else {
                return Err(self.unexpected("expected lambda parameters"));
            }
        }
        self.expect_op(":")?;
        let body = self.parse_expr()?;
        let span = Span::new(start.start, body.span.end);
        Ok(Expr {
            kind: ExprKind::Lambda {
                body: Box::new(body),
            },
            span,
            line: start.line,
        })
    }

    fn parse_or(&mut self) -> ImportResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check_name("or") {
            self.bump();
            let right = self.parse_and()?;
            left = binop("or", left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ImportResult<Expr> {
        let mut left = self.parse_not()?;
        while self.check_name("and") {
            self.bump();
            let right = self.parse_not()?;
            left = binop("and", left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ImportResult<Expr> {
        if self.check_name("not") {
            let token = self.bump();
            let operand = self.parse_not()?;
            let span = Span::new(token.start, operand.span.end);
            let line = token.line;
            return Ok(Expr {
                kind: ExprKind::UnaryOp {
                    op: "not".to_string(),
                    operand: Box::new(operand),
                },
                span,
                line,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ImportResult<Expr> {
        let mut left = self.parse_binary(0)?;
        loop {
            let op = if COMPARE_OPS.iter().any(|op| self.check_op(op)) {
                let TokenKind::Op(op) = self.bump().kind else {
                    unreachable!()
                };
                op
            } else if self.check_name("in") {
                self.bump();
                "in".to_string()
            } else if self.check_name("is") {
                self.bump();
                self.eat_name("not");
                "is".to_string()
            } else if self.check_name("not") && self.peek_at(1).is_name("in") {
                self.bump();
                self.bump();
                "not in".to_string()
            } else {
                return Ok(left);
            };
            let right = self.parse_binary(0)?;
            left = binop(&op, left, right);
        }
    }

    fn parse_binary(&mut self, level: usize) -> ImportResult<Expr> {
        if level >= BINOP_LEVELS.len() {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1)?;
        loop {
            let matched = BINOP_LEVELS[level].iter().find(|op| self.check_op(op));
            match matched {
                Some(&op) => {
                    self.bump();
                    let right = self.parse_binary(level + 1)?;
                    left = binop(op, left, right);
                }
                None => return Ok(left),
            }
        }
    }

    fn parse_unary(&mut self) -> ImportResult<Expr> {
        if self.check_op("-") || self.check_op("+") || self.check_op("~") {
            let token = self.bump();
            let TokenKind::Op(op) = token.kind.clone() else {
                unreachable!()
            };
            let operand = self.parse_unary()?;
            let span = Span::new(token.start, operand.span.end);
            let line = token.line;
            return Ok(Expr {
                kind: ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                span,
                line,
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ImportResult<Expr> {
        let base = self.parse_postfix()?;
        if self.check_op("**") {
            self.bump();
            let exponent = self.parse_unary()?;
            return Ok(binop("**", base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ImportResult<Expr> {
        let mut value = self.parse_atom()?;
        loop {
            if self.check_op("(") {
                value = self.parse_call(value)?;
            } else if self.check_op(".") && matches!(self.peek_at(1).kind, TokenKind::Name(_)) {
                self.bump();
                let (attr, token) = self.expect_any_name()?;
                let span = Span::new(value.span.start, token.end);
                let line = value.line;
                value = Expr {
                    kind: ExprKind::Attribute {
                        value: Box::new(value),
                        attr,
                    },
                    span,
                    line,
                };
            } else if self.check_op("[") {
                value = self.parse_subscript(value)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_call(&mut self, func: Expr) -> ImportResult<Expr> {
        self.expect_op("(")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.check_op(")") {
            if self.check_op("*") || self.check_op("**") {
                let star = self.bump();
                let double = star.is_op("**");
                let inner = self.parse_expr()?;
                let span = Span::new(star.start, inner.span.end);
                let line = star.line;
                args.push(Expr {
                    kind: ExprKind::Starred {
                        value: Box::new(inner),
                        double,
                    },
                    span,
                    line,
                });
            } else if matches!(self.peek().kind, TokenKind::Name(_))
                && self.peek_at(1).is_op("=")
            {
                let (name, _) = self.expect_any_name()?;
                self.expect_op("=")?;
                kwargs.push((name, self.parse_expr()?));
            } else {
                let arg = self.parse_expr()?;
                if self.check_name("for") {
                    // Generator argument: keep it opaque.
                    let span = self.scan_balanced(arg.span, ")");
                    let line = arg.line;
                    args.push(Expr {
                        kind: ExprKind::Opaque,
                        span,
                        line,
                    });
                    break;
                }
                args.push(arg);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        let close = self.expect_op(")")?;
        let span = Span::new(func.span.start, close.end);
        let line = func.line;
        Ok(Expr {
            kind: ExprKind::Call {
                func: Box::new(func),
                args,
                kwargs,
            },
            span,
            line,
        })
    }

    fn parse_subscript(&mut self, value: Expr) -> ImportResult<Expr> {
        let open = self.expect_op("[")?;
        let saved = self.pos;
        let index = match self.parse_expr_list() {
            Ok(index) if self.check_op("]") => index,
            _ => {
                // Slice or other non-expression content: re-scan opaquely.
                self.pos = saved;
                let span = self.scan_balanced(Span::new(open.end, open.end), "]");
                Expr {
                    kind: ExprKind::Opaque,
                    span,
                    line: open.line,
                }
            }
        };
        let close = self.expect_op("]")?;
        let span = Span::new(value.span.start, close.end);
        let line = value.line;
        Ok(Expr {
            kind: ExprKind::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            },
            span,
            line,
        })
    }

    /// Consume tokens up to (not including) the closer that balances the
    /// already-open bracket, returning the covered span.
    fn scan_balanced(&mut self, start: Span, closer: &str) -> Span {
        let mut depth = 1usize;
        let mut end = start.end;
        loop {
            match &self.peek().kind {
                TokenKind::Eof => return Span::new(start.start, end),
                TokenKind::Op(op) => {
                    match op.as_str() {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => {
                            if depth == 1 && op == closer {
                                return Span::new(start.start, end);
                            }
                            depth = depth.saturating_sub(1);
                        }
                        _ => {}
                    }
                    end = self.bump().end;
                }
                _ => {
                    end = self.bump().end;
                }
            }
        }
    }

    fn parse_atom(&mut self) -> ImportResult<Expr> {
        let token = self.peek().clone();
        match token.kind.clone() {
            TokenKind::Str(text) => {
                self.bump();
                let mut content = text;
                let mut end = token.end;
                // Adjacent string literals concatenate.
                while let TokenKind::Str(more) = self.peek().kind.clone() {
                    content.push_str(&more);
                    end = self.bump().end;
                }
                Ok(Expr {
                    kind: ExprKind::Str(content),
                    span: Span::new(token.start, end),
                    line: token.line,
                })
            }
            TokenKind::Number(text) => {
                self.bump();
                Ok(Expr {
                    kind: ExprKind::Number(text),
                    span: Span::new(token.start, token.end),
                    line: token.line,
                })
            }
            TokenKind::Name(name) => match name.as_str() {
                "True" | "False" => {
                    self.bump();
                    Ok(Expr {
                        kind: ExprKind::Bool(name == "True"),
                        span: Span::new(token.start, token.end),
                        line: token.line,
                    })
                }
                "None" => {
                    self.bump();
                    Ok(Expr {
                        kind: ExprKind::NoneLit,
                        span: Span::new(token.start, token.end),
                        line: token.line,
                    })
                }
                "lambda" => self.parse_lambda(),
                _ => {
                    self.bump();
                    Ok(Expr {
                        kind: ExprKind::Name(name),
                        span: Span::new(token.start, token.end),
                        line: token.line,
                    })
                }
            },
            TokenKind::Op(op) => match op.as_str() {
                "(" => self.parse_paren(),
                "[" => self.parse_list(),
                "{" => self.parse_dict_or_set(),
                "..." => {
                    self.bump();
                    Ok(Expr {
                        kind: ExprKind::Opaque,
                        span: Span::new(token.start, token.end),
                        line: token.line,
                    })
                }
                _ => Err(self.unexpected("expected an expression")),
            },
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn parse_paren(&mut self) -> ImportResult<Expr> {
        let open = self.expect_op("(")?;
        if self.check_op(")") {
            let close = self.bump();
            return Ok(Expr {
                kind: ExprKind::Tuple(Vec::new()),
                span: Span::new(open.start, close.end),
                line: open.line,
            });
        }
        let inner = self.parse_expr_list()?;
        if self.check_name("for") {
            let span = self.scan_balanced(Span::new(open.start, inner.span.end), ")");
            self.expect_op(")")?;
            return Ok(Expr {
                kind: ExprKind::Opaque,
                span,
                line: open.line,
            });
        }
        self.expect_op(")")?;
        Ok(inner)
    }

    fn parse_list(&mut self) -> ImportResult<Expr> {
        let open = self.expect_op("[")?;
        let mut items = Vec::new();
        while !self.check_op("]") {
            let item = self.parse_expr()?;
            if items.is_empty() && self.check_name("for") {
                let span = self.scan_balanced(Span::new(open.start, item.span.end), "]");
                self.expect_op("]")?;
                return Ok(Expr {
                    kind: ExprKind::Opaque,
                    span,
                    line: open.line,
                });
            }
            items.push(item);
            if !self.eat_op(",") {
                break;
            }
        }
        let close = self.expect_op("]")?;
        Ok(Expr {
            kind: ExprKind::List(items),
            span: Span::new(open.start, close.end),
            line: open.line,
        })
    }

    fn parse_dict_or_set(&mut self) -> ImportResult<Expr> {
        let open = self.expect_op("{")?;
        if self.check_op("}") {
            let close = self.bump();
            return Ok(Expr {
                kind: ExprKind::Dict(Vec::new()),
                span: Span::new(open.start, close.end),
                line: open.line,
            });
        }

        // `{**other}` merges an unresolvable mapping; keep the entry opaque.
        if self.check_op("**") {
            let star = self.bump();
            let inner = self.parse_expr()?;
            let key = Expr {
                kind: ExprKind::Opaque,
                span: Span::new(star.start, inner.span.end),
                line: star.line,
            };
            let mut entries = vec![(key, inner)];
            while self.eat_op(",") && !self.check_op("}") {
                entries.extend(self.parse_dict_entry()?);
            }
            let close = self.expect_op("}")?;
            return Ok(Expr {
                kind: ExprKind::Dict(entries),
                span: Span::new(open.start, close.end),
                line: open.line,
            });
        }

        let first = self.parse_expr()?;
        if self.check_op(":") {
            self.bump();
            let value = self.parse_expr()?;
            if self.check_name("for") {
                let span = self.scan_balanced(Span::new(open.start, value.span.end), "}");
                self.expect_op("}")?;
                return Ok(Expr {
                    kind: ExprKind::Opaque,
                    span,
                    line: open.line,
                });
            }
            let mut entries = vec![(first, value)];
            while self.eat_op(",") && !self.check_op("}") {
                entries.extend(self.parse_dict_entry()?);
            }
            let close = self.expect_op("}")?;
            return Ok(Expr {
                kind: ExprKind::Dict(entries),
                span: Span::new(open.start, close.end),
                line: open.line,
            });
        }

        // Set literal
        if self.check_name("for") {
            let span = self.scan_balanced(Span::new(open.start, first.span.end), "}");
            self.expect_op("}")?;
            return Ok(Expr {
                kind: ExprKind::Opaque,
                span,
                line: open.line,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") && !self.check_op("}") {
            items.push(self.parse_expr()?);
        }
        let close = self.expect_op("}")?;
        Ok(Expr {
            kind: ExprKind::Set(items),
            span: Span::new(open.start, close.end),
            line: open.line,
        })
    }

    fn parse_dict_entry(&mut self) -> ImportResult<Vec<(Expr, Expr)>> {
        if self.check_op("**") {
            let star = self.bump();
            let inner = self.parse_expr()?;
            let key = Expr {
                kind: ExprKind::Opaque,
                span: Span::new(star.start, inner.span.end),
                line: star.line,
            };
            return Ok(vec![(key, inner)]);
        }
        let key = self.parse_expr()?;
        self.expect_op(":")?;
        let value = self.parse_expr()?;
        Ok(vec![(key, value)])
    }
}

fn binop(op: &str, left: Expr, right: Expr) -> Expr {
    let span = left.span.to(right.span);
    let line = left.line;
    Expr {
        kind: ExprKind::BinOp {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
        line,
    }
}
