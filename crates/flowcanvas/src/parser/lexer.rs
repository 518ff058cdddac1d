//! Tokenizer for builder source text
//!
//! Indentation-significant lexing: logical lines produce `Newline`,
//! `Indent` and `Dedent` tokens, while newlines inside brackets are
//! implicit joins. Byte offsets are kept on every token so later stages can
//! slice the original source for unresolved expressions.

use crate::error::{ImportError, ImportResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name(String),
    /// Numeric literal, kept as raw text
    Number(String),
    /// String literal, decoded content
    Str(String),
    /// Operator or punctuation
    Op(String),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

impl Token {
    pub fn is_name(&self, text: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(n) if n == text)
    }

    pub fn is_op(&self, text: &str) -> bool {
        matches!(&self.kind, TokenKind::Op(o) if o == text)
    }
}

/// Multi-character operators, longest first so greedy matching works.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "!=", "==", "<=", ">=", "->", ":=", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=", "@=", "**", "//", ">>", "<<", "+", "-", "*", "/", "%", "@",
    "&", "|", "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    paren_depth: usize,
    indent_stack: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            paren_depth: 0,
            indent_stack: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> ImportResult<Vec<Token>> {
        while self.pos < self.bytes.len() {
            if self.at_line_start && self.paren_depth == 0 {
                self.handle_indentation()?;
                if self.pos >= self.bytes.len() {
                    break;
                }
            }
            let c = self.bytes[self.pos];
            match c {
                b' ' | b'\t' => {
                    self.advance(1);
                }
                b'\r' => {
                    self.advance(1);
                }
                b'\n' => {
                    self.consume_newline();
                }
                b'\\' if self.peek(1) == Some(b'\n') || self.peek(1) == Some(b'\r') => {
                    // Explicit line continuation
                    self.advance(1);
                    if self.bytes.get(self.pos) == Some(&b'\r') {
                        self.advance(1);
                    }
                    if self.bytes.get(self.pos) == Some(&b'\n') {
                        self.newline_advance();
                    }
                }
                b'#' => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.advance(1);
                    }
                }
                b'\'' | b'"' => {
                    self.lex_string(String::new())?;
                }
                b'0'..=b'9' => {
                    self.lex_number();
                }
                b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => {
                    self.lex_number();
                }
                c if c == b'_' || c.is_ascii_alphabetic() => {
                    self.lex_name_or_prefixed_string()?;
                }
                _ => {
                    self.lex_operator()?;
                }
            }
        }

        // Close the final logical line and any open blocks.
        if !self.at_line_start {
            self.push_here(TokenKind::Newline);
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push_here(TokenKind::Dedent);
        }
        self.push_here(TokenKind::Eof);
        Ok(self.tokens)
    }

    /// Measure leading whitespace of a fresh logical line and emit
    /// Indent/Dedent tokens. Blank and comment-only lines are skipped.
    fn handle_indentation(&mut self) -> ImportResult<()> {
        loop {
            let line_start = self.pos;
            let mut width = 0usize;
            let mut scan = self.pos;
            while scan < self.bytes.len() {
                match self.bytes[scan] {
                    b' ' => width += 1,
                    b'\t' => width = (width / 8 + 1) * 8,
                    _ => break,
                }
                scan += 1;
            }
            match self.bytes.get(scan) {
                None => {
                    self.seek(scan, scan - line_start);
                    return Ok(());
                }
                Some(b'\n') | Some(b'\r') | Some(b'#') => {
                    // Blank or comment-only line: no tokens at all.
                    self.seek(scan, scan - line_start);
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.advance(1);
                    }
                    if self.pos < self.bytes.len() {
                        self.newline_advance();
                    }
                    continue;
                }
                Some(_) => {
                    self.seek(scan, scan - line_start);
                    let current = *self.indent_stack.last().unwrap_or(&0);
                    if width > current {
                        self.indent_stack.push(width);
                        self.push_here(TokenKind::Indent);
                    } else if width < current {
                        while self
                            .indent_stack
                            .last()
                            .map(|&top| top > width)
                            .unwrap_or(false)
                        {
                            self.indent_stack.pop();
                            self.push_here(TokenKind::Dedent);
                        }
                        if self.indent_stack.last() != Some(&width) {
                            return Err(ImportError::parse(
                                self.line,
                                self.column,
                                "unindent does not match any outer indentation level",
                            ));
                        }
                    }
                    self.at_line_start = false;
                    return Ok(());
                }
            }
        }
    }

    fn lex_name_or_prefixed_string(&mut self) -> ImportResult<()> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.advance(1);
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let is_string_prefix = text.len() <= 2
            && text
                .chars()
                .all(|c| matches!(c, 'r' | 'R' | 'b' | 'B' | 'f' | 'F' | 'u' | 'U'))
            && matches!(self.bytes.get(self.pos), Some(b'\'') | Some(b'"'));
        if is_string_prefix {
            let raw = text.chars().any(|c| matches!(c, 'r' | 'R'));
            self.tokens_string_with_start(start, line, column, raw)?;
        } else {
            self.tokens.push(Token {
                kind: TokenKind::Name(text.to_string()),
                line,
                column,
                start,
                end: self.pos,
            });
        }
        Ok(())
    }

    fn lex_string(&mut self, _prefix: String) -> ImportResult<()> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.tokens_string_with_start(start, line, column, false)
    }

    fn tokens_string_with_start(
        &mut self,
        start: usize,
        line: u32,
        column: u32,
        raw: bool,
    ) -> ImportResult<()> {
        let quote = self.bytes[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let quote_len = if triple { 3 } else { 1 };
        self.advance(quote_len);

        let mut content = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(ImportError::parse(line, column, "unterminated string literal"));
            }
            let c = self.bytes[self.pos];
            if c == quote {
                if !triple {
                    self.advance(1);
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.advance(3);
                    break;
                }
                content.push(c as char);
                self.advance(1);
            } else if c == b'\\' {
                if raw {
                    content.push('\\');
                    if let Some(next) = self.peek(1) {
                        content.push(next as char);
                    }
                    self.advance(2);
                } else {
                    match self.peek(1) {
                        Some(b'n') => content.push('\n'),
                        Some(b't') => content.push('\t'),
                        Some(b'r') => content.push('\r'),
                        Some(b'\\') => content.push('\\'),
                        Some(b'\'') => content.push('\''),
                        Some(b'"') => content.push('"'),
                        Some(b'0') => content.push('\0'),
                        Some(b'\n') => {}
                        Some(other) => {
                            content.push('\\');
                            content.push(other as char);
                        }
                        None => {
                            return Err(ImportError::parse(
                                line,
                                column,
                                "unterminated string literal",
                            ));
                        }
                    }
                    if self.peek(1) == Some(b'\n') {
                        self.advance(1);
                        self.newline_advance();
                    } else {
                        self.advance(2);
                    }
                }
            } else if c == b'\n' {
                if !triple {
                    return Err(ImportError::parse(line, column, "unterminated string literal"));
                }
                content.push('\n');
                self.newline_advance();
            } else {
                // Copy the full UTF-8 character, not just the first byte.
                let ch = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                content.push(ch);
                self.advance(ch.len_utf8());
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::Str(content),
            line,
            column,
            start,
            end: self.pos,
        });
        Ok(())
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            let is_number_char = c.is_ascii_alphanumeric() || c == b'_' || c == b'.';
            if is_number_char {
                self.advance(1);
                // Exponent sign: 1e-5, 2.5E+10
                if (c == b'e' || c == b'E')
                    && start + 1 < self.pos
                    && matches!(self.bytes.get(self.pos), Some(b'+') | Some(b'-'))
                    && self.src[start..self.pos - 1].chars().all(|d| {
                        d.is_ascii_digit() || d == '.' || d == '_'
                    })
                {
                    self.advance(1);
                }
            } else {
                break;
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Number(self.src[start..self.pos].to_string()),
            line,
            column,
            start,
            end: self.pos,
        });
    }

    fn lex_operator(&mut self) -> ImportResult<()> {
        let rest = &self.src[self.pos..];
        for op in OPERATORS {
            if rest.starts_with(op) {
                let start = self.pos;
                let (line, column) = (self.line, self.column);
                match *op {
                    "(" | "[" | "{" => self.paren_depth += 1,
                    ")" | "]" | "}" => self.paren_depth = self.paren_depth.saturating_sub(1),
                    _ => {}
                }
                self.advance(op.len());
                self.tokens.push(Token {
                    kind: TokenKind::Op(op.to_string()),
                    line,
                    column,
                    start,
                    end: self.pos,
                });
                return Ok(());
            }
        }
        Err(ImportError::parse(
            self.line,
            self.column,
            format!(
                "unexpected character '{}'",
                self.src[self.pos..].chars().next().unwrap_or('?')
            ),
        ))
    }

    fn consume_newline(&mut self) {
        if self.paren_depth == 0 {
            let emit = self
                .tokens
                .last()
                .map(|t| !matches!(t.kind, TokenKind::Newline))
                .unwrap_or(false);
            if emit {
                self.push_here(TokenKind::Newline);
            }
            self.at_line_start = true;
        }
        self.newline_advance();
    }

    fn push_here(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
            column: self.column,
            start: self.pos,
            end: self.pos,
        });
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.column += n as u32;
    }

    fn seek(&mut self, pos: usize, consumed_columns: usize) {
        self.pos = pos;
        self.column += consumed_columns as u32;
    }

    fn newline_advance(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.column = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_call_tokens() {
        let tokens = kinds("graph.add_node(\"search\")\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Name("graph".into()),
                TokenKind::Op(".".into()),
                TokenKind::Name("add_node".into()),
                TokenKind::Op("(".into()),
                TokenKind::Str("search".into()),
                TokenKind::Op(")".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indentation_tokens() {
        let tokens = kinds("def f():\n    pass\n");
        assert!(tokens.contains(&TokenKind::Indent));
        assert!(tokens.contains(&TokenKind::Dedent));
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let tokens = kinds("a = 1\n\n# comment\nb = 2\n");
        let names: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t, TokenKind::Name(_)))
            .collect();
        assert_eq!(names.len(), 2);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_implicit_line_join_inside_brackets() {
        let tokens = kinds("f(\n    1,\n    2,\n)\n");
        let newlines = tokens
            .iter()
            .filter(|t| matches!(t, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_triple_quoted_string() {
        let tokens = kinds("\"\"\"Two-line\ndocstring.\"\"\"\n");
        assert_eq!(tokens[0], TokenKind::Str("Two-line\ndocstring.".into()));
    }

    #[test]
    fn test_string_prefixes() {
        let tokens = kinds("f\"hello {name}\"\n");
        assert_eq!(tokens[0], TokenKind::Str("hello {name}".into()));
    }

    #[test]
    fn test_unterminated_string_is_parse_error() {
        let err = Lexer::new("x = \"oops\n").tokenize().unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_bad_dedent_is_parse_error() {
        let err = Lexer::new("if x:\n        a = 1\n    b = 2\n")
            .tokenize()
            .unwrap_err();
        assert!(err.to_string().contains("unindent"));
    }

    #[test]
    fn test_number_with_exponent() {
        let tokens = kinds("t = 1.5e-3\n");
        assert!(tokens.contains(&TokenKind::Number("1.5e-3".into())));
    }
}
