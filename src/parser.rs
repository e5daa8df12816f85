//! Recursive-descent parser for module files.
//!
//! Builds a lossless `rowan` green tree from the tokens produced by
//! [`crate::syntax::tokenize`]. Trivia is attached to the innermost node that
//! is open when the following significant token is consumed, so top-level
//! comments and blank lines sit directly under [`SyntaxKind::NODE_ROOT`]
//! between statement nodes.
//!
//! The parser never gives up: unexpected input is wrapped in
//! [`SyntaxKind::NODE_ERROR`] nodes and reported through [`Parse::errors`].

use crate::syntax::SyntaxKind::{self, *};
use crate::syntax::{SyntaxError, SyntaxNode, Token, tokenize};
use rowan::{Checkpoint, GreenNode, GreenNodeBuilder, TextRange, TextSize};

/// Result of parsing: the tree and every error found on the way.
#[derive(Debug, Clone)]
pub struct Parse {
    green: GreenNode,
    errors: Vec<SyntaxError>,
}

impl Parse {
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }
}

/// Parses module file source text.
pub fn parse(source: &str) -> Parse {
    let (tokens, mut errors) = tokenize(source);
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        builder: GreenNodeBuilder::new(),
        errors: Vec::new(),
    };
    parser.file();

    errors.append(&mut parser.errors);
    errors.sort_by_key(|e| e.range.start());
    Parse {
        green: parser.builder.finish(),
        errors,
    }
}

/// Words that cannot start an expression.
const KEYWORDS: &[&str] = &["and", "else", "for", "if", "in", "lambda", "not", "or"];

/// Statements that are valid Starlark but forbidden in module files.
const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "def", "if", "for", "while", "return", "break", "continue", "pass", "load",
];

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    builder: GreenNodeBuilder<'static>,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    // ---------------------------------------------------------------------
    // Token cursor
    // ---------------------------------------------------------------------

    fn nth_token(&self, n: usize) -> Option<&Token<'a>> {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .nth(n)
    }

    fn nth(&self, n: usize) -> SyntaxKind {
        self.nth_token(n).map_or(EOF, |t| t.kind)
    }

    fn current(&self) -> SyntaxKind {
        self.nth(0)
    }

    fn current_text(&self) -> &'a str {
        self.nth_token(0).map_or("", |t| t.text)
    }

    fn at_word(&self, word: &str) -> bool {
        self.current() == IDENT && self.current_text() == word
    }

    fn at_operator(&self, ops: &[&str]) -> bool {
        self.current() == OPERATOR && ops.contains(&self.current_text())
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.current(), NEWLINE | SEMICOLON | EOF)
    }

    fn eat_trivia(&mut self) {
        while let Some(token) = self.tokens.get(self.pos) {
            if !token.kind.is_trivia() {
                break;
            }
            self.builder.token(token.kind.into(), token.text);
            self.pos += 1;
        }
    }

    fn bump(&mut self) {
        self.eat_trivia();
        if let Some(token) = self.tokens.get(self.pos).copied() {
            self.builder.token(token.kind.into(), token.text);
            self.pos += 1;
        }
    }

    fn start(&mut self, kind: SyntaxKind) {
        self.eat_trivia();
        self.builder.start_node(kind.into());
    }

    fn start_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) {
        self.builder.start_node_at(checkpoint, kind.into());
    }

    fn finish(&mut self) {
        self.builder.finish_node();
    }

    /// Flushes pending trivia first so the checkpoint sits on the next
    /// significant token.
    fn checkpoint(&mut self) -> Checkpoint {
        self.eat_trivia();
        self.builder.checkpoint()
    }

    fn error(&mut self, message: impl Into<String>) {
        let range = self.nth_token(0).map_or_else(
            || TextRange::empty(TextSize::of(self.source)),
            |t| t.range(),
        );
        self.errors
            .push(SyntaxError::new(self.source, message, range));
    }

    fn expect(&mut self, kind: SyntaxKind, what: &str) -> bool {
        if self.current() == kind {
            self.bump();
            true
        } else {
            self.error(format!("expected {what}"));
            false
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn file(&mut self) {
        self.builder.start_node(NODE_ROOT.into());
        loop {
            self.eat_trivia();
            match self.current() {
                EOF => break,
                NEWLINE => self.bump(),
                _ => self.statement(),
            }
        }
        self.builder.finish_node();
    }

    fn statement(&mut self) {
        let word = self.current_text();
        if self.current() == IDENT && UNSUPPORTED_STATEMENTS.contains(&word) && self.nth(1) != L_PAREN
        {
            self.start(NODE_ERROR);
            self.error(format!("`{word}` statements are not allowed in module files"));
            self.skip_line();
            self.finish();
            return;
        }
        if self.current() == SEMICOLON {
            self.start(NODE_ERROR);
            self.error("expected a statement");
            self.bump();
            self.finish();
            return;
        }

        self.simple_statement();
        match self.current() {
            NEWLINE | EOF => {}
            SEMICOLON => self.bump(),
            _ => {
                self.start(NODE_ERROR);
                self.error("expected end of statement");
                self.skip_line();
                self.finish();
            }
        }
    }

    fn simple_statement(&mut self) {
        let checkpoint = self.checkpoint();
        self.expr_list();
        if matches!(self.current(), EQ | AUG_ASSIGN) {
            self.start_at(checkpoint, NODE_ASSIGN_STMT);
            self.bump();
            self.expr_list();
        } else {
            self.start_at(checkpoint, NODE_EXPR_STMT);
        }
        self.finish();
    }

    fn skip_line(&mut self) {
        while !matches!(self.current(), NEWLINE | EOF) {
            self.bump();
        }
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// `a, b` at statement level, as used by tuple assignments.
    fn expr_list(&mut self) {
        let checkpoint = self.checkpoint();
        self.expr();
        if self.current() != COMMA {
            return;
        }
        self.start_at(checkpoint, NODE_TUPLE);
        while self.current() == COMMA {
            self.bump();
            if self.at_statement_end() || matches!(self.current(), EQ | AUG_ASSIGN) {
                break;
            }
            self.expr();
        }
        self.finish();
    }

    fn expr(&mut self) {
        let checkpoint = self.checkpoint();
        self.binary(0);
        if self.at_word("if") {
            self.start_at(checkpoint, NODE_CONDITIONAL);
            self.bump();
            self.binary(0);
            if self.at_word("else") {
                self.bump();
                self.expr();
            } else {
                self.error("expected `else`");
            }
            self.finish();
        }
    }

    /// Binding power and token count of the infix operator at the cursor.
    fn infix_op(&self) -> Option<(u8, usize)> {
        match (self.current(), self.current_text()) {
            (IDENT, "or") => Some((1, 1)),
            (IDENT, "and") => Some((2, 1)),
            (IDENT, "in") => Some((4, 1)),
            (IDENT, "not")
                if self.nth(1) == IDENT
                    && self.nth_token(1).is_some_and(|t| t.text == "in") =>
            {
                Some((4, 2))
            }
            (OPERATOR, "==" | "!=" | "<" | ">" | "<=" | ">=") => Some((4, 1)),
            (OPERATOR, "|") => Some((5, 1)),
            (OPERATOR, "^") => Some((6, 1)),
            (OPERATOR, "&") => Some((7, 1)),
            (OPERATOR, "<<" | ">>") => Some((8, 1)),
            (OPERATOR, "+" | "-") => Some((9, 1)),
            (OPERATOR, "*" | "/" | "//" | "%") => Some((10, 1)),
            _ => None,
        }
    }

    fn binary(&mut self, min_bp: u8) {
        let checkpoint = self.checkpoint();
        self.unary();
        while let Some((bp, len)) = self.infix_op() {
            if bp <= min_bp {
                break;
            }
            self.start_at(checkpoint, NODE_BINARY);
            for _ in 0..len {
                self.bump();
            }
            self.binary(bp);
            self.finish();
        }
    }

    fn unary(&mut self) {
        if self.at_operator(&["-", "+", "~"]) {
            self.start(NODE_UNARY);
            self.bump();
            self.unary();
            self.finish();
        } else if self.at_word("not") {
            self.start(NODE_UNARY);
            self.bump();
            self.binary(3);
            self.finish();
        } else {
            self.postfix();
        }
    }

    fn postfix(&mut self) {
        let checkpoint = self.checkpoint();
        self.primary();
        loop {
            match self.current() {
                L_PAREN => {
                    self.start_at(checkpoint, NODE_CALL);
                    self.arg_list();
                    self.finish();
                }
                DOT => {
                    self.start_at(checkpoint, NODE_ATTR);
                    self.bump();
                    self.expect(IDENT, "an attribute name");
                    self.finish();
                }
                L_BRACK => {
                    self.start_at(checkpoint, NODE_INDEX);
                    self.bump();
                    self.slice();
                    self.expect(R_BRACK, "`]`");
                    self.finish();
                }
                _ => break,
            }
        }
    }

    fn slice(&mut self) {
        loop {
            if !matches!(self.current(), COLON | R_BRACK | NEWLINE | EOF) {
                self.expr();
            }
            if self.current() == COLON {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn primary(&mut self) {
        match self.current() {
            IDENT if !KEYWORDS.contains(&self.current_text()) => {
                self.start(NODE_NAME);
                self.bump();
                self.finish();
            }
            STRING | NUMBER => {
                self.start(NODE_LITERAL);
                self.bump();
                self.finish();
            }
            L_PAREN => self.paren(),
            L_BRACK => self.list(),
            L_BRACE => self.dict(),
            NEWLINE | EOF => self.error("expected an expression"),
            _ => {
                self.start(NODE_ERROR);
                self.error("expected an expression");
                self.bump();
                self.finish();
            }
        }
    }

    fn paren(&mut self) {
        let checkpoint = self.checkpoint();
        self.bump();
        let mut kind = NODE_PAREN;
        if self.current() == R_PAREN {
            kind = NODE_TUPLE;
        } else {
            self.expr();
            if self.at_word("for") {
                self.skip_to_close();
                kind = NODE_COMPREHENSION;
            } else if self.current() == COMMA {
                kind = NODE_TUPLE;
                self.bump();
                self.delimited(R_PAREN, Self::expr);
            }
        }
        self.expect(R_PAREN, "`)`");
        self.start_at(checkpoint, kind);
        self.finish();
    }

    fn list(&mut self) {
        let checkpoint = self.checkpoint();
        self.bump();
        let mut kind = NODE_LIST;
        if self.current() != R_BRACK {
            self.expr();
            if self.at_word("for") {
                self.skip_to_close();
                kind = NODE_COMPREHENSION;
            } else if self.current() == COMMA {
                self.bump();
                self.delimited(R_BRACK, Self::expr);
            }
        }
        self.expect(R_BRACK, "`]`");
        self.start_at(checkpoint, kind);
        self.finish();
    }

    fn dict(&mut self) {
        let checkpoint = self.checkpoint();
        self.bump();
        let mut kind = NODE_DICT;
        if self.current() != R_BRACE {
            self.dict_entry();
            if self.at_word("for") {
                self.skip_to_close();
                kind = NODE_COMPREHENSION;
            } else if self.current() == COMMA {
                self.bump();
                self.delimited(R_BRACE, Self::dict_entry);
            }
        }
        self.expect(R_BRACE, "`}`");
        self.start_at(checkpoint, kind);
        self.finish();
    }

    fn dict_entry(&mut self) {
        self.start(NODE_DICT_ENTRY);
        self.expr();
        self.expect(COLON, "`:`");
        self.expr();
        self.finish();
    }

    fn arg_list(&mut self) {
        self.start(NODE_ARG_LIST);
        self.bump();
        // Positional arguments must come before keyword and unpacked ones.
        let mut after: Option<SyntaxKind> = None;
        self.delimited(R_PAREN, |p| {
            let kind = p.argument_kind();
            match (kind, after) {
                (NODE_ARG, Some(NODE_KEYWORD_ARG)) => {
                    p.error("positional argument may not follow keyword argument");
                }
                (NODE_ARG, Some(_)) => {
                    p.error("positional argument may not follow unpacked arguments");
                }
                (NODE_ARG, None) => {}
                _ => after = after.or(Some(kind)),
            }
            p.argument(kind);
        });
        self.expect(R_PAREN, "`)`");
        self.finish();
    }

    fn argument_kind(&self) -> SyntaxKind {
        if self.at_operator(&["*", "**"]) {
            NODE_STAR_ARG
        } else if self.current() == IDENT && self.nth(1) == EQ {
            NODE_KEYWORD_ARG
        } else {
            NODE_ARG
        }
    }

    fn argument(&mut self, kind: SyntaxKind) {
        self.start(kind);
        match kind {
            NODE_STAR_ARG => self.bump(),
            NODE_KEYWORD_ARG => {
                self.bump();
                self.bump();
            }
            _ => {}
        }
        self.expr();
        self.finish();
    }

    /// Comma-separated elements up to (not including) `close`. A trailing
    /// comma is allowed.
    fn delimited(&mut self, close: SyntaxKind, mut element: impl FnMut(&mut Self)) {
        while !matches!(self.current(), NEWLINE | EOF) && self.current() != close {
            element(self);
            if self.current() == COMMA {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Consumes the body of a comprehension up to the bracket closing it.
    fn skip_to_close(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current() {
                NEWLINE | EOF => break,
                L_PAREN | L_BRACK | L_BRACE => depth += 1,
                R_PAREN | R_BRACK | R_BRACE => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::NodeOrToken;

    fn statement_kinds(source: &str) -> Vec<SyntaxKind> {
        parse(source).syntax().children().map(|n| n.kind()).collect()
    }

    fn dump(node: &SyntaxNode, depth: usize, out: &mut String) {
        out.push_str(&format!("{}{:?}\n", "  ".repeat(depth), node.kind()));
        for child in node.children_with_tokens() {
            match child {
                NodeOrToken::Node(n) => dump(&n, depth + 1, out),
                NodeOrToken::Token(t) if !t.kind().is_trivia() => {
                    out.push_str(&format!("{}{:?} {:?}\n", "  ".repeat(depth + 1), t.kind(), t.text()));
                }
                NodeOrToken::Token(_) => {}
            }
        }
    }

    #[test]
    fn tree_is_lossless() {
        let source = r#"# header
module(name = "root", version = "1.0")

bazel_dep(name = "rules_go", version = "0.50.1", repo_name = "io_bazel_rules_go")

go_deps = use_extension("@gazelle//:extensions.bzl", "go_deps")  # trailing
go_deps.from_file(go_mod = "//:go.mod")
use_repo(
    go_deps,
    # comment before
    "com_github_foo",  # comment after
    bar = "com_github_bar",
)
x = [a for a in range(3) if a]; y = {"k": (1, 2)}[ "k" ]
"#;
        let parse = parse(source);
        assert!(parse.errors().is_empty(), "{:?}", parse.errors());
        assert_eq!(parse.syntax().text().to_string(), source);
    }

    #[test]
    fn recognizes_statement_shapes() {
        assert_eq!(
            statement_kinds("a = f(1)\nb.c(x = 1)\nd += [1]\n"),
            vec![NODE_ASSIGN_STMT, NODE_EXPR_STMT, NODE_ASSIGN_STMT]
        );
    }

    #[test]
    fn semicolons_separate_statements() {
        assert_eq!(
            statement_kinds("f(); g()\n"),
            vec![NODE_EXPR_STMT, NODE_EXPR_STMT]
        );
    }

    #[test]
    fn parses_call_with_mixed_arguments() {
        let parse = parse("use_repo(ext, \"a\", b = \"c\", *rest)\n");
        let mut out = String::new();
        dump(&parse.syntax(), 0, &mut out);
        insta::assert_snapshot!(out, @r#"
        NODE_ROOT
          NODE_EXPR_STMT
            NODE_CALL
              NODE_NAME
                IDENT "use_repo"
              NODE_ARG_LIST
                L_PAREN "("
                NODE_ARG
                  NODE_NAME
                    IDENT "ext"
                COMMA ","
                NODE_ARG
                  NODE_LITERAL
                    STRING "\"a\""
                COMMA ","
                NODE_KEYWORD_ARG
                  IDENT "b"
                  EQ "="
                  NODE_LITERAL
                    STRING "\"c\""
                COMMA ","
                NODE_STAR_ARG
                  OPERATOR "*"
                  NODE_NAME
                    IDENT "rest"
                R_PAREN ")"
          NEWLINE "\n"
        "#);
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let parse = parse("a - b - c\n");
        let stmt = parse.syntax().first_child().unwrap();
        let outer = stmt.first_child().unwrap();
        assert_eq!(outer.kind(), NODE_BINARY);
        assert_eq!(outer.first_child().unwrap().kind(), NODE_BINARY);
        assert_eq!(outer.first_child().unwrap().text().to_string(), "a - b");
    }

    #[test]
    fn comment_after_statement_stays_at_root() {
        let parse = parse("f()  # note\n");
        let root = parse.syntax();
        let stmt = root.first_child().unwrap();
        assert_eq!(stmt.text().to_string(), "f()");
        assert!(
            root.children_with_tokens()
                .any(|c| c.kind() == COMMENT && c.as_token().is_some())
        );
    }

    #[test]
    fn reports_unclosed_call() {
        let parse = parse("use_repo(ext, \"a\"\n");
        assert!(!parse.errors().is_empty());
        assert_eq!(parse.syntax().text().to_string(), "use_repo(ext, \"a\"\n");
    }

    #[test]
    fn rejects_forbidden_statements() {
        let parse = parse("def f():\n    pass\n");
        assert!(
            parse
                .errors()
                .iter()
                .any(|e| e.message.contains("`def` statements are not allowed"))
        );
    }

    #[test]
    fn reports_garbage_after_expression() {
        let parse = parse("f() g()\n");
        assert_eq!(parse.errors().len(), 1);
        assert_eq!(parse.errors()[0].message, "expected end of statement");
        assert_eq!(parse.errors()[0].column, 5);
    }

    #[test]
    fn rejects_positional_after_keyword_argument() {
        let parse = parse("use_repo(ext, foo = \"bar\", \"baz\")\n");
        assert_eq!(parse.errors().len(), 1);
        assert_eq!(
            parse.errors()[0].message,
            "positional argument may not follow keyword argument"
        );
        assert_eq!(parse.errors()[0].column, 28);
    }

    #[test]
    fn rejects_positional_after_unpacked_arguments() {
        let parse = parse("f(*args, \"x\")\nf(a, k = 1, *rest, **kw)\n");
        assert_eq!(parse.errors().len(), 1);
        assert_eq!(parse.errors()[0].line, 1);
        assert!(parse.errors()[0].message.contains("unpacked"));
    }

    #[test]
    fn nested_calls_track_argument_order_separately() {
        let parse = parse("f(k = g(\"a\", \"b\"))\nf(\"a\", g(k = 1))\n");
        assert!(parse.errors().is_empty(), "{:?}", parse.errors());
    }

    #[test]
    fn recovers_from_stray_closing_bracket() {
        let parse = parse(")\nf()\n");
        assert!(!parse.errors().is_empty());
        assert_eq!(parse.syntax().text().to_string(), ")\nf()\n");
    }
}
