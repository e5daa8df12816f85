//! Statement model for module files.
//!
//! A [`ModuleFile`] owns its top-level statements in file order. Every
//! statement remembers the exact text it was parsed from, split into three
//! parts:
//!
//! ```text
//! leading   blank lines and comment lines above the statement
//! text      the statement itself
//! suffix    same-line trailing trivia, up to and including the newline
//! ```
//!
//! Concatenating these parts for every statement, followed by
//! [`ModuleFile::trailer`], reproduces the source. Statements that are never
//! edited are therefore printed byte-for-byte by [`crate::rewriter`].
//!
//! Indexes built over the file refer to statements by their position in
//! [`ModuleFile::stmts`].

use crate::error::ParseError;
use crate::parser;
use crate::syntax::{self, SyntaxKind, SyntaxNode, offset_to_line_col};
use anyhow::{Context, Result};
use rowan::NodeOrToken;
use std::path::{Path, PathBuf};

/// A parsed module file.
#[derive(Debug, Clone)]
pub struct ModuleFile {
    pub path: PathBuf,
    pub stmts: Vec<Stmt>,
    /// Trivia after the last statement.
    pub trailer: String,
}

/// A top-level statement.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub leading: String,
    pub text: String,
    pub suffix: String,
    pub kind: StmtKind,
    /// Line the statement starts on, 1-indexed. `None` for synthesized
    /// statements.
    pub line: Option<usize>,
    /// Set when `kind` no longer matches `text` and the statement has to be
    /// rendered from its model.
    pub dirty: bool,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// A bare call, e.g. `bazel_dep(...)` or `ext.tag(...)`.
    Call(CallExpr),
    /// `target = value`.
    Assign { target: Expr, value: Expr },
    /// Anything else (augmented assignments, bare expressions, errors).
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Str(String),
    Call(CallExpr),
    Dot { receiver: Box<Expr>, name: String },
    /// Expressions the tool never needs to look inside of.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub callee_text: String,
    pub args: Vec<Argument>,
    /// Comments between the last argument and the closing parenthesis.
    pub closing_comments: Vec<String>,
    /// The argument list spanned several lines in the source.
    pub multiline: bool,
}

/// A call argument together with the comments attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Keyword for `name = value` arguments.
    pub keyword: Option<String>,
    pub value: Expr,
    /// Source text of the whole argument, or its rendering when synthesized.
    pub text: String,
    pub leading_comments: Vec<String>,
    pub trailing_comment: Option<String>,
}

impl ModuleFile {
    /// Parses `source`. Any syntax error makes the file unusable, since
    /// editing a partially understood file could corrupt it.
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Result<Self, ParseError> {
        let path = path.into();
        let parse = parser::parse(source);
        if !parse.errors().is_empty() {
            return Err(ParseError {
                path,
                errors: parse.errors().to_vec(),
            });
        }
        Ok(Self::lower(path, &parse.syntax(), source))
    }

    /// Reads and parses the module file at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(path, &source)?)
    }

    /// `"\r\n"` for files written with Windows line endings, `"\n"`
    /// otherwise.
    pub fn line_ending(&self) -> &'static str {
        self.stmts
            .iter()
            .find_map(Stmt::line_ending)
            .unwrap_or("\n")
    }

    fn lower(path: PathBuf, root: &SyntaxNode, source: &str) -> Self {
        let mut stmts: Vec<Stmt> = Vec::new();
        let mut pending = String::new();
        // Root-level tokens after a statement belong to its suffix until the
        // end of its line.
        let mut in_suffix = false;

        for element in root.children_with_tokens() {
            match element {
                NodeOrToken::Token(token) => match stmts.last_mut() {
                    Some(last) if in_suffix => {
                        last.suffix.push_str(token.text());
                        if token.kind() == SyntaxKind::NEWLINE {
                            in_suffix = false;
                        }
                    }
                    _ => pending.push_str(token.text()),
                },
                NodeOrToken::Node(node) => {
                    let start: usize = node.text_range().start().into();
                    let (line, _) = offset_to_line_col(source, start);
                    stmts.push(Stmt {
                        leading: std::mem::take(&mut pending),
                        text: node.text().to_string(),
                        suffix: String::new(),
                        kind: lower_stmt(&node),
                        line: Some(line),
                        dirty: false,
                    });
                    in_suffix = true;
                }
            }
        }

        Self {
            path,
            stmts,
            trailer: pending,
        }
    }
}

impl Stmt {
    /// The line ending closing this statement's line. `None` when another
    /// statement follows on the same line, or at the end of a file without
    /// a final newline.
    pub fn line_ending(&self) -> Option<&'static str> {
        if self.suffix.ends_with("\r\n") {
            Some("\r\n")
        } else if self.suffix.ends_with('\n') {
            Some("\n")
        } else {
            None
        }
    }

    /// A statement that did not exist in the source.
    pub fn synthesized(call: CallExpr) -> Self {
        Self {
            leading: String::new(),
            text: String::new(),
            suffix: "\n".to_string(),
            kind: StmtKind::Call(call),
            line: None,
            dirty: true,
        }
    }

    pub fn as_call(&self) -> Option<&CallExpr> {
        match &self.kind {
            StmtKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_call_mut(&mut self) -> Option<&mut CallExpr> {
        match &mut self.kind {
            StmtKind::Call(call) => Some(call),
            _ => None,
        }
    }
}

impl CallExpr {
    /// `use_repo(proxy, "a", "b")` with no comments.
    pub fn new(callee: &str, args: Vec<Argument>) -> Self {
        Self {
            callee: Box::new(Expr::Ident(callee.to_string())),
            callee_text: callee.to_string(),
            args,
            closing_comments: Vec::new(),
            multiline: false,
        }
    }

    /// Name of the called function when it is a plain identifier.
    pub fn callee_name(&self) -> Option<&str> {
        match self.callee.as_ref() {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Identifier the method is called on, for calls like `proxy.tag(...)`.
    pub fn method_receiver(&self) -> Option<&str> {
        match self.callee.as_ref() {
            Expr::Dot { receiver, .. } => match receiver.as_ref() {
                Expr::Ident(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn positional(&self, index: usize) -> Option<&Expr> {
        self.args
            .iter()
            .filter(|a| a.keyword.is_none())
            .nth(index)
            .map(|a| &a.value)
    }

    pub fn keyword(&self, name: &str) -> Option<&Expr> {
        self.args
            .iter()
            .find(|a| a.keyword.as_deref() == Some(name))
            .map(|a| &a.value)
    }

    /// Inserts `args` after the last positional argument, ahead of any
    /// keyword or unpacked argument.
    pub fn insert_positional(&mut self, args: impl IntoIterator<Item = Argument>) {
        let at = self
            .args
            .iter()
            .position(|a| a.keyword.is_some() || a.is_unpacked())
            .unwrap_or(self.args.len());
        self.args.splice(at..at, args);
    }

    /// Value of a string keyword argument, ignoring empty strings.
    pub fn keyword_string(&self, name: &str) -> Option<&str> {
        match self.keyword(name) {
            Some(Expr::Str(value)) if !value.is_empty() => Some(value),
            _ => None,
        }
    }
}

impl Argument {
    pub fn positional(value: Expr, text: String) -> Self {
        Self {
            keyword: None,
            value,
            text,
            leading_comments: Vec::new(),
            trailing_comment: None,
        }
    }

    pub fn ident(name: &str) -> Self {
        Self::positional(Expr::Ident(name.to_string()), name.to_string())
    }

    pub fn string(value: &str) -> Self {
        Self::positional(Expr::Str(value.to_string()), syntax::quote(value))
    }

    /// `*args` or `**kwargs`.
    pub fn is_unpacked(&self) -> bool {
        self.keyword.is_none() && self.text.starts_with('*')
    }

    /// The value of a positional string literal argument.
    pub fn as_string_literal(&self) -> Option<&str> {
        match (&self.keyword, &self.value) {
            (None, Expr::Str(value)) => Some(value),
            _ => None,
        }
    }
}

fn lower_stmt(node: &SyntaxNode) -> StmtKind {
    match node.kind() {
        SyntaxKind::NODE_EXPR_STMT => match node.first_child().map(|n| lower_expr(&n)) {
            Some(Expr::Call(call)) => StmtKind::Call(call),
            _ => StmtKind::Other,
        },
        SyntaxKind::NODE_ASSIGN_STMT => {
            let is_plain = node
                .children_with_tokens()
                .any(|c| c.kind() == SyntaxKind::EQ);
            let mut sides = node.children();
            match (is_plain, sides.next(), sides.next()) {
                (true, Some(target), Some(value)) => StmtKind::Assign {
                    target: lower_expr(&target),
                    value: lower_expr(&value),
                },
                _ => StmtKind::Other,
            }
        }
        _ => StmtKind::Other,
    }
}

fn lower_expr(node: &SyntaxNode) -> Expr {
    match node.kind() {
        SyntaxKind::NODE_NAME => first_token_text(node, SyntaxKind::IDENT)
            .map(Expr::Ident)
            .unwrap_or(Expr::Opaque),
        SyntaxKind::NODE_LITERAL => first_token_text(node, SyntaxKind::STRING)
            .and_then(|text| syntax::string_value(&text))
            .map(Expr::Str)
            .unwrap_or(Expr::Opaque),
        SyntaxKind::NODE_CALL => lower_call(node).map(Expr::Call).unwrap_or(Expr::Opaque),
        SyntaxKind::NODE_ATTR => {
            let receiver = node.first_child().map(|n| lower_expr(&n));
            let name = node
                .children_with_tokens()
                .filter_map(|c| c.into_token())
                .filter(|t| t.kind() == SyntaxKind::IDENT)
                .last()
                .map(|t| t.text().to_string());
            match (receiver, name) {
                (Some(receiver), Some(name)) => Expr::Dot {
                    receiver: Box::new(receiver),
                    name,
                },
                _ => Expr::Opaque,
            }
        }
        _ => Expr::Opaque,
    }
}

fn first_token_text(node: &SyntaxNode, kind: SyntaxKind) -> Option<String> {
    node.children_with_tokens()
        .filter_map(|c| c.into_token())
        .find(|t| t.kind() == kind)
        .map(|t| t.text().to_string())
}

fn lower_call(node: &SyntaxNode) -> Option<CallExpr> {
    let mut children = node.children();
    let callee = children.next()?;
    let arg_list = children.find(|n| n.kind() == SyntaxKind::NODE_ARG_LIST)?;

    let mut args: Vec<Argument> = Vec::new();
    let mut comments: Vec<String> = Vec::new();
    // A comment belongs to the previous argument while no newline has been
    // seen since that argument ended.
    let mut same_line = false;

    for element in arg_list.children_with_tokens() {
        match element {
            NodeOrToken::Node(arg) => {
                args.push(lower_argument(&arg, std::mem::take(&mut comments)));
                same_line = true;
            }
            NodeOrToken::Token(token) => match token.kind() {
                SyntaxKind::WHITESPACE if token.text().contains('\n') => same_line = false,
                SyntaxKind::COMMENT => {
                    let comment = token.text().trim_end().to_string();
                    match args.last_mut() {
                        Some(last) if same_line && last.trailing_comment.is_none() => {
                            last.trailing_comment = Some(comment);
                        }
                        _ => comments.push(comment),
                    }
                }
                _ => {}
            },
        }
    }

    Some(CallExpr {
        callee: Box::new(lower_expr(&callee)),
        callee_text: callee.text().to_string(),
        args,
        closing_comments: comments,
        multiline: arg_list.text().contains_char('\n'),
    })
}

fn lower_argument(node: &SyntaxNode, leading_comments: Vec<String>) -> Argument {
    let keyword = match node.kind() {
        SyntaxKind::NODE_KEYWORD_ARG => first_token_text(node, SyntaxKind::IDENT),
        _ => None,
    };
    let value = match node.kind() {
        SyntaxKind::NODE_STAR_ARG => Expr::Opaque,
        _ => node
            .children()
            .last()
            .map(|n| lower_expr(&n))
            .unwrap_or(Expr::Opaque),
    };
    Argument {
        keyword,
        value,
        text: node.text().to_string(),
        leading_comments,
        trailing_comment: None,
    }
}
