//! Printing of edited module files.
//!
//! Statements that were not edited are printed from their original text, so
//! a file with no changes renders byte-for-byte identical to its source.
//! Edited and synthesized calls are rendered from their model: on one line
//! when they were written on one line, carry no comments and fit in
//! [`MAX_LINE`] columns, otherwise with one argument per line.

use crate::ast::{CallExpr, ModuleFile, StmtKind};
use anyhow::{Context, Result};
use diffy::PatchFormatter;
use std::path::Path;

/// Longest single-line call the printer produces.
pub const MAX_LINE: usize = 79;

const INDENT: &str = "    ";

/// Renders `file` back to source text.
pub fn render(file: &ModuleFile) -> String {
    let ending = file.line_ending();
    let mut out = String::new();
    for stmt in &file.stmts {
        // Synthesized statements start on a line of their own unless they
        // follow a `;` separator.
        if stmt.line.is_none() && !out.is_empty() && !out.ends_with('\n') {
            let end = out.trim_end_matches([' ', '\t']).len();
            if out[..end].ends_with(';') {
                if end == out.len() {
                    out.push(' ');
                }
            } else {
                out.truncate(end);
                out.push_str(ending);
            }
        }
        out.push_str(&stmt.leading);
        match &stmt.kind {
            StmtKind::Call(call) if stmt.dirty => {
                let text = render_call(call);
                if ending == "\n" {
                    out.push_str(&text);
                } else {
                    out.push_str(&text.replace("\r\n", "\n").replace('\n', ending));
                }
            }
            _ => out.push_str(&stmt.text),
        }
        out.push_str(&stmt.suffix);
    }
    out.push_str(&file.trailer);
    out
}

/// Renders a call expression.
pub fn render_call(call: &CallExpr) -> String {
    let has_comments = !call.closing_comments.is_empty()
        || call
            .args
            .iter()
            .any(|a| !a.leading_comments.is_empty() || a.trailing_comment.is_some());

    if !call.multiline && !has_comments {
        let args: Vec<&str> = call.args.iter().map(|a| a.text.as_str()).collect();
        let line = format!("{}({})", call.callee_text, args.join(", "));
        if line.len() <= MAX_LINE && !line.contains('\n') {
            return line;
        }
    }

    let mut out = format!("{}(\n", call.callee_text);
    for arg in &call.args {
        for comment in &arg.leading_comments {
            out.push_str(INDENT);
            out.push_str(comment);
            out.push('\n');
        }
        out.push_str(INDENT);
        out.push_str(&arg.text);
        out.push(',');
        if let Some(comment) = &arg.trailing_comment {
            out.push_str("  ");
            out.push_str(comment);
        }
        out.push('\n');
    }
    for comment in &call.closing_comments {
        out.push_str(INDENT);
        out.push_str(comment);
        out.push('\n');
    }
    out.push(')');
    out
}

/// Writes the rendered file back to its path.
pub fn write(file: &ModuleFile) -> Result<()> {
    std::fs::write(&file.path, render(file))
        .with_context(|| format!("Failed to write {}", file.path.display()))
}

/// Unified diff between two renderings of the file at `path`. Empty when
/// they are equal.
pub fn unified_diff(path: &Path, before: &str, after: &str, color: bool) -> String {
    if before == after {
        return String::new();
    }
    let patch = diffy::create_patch(before, after);
    let formatter = if color {
        PatchFormatter::new().with_color()
    } else {
        PatchFormatter::new()
    };
    let text = formatter.fmt_patch(&patch).to_string();
    // Replace diffy's placeholder file names with the real path.
    let hunks = text
        .find("@@")
        .map(|i| text[..i].rfind('\n').map_or(0, |j| j + 1))
        .map_or(text.as_str(), |start| &text[start..]);
    let path = path.display();
    format!("--- a/{path}\n+++ b/{path}\n{hunks}")
}
