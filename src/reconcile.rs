//! Reconciliation of `use_repo` statements with reported repository usage.
//!
//! For every extension in a [`RepoUsages`] map, the `use_repo` calls made
//! through its proxies are rewritten so that their string literal arguments
//! are exactly the reported repositories:
//!
//! 1. Literals that are not reported, or that repeat an earlier literal, are
//!    dropped. Keyword and other non-literal arguments are never touched.
//! 2. Reported repositories not imported anywhere are added to the last
//!    `use_repo` call of the extension, after its last positional argument. If there is none, a new call is
//!    inserted right after the last statement that uses the most recently
//!    used proxy.
//! 3. `use_repo` calls left with only their proxy argument are deleted,
//!    together with the comment lines directly above them.
//!
//! Every pre-existing statement keeps its relative order, and running the
//! reconciler again on its own output changes nothing.

use crate::ast::{Argument, CallExpr, ModuleFile, Stmt};
use crate::error::UpdateError;
use crate::label::ExtensionKey;
use crate::scanner::{ModuleIndex, use_repo_proxy};
use crate::usages::RepoUsages;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What one reconciliation run changed.
#[derive(Debug, Default, Serialize)]
pub struct UpdateSummary {
    /// Extensions whose imports changed, in key order.
    pub extensions: Vec<ExtensionChange>,
    /// Number of `use_repo` calls that were created.
    pub inserted_calls: usize,
    /// Number of `use_repo` calls that were deleted because they no longer
    /// import anything.
    pub removed_calls: usize,
}

/// Import changes for one extension.
#[derive(Debug, Serialize)]
pub struct ExtensionChange {
    pub extension: ExtensionKey,
    /// Repositories that became imported.
    pub added: Vec<String>,
    /// Stale or duplicate literals that were dropped, in file order.
    pub removed: Vec<String>,
    /// `added` went into a newly created `use_repo` call.
    pub new_call: bool,
}

impl UpdateSummary {
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.removed_calls == 0
    }
}

/// Rewrites the `use_repo` calls of `file` to import exactly `usages`.
///
/// Extensions missing from `usages` are left alone. Fails with
/// [`UpdateError::UnknownExtension`] when a non-empty set is reported for
/// an extension the file never declares, or with
/// [`UpdateError::InvalidLabel`] when its declaration has a label that does
/// not parse. All extensions are checked before anything is changed, so
/// `file` is untouched on error.
pub fn update_repo_usages(
    file: &mut ModuleFile,
    usages: &RepoUsages,
) -> Result<UpdateSummary, UpdateError> {
    let index = ModuleIndex::build(file);

    for (extension, repos) in usages {
        if repos.is_empty() {
            continue;
        }
        if let Err(invalid) = index.require(extension) {
            return Err(invalid.unwrap_or_else(|| UpdateError::UnknownExtension {
                extension: extension.to_string(),
                file: file.path.clone(),
                repos: repos.iter().cloned().collect(),
            }));
        }
    }

    let mut summary = UpdateSummary::default();
    // Several extensions may anchor their new calls on the same statement.
    let mut insertions: BTreeMap<usize, Vec<Stmt>> = BTreeMap::new();

    for (extension, repos) in usages {
        let Some(proxies) = index.extensions.get(extension) else {
            continue;
        };
        let Some(anchor) = proxies.iter().max_by_key(|p| p.last_usage) else {
            continue;
        };

        let mut remaining = repos.clone();
        let mut removed = Vec::new();
        let mut last_use_repo: Option<usize> = None;

        for proxy in proxies {
            for pos in index.use_repos_of(proxy) {
                last_use_repo = last_use_repo.max(Some(pos));
                let stmt = &mut file.stmts[pos];
                let Some(call) = stmt.as_call_mut() else {
                    continue;
                };
                let dropped = prune(call, &mut remaining);
                if !dropped.is_empty() {
                    debug!(%extension, line = ?stmt.line, ?dropped, "pruned use_repo");
                    stmt.dirty = true;
                    removed.extend(dropped);
                }
            }
        }

        let added: Vec<String> = remaining.into_iter().collect();
        let mut new_call = false;
        if !added.is_empty() {
            match last_use_repo {
                Some(pos) => {
                    let stmt = &mut file.stmts[pos];
                    if let Some(call) = stmt.as_call_mut() {
                        call.insert_positional(added.iter().map(|repo| Argument::string(repo)));
                        stmt.dirty = true;
                    }
                    debug!(%extension, line = ?stmt.line, ?added, "extended use_repo");
                }
                None => {
                    let mut args = vec![Argument::ident(&anchor.name)];
                    args.extend(added.iter().map(|repo| Argument::string(repo)));
                    insertions
                        .entry(anchor.last_usage)
                        .or_default()
                        .push(Stmt::synthesized(CallExpr::new("use_repo", args)));
                    debug!(%extension, proxy = %anchor.name, ?added, "inserting use_repo");
                    new_call = true;
                    summary.inserted_calls += 1;
                }
            }
        }

        if !added.is_empty() || !removed.is_empty() {
            summary.extensions.push(ExtensionChange {
                extension: extension.clone(),
                added,
                removed,
                new_call,
            });
        }
    }

    if !insertions.is_empty() {
        splice(file, insertions);
    }
    summary.removed_calls = remove_empty_use_repos(file);
    Ok(summary)
}

/// Drops literal arguments not in `remaining` and consumes the ones kept.
/// Returns the dropped values.
fn prune(call: &mut CallExpr, remaining: &mut BTreeSet<String>) -> Vec<String> {
    let mut dropped = Vec::new();
    let args = std::mem::take(&mut call.args);
    for (i, arg) in args.into_iter().enumerate() {
        let keep = match arg.as_string_literal() {
            // Argument 0 is the proxy.
            Some(repo) if i > 0 => {
                if remaining.remove(repo) {
                    true
                } else {
                    dropped.push(repo.to_string());
                    false
                }
            }
            _ => true,
        };
        if keep {
            call.args.push(arg);
        }
    }
    dropped
}

/// Places every inserted statement right after its anchor. An anchor that
/// shares its line with the next statement passes its `;` separator on, so
/// the following statement stays where it was.
fn splice(file: &mut ModuleFile, mut insertions: BTreeMap<usize, Vec<Stmt>>) {
    let ending = file.line_ending();
    let stmts = std::mem::take(&mut file.stmts);
    let count = stmts.len();
    for (pos, stmt) in stmts.into_iter().enumerate() {
        let separator = match stmt.line_ending() {
            None if pos + 1 < count => stmt.suffix.clone(),
            _ => ending.to_string(),
        };
        file.stmts.push(stmt);
        if let Some(new) = insertions.remove(&pos) {
            for mut inserted in new {
                inserted.suffix = separator.clone();
                file.stmts.push(inserted);
            }
        }
    }
}

fn remove_empty_use_repos(file: &mut ModuleFile) -> usize {
    let stmts = std::mem::take(&mut file.stmts);
    let mut removed = 0;
    // Blank lines and unattached comments of deleted statements.
    let mut carried = String::new();

    for mut stmt in stmts {
        let empty = use_repo_proxy(&stmt).is_some()
            && stmt.as_call().is_some_and(|call| call.args.len() == 1);
        if empty {
            debug!(line = ?stmt.line, "removing empty use_repo");
            removed += 1;
            let (detached, _attached) = split_attached_comments(&stmt.leading);
            carried = join_trivia(&carried, detached);
            // An earlier statement on the same line now ends it.
            if let (Some(ending), Some(prev)) = (stmt.line_ending(), file.stmts.last_mut()) {
                if prev.line_ending().is_none() {
                    prev.suffix = ending.to_string();
                }
            }
            continue;
        }
        if !carried.is_empty() {
            stmt.leading = join_trivia(&std::mem::take(&mut carried), &stmt.leading);
        }
        file.stmts.push(stmt);
    }

    if !carried.is_empty() {
        file.trailer = join_trivia(&carried, &file.trailer);
    }
    removed
}

/// Splits leading trivia into the part separated from the statement and the
/// comment lines directly above it.
fn split_attached_comments(leading: &str) -> (&str, &str) {
    // Indentation on the statement's own line stays attached.
    let mut split = leading.rfind('\n').map_or(0, |i| i + 1);
    while split > 0 {
        let start = leading[..split - 1].rfind('\n').map_or(0, |i| i + 1);
        if !leading[start..split].trim_start().starts_with('#') {
            break;
        }
        split = start;
    }
    leading.split_at(split)
}

/// Concatenates two runs of trivia, collapsing a blank line at the seam
/// into one.
fn join_trivia(first: &str, second: &str) -> String {
    let first_ends_blank = first
        .split_inclusive('\n')
        .last()
        .is_some_and(|line| line.trim().is_empty() && line.ends_with('\n'));
    let second_blank = second
        .split_inclusive('\n')
        .next()
        .filter(|line| line.trim().is_empty() && line.ends_with('\n'));
    match second_blank {
        Some(line) if first_ends_blank => format!("{first}{}", &second[line.len()..]),
        _ => format!("{first}{second}"),
    }
}
