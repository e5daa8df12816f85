//! Loading of repository usage reports.
//!
//! A usage report says which repositories each module extension must make
//! visible. Reports arrive either as one JSON object keyed by extension
//! (`--usages FILE`) or as one JSON array per extension, passed as
//! `EXTENSION=PATH` pairs. Both are merged into a single [`RepoUsages`] map.

use crate::label::ExtensionKey;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repositories that must be imported, per extension. An empty set means
/// the extension is no longer used at all.
pub type RepoUsages = BTreeMap<ExtensionKey, BTreeSet<String>>;

/// Parses an `EXTENSION=PATH` command line pair.
pub fn parse_usage_arg(s: &str) -> Result<(ExtensionKey, PathBuf), String> {
    let (extension, path) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid usage '{}': expected EXTENSION=PATH", s))?;
    if path.is_empty() {
        return Err(format!("Invalid usage '{}': missing path", s));
    }
    let key = extension
        .parse::<ExtensionKey>()
        .map_err(|e| format!("Invalid usage '{}': {}", s, e))?;
    Ok((key, PathBuf::from(path)))
}

/// Reads a JSON array of repository names.
pub fn load_repo_list(path: &Path) -> Result<BTreeSet<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let repos: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a JSON array of strings", path.display()))?;
    Ok(repos.into_iter().collect())
}

/// Reads a JSON object mapping extension keys to arrays of repository names.
///
/// Keys that name the same extension in different spellings, such as
/// `@dep//:x.bzl%e` and `@dep//x.bzl%e`, are merged.
pub fn load_usage_file(path: &Path) -> Result<RepoUsages> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a JSON object", path.display()))?;

    let mut usages = RepoUsages::new();
    for (key, repos) in raw {
        let extension: ExtensionKey = key
            .parse()
            .with_context(|| format!("Invalid extension key in {}", path.display()))?;
        usages.entry(extension).or_default().extend(repos);
    }
    Ok(usages)
}

/// Merges a usage file and per-extension lists. A per-extension list
/// replaces whatever the usage file says about the same extension.
pub fn collect(usage_file: Option<&Path>, lists: &[(ExtensionKey, PathBuf)]) -> Result<RepoUsages> {
    let mut usages = match usage_file {
        Some(path) => load_usage_file(path)?,
        None => RepoUsages::new(),
    };
    for (extension, path) in lists {
        let repos = load_repo_list(path)?;
        debug!(%extension, count = repos.len(), path = %path.display(), "loaded repo list");
        usages.insert(extension.clone(), repos);
    }
    Ok(usages)
}
