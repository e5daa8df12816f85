//! Error types for auto-use-repo.
//!
//! The library reports typed errors so callers can tell a malformed module
//! file apart from a usage report that does not match it. The binary wraps
//! all of them in `anyhow` and exits with status 1.

use crate::syntax::SyntaxError;
use std::path::PathBuf;
use thiserror::Error;

/// A module file that could not be parsed.
#[derive(Debug, Error)]
#[error("failed to parse {}: {}", .path.display(), summarize(.errors))]
pub struct ParseError {
    pub path: PathBuf,
    pub errors: Vec<SyntaxError>,
}

fn summarize(errors: &[SyntaxError]) -> String {
    let mut shown: Vec<String> = errors.iter().take(3).map(ToString::to_string).collect();
    if errors.len() > 3 {
        shown.push(format!("and {} more", errors.len() - 3));
    }
    shown.join("; ")
}

/// A label string that cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("empty label")]
    Empty,

    #[error("invalid repository name {repository:?} in label {label:?}")]
    InvalidRepository { label: String, repository: String },

    #[error("label {label:?} has an empty target")]
    EmptyTarget { label: String },

    #[error("label {label:?} contains invalid character {ch:?}")]
    InvalidCharacter { label: String, ch: char },

    #[error("extension key {key:?} must have the form @module//path/to/file.bzl%name")]
    MissingExtensionName { key: String },
}

/// Failures of [`crate::reconcile::update_repo_usages`].
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Repositories were reported for an extension the module file never
    /// declares with `use_extension`.
    #[error(
        "use_extension for {extension} not found in {}, but used repositories reported: {}",
        .file.display(),
        .repos.join(", ")
    )]
    UnknownExtension {
        extension: String,
        file: PathBuf,
        repos: Vec<String>,
    },

    /// A `use_extension` call names its defining file with a label that does
    /// not parse.
    #[error("invalid extension label {label:?} on line {line}")]
    InvalidLabel {
        label: String,
        line: usize,
        #[source]
        source: LabelError,
    },
}
