//! auto-use-repo library for reconciling `use_repo` calls in Bazel module files.
//!
//! A module extension makes repositories visible to the root module only
//! through `use_repo(proxy, "repo", ...)` calls. This library rewrites those
//! calls so they import exactly the repositories each extension reports as
//! used. The workflow has three phases:
//!
//! 1. **Parsing**: read MODULE.bazel into a lossless statement model
//! 2. **Reconciliation**: index proxies and `use_repo` calls, then prune,
//!    extend, insert and delete calls to match the usage report
//! 3. **Rewriting**: print the file, leaving untouched statements byte-for-byte
//!
//! # Example
//!
//! ```
//! use auto_use_repo::{ModuleFile, RepoUsages, rewriter, update_repo_usages};
//!
//! let source = "ext = use_extension(\"@dep//x.bzl\", \"ext\")\nuse_repo(ext, \"a\", \"b\")\n";
//! let mut file = ModuleFile::parse("MODULE.bazel", source).unwrap();
//!
//! let mut usages = RepoUsages::new();
//! usages.insert(
//!     "@dep//x.bzl%ext".parse().unwrap(),
//!     ["b", "c"].into_iter().map(String::from).collect(),
//! );
//! update_repo_usages(&mut file, &usages).unwrap();
//!
//! assert_eq!(
//!     rewriter::render(&file),
//!     "ext = use_extension(\"@dep//x.bzl\", \"ext\")\nuse_repo(ext, \"b\", \"c\")\n"
//! );
//! ```

pub mod ast;
pub mod error;
pub mod label;
pub mod parser;
pub mod reconcile;
pub mod rewriter;
pub mod scanner;
pub mod syntax;
pub mod usages;

// Crate-root API used by the binary and tests
pub use ast::ModuleFile;
pub use error::{LabelError, ParseError, UpdateError};
pub use label::{ExtensionKey, Label};
pub use reconcile::{ExtensionChange, UpdateSummary, update_repo_usages};
pub use usages::RepoUsages;
