//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Every subcommand reads one module file; `check` and `apply` additionally
//! take a repository usage report.

use auto_use_repo::ExtensionKey;
use auto_use_repo::usages::parse_usage_arg;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keep the use_repo calls of a Bazel MODULE.bazel file in sync with the
/// repositories each module extension actually provides.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Print debug diagnostics to stderr. RUST_LOG takes precedence.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which module file to operate on.
#[derive(Debug, clap::Args)]
pub struct ModuleArgs {
    /// Workspace root containing MODULE.bazel. Set automatically under `bazel run`.
    #[arg(long, env = "BUILD_WORKSPACE_DIRECTORY", default_value = ".")]
    pub workspace: PathBuf,

    /// Module file to edit. Overrides --workspace.
    #[arg(long)]
    pub module_file: Option<PathBuf>,
}

impl ModuleArgs {
    pub fn path(&self) -> PathBuf {
        self.module_file
            .clone()
            .unwrap_or_else(|| self.workspace.join("MODULE.bazel"))
    }
}

/// Which repositories each extension must import.
#[derive(Debug, clap::Args)]
pub struct UsageArgs {
    /// JSON object mapping extension keys (`@module//path/file.bzl%name`) to
    /// arrays of repository names.
    #[arg(long)]
    pub usages: Option<PathBuf>,

    /// Per-extension reports in `EXTENSION=PATH` format, where PATH holds a
    /// JSON array of repository names. Overrides --usages for that extension.
    #[arg(value_name = "EXTENSION=PATH", value_parser = parse_usage_arg)]
    pub lists: Vec<(ExtensionKey, PathBuf)>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report whether the module file is up to date. Exits with status 1 if not.
    Check {
        #[command(flatten)]
        module: ModuleArgs,

        #[command(flatten)]
        usages: UsageArgs,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Rewrite the use_repo calls of the module file.
    Apply {
        #[command(flatten)]
        module: ModuleArgs,

        #[command(flatten)]
        usages: UsageArgs,

        /// Actually modify the file (default is dry-run).
        #[arg(long)]
        write: bool,

        /// Show the diff and ask before writing.
        #[arg(short, long)]
        interactive: bool,
    },

    /// List the extensions the module file uses and what each one imports.
    Extensions {
        #[command(flatten)]
        module: ModuleArgs,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },
}
