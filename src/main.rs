//! auto-use-repo: keep `use_repo` calls in MODULE.bazel in sync with the
//! repositories module extensions provide.
//!
//! Reads a usage report (which repositories each extension must make
//! visible), reconciles the module file's `use_repo` statements against it,
//! and prints, checks or writes the result.

mod cli;

use anyhow::{Context, Result};
use auto_use_repo::scanner::ModuleIndex;
use auto_use_repo::{ModuleFile, UpdateSummary, rewriter, update_repo_usages, usages};
use clap::Parser;
use cli::{Args, Commands, ModuleArgs, UsageArgs};
use colored::Colorize;
use dialoguer::Confirm;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Machine-readable result of `check`.
#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    module_file: &'a Path,
    up_to_date: bool,
    summary: &'a UpdateSummary,
}

/// One extension as listed by `extensions --json`.
#[derive(Debug, Serialize)]
struct ExtensionListing {
    extension: String,
    proxies: Vec<ProxyListing>,
    repos: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProxyListing {
    name: String,
    line: Option<usize>,
    last_usage_line: Option<usize>,
}

/// The module file before and after reconciliation.
struct Reconciled {
    updated: ModuleFile,
    before: String,
    after: String,
    summary: UpdateSummary,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Commands::Check {
            module,
            usages,
            json,
        } => cmd_check(&module, &usages, json),
        Commands::Apply {
            module,
            usages,
            write,
            interactive,
        } => cmd_apply(&module, &usages, write, interactive),
        Commands::Extensions { module, json } => cmd_extensions(&module, json),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "auto_use_repo=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

/// Reads the module file and usage report and runs the reconciler on a copy.
fn reconcile(module: &ModuleArgs, usage_args: &UsageArgs) -> Result<Reconciled> {
    let path = module.path();
    let original = ModuleFile::read(&path)?;
    let usages = usages::collect(usage_args.usages.as_deref(), &usage_args.lists)?;
    tracing::debug!(
        module_file = %path.display(),
        extensions = usages.len(),
        "reconciling"
    );

    let mut updated = original.clone();
    let summary = update_repo_usages(&mut updated, &usages)
        .with_context(|| format!("Failed to update {}", path.display()))?;

    Ok(Reconciled {
        before: rewriter::render(&original),
        after: rewriter::render(&updated),
        updated,
        summary,
    })
}

fn cmd_check(module: &ModuleArgs, usage_args: &UsageArgs, json_output: bool) -> Result<ExitCode> {
    let path = module.path();
    let result = reconcile(module, usage_args)?;
    let up_to_date = result.before == result.after;

    if json_output {
        let report = CheckReport {
            module_file: &path,
            up_to_date,
            summary: &result.summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if up_to_date {
        println!("{} {} is up to date", "ok:".green().bold(), path.display());
    } else {
        println!(
            "{} {} is out of date",
            "warn:".yellow().bold(),
            path.display()
        );
        print_summary(&result.summary);
        print!("\n{}", diff(&path, &result));
        println!(
            "\n{} Run `auto-use-repo apply --write` to update it",
            "hint:".cyan().bold()
        );
    }

    Ok(if up_to_date {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_apply(
    module: &ModuleArgs,
    usage_args: &UsageArgs,
    write: bool,
    interactive: bool,
) -> Result<ExitCode> {
    let path = module.path();
    let result = reconcile(module, usage_args)?;

    if result.before == result.after {
        println!("{} No changes to apply", "info:".blue().bold());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {}",
        if write { "Updating:" } else { "Would update:" }
            .yellow()
            .bold(),
        path.display()
    );
    print_summary(&result.summary);

    if interactive {
        print!("\n{}", diff(&path, &result));
        let confirmed = Confirm::new()
            .with_prompt(format!("Write changes to {}?", path.display()))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("{} Skipped {}", "info:".blue().bold(), path.display());
            return Ok(ExitCode::SUCCESS);
        }
        rewriter::write(&result.updated)?;
        println!("{} Wrote {}", "ok:".green().bold(), path.display());
    } else if write {
        rewriter::write(&result.updated)?;
    } else {
        print!("\n{}", diff(&path, &result));
        println!("\n{} Use --write to apply changes", "hint:".cyan().bold());
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_extensions(module: &ModuleArgs, json_output: bool) -> Result<ExitCode> {
    let path = module.path();
    let file = ModuleFile::read(&path)?;
    let index = ModuleIndex::build(&file);
    for invalid in &index.invalid {
        eprintln!(
            "{} line {}: skipping use_extension with invalid label {:?}: {}",
            "warn:".yellow().bold(),
            invalid.line,
            invalid.label,
            invalid.error
        );
    }

    let listings: Vec<ExtensionListing> = index
        .extensions
        .iter()
        .map(|(extension, proxies)| ExtensionListing {
            extension: extension.to_string(),
            proxies: proxies
                .iter()
                .map(|p| ProxyListing {
                    name: p.name.clone(),
                    line: file.stmts[p.defined_at].line,
                    last_usage_line: file.stmts[p.last_usage].line,
                })
                .collect(),
            repos: proxies
                .iter()
                .flat_map(|p| index.use_repos_of(p))
                .filter_map(|pos| file.stmts[pos].as_call())
                .flat_map(|call| call.args.iter().filter_map(|a| a.as_string_literal()))
                .map(str::to_string)
                .collect(),
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(ExitCode::SUCCESS);
    }

    if listings.is_empty() {
        println!("{} No use_extension calls in {}", "info:".blue().bold(), path.display());
        return Ok(ExitCode::SUCCESS);
    }

    for listing in &listings {
        println!("{}", listing.extension.bold());
        for proxy in &listing.proxies {
            println!(
                "  {} {}",
                proxy.name,
                format!(
                    "(line {}, last used on line {})",
                    display_line(proxy.line),
                    display_line(proxy.last_usage_line)
                )
                .dimmed()
            );
        }
        if listing.repos.is_empty() {
            println!("    {}", "no repositories imported".dimmed());
        } else {
            println!("    {}", listing.repos.join(", "));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn display_line(line: Option<usize>) -> String {
    line.map_or_else(|| "?".to_string(), |l| l.to_string())
}

fn diff(path: &Path, result: &Reconciled) -> String {
    let color = colored::control::SHOULD_COLORIZE.should_colorize();
    rewriter::unified_diff(path, &result.before, &result.after, color)
}

fn print_summary(summary: &UpdateSummary) {
    for change in &summary.extensions {
        println!("  {}", change.extension.to_string().dimmed());
        for repo in &change.added {
            println!("    {} {}", "+".green(), repo.green());
        }
        for repo in &change.removed {
            println!("    {} {}", "-".red(), repo.red());
        }
        if change.new_call {
            println!("    {}", "(new use_repo call)".dimmed());
        }
    }
    if summary.removed_calls > 0 {
        println!(
            "  {} {} empty use_repo call(s)",
            "removed".red(),
            summary.removed_calls
        );
    }
}
