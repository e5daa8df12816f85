//! Module file indexes.
//!
//! Scans the top-level statements of a [`ModuleFile`] and builds the three
//! lookups the reconciler needs: the apparent-to-module repository name map,
//! the `use_extension` proxies of every extension, and the `use_repo` calls
//! made through each proxy name. Statements are referred to by their position
//! in [`ModuleFile::stmts`].

use crate::ast::{CallExpr, Expr, ModuleFile, Stmt, StmtKind};
use crate::error::{LabelError, UpdateError};
use crate::label::{ExtensionKey, Label};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Maps apparent repository names to module names.
#[derive(Debug, Clone, Default)]
pub struct RepoNames(HashMap<String, String>);

impl RepoNames {
    /// Module name for `apparent`, or `apparent` itself when it is not an
    /// alias the file declares.
    pub fn canonical<'a>(&'a self, apparent: &'a str) -> &'a str {
        self.0.get(apparent).map_or(apparent, String::as_str)
    }

    pub fn get(&self, apparent: &str) -> Option<&str> {
        self.0.get(apparent).map(String::as_str)
    }
}

/// One `proxy = use_extension(...)` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyInfo {
    /// Identifier the proxy is bound to.
    pub name: String,
    /// Position of the defining assignment.
    pub defined_at: usize,
    /// Position of the next assignment to the same name, if any.
    pub shadowed_at: Option<usize>,
    /// Position of the last statement that defines or uses the proxy: the
    /// assignment itself or a `name.tag(...)` call while this binding is live.
    pub last_usage: usize,
}

impl ProxyInfo {
    /// Whether a statement at `pos` refers to this binding when it names
    /// the proxy identifier.
    pub fn in_scope(&self, pos: usize) -> bool {
        pos > self.defined_at && self.shadowed_at.is_none_or(|end| pos < end)
    }
}

/// A `use_extension` call whose label does not parse. It only matters for
/// reported extensions of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidExtension {
    pub name: String,
    pub label: String,
    pub line: usize,
    pub error: LabelError,
}

impl InvalidExtension {
    pub fn to_error(&self) -> UpdateError {
        UpdateError::InvalidLabel {
            label: self.label.clone(),
            line: self.line,
            source: self.error.clone(),
        }
    }
}

/// Proxies per extension, in definition order.
pub type ExtensionProxies = BTreeMap<ExtensionKey, Vec<ProxyInfo>>;

/// `use_repo` statement positions per proxy identifier, in file order.
pub type UseRepoCalls = HashMap<String, Vec<usize>>;

/// All indexes over one module file.
#[derive(Debug, Clone)]
pub struct ModuleIndex {
    pub repo_names: RepoNames,
    pub extensions: ExtensionProxies,
    pub use_repos: UseRepoCalls,
    pub invalid: Vec<InvalidExtension>,
}

impl ModuleIndex {
    pub fn build(file: &ModuleFile) -> Self {
        let repo_names = module_repo_names(&file.stmts);
        let (extensions, invalid) = extension_proxies(&file.stmts, &repo_names);
        let use_repos = use_repo_calls(&file.stmts);
        Self {
            repo_names,
            extensions,
            use_repos,
            invalid,
        }
    }

    /// Checks that `extension` is declared by the file.
    ///
    /// An undeclared extension whose name matches a `use_extension` call
    /// with an unparsable label reports that label instead, since the call
    /// may well be the missing declaration.
    pub fn require(&self, extension: &ExtensionKey) -> Result<&[ProxyInfo], Option<UpdateError>> {
        if let Some(proxies) = self.extensions.get(extension) {
            return Ok(proxies);
        }
        Err(self
            .invalid
            .iter()
            .find(|invalid| invalid.name == extension.name())
            .map(InvalidExtension::to_error))
    }

    /// Positions of the `use_repo` calls that import through `proxy`.
    pub fn use_repos_of<'a>(&'a self, proxy: &'a ProxyInfo) -> impl Iterator<Item = usize> + 'a {
        self.use_repos
            .get(&proxy.name)
            .into_iter()
            .flatten()
            .copied()
            .filter(|pos| proxy.in_scope(*pos))
    }
}

/// Collects the apparent repository names declared by `module(...)` and
/// `bazel_dep(...)`.
///
/// Each declaration maps its `repo_name` (or its own name when there is
/// none) to the module name; the root module is also reachable under the
/// empty name. `module` declarations are read first, so a `bazel_dep` that
/// reuses an alias wins over the root module's own `repo_name`.
pub fn module_repo_names(stmts: &[Stmt]) -> RepoNames {
    let mut names = HashMap::new();
    for callee in ["module", "bazel_dep"] {
        for call in stmts.iter().filter_map(Stmt::as_call) {
            if call.callee_name() != Some(callee) {
                continue;
            }
            let Some(name) = call.keyword_string("name") else {
                continue;
            };
            if callee == "module" {
                names.insert(String::new(), name.to_string());
            }
            let alias = call.keyword_string("repo_name").unwrap_or(name);
            names.insert(alias.to_string(), name.to_string());
        }
    }
    RepoNames(names)
}

/// Finds every `use_extension` proxy and the last statement using it.
///
/// Calls whose label does not parse are returned separately; they still end
/// the scope of whatever the name was bound to before.
pub fn extension_proxies(
    stmts: &[Stmt],
    repo_names: &RepoNames,
) -> (ExtensionProxies, Vec<InvalidExtension>) {
    let mut extensions = ExtensionProxies::new();
    let mut invalid = Vec::new();
    // Live bindings: identifier -> (extension, index into its proxy list).
    let mut bindings: HashMap<String, (ExtensionKey, usize)> = HashMap::new();

    for (pos, stmt) in stmts.iter().enumerate() {
        match &stmt.kind {
            StmtKind::Call(call) => {
                let Some((key, index)) = call.method_receiver().and_then(|r| bindings.get(r))
                else {
                    continue;
                };
                if let Some(proxy) = extensions.get_mut(key).and_then(|p| p.get_mut(*index)) {
                    proxy.last_usage = pos;
                }
            }
            StmtKind::Assign {
                target: Expr::Ident(name),
                value,
            } => {
                if let Some((key, index)) = bindings.remove(name) {
                    if let Some(proxy) = extensions.get_mut(&key).and_then(|p| p.get_mut(index)) {
                        proxy.shadowed_at = Some(pos);
                    }
                }

                let Some((bzl_file, extension_name)) = use_extension_args(value) else {
                    continue;
                };
                let label = match Label::parse(bzl_file) {
                    Ok(label) => label,
                    Err(error) => {
                        let line = stmt.line.unwrap_or_default();
                        warn!(label = bzl_file, line, %error, "ignoring use_extension with invalid label");
                        invalid.push(InvalidExtension {
                            name: extension_name.to_string(),
                            label: bzl_file.to_string(),
                            line,
                            error,
                        });
                        continue;
                    }
                };
                let module = if label.canonical {
                    label.repository.clone()
                } else {
                    repo_names.canonical(&label.repository).to_string()
                };
                let key = ExtensionKey::from_label(&label.with_repository(&module), extension_name);
                debug!(proxy = %name, extension = %key, "found use_extension");

                let proxies = extensions.entry(key.clone()).or_default();
                proxies.push(ProxyInfo {
                    name: name.clone(),
                    defined_at: pos,
                    shadowed_at: None,
                    last_usage: pos,
                });
                bindings.insert(name.clone(), (key, proxies.len() - 1));
            }
            _ => {}
        }
    }

    (extensions, invalid)
}

/// Indexes `use_repo` statements by the proxy identifier they import through.
pub fn use_repo_calls(stmts: &[Stmt]) -> UseRepoCalls {
    let mut calls = UseRepoCalls::new();
    for (pos, stmt) in stmts.iter().enumerate() {
        if let Some(proxy) = use_repo_proxy(stmt) {
            calls.entry(proxy.to_string()).or_default().push(pos);
        }
    }
    calls
}

/// Proxy identifier of a `use_repo(proxy, ...)` statement.
pub fn use_repo_proxy(stmt: &Stmt) -> Option<&str> {
    let call = stmt.as_call()?;
    if call.callee_name() != Some("use_repo") {
        return None;
    }
    match call.args.first() {
        Some(arg) if arg.keyword.is_none() => match &arg.value {
            Expr::Ident(name) => Some(name),
            _ => None,
        },
        _ => None,
    }
}

/// The `.bzl` label and extension name of a `use_extension(...)` call.
fn use_extension_args(value: &Expr) -> Option<(&str, &str)> {
    let Expr::Call(call) = value else {
        return None;
    };
    if call.callee_name() != Some("use_extension") {
        return None;
    }
    Some((
        string_arg(call, 0, "extension_bzl_file")?,
        string_arg(call, 1, "extension_name")?,
    ))
}

fn string_arg<'a>(call: &'a CallExpr, index: usize, keyword: &str) -> Option<&'a str> {
    match call.positional(index).or_else(|| call.keyword(keyword)) {
        Some(Expr::Str(value)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ModuleFile {
        ModuleFile::parse("MODULE.bazel", source).unwrap()
    }

    fn key(s: &str) -> ExtensionKey {
        s.parse().unwrap()
    }

    #[test]
    fn bazel_dep_aliases_override_module_alias() {
        let file = parse(
            r#"bazel_dep(name = "rules_go", repo_name = "io_bazel_rules_go")
module(name = "root", repo_name = "io_bazel_rules_go")
bazel_dep(name = "gazelle", repo_name = "bazel_gazelle")
bazel_dep(name = "plain")
"#,
        );
        let names = module_repo_names(&file.stmts);
        assert_eq!(names.get("io_bazel_rules_go"), Some("rules_go"));
        assert_eq!(names.get("bazel_gazelle"), Some("gazelle"));
        assert_eq!(names.get("plain"), Some("plain"));
        assert_eq!(names.get(""), Some("root"));
        assert_eq!(names.get("undeclared"), None);
        assert_eq!(names.canonical("undeclared"), "undeclared");
    }

    #[test]
    fn resolves_extension_keys_through_aliases() {
        let file = parse(
            r#"module(name = "root", repo_name = "my_root")
bazel_dep(name = "rules_go", repo_name = "io_bazel_rules_go")
go_sdk = use_extension("@io_bazel_rules_go//go:extensions.bzl", "go_sdk")
local = use_extension("//:extensions.bzl", "local")
canon = use_extension("@@io_bazel_rules_go//x.bzl", "e")
"#,
        );
        let index = ModuleIndex::build(&file);
        let keys: Vec<&str> = index.extensions.keys().map(ExtensionKey::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "@io_bazel_rules_go//x.bzl%e",
                "@root//extensions.bzl%local",
                "@rules_go//go/extensions.bzl%go_sdk",
            ]
        );
    }

    #[test]
    fn accepts_keyword_extension_arguments() {
        let file = parse(
            r#"ext = use_extension(extension_bzl_file = "@dep//x.bzl", extension_name = "e", dev_dependency = True)
"#,
        );
        let (proxies, _) = extension_proxies(&file.stmts, &RepoNames::default());
        assert!(proxies.contains_key(&key("@dep//x.bzl%e")));
    }

    #[test]
    fn tracks_last_usage_per_binding() {
        let file = parse(
            r#"ext = use_extension("@dep//x.bzl", "e")
ext.tag(a = 1)
other = use_extension("@dep//y.bzl", "f")
ext.tag(b = 2)
dev = use_extension("@dep//x.bzl", "e", dev_dependency = True)
dev.tag()
"#,
        );
        let (proxies, _) = extension_proxies(&file.stmts, &RepoNames::default());
        let e = &proxies[&key("@dep//x.bzl%e")];
        assert_eq!(e.len(), 2);
        assert_eq!((e[0].name.as_str(), e[0].defined_at, e[0].last_usage), ("ext", 0, 3));
        assert_eq!((e[1].name.as_str(), e[1].defined_at, e[1].last_usage), ("dev", 4, 5));
        assert_eq!(proxies[&key("@dep//y.bzl%f")][0].last_usage, 2);
    }

    #[test]
    fn rebinding_a_name_ends_the_previous_proxy() {
        let file = parse(
            r#"ext = use_extension("@dep//x.bzl", "e")
use_repo(ext, "a")
ext = use_extension("@dep//y.bzl", "f")
ext.tag()
use_repo(ext, "b")
"#,
        );
        let index = ModuleIndex::build(&file);
        let first = &index.extensions[&key("@dep//x.bzl%e")][0];
        let second = &index.extensions[&key("@dep//y.bzl%f")][0];
        assert_eq!(first.shadowed_at, Some(2));
        assert_eq!(first.last_usage, 0);
        assert_eq!(second.last_usage, 3);
        assert_eq!(index.use_repos_of(first).collect::<Vec<_>>(), vec![1]);
        assert_eq!(index.use_repos_of(second).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn indexes_use_repo_calls_by_proxy() {
        let file = parse(
            r#"use_repo(ext, "a")
use_repo(other)
use_repo(ext, b = "c")
use_repo("not_a_proxy")
use_repo(proxy = ext)
"#,
        );
        let calls = use_repo_calls(&file.stmts);
        assert_eq!(calls["ext"], vec![0, 2]);
        assert_eq!(calls["other"], vec![1]);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn invalid_extension_label_is_recorded_with_line() {
        let file = parse(
            "ext = use_extension(\"@dep//x.bzl\", \"e\")\n\next = use_extension(\"@bad!repo//x.bzl\", \"e\")\nuse_repo(ext, \"a\")\n",
        );
        let index = ModuleIndex::build(&file);
        assert_eq!(index.invalid.len(), 1);
        assert_eq!(index.invalid[0].name, "e");
        assert_eq!(index.invalid[0].line, 3);
        // The bad call still rebinds `ext`.
        let proxy = &index.extensions[&key("@dep//x.bzl%e")][0];
        assert_eq!(proxy.shadowed_at, Some(1));
        assert_eq!(index.use_repos_of(proxy).count(), 0);
    }

    #[test]
    fn require_reports_invalid_label_for_matching_name_only() {
        let file = parse("ext = use_extension(\"@bad!repo//x.bzl\", \"e\")\n");
        let index = ModuleIndex::build(&file);
        let err = index.require(&key("@dep//x.bzl%e")).unwrap_err();
        assert!(matches!(err, Some(UpdateError::InvalidLabel { line: 1, .. })));
        assert!(index.require(&key("@dep//x.bzl%other")).unwrap_err().is_none());
    }

    #[test]
    fn ignores_non_literal_extension_arguments() {
        let file = parse("ext = use_extension(LABEL, \"e\")\nx = use_extension(\"@dep//x.bzl\")\n");
        let (proxies, _) = extension_proxies(&file.stmts, &RepoNames::default());
        assert!(proxies.is_empty());
    }
}
