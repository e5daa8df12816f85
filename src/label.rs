//! Bazel label parsing and extension identities.
//!
//! Only the parts of label syntax that matter for naming a `.bzl` file are
//! understood: an optional `@repo` or `@@repo` prefix, `//package:target`,
//! and the relative forms `:target` and `target`. A label without `:` is read
//! as a file path relative to the repository root, so `@dep//x.bzl` and
//! `@dep//:x.bzl` name the same file.

use crate::error::LabelError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// Repository name without `@`. Empty for the main repository.
    pub repository: String,
    /// Written with `@@`: the name is canonical and must not be mapped
    /// through `repo_name` aliases.
    pub canonical: bool,
    pub package: String,
    pub target: String,
}

impl Label {
    pub fn parse(label: &str) -> Result<Self, LabelError> {
        if label.is_empty() {
            return Err(LabelError::Empty);
        }
        if let Some(ch) = label.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(LabelError::InvalidCharacter {
                label: label.to_string(),
                ch,
            });
        }

        let (canonical, rest) = if let Some(rest) = label.strip_prefix("@@") {
            (true, Some(rest))
        } else {
            (false, label.strip_prefix('@'))
        };

        let (repository, path) = match rest {
            Some(rest) => match rest.find("//") {
                Some(i) => (&rest[..i], &rest[i + 2..]),
                // `@foo` is shorthand for `@foo//:foo`.
                None => (rest, ""),
            },
            None => ("", label.strip_prefix("//").unwrap_or(label)),
        };

        if !repository.chars().all(is_repo_char) {
            return Err(LabelError::InvalidRepository {
                label: label.to_string(),
                repository: repository.to_string(),
            });
        }

        let (package, target) = match path.split_once(':') {
            Some((package, target)) => (package, target),
            None if path.is_empty() && rest.is_some() && !label.contains("//") => ("", repository),
            None => ("", path),
        };
        if target.is_empty() {
            return Err(LabelError::EmptyTarget {
                label: label.to_string(),
            });
        }

        Ok(Self {
            repository: repository.to_string(),
            canonical,
            package: package.to_string(),
            target: target.to_string(),
        })
    }

    /// Path of the labelled file relative to its repository root.
    pub fn file_path(&self) -> String {
        if self.package.is_empty() {
            self.target.clone()
        } else {
            format!("{}/{}", self.package, self.target)
        }
    }

    /// The same label in another repository.
    pub fn with_repository(&self, repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            canonical: false,
            ..self.clone()
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.canonical { "@@" } else { "@" };
        write!(f, "{at}{}//{}:{}", self.repository, self.package, self.target)
    }
}

fn is_repo_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '~')
}

/// Canonical identity of a module extension, `@module//path/to/file.bzl%name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ExtensionKey(String);

impl ExtensionKey {
    pub fn new(module: &str, file_path: &str, name: &str) -> Self {
        Self(format!("@{module}//{file_path}%{name}"))
    }

    /// Key for extension `name` defined in the file `label` points at. The
    /// label's repository must already be a module name.
    pub fn from_label(label: &Label, name: &str) -> Self {
        Self::new(&label.repository, &label.file_path(), name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The extension name after `%`.
    pub fn name(&self) -> &str {
        self.0.rsplit_once('%').map_or("", |(_, name)| name)
    }
}

impl FromStr for ExtensionKey {
    type Err = LabelError;

    /// Parses a key as written by users. The label part is normalized, so
    /// `@dep//:x.bzl%ext` and `@dep//x.bzl%ext` produce equal keys.
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let Some((label, name)) = key.rsplit_once('%') else {
            return Err(LabelError::MissingExtensionName {
                key: key.to_string(),
            });
        };
        if name.is_empty() {
            return Err(LabelError::MissingExtensionName {
                key: key.to_string(),
            });
        }
        Ok(Self::from_label(&Label::parse(label)?, name))
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    #[test]
    fn parses_repository_package_and_target() {
        let l = label("@rules_go//go/private:extensions.bzl");
        assert_eq!(l.repository, "rules_go");
        assert!(!l.canonical);
        assert_eq!(l.package, "go/private");
        assert_eq!(l.target, "extensions.bzl");
        assert_eq!(l.file_path(), "go/private/extensions.bzl");
    }

    #[test]
    fn label_without_colon_is_a_file_path() {
        let l = label("@dep//x.bzl");
        assert_eq!(l.repository, "dep");
        assert_eq!(l.file_path(), "x.bzl");
        assert_eq!(label("@dep//a/b.bzl").file_path(), "a/b.bzl");
    }

    #[test]
    fn main_repository_and_relative_labels() {
        let l = label("//:extensions.bzl");
        assert_eq!(l.repository, "");
        assert_eq!(l.file_path(), "extensions.bzl");
        assert_eq!(label(":extensions.bzl").file_path(), "extensions.bzl");
        assert_eq!(label("extensions.bzl").file_path(), "extensions.bzl");
        assert_eq!(label("@//tools:ext.bzl").repository, "");
    }

    #[test]
    fn canonical_repository_names() {
        let l = label("@@rules_go+//go:extensions.bzl");
        assert!(l.canonical);
        assert_eq!(l.repository, "rules_go+");
        assert_eq!(l.to_string(), "@@rules_go+//go:extensions.bzl");
    }

    #[test]
    fn bare_repository_shorthand() {
        let l = label("@foo");
        assert_eq!(l.repository, "foo");
        assert_eq!(l.target, "foo");
    }

    #[test]
    fn renders_with_substituted_repository() {
        let l = label("@io_bazel_rules_go//go:def.bzl").with_repository("rules_go");
        assert_eq!(l.to_string(), "@rules_go//go:def.bzl");
    }

    #[test]
    fn rejects_malformed_labels() {
        assert_eq!(Label::parse(""), Err(LabelError::Empty));
        assert!(matches!(
            Label::parse("@bad repo//x.bzl"),
            Err(LabelError::InvalidCharacter { ch: ' ', .. })
        ));
        assert!(matches!(
            Label::parse("@b@d//x.bzl"),
            Err(LabelError::InvalidRepository { .. })
        ));
        assert!(matches!(
            Label::parse("//pkg:"),
            Err(LabelError::EmptyTarget { .. })
        ));
        assert!(matches!(Label::parse("//"), Err(LabelError::EmptyTarget { .. })));
    }

    #[test]
    fn extension_keys_are_normalized() {
        let a: ExtensionKey = "@dep//x.bzl%ext".parse().unwrap();
        let b: ExtensionKey = "@dep//:x.bzl%ext".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "@dep//x.bzl%ext");
        assert_eq!(
            "@rules_go//go:extensions.bzl%go_sdk"
                .parse::<ExtensionKey>()
                .unwrap()
                .to_string(),
            "@rules_go//go/extensions.bzl%go_sdk"
        );
    }

    #[test]
    fn extension_key_requires_a_name() {
        assert!(matches!(
            "@dep//x.bzl".parse::<ExtensionKey>(),
            Err(LabelError::MissingExtensionName { .. })
        ));
        assert!(matches!(
            "@dep//x.bzl%".parse::<ExtensionKey>(),
            Err(LabelError::MissingExtensionName { .. })
        ));
    }

    #[test]
    fn extension_key_serializes_as_string() {
        let key = ExtensionKey::new("dep", "x.bzl", "ext");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"@dep//x.bzl%ext\"");
    }
}
