//! Command-line behavior tests.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MODULE: &str = r#"module(name = "app")

bazel_dep(name = "rules_go", version = "0.50.1", repo_name = "io_bazel_rules_go")

go_sdk = use_extension("@io_bazel_rules_go//go:extensions.bzl", "go_sdk")
go_sdk.download(version = "1.23.1")
use_repo(go_sdk, "go_toolchains", "stale_repo")
"#;

fn auto_use_repo() -> Command {
    let mut cmd = Command::cargo_bin("auto-use-repo").expect("auto-use-repo binary");
    cmd.env_remove("BUILD_WORKSPACE_DIRECTORY")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn create_workspace() -> TempDir {
    let td = tempfile::tempdir().expect("tempdir");
    fs::write(td.path().join("MODULE.bazel"), MODULE).unwrap();
    fs::write(td.path().join("go_sdk.json"), r#"["go_toolchains"]"#).unwrap();
    td
}

fn module_text(root: &Path) -> String {
    fs::read_to_string(root.join("MODULE.bazel")).unwrap()
}

const GO_SDK_USAGE: &str = "@rules_go//go:extensions.bzl%go_sdk=go_sdk.json";

#[test]
fn check_reports_out_of_date_file() {
    let temp = create_workspace();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["check", GO_SDK_USAGE])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("is out of date"))
        .stdout(predicate::str::contains("-use_repo(go_sdk, \"go_toolchains\", \"stale_repo\")"))
        .stdout(predicate::str::contains("+use_repo(go_sdk, \"go_toolchains\")"));

    assert_eq!(module_text(temp.path()), MODULE);
}

#[test]
fn apply_without_write_is_dry_run() {
    let temp = create_workspace();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["apply", GO_SDK_USAGE])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would update:"))
        .stdout(predicate::str::contains("Use --write to apply changes"));

    assert_eq!(module_text(temp.path()), MODULE);
}

#[test]
fn apply_write_then_check_passes() {
    let temp = create_workspace();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["apply", "--write", GO_SDK_USAGE])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updating:"));

    let updated = module_text(temp.path());
    assert!(updated.ends_with("use_repo(go_sdk, \"go_toolchains\")\n"), "{updated}");

    auto_use_repo()
        .current_dir(temp.path())
        .args(["check", GO_SDK_USAGE])
        .assert()
        .success()
        .stdout(predicate::str::contains("is up to date"));
}

#[test]
fn workspace_directory_comes_from_bazel_run_environment() {
    let temp = create_workspace();
    let usage = temp.path().join("go_sdk.json");

    auto_use_repo()
        .env("BUILD_WORKSPACE_DIRECTORY", temp.path())
        .args([
            "apply".to_string(),
            "--write".to_string(),
            format!("@rules_go//go:extensions.bzl%go_sdk={}", usage.display()),
        ])
        .assert()
        .success();

    assert!(!module_text(temp.path()).contains("stale_repo"));
}

#[test]
fn usage_file_is_accepted() {
    let temp = create_workspace();
    fs::write(
        temp.path().join("usages.json"),
        r#"{"@rules_go//go:extensions.bzl%go_sdk": []}"#,
    )
    .unwrap();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["apply", "--write", "--usages", "usages.json"])
        .assert()
        .success();

    let updated = module_text(temp.path());
    assert!(!updated.contains("use_repo("), "{updated}");
    assert!(updated.ends_with("go_sdk.download(version = \"1.23.1\")\n"), "{updated}");
}

#[test]
fn check_json_reports_summary() {
    let temp = create_workspace();

    let output = auto_use_repo()
        .current_dir(temp.path())
        .args(["check", "--json", GO_SDK_USAGE])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["up_to_date"], false);
    assert_eq!(
        report["summary"]["extensions"][0]["extension"],
        "@rules_go//go/extensions.bzl%go_sdk"
    );
    assert_eq!(report["summary"]["extensions"][0]["removed"][0], "stale_repo");
}

#[test]
fn unknown_extension_fails_without_writing() {
    let temp = create_workspace();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["apply", "--write", "@other//x.bzl%ext=go_sdk.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "use_extension for @other//x.bzl%ext not found",
        ));

    assert_eq!(module_text(temp.path()), MODULE);
}

#[test]
fn missing_module_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["extensions"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn extensions_lists_proxies_and_imports() {
    let temp = create_workspace();

    auto_use_repo()
        .current_dir(temp.path())
        .args(["extensions"])
        .assert()
        .success()
        .stdout(predicate::str::contains("@rules_go//go/extensions.bzl%go_sdk"))
        .stdout(predicate::str::contains("go_sdk (line 5, last used on line 6)"))
        .stdout(predicate::str::contains("go_toolchains, stale_repo"));
}

#[test]
fn extensions_json_output() {
    let temp = create_workspace();

    let output = auto_use_repo()
        .current_dir(temp.path())
        .args(["extensions", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listing[0]["proxies"][0]["name"], "go_sdk");
    assert_eq!(listing[0]["proxies"][0]["line"], 5);
    assert_eq!(listing[0]["repos"][1], "stale_repo");
}
