//! End-to-end CLI tests for the rmexport binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binary isolated from the user's config file and log settings.
fn rmexport(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rmexport").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

async fn tablet() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ID": "dir1", "Parent": "", "Type": "CollectionType", "VissibleName": "Work"},
            {"ID": "f1", "Parent": "", "Type": "DocumentType", "VissibleName": "Notes"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/documents/dir1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ID": "f2", "Parent": "dir1", "Type": "DocumentType", "VissibleName": "Paper"}
        ])))
        .mount(&server)
        .await;
    for id in ["f1", "f2"] {
        Mock::given(method("GET"))
            .and(path(format!("/download/{id}/pdf")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("pdf of {id}")))
            .mount(&server)
            .await;
    }
    server
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    rmexport(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    rmexport(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rmexport"));
}

#[test]
fn test_binary_requires_subcommand() {
    let home = TempDir::new().unwrap();
    rmexport(&home).assert().failure();
}

#[test]
fn test_export_rejects_unknown_format() {
    let home = TempDir::new().unwrap();
    rmexport(&home)
        .args(["export", "--all", "--format", "docx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("docx"));
}

#[test]
fn test_export_without_selection_fails() {
    let home = TempDir::new().unwrap();
    rmexport(&home)
        .args(["--address", "127.0.0.1:9", "export"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing selected"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("bad.toml");
    std::fs::write(&config, "no_such_key = 1\n").unwrap();
    rmexport(&home)
        .arg("--config")
        .arg(&config)
        .arg("restart")
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_prints_tree() {
    let server = tablet().await;
    let home = TempDir::new().unwrap();
    rmexport(&home)
        .args(["-q", "--address", &server.address().to_string(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Work/  [dir1]"))
        .stdout(predicate::str::contains("  Paper  [f2]"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_all_writes_files() {
    let server = tablet().await;
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    rmexport(&home)
        .args(["-q", "--address", &server.address().to_string(), "export", "--all"])
        .arg("--no-wrapper")
        .arg("-o")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Paper.pdf"));

    let paper = std::fs::read_to_string(out.path().join("Work").join("Paper.pdf")).unwrap();
    assert_eq!(paper, "pdf of f2");
    let notes = std::fs::read_to_string(out.path().join("Notes.pdf")).unwrap();
    assert_eq!(notes, "pdf of f1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_selected_folder_into_wrapper() {
    let server = tablet().await;
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    rmexport(&home)
        .args(["-q", "--address", &server.address().to_string(), "export", "-s", "Work"])
        .arg("-o")
        .arg(out.path())
        .assert()
        .success();

    let wrappers: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(wrappers.len(), 1);
    assert!(wrappers[0].starts_with("rM Export ("));
    assert!(out.path().join(&wrappers[0]).join("Work").join("Paper.pdf").exists());
    assert!(!out.path().join(&wrappers[0]).join("Notes.pdf").exists());
}
