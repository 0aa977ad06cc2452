//! Integration tests for the web interface transport.
//!
//! A wiremock server stands in for the tablet's USB web interface.

use std::time::Duration;

use futures_util::StreamExt;
use rmexport_core::catalog::{Catalog, DocumentRecord};
use rmexport_core::export::ExportFormat;
use rmexport_core::transport::{HttpConfig, HttpTransport, Transport, TransportError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> HttpConfig {
    HttpConfig {
        connect_timeout: Duration::from_secs(2),
        listing_timeout: Duration::from_secs(2),
        download_timeout: Duration::from_secs(5),
        request_delay: Duration::ZERO,
    }
}

fn transport_for(server: &MockServer) -> HttpTransport {
    let authority = server.address().to_string();
    HttpTransport::with_config(&authority, fast_config()).expect("mock address is valid")
}

fn folder_entry(id: &str, parent: &str, name: &str) -> serde_json::Value {
    json!({
        "ID": id,
        "Parent": parent,
        "Type": "CollectionType",
        "VissibleName": name,
        "Bookmarked": false,
        "ModifiedClient": "2024-03-01T09:05:07.123Z"
    })
}

fn document_entry(id: &str, parent: &str, name: &str) -> serde_json::Value {
    json!({
        "ID": id,
        "Parent": parent,
        "Type": "DocumentType",
        "VissibleName": name,
        "Bookmarked": true,
        "ModifiedClient": "2024-03-02T10:00:00.000Z",
        "fileType": "pdf"
    })
}

async fn mount_listing(server: &MockServer, folder_path: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(folder_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_documents_walks_every_folder() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "/documents/",
        json!([folder_entry("dir1", "", "Work"), document_entry("f1", "", "Notes")]),
    )
    .await;
    mount_listing(
        &server,
        "/documents/dir1",
        json!([document_entry("f2", "dir1", "Paper")]),
    )
    .await;

    let transport = transport_for(&server);
    let records = transport.list_documents().await.expect("listing succeeds");

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["dir1", "f1", "f2"]);
    assert!(records[0].is_folder);
    assert!(records[1].bookmarked);
    assert_eq!(records[1].file_type.as_deref(), Some("pdf"));
    assert!(records[2].last_modified.is_some());
}

#[tokio::test]
async fn test_catalog_load_builds_paths() {
    let server = MockServer::start().await;
    mount_listing(&server, "/documents/", json!([folder_entry("dir1", "", "Work")])).await;
    mount_listing(
        &server,
        "/documents/dir1",
        json!([document_entry("f2", "dir1", "Paper")]),
    )
    .await;

    let catalog = Catalog::load(&transport_for(&server)).await.expect("catalog loads");

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.hierarchical_path("f2"), ["Work", "Paper"]);
    assert_eq!(catalog.resolve("Work/Paper").map(|r| r.id.as_str()), Some("f2"));
}

#[tokio::test]
async fn test_listing_skips_malformed_entries() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "/documents/",
        json!([
            document_entry("f1", "", "Notes"),
            {"ID": "broken", "Type": "DocumentType"},
            {"ID": "weird", "Parent": "", "Type": "Unknown", "VissibleName": "x"}
        ]),
    )
    .await;

    let records = transport_for(&server).list_documents().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "f1");
}

#[tokio::test]
async fn test_listing_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = transport_for(&server).list_documents().await.unwrap_err();
    assert!(
        matches!(err, TransportError::RemoteStatus { code: 500, .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_listing_garbage_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = transport_for(&server).list_documents().await.unwrap_err();
    assert!(matches!(err, TransportError::Parse { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_fetch_document_streams_bytes() {
    let server = MockServer::start().await;
    mount_listing(&server, "/documents/dir1", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/download/f2/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 body".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let record = DocumentRecord::document("f2", "dir1", "Paper");
    let mut stream = transport_for(&server)
        .fetch_document(&record, ExportFormat::Pdf)
        .await
        .expect("fetch starts");

    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"%PDF-1.7 body");
}

#[tokio::test]
async fn test_fetch_document_ignores_folder_open_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/dir1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/f2/rmdoc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
        .mount(&server)
        .await;

    let record = DocumentRecord::document("f2", "dir1", "Paper");
    let result = transport_for(&server)
        .fetch_document(&record, ExportFormat::Rmdoc)
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_fetch_document_error_status() {
    let server = MockServer::start().await;
    mount_listing(&server, "/documents/", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/download/f1/pdf"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let record = DocumentRecord::document("f1", "", "Notes");
    let err = transport_for(&server)
        .fetch_document(&record, ExportFormat::Pdf)
        .await
        .err()
        .expect("503 is an error");
    assert!(matches!(err, TransportError::RemoteStatus { code: 503, .. }));
    assert!(err.is_transient());
}
