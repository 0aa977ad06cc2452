//! On-device document store: `.metadata`/`.content` JSON and the batched listing.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::catalog::{DocumentRecord, parse_device_timestamp};

/// Document store, relative to the remote user's home directory.
pub const REMOTE_DOCUMENTS_DIR: &str = ".local/share/remarkable/xochitl";

/// Parent id of documents in the trash.
pub(crate) const TRASH_ID: &str = "trash";

/// Prefix of the framing lines printed by [`listing_script`].
pub(crate) const LISTING_MARKER: &str = "@@rmexport@@";

const FOLDER_TYPE: &str = "CollectionType";
const DOCUMENT_TYPE: &str = "DocumentType";

/// Contents of `{id}.metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMetadata {
    /// Soft-deleted, waiting for sync.
    #[serde(default)]
    pub deleted: bool,
    /// Milliseconds since the epoch, as a decimal string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub last_modified: String,
    /// Metadata changed locally since the last sync.
    #[serde(default, rename = "metadatamodified")]
    pub metadata_modified: bool,
    /// Content changed locally since the last sync.
    #[serde(default)]
    pub modified: bool,
    /// Parent folder id; empty for the root, `trash` for trashed items.
    #[serde(default)]
    pub parent: String,
    /// Starred (bookmarked) on the device.
    #[serde(default)]
    pub pinned: bool,
    /// Uploaded to the cloud.
    #[serde(default)]
    pub synced: bool,
    /// `CollectionType` or `DocumentType`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Sync version, bumped on every change.
    #[serde(default)]
    pub version: u32,
    /// Name shown on the device.
    pub visible_name: String,
    /// Page the document was last open at; documents only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened_page: Option<u32>,
}

impl RemoteMetadata {
    /// Metadata for a new document.
    #[must_use]
    pub fn document(name: impl Into<String>, parent: impl Into<String>, modified: OffsetDateTime) -> Self {
        Self {
            last_opened_page: Some(0),
            ..Self::new(DOCUMENT_TYPE, name.into(), parent.into(), modified)
        }
    }

    /// Metadata for a new folder.
    #[must_use]
    pub fn folder(name: impl Into<String>, parent: impl Into<String>, modified: OffsetDateTime) -> Self {
        Self::new(FOLDER_TYPE, name.into(), parent.into(), modified)
    }

    fn new(kind: &str, visible_name: String, parent: String, modified: OffsetDateTime) -> Self {
        let millis = modified.unix_timestamp_nanos() / 1_000_000;
        Self {
            deleted: false,
            last_modified: millis.to_string(),
            metadata_modified: false,
            modified: false,
            parent,
            pinned: false,
            synced: false,
            kind: kind.to_string(),
            version: 1,
            visible_name,
            last_opened_page: None,
        }
    }

    /// Returns true for folders.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == FOLDER_TYPE
    }

    /// Parses `last_modified` as epoch milliseconds, or as a device timestamp.
    #[must_use]
    pub fn modified_at(&self) -> Option<OffsetDateTime> {
        match self.last_modified.trim().parse::<i64>() {
            Ok(millis) => {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
            }
            Err(_) => parse_device_timestamp(self.last_modified.trim()),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Contents of `{id}.content` for an imported file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContent {
    /// Tool and pen settings; empty for a new import.
    #[serde(default)]
    pub extra_metadata: serde_json::Map<String, serde_json::Value>,
    /// `pdf`, `epub` or `notebook`.
    #[serde(default)]
    pub file_type: String,
    /// Reader font for EPUBs; empty means the device default.
    #[serde(default)]
    pub font_name: String,
    /// Page the document was last open at.
    #[serde(default)]
    pub last_opened_page: u32,
    /// Reader line height; `-1` means the device default.
    #[serde(default)]
    pub line_height: i32,
    /// Reader margins in pixels.
    #[serde(default)]
    pub margins: u32,
    /// Number of pages, updated by the device once it renders the file.
    #[serde(default)]
    pub page_count: u32,
    /// Reader text scale.
    #[serde(default)]
    pub text_scale: f64,
    /// 3x3 view transform keyed `m11`..`m33`.
    #[serde(default)]
    pub transform: BTreeMap<String, f64>,
}

impl RemoteContent {
    /// Content descriptor for a freshly uploaded `file_type` document.
    #[must_use]
    pub fn for_file_type(file_type: impl Into<String>) -> Self {
        let transform = ["m11", "m12", "m13", "m21", "m22", "m23", "m31", "m32", "m33"]
            .into_iter()
            .map(|key| {
                let diagonal = matches!(key, "m11" | "m22" | "m33");
                (key.to_string(), if diagonal { 1.0 } else { 0.0 })
            })
            .collect();

        Self {
            extra_metadata: serde_json::Map::new(),
            file_type: file_type.into(),
            font_name: String::new(),
            last_opened_page: 0,
            line_height: -1,
            margins: 100,
            page_count: 1,
            text_scale: 1.0,
            transform,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentSummary {
    #[serde(default, rename = "fileType")]
    file_type: Option<String>,
}

/// Shell script printing every `.metadata` (and matching `.content`) file,
/// each preceded by a marker line naming its kind and id.
pub(crate) fn listing_script() -> String {
    format!(
        "cd {dir} || exit 1; \
         for f in *.metadata; do \
           [ -f \"$f\" ] || continue; \
           id=\"${{f%.metadata}}\"; \
           echo '{marker} meta' \"$id\"; cat \"$f\"; echo; \
           if [ -f \"$id.content\" ]; then \
             echo '{marker} content' \"$id\"; cat \"$id.content\"; echo; \
           fi; \
         done",
        dir = REMOTE_DOCUMENTS_DIR,
        marker = LISTING_MARKER,
    )
}

/// Parses the output of the batched listing command into records.
///
/// Deleted entries, trashed entries and blocks that fail to parse are
/// skipped. Records come back folders first, then by name.
#[must_use]
pub fn parse_remote_listing(output: &str) -> Vec<DocumentRecord> {
    let mut metadata: Vec<(String, String)> = Vec::new();
    let mut content: HashMap<String, String> = HashMap::new();

    let mut current: Option<(&str, &str)> = None;
    let mut body = String::new();
    let mut flush = |current: Option<(&str, &str)>, body: &mut String| {
        if let Some((kind, id)) = current {
            let text = std::mem::take(body);
            match kind {
                "meta" => metadata.push((id.to_string(), text)),
                "content" => {
                    content.insert(id.to_string(), text);
                }
                other => debug!(kind = other, id, "ignoring unknown listing block"),
            }
        }
        body.clear();
    };

    for line in output.lines() {
        if let Some(header) = line.strip_prefix(LISTING_MARKER) {
            flush(current.take(), &mut body);
            let mut parts = header.split_whitespace();
            current = match (parts.next(), parts.next()) {
                (Some(kind), Some(id)) => Some((kind, id)),
                _ => None,
            };
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(current.take(), &mut body);

    let mut records: Vec<DocumentRecord> = metadata
        .into_iter()
        .filter_map(|(id, text)| {
            let meta = match serde_json::from_str::<RemoteMetadata>(&text) {
                Ok(meta) => meta,
                Err(error) => {
                    warn!(id = %id, error = %error, "skipping unreadable metadata");
                    return None;
                }
            };
            if meta.deleted || meta.parent == TRASH_ID {
                return None;
            }
            let file_type = content
                .get(&id)
                .and_then(|text| serde_json::from_str::<ContentSummary>(text).ok())
                .and_then(|summary| summary.file_type)
                .filter(|t| !t.is_empty());

            Some(DocumentRecord {
                is_folder: meta.is_folder(),
                last_modified: meta.modified_at(),
                bookmarked: meta.pinned,
                name: meta.visible_name,
                parent_id: meta.parent,
                file_type: if meta.kind == FOLDER_TYPE { None } else { file_type },
                id,
            })
        })
        .collect();

    records.sort_by(|a, b| {
        b.is_folder
            .cmp(&a.is_folder)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn block(kind: &str, id: &str, json: &str) -> String {
        format!("{LISTING_MARKER} {kind} {id}\n{json}\n")
    }

    #[test]
    fn test_parse_remote_listing() {
        let output = [
            block(
                "meta",
                "doc-1",
                r#"{"deleted": false, "lastModified": "1709288430000", "parent": "dir-1",
                    "pinned": true, "type": "DocumentType", "visibleName": "Paper"}"#,
            ),
            block("content", "doc-1", r#"{"fileType": "pdf", "pageCount": 3}"#),
            block(
                "meta",
                "dir-1",
                r#"{"parent": "", "type": "CollectionType", "visibleName": "Work"}"#,
            ),
            block(
                "meta",
                "gone",
                r#"{"deleted": true, "parent": "", "type": "DocumentType", "visibleName": "Old"}"#,
            ),
            block(
                "meta",
                "binned",
                r#"{"parent": "trash", "type": "DocumentType", "visibleName": "Binned"}"#,
            ),
            block("meta", "broken", "{not json"),
        ]
        .concat();

        let records = parse_remote_listing(&output);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["dir-1", "doc-1"]);

        let folder = &records[0];
        assert!(folder.is_folder);
        assert_eq!(folder.name, "Work");
        assert!(folder.file_type.is_none());

        let paper = &records[1];
        assert!(!paper.is_folder);
        assert!(paper.bookmarked);
        assert_eq!(paper.parent_id, "dir-1");
        assert_eq!(paper.file_type.as_deref(), Some("pdf"));
        assert_eq!(paper.last_modified, Some(datetime!(2024-03-01 10:20:30 UTC)));
    }

    #[test]
    fn test_parse_remote_listing_empty_output() {
        assert!(parse_remote_listing("").is_empty());
    }

    #[test]
    fn test_last_modified_accepts_number_and_iso() {
        let meta: RemoteMetadata = serde_json::from_str(
            r#"{"lastModified": 1709288430000, "type": "DocumentType", "visibleName": "x"}"#,
        )
        .unwrap();
        assert_eq!(meta.modified_at(), Some(datetime!(2024-03-01 10:20:30 UTC)));

        let meta: RemoteMetadata = serde_json::from_str(
            r#"{"lastModified": "2024-03-01T10:20:30.000Z", "type": "DocumentType", "visibleName": "x"}"#,
        )
        .unwrap();
        assert_eq!(meta.modified_at(), Some(datetime!(2024-03-01 10:20:30 UTC)));
    }

    #[test]
    fn test_new_document_metadata_shape() {
        let meta = RemoteMetadata::document("Report", "dir-1", datetime!(2024-03-01 10:20:30 UTC));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "DocumentType");
        assert_eq!(json["visibleName"], "Report");
        assert_eq!(json["parent"], "dir-1");
        assert_eq!(json["lastModified"], "1709288430000");
        assert_eq!(json["metadatamodified"], false);
        assert_eq!(json["version"], 1);
        assert_eq!(json["lastOpenedPage"], 0);
    }

    #[test]
    fn test_new_folder_metadata_omits_page() {
        let meta = RemoteMetadata::folder("Inbox", "", datetime!(2024-03-01 10:20:30 UTC));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "CollectionType");
        assert!(json.get("lastOpenedPage").is_none());
        assert!(meta.is_folder());
    }

    #[test]
    fn test_content_defaults() {
        let content = RemoteContent::for_file_type("epub");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["fileType"], "epub");
        assert_eq!(json["lineHeight"], -1);
        assert_eq!(json["margins"], 100);
        assert_eq!(json["transform"]["m11"], 1.0);
        assert_eq!(json["transform"]["m12"], 0.0);
        assert_eq!(content.transform.len(), 9);
    }

    #[test]
    fn test_listing_script_targets_document_store() {
        let script = listing_script();
        assert!(script.starts_with("cd .local/share/remarkable/xochitl"));
        assert!(script.contains(LISTING_MARKER));
    }
}
