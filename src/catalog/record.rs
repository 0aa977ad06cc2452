//! Document record types shared by the catalog, selection tree and export pipeline.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque, stable identifier of a folder or document on the tablet.
///
/// The empty string denotes the root of the hierarchy.
pub type DocumentId = String;

/// Identifier of the hierarchy root.
pub const ROOT_ID: &str = "";

/// A single folder or document as listed by the tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier.
    pub id: DocumentId,
    /// Identifier of the containing folder (`""` for the root).
    pub parent_id: DocumentId,
    /// True for folders ("collections" on the device).
    pub is_folder: bool,
    /// Name shown on the tablet.
    pub name: String,
    /// Whether the document is starred on the device.
    #[serde(default)]
    pub bookmarked: bool,
    /// Last modification time reported by the device, when present.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    /// Source file type (`pdf`, `epub`, `notebook`, ...), when present.
    #[serde(default)]
    pub file_type: Option<String>,
}

impl DocumentRecord {
    /// Creates a folder record with no optional metadata.
    #[must_use]
    pub fn folder(
        id: impl Into<DocumentId>,
        parent_id: impl Into<DocumentId>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(id, parent_id, true, name)
    }

    /// Creates a document (leaf) record with no optional metadata.
    #[must_use]
    pub fn document(
        id: impl Into<DocumentId>,
        parent_id: impl Into<DocumentId>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(id, parent_id, false, name)
    }

    fn new(
        id: impl Into<DocumentId>,
        parent_id: impl Into<DocumentId>,
        is_folder: bool,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            is_folder,
            name: name.into(),
            bookmarked: false,
            last_modified: None,
            file_type: None,
        }
    }

    /// Returns true if this record sits directly under the root.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_id == ROOT_ID
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_and_document_constructors() {
        let folder = DocumentRecord::folder("dir1", "", "Notes");
        assert!(folder.is_folder);
        assert!(folder.is_top_level());
        assert_eq!(folder.name, "Notes");

        let doc = DocumentRecord::document("f1", "dir1", "Paper");
        assert!(!doc.is_folder);
        assert!(!doc.is_top_level());
        assert!(doc.last_modified.is_none());
        assert!(doc.file_type.is_none());
    }

    #[test]
    fn test_record_serializes_optional_timestamp() {
        let mut doc = DocumentRecord::document("f1", "", "Paper");
        doc.last_modified = Some(time::macros::datetime!(2024-03-01 10:20:30 UTC));
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("2024-03-01T10:20:30Z"), "got: {json}");

        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
