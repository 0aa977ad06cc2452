//! Document catalog: the tablet's folder hierarchy as read through a transport.
//!
//! The catalog owns the [`DocumentRecord`]s for one session. The selection
//! tree and the export pipeline reference its ids and resolved paths.
//!
//! # Example
//!
//! ```no_run
//! use rmexport_core::catalog::{Catalog, ROOT_ID};
//! use rmexport_core::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("10.11.99.1")?;
//! let catalog = Catalog::load(&transport).await?;
//! for record in catalog.folder(ROOT_ID) {
//!     println!("{}", catalog.display_path(&record.id));
//! }
//! # Ok(())
//! # }
//! ```

mod listing;
mod record;

pub use listing::{TabletAddress, parse_device_timestamp, parse_documents_response, validate_address};
pub use record::{DocumentId, DocumentRecord, ROOT_ID};

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::export::ExportItem;
use crate::selection::SelectionTree;
use crate::transport::{Transport, TransportError};

/// Folder hierarchy of one tablet, indexed by parent and by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// For a folder id, the records directly inside it in listing order.
    children: HashMap<DocumentId, Vec<DocumentRecord>>,
    by_id: HashMap<DocumentId, DocumentRecord>,
}

impl Catalog {
    /// Builds a catalog from records in listing order.
    ///
    /// A later record with an id already seen replaces the earlier one.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = DocumentRecord>) -> Self {
        let mut by_id: HashMap<DocumentId, DocumentRecord> = HashMap::new();
        let mut order: Vec<DocumentId> = Vec::new();
        for record in records {
            if !by_id.contains_key(&record.id) {
                order.push(record.id.clone());
            }
            by_id.insert(record.id.clone(), record);
        }

        let mut children: HashMap<DocumentId, Vec<DocumentRecord>> = HashMap::new();
        for id in &order {
            if let Some(record) = by_id.get(id) {
                children
                    .entry(record.parent_id.clone())
                    .or_default()
                    .push(record.clone());
            }
        }

        Self { children, by_id }
    }

    /// Reads every record through `transport`.
    ///
    /// # Errors
    ///
    /// Propagates the transport's listing error (`InvalidAddress`,
    /// `Connection`, `Timeout`, `Parse`, ...).
    #[instrument(skip(transport), fields(transport = transport.name()))]
    pub async fn load(transport: &dyn Transport) -> Result<Self, TransportError> {
        let records = transport.list_documents().await?;
        debug!(count = records.len(), "catalog loaded");
        Ok(Self::from_records(records))
    }

    /// Number of records (folders and documents).
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if the tablet listed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Records directly inside folder `id`; empty for unknown ids and documents.
    #[must_use]
    pub fn folder(&self, id: &str) -> &[DocumentRecord] {
        self.children.get(id).map_or(&[], Vec::as_slice)
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.by_id.get(id)
    }

    /// The parent-to-children mapping the selection tree is built from.
    #[must_use]
    pub fn children_by_parent(&self) -> &HashMap<DocumentId, Vec<DocumentRecord>> {
        &self.children
    }

    /// Names from the root down to `id`, inclusive.
    ///
    /// The walk stops at the root, at an unknown parent, or on a cycle.
    #[must_use]
    pub fn hierarchical_path(&self, id: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut current = id;
        while current != ROOT_ID && seen.insert(current) {
            let Some(record) = self.by_id.get(current) else {
                break;
            };
            names.push(record.name.clone());
            current = &record.parent_id;
        }
        names.reverse();
        names
    }

    /// Human-readable `/`-joined path; names containing `/` are single-quoted.
    #[must_use]
    pub fn display_path(&self, id: &str) -> String {
        self.hierarchical_path(id)
            .into_iter()
            .map(|name| {
                if name.contains('/') {
                    format!("'{name}'")
                } else {
                    name
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Finds a record by id, or else by its [`Catalog::display_path`].
    #[must_use]
    pub fn resolve(&self, selector: &str) -> Option<&DocumentRecord> {
        self.by_id
            .get(selector)
            .or_else(|| self.find_by_display_path(selector))
    }

    /// First record, in depth-first order, whose [`Catalog::display_path`] is `path`.
    ///
    /// Leading and trailing `/` are ignored.
    #[must_use]
    pub fn find_by_display_path(&self, path: &str) -> Option<&DocumentRecord> {
        let wanted = path.trim_matches('/');
        self.iter_depth_first()
            .find(|record| self.display_path(&record.id) == wanted)
    }

    /// Checked leaves of `tree` with resolved paths, in depth-first listing order.
    ///
    /// Checked ids the catalog cannot reach from the root (orphans) follow, by id.
    #[must_use]
    pub fn checked_items(&self, tree: &SelectionTree) -> Vec<ExportItem> {
        let mut checked = tree.checked_items();
        let mut items = Vec::with_capacity(checked.len());

        for record in self.iter_depth_first() {
            if checked.remove(&record.id) {
                items.push(self.export_item(record));
            }
        }
        for id in checked {
            if let Some(record) = self.by_id.get(&id) {
                items.push(self.export_item(record));
            }
        }
        items
    }

    fn export_item(&self, record: &DocumentRecord) -> ExportItem {
        ExportItem::new(record.clone(), self.hierarchical_path(&record.id))
    }

    /// Pre-order walk from the root following listing order.
    pub fn iter_depth_first(&self) -> impl Iterator<Item = &DocumentRecord> {
        let mut stack: Vec<&DocumentRecord> = self.folder(ROOT_ID).iter().rev().collect();
        let mut seen: HashSet<&str> = HashSet::new();
        std::iter::from_fn(move || {
            loop {
                let record = stack.pop()?;
                if !seen.insert(record.id.as_str()) {
                    continue;
                }
                stack.extend(self.folder(&record.id).iter().rev());
                return Some(record);
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_catalog() -> Catalog {
        Catalog::from_records([
            DocumentRecord::folder("dir1", "", "folder1"),
            DocumentRecord::folder("dir2", "", "folder2"),
            DocumentRecord::document("f3", "", "file3"),
            DocumentRecord::document("f1", "dir1", "file1"),
            DocumentRecord::document("f2", "dir2", "file2"),
            DocumentRecord::folder("dir3", "dir2", "project/v2"),
            DocumentRecord::document("f4", "dir3", "deep"),
        ])
    }

    #[test]
    fn test_folder_keeps_listing_order() {
        let catalog = sample_catalog();
        let ids: Vec<&str> = catalog.folder("").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["dir1", "dir2", "f3"]);
        assert!(catalog.folder("f3").is_empty());
        assert!(catalog.folder("unknown").is_empty());
    }

    #[test]
    fn test_hierarchical_and_display_path() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.hierarchical_path("f4"),
            ["folder2", "project/v2", "deep"]
        );
        assert_eq!(catalog.display_path("f4"), "folder2/'project/v2'/deep");
        assert_eq!(catalog.display_path("f3"), "file3");
        assert!(catalog.hierarchical_path("").is_empty());
    }

    #[test]
    fn test_hierarchical_path_stops_on_cycle() {
        let catalog = Catalog::from_records([
            DocumentRecord::folder("a", "b", "A"),
            DocumentRecord::folder("b", "a", "B"),
        ]);
        assert_eq!(catalog.hierarchical_path("a"), ["B", "A"]);
    }

    #[test]
    fn test_resolve_by_id_or_display_path() {
        let catalog = sample_catalog();
        assert_eq!(catalog.resolve("f1").unwrap().name, "file1");
        assert_eq!(catalog.resolve("folder1/file1").unwrap().id, "f1");
        assert_eq!(catalog.resolve("/folder2/'project/v2'/").unwrap().id, "dir3");
        assert!(catalog.resolve("folder1/missing").is_none());
        assert!(catalog.find_by_display_path("f1").is_none());
    }

    #[test]
    fn test_checked_items_depth_first_with_paths() {
        let catalog = sample_catalog();
        let mut tree = SelectionTree::build(catalog.children_by_parent());
        tree.select("", true);

        let items = catalog.checked_items(&tree);
        let ids: Vec<&str> = items.iter().map(|i| i.record.id.as_str()).collect();
        assert_eq!(ids, ["f1", "f2", "f4", "f3"]);
        assert_eq!(items[2].path, ["folder2", "project/v2", "deep"]);
    }

    #[test]
    fn test_duplicate_ids_keep_last_record() {
        let catalog = Catalog::from_records([
            DocumentRecord::document("x", "", "old"),
            DocumentRecord::document("x", "", "new"),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.folder("").len(), 1);
        assert_eq!(catalog.get("x").unwrap().name, "new");
    }
}
