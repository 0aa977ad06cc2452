//! Arena-backed selection tree.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;

use tracing::{debug, trace, warn};

use super::{SelectionInfo, SelectionStatus};
use crate::catalog::{DocumentId, DocumentRecord, ROOT_ID};

#[derive(Debug, Clone)]
struct Node {
    parent: Option<DocumentId>,
    children: Vec<DocumentId>,
    is_leaf: bool,
    status: SelectionStatus,
}

impl Node {
    fn folder(parent: Option<DocumentId>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            is_leaf: false,
            status: SelectionStatus::Unselected,
        }
    }
}

/// Selection state for every known id, plus a running count of selected leaves.
///
/// Nodes live in a flat map keyed by id; parent and child links are ids, not
/// references. Folder status is always the aggregation of its children:
///
/// - `Unselected` iff no child is `Selected` or `Partial`
/// - `Selected` iff every child is `Selected`
/// - `Partial` otherwise
#[derive(Debug, Clone)]
pub struct SelectionTree {
    nodes: HashMap<DocumentId, Node>,
    checked_count: usize,
}

impl Default for SelectionTree {
    fn default() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID.to_string(), Node::folder(None));
        Self {
            nodes,
            checked_count: 0,
        }
    }
}

impl SelectionTree {
    /// Builds the tree from a parent-to-children mapping.
    ///
    /// Every status starts `Unselected` and the checked count at zero. A parent
    /// id with no record of its own becomes a detached folder node.
    #[must_use]
    pub fn build<S: BuildHasher>(
        children_by_parent: &HashMap<DocumentId, Vec<DocumentRecord>, S>,
    ) -> Self {
        let mut tree = Self::default();

        for (parent_id, records) in children_by_parent {
            for record in records {
                if record.id == ROOT_ID {
                    warn!(parent = %parent_id, "ignoring record with the root id");
                    continue;
                }
                let node = tree
                    .nodes
                    .entry(record.id.clone())
                    .or_insert_with(|| Node::folder(None));
                node.parent = Some(parent_id.clone());
                node.is_leaf = !record.is_folder;
            }
        }

        for (parent_id, records) in children_by_parent {
            let node = tree
                .nodes
                .entry(parent_id.clone())
                .or_insert_with(|| Node::folder(None));
            node.children = records
                .iter()
                .filter(|record| record.id != ROOT_ID)
                .map(|record| record.id.clone())
                .collect();
            // Status of a node with children is aggregated, so it cannot count as a leaf.
            if node.is_leaf && !node.children.is_empty() {
                warn!(id = %parent_id, "document has children; treating it as a folder");
                node.is_leaf = false;
            }
        }

        debug!(nodes = tree.nodes.len(), "selection tree built");
        tree
    }

    /// Selects or deselects `id` and everything below it, then updates ancestors.
    ///
    /// Nodes in the subtree are forced to `Selected`/`Unselected`, never
    /// `Partial`. Calling this twice with the same arguments changes nothing the
    /// second time. Unknown ids are ignored.
    pub fn select(&mut self, id: &str, selected: bool) {
        if !self.nodes.contains_key(id) {
            debug!(id, "select on unknown id ignored");
            return;
        }

        let target = SelectionStatus::from_selected(selected);
        let mut stack = vec![id.to_string()];
        let mut visited: HashSet<DocumentId> = HashSet::new();

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            let previous = std::mem::replace(&mut node.status, target);
            if node.is_leaf && previous != target {
                if selected {
                    self.checked_count += 1;
                } else if previous == SelectionStatus::Selected {
                    self.checked_count = self.checked_count.saturating_sub(1);
                }
            }
            stack.extend(
                node.children
                    .iter()
                    .filter(|child| !visited.contains(*child))
                    .cloned(),
            );
            visited.insert(current);
        }

        self.update_ancestors(id);
        trace!(id, selected, checked = self.checked_count, "selection applied");
    }

    /// Recomputes every ancestor of `id`, stopping after the root.
    fn update_ancestors(&mut self, id: &str) {
        let mut current = self.nodes.get(id).and_then(|node| node.parent.clone());
        let mut steps = 0usize;

        while let Some(folder_id) = current {
            steps += 1;
            if steps > self.nodes.len() {
                warn!(id, "parent cycle detected; stopping propagation");
                break;
            }
            let status = self.aggregate(&folder_id);
            let Some(node) = self.nodes.get_mut(&folder_id) else {
                break;
            };
            node.status = status;
            current = node.parent.clone();
        }
    }

    fn aggregate(&self, folder_id: &str) -> SelectionStatus {
        let Some(node) = self.nodes.get(folder_id) else {
            return SelectionStatus::Unselected;
        };

        let mut selected = 0usize;
        let mut partial = 0usize;
        for child in &node.children {
            match self.status(child) {
                SelectionStatus::Selected => selected += 1,
                SelectionStatus::Partial => partial += 1,
                SelectionStatus::Unselected => {}
            }
        }

        if selected == 0 && partial == 0 {
            SelectionStatus::Unselected
        } else if selected == node.children.len() {
            SelectionStatus::Selected
        } else {
            SelectionStatus::Partial
        }
    }

    fn status(&self, id: &str) -> SelectionStatus {
        self.nodes
            .get(id)
            .map_or(SelectionStatus::Unselected, |node| node.status)
    }

    /// Statuses of the immediate children of `id`, in listing order.
    #[must_use]
    pub fn folder_selection(&self, id: &str) -> Vec<SelectionInfo> {
        self.nodes.get(id).map_or_else(Vec::new, |node| {
            node.children
                .iter()
                .map(|child| SelectionInfo {
                    id: child.clone(),
                    status: self.status(child),
                })
                .collect()
        })
    }

    /// Status of a single node (`Unselected` for unknown ids).
    #[must_use]
    pub fn item_selection(&self, id: &str) -> SelectionInfo {
        SelectionInfo {
            id: id.to_string(),
            status: self.status(id),
        }
    }

    /// Ids of every selected leaf (non-folder) node.
    #[must_use]
    pub fn checked_items(&self) -> BTreeSet<DocumentId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_leaf && node.status == SelectionStatus::Selected)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of selected leaves.
    #[must_use]
    pub fn checked_count(&self) -> usize {
        self.checked_count
    }

    /// Returns true if `id` is a known node.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }
}
