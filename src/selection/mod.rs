//! Tri-state selection over the document hierarchy.
//!
//! - [`SelectionTree`] - arena of nodes keyed by id, with upward propagation
//! - [`SelectionStatus`] - `Unselected`, `Partial` (folders only) or `Selected`
//! - [`SelectionInfo`] - one node's status, as the UI renders it
//!
//! Selection never fails: unknown ids degrade to `Unselected` so a sparse or
//! partial catalog is still usable.

mod tree;

pub use tree::SelectionTree;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::DocumentId;

/// Checkbox state of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    /// Neither the node nor anything below it is selected.
    #[default]
    Unselected,
    /// Some, but not all, of a folder's children are selected.
    Partial,
    /// The node and everything below it are selected.
    Selected,
}

impl SelectionStatus {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unselected => "unselected",
            Self::Partial => "partial",
            Self::Selected => "selected",
        }
    }

    fn from_selected(selected: bool) -> Self {
        if selected { Self::Selected } else { Self::Unselected }
    }
}

impl fmt::Display for SelectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionInfo {
    /// Node id.
    pub id: DocumentId,
    /// Current status.
    pub status: SelectionStatus,
}
