//! Resumable export of checked documents to the local filesystem.
//!
//! An [`ExportJob`] walks its items strictly in order. For each document it
//! fetches every requested format through a [`Transport`](crate::transport::Transport),
//! allocates a unique destination path and streams the bytes to disk. The
//! first failure halts the run and leaves the cursor on the failing item, so
//! calling [`ExportJob::run`] again retries exactly that item.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rmexport_core::catalog::Catalog;
//! use rmexport_core::export::{ExportEvent, ExportFormat, ExportJob, ExportOptions};
//! use rmexport_core::selection::SelectionTree;
//! use rmexport_core::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new("10.11.99.1")?);
//! let catalog = Catalog::load(transport.as_ref()).await?;
//! let mut tree = SelectionTree::build(catalog.children_by_parent());
//! tree.select("", true);
//!
//! let options = ExportOptions::new("./exports", vec![ExportFormat::Pdf]);
//! let mut job = ExportJob::begin(options, catalog.checked_items(&tree), transport)?;
//! let outcome = job
//!     .run(|event| {
//!         if let ExportEvent::Failed { item, cause, .. } = event {
//!             eprintln!("{}: {cause}", item.record.name);
//!         }
//!     })
//!     .await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod error;
mod format;
mod job;

pub use error::ExportError;
pub use format::{ExportFormat, dedup_formats};
pub use job::{ExportJob, wrapper_folder_name};

use std::path::PathBuf;

use crate::catalog::DocumentRecord;

/// One checked document together with its folder path on the tablet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportItem {
    /// The catalog record.
    pub record: DocumentRecord,
    /// Names from the root down to the record itself.
    pub path: Vec<String>,
}

impl ExportItem {
    /// Creates an item from a record and its hierarchical path.
    #[must_use]
    pub fn new(record: DocumentRecord, path: Vec<String>) -> Self {
        Self { record, path }
    }
}

/// Where and in which formats a job writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Local directory the wrapper folder is created in.
    pub location: PathBuf,
    /// Formats to fetch per document, in order.
    pub formats: Vec<ExportFormat>,
}

impl ExportOptions {
    /// Creates export options.
    #[must_use]
    pub fn new(location: impl Into<PathBuf>, formats: Vec<ExportFormat>) -> Self {
        Self {
            location: location.into(),
            formats,
        }
    }
}

/// Progress notification emitted by [`ExportJob::run`].
#[derive(Debug, Clone, Copy)]
pub enum ExportEvent<'a> {
    /// Processing of the item at `index` has begun.
    Started {
        /// Position in the job's item list.
        index: usize,
        /// The item.
        item: &'a ExportItem,
    },
    /// Every format of the item was written; `files` is empty for folders.
    Finished {
        /// Position in the job's item list.
        index: usize,
        /// The item.
        item: &'a ExportItem,
        /// Files written, one per format.
        files: &'a [PathBuf],
    },
    /// The item failed and the run halted.
    Failed {
        /// Position in the job's item list.
        index: usize,
        /// The item.
        item: &'a ExportItem,
        /// What went wrong.
        cause: &'a ExportError,
    },
}

/// How a call to [`ExportJob::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item has been processed.
    Completed,
    /// The item at `index` failed; the cursor points at it.
    Halted {
        /// Index of the failed item.
        index: usize,
    },
    /// Cancellation was requested before the item at `index` started.
    Cancelled {
        /// Index of the next unprocessed item.
        index: usize,
    },
}

impl RunOutcome {
    /// Returns true if the job has nothing left to do.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}
