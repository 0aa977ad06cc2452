//! rmexport core library
//!
//! Reads the folder tree of an e-ink tablet and exports selected documents
//! to a local directory in one or more formats.
//!
//! # Architecture
//!
//! - [`catalog`] - Document records and the folder hierarchy
//! - [`selection`] - Tri-state selection over the hierarchy
//! - [`paths`] - Safe, collision-free local paths
//! - [`export`] - Resumable, ordered export job
//! - [`transport`] - Web interface (HTTP) and SSH access to the tablet

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod export;
pub mod paths;
pub mod selection;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use catalog::{Catalog, DocumentId, DocumentRecord, ROOT_ID};
pub use export::{
    ExportError, ExportEvent, ExportFormat, ExportItem, ExportJob, ExportOptions, RunOutcome,
};
pub use paths::{PathAllocator, PathError, resolve_path};
pub use selection::{SelectionInfo, SelectionStatus, SelectionTree};
pub use transport::{HttpTransport, SshConfig, SshTransport, Transport, TransportError};
