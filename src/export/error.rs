//! Error types for the export pipeline.

use std::path::PathBuf;

use thiserror::Error;

use super::ExportFormat;
use crate::catalog::DocumentId;
use crate::paths::PathError;
use crate::transport::TransportError;

/// Why an export job could not start, or why one item failed.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Fetching from the tablet failed (status, connection, timeout, ...).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No destination path could be derived for a document.
    #[error("cannot place document {id}: {source}")]
    Path {
        /// Document that could not be placed.
        id: DocumentId,
        /// The underlying path error.
        #[source]
        source: PathError,
    },

    /// Writing the exported file locally failed.
    #[error("IO error writing to {path}: {source}")]
    LocalIo {
        /// File or directory where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A requested format cannot be produced by the chosen transport.
    #[error("format {format} is not supported by the {transport} transport")]
    UnsupportedFormat {
        /// The requested format.
        format: ExportFormat,
        /// Name of the transport.
        transport: &'static str,
    },

    /// The job was given an empty format list.
    #[error("no export formats requested")]
    NoFormats,
}

impl ExportError {
    /// Creates a path error for document `id`.
    pub fn path(id: impl Into<DocumentId>, source: PathError) -> Self {
        Self::Path {
            id: id.into(),
            source,
        }
    }

    /// Creates a local IO error.
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Returns true if retrying the same item might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_transient(),
            Self::LocalIo { .. } => true,
            Self::Path { .. } | Self::UnsupportedFormat { .. } | Self::NoFormats => false,
        }
    }
}
