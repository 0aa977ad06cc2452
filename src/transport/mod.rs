//! Transports for reading documents from the tablet.
//!
//! Two bindings share one narrow contract:
//!
//! - [`HttpTransport`] - the USB web interface (`http://10.11.99.1`)
//! - [`SshTransport`] - a remote shell over the system `ssh` client
//!
//! The export pipeline and the catalog only see [`Transport`]; a binding is
//! chosen once per catalog read or export job and passed in explicitly.
//!
//! # Example
//!
//! ```no_run
//! use rmexport_core::transport::{HttpTransport, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("10.11.99.1")?;
//! let records = transport.list_documents().await?;
//! println!("{} documents", records.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod http;
mod ssh;
mod xochitl;

pub use error::{BoxedSource, TransportError};
pub use http::{DEFAULT_TABLET_ADDRESS, HttpConfig, HttpTransport, tablet_base_url};
pub use ssh::{SshConfig, SshTransport, shell_quote};
pub use xochitl::{REMOTE_DOCUMENTS_DIR, RemoteContent, RemoteMetadata, parse_remote_listing};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::catalog::DocumentRecord;
use crate::export::ExportFormat;

/// Stream of document bytes as fetched from the tablet.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// How bytes are fetched from the tablet.
///
/// # Object Safety
///
/// This trait uses `async_trait` so jobs can hold an `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport's name (`"http"`, `"ssh"`).
    fn name(&self) -> &'static str;

    /// Returns true if [`Transport::fetch_document`] can produce `format`.
    fn supports(&self, format: ExportFormat) -> bool;

    /// Lists every folder and document on the tablet, in listing order.
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, TransportError>;

    /// Starts fetching one document in one format.
    ///
    /// Errors raised before the first byte (status, connection, timeout) are
    /// returned directly; errors mid-transfer arrive as stream items.
    async fn fetch_document(
        &self,
        record: &DocumentRecord,
        format: ExportFormat,
    ) -> Result<ByteStream, TransportError>;
}
