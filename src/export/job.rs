//! Export job state machine and file streaming.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::{
    ExportError, ExportEvent, ExportFormat, ExportItem, ExportOptions, RunOutcome, dedup_formats,
};
use crate::paths::{PathAllocator, normalize};
use crate::transport::{ByteStream, Transport};

/// Prefix of the folder every job writes into.
const WRAPPER_PREFIX: &str = "rM Export";

/// Builds the per-job wrapper folder name, `rM Export (YYYY-MM-DD HH:MM:SS)`.
///
/// The `:` characters are replaced when the name is normalized into a path.
#[must_use]
pub fn wrapper_folder_name(at: OffsetDateTime) -> String {
    let layout = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(layout).map_or_else(
        |_| WRAPPER_PREFIX.to_string(),
        |stamp| format!("{WRAPPER_PREFIX} ({stamp})"),
    )
}

/// A resumable, ordered export of checked items.
///
/// The wrapper folder name is fixed when the job begins and reused by every
/// later [`ExportJob::run`], so retries land next to earlier output.
pub struct ExportJob {
    options: ExportOptions,
    items: Vec<ExportItem>,
    wrapper_folder: String,
    cursor: usize,
    allocator: PathAllocator,
    transport: Arc<dyn Transport>,
    cancel: Option<Arc<AtomicBool>>,
}

impl fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportJob")
            .field("options", &self.options)
            .field("items", &self.items.len())
            .field("wrapper_folder", &self.wrapper_folder)
            .field("cursor", &self.cursor)
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

impl ExportJob {
    /// Starts a job over `items`, writing under `options.location`.
    ///
    /// Duplicate formats are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// - [`ExportError::NoFormats`] if `options.formats` is empty
    /// - [`ExportError::UnsupportedFormat`] if the transport cannot produce a format
    pub fn begin(
        options: ExportOptions,
        items: Vec<ExportItem>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ExportError> {
        let formats = dedup_formats(&options.formats);
        if formats.is_empty() {
            return Err(ExportError::NoFormats);
        }
        if let Some(format) = formats.iter().find(|format| !transport.supports(**format)) {
            return Err(ExportError::UnsupportedFormat {
                format: *format,
                transport: transport.name(),
            });
        }

        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let wrapper_folder = wrapper_folder_name(now);
        info!(
            items = items.len(),
            formats = ?formats,
            location = %options.location.display(),
            wrapper = %wrapper_folder,
            transport = transport.name(),
            "export job created"
        );

        Ok(Self {
            options: ExportOptions {
                location: options.location,
                formats,
            },
            items,
            wrapper_folder,
            cursor: 0,
            allocator: PathAllocator::new(),
            transport,
            cancel: None,
        })
    }

    /// Replaces the wrapper folder name (an empty name writes straight into the location).
    #[must_use]
    pub fn with_wrapper_folder(mut self, name: impl Into<String>) -> Self {
        self.wrapper_folder = name.into();
        self
    }

    /// Makes [`ExportJob::run`] stop at the next item boundary once `flag` is set.
    #[must_use]
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Processes items from the cursor onward, reporting through `on_event`.
    ///
    /// Returns [`RunOutcome::Halted`] on the first failing item, with the
    /// cursor left on it and path allocations for it undone. Running a
    /// completed job does nothing and returns [`RunOutcome::Completed`].
    #[instrument(skip_all, fields(transport = self.transport.name(), cursor = self.cursor))]
    pub async fn run<F>(&mut self, mut on_event: F) -> RunOutcome
    where
        F: FnMut(ExportEvent<'_>),
    {
        while self.cursor < self.items.len() {
            if self.cancel_requested() {
                info!(index = self.cursor, "export cancelled");
                return RunOutcome::Cancelled { index: self.cursor };
            }

            let index = self.cursor;
            let item = &self.items[index];
            on_event(ExportEvent::Started { index, item });

            let checkpoint = self.allocator.clone();
            let result = export_item(
                self.transport.as_ref(),
                &mut self.allocator,
                &self.options,
                &self.wrapper_folder,
                item,
            )
            .await;

            match result {
                Ok(files) => {
                    debug!(index, id = %item.record.id, files = files.len(), "item exported");
                    on_event(ExportEvent::Finished {
                        index,
                        item,
                        files: &files,
                    });
                    self.cursor += 1;
                }
                Err(cause) => {
                    self.allocator = checkpoint;
                    warn!(index, id = %item.record.id, error = %cause, "export halted");
                    on_event(ExportEvent::Failed {
                        index,
                        item,
                        cause: &cause,
                    });
                    return RunOutcome::Halted { index };
                }
            }
        }

        info!(items = self.items.len(), "export complete");
        RunOutcome::Completed
    }

    /// Advances past the item at the cursor without exporting it.
    ///
    /// Returns false if the job is already complete.
    pub fn skip_current(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        if let Some(item) = self.items.get(self.cursor) {
            info!(index = self.cursor, id = %item.record.id, "skipping item");
        }
        self.cursor += 1;
        true
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Index of the next item to process.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of items in the job.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the job has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true once every item has been processed or skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.items.len()
    }

    /// The item the next run starts with, if any.
    #[must_use]
    pub fn current_item(&self) -> Option<&ExportItem> {
        self.items.get(self.cursor)
    }

    /// Items in processing order.
    #[must_use]
    pub fn items(&self) -> &[ExportItem] {
        &self.items
    }

    /// The wrapper folder name, before normalization.
    #[must_use]
    pub fn wrapper_folder(&self) -> &str {
        &self.wrapper_folder
    }

    /// Formats fetched per document, deduplicated, in order.
    #[must_use]
    pub fn formats(&self) -> &[ExportFormat] {
        &self.options.formats
    }

    /// Local directory the wrapper folder lives in.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.options.location
    }

    /// Directory files are actually written under: the location plus the
    /// normalized wrapper folder, if any.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        let wrapper = normalize(&self.wrapper_folder);
        if wrapper.is_empty() {
            self.options.location.clone()
        } else {
            self.options.location.join(wrapper)
        }
    }
}

async fn export_item(
    transport: &dyn Transport,
    allocator: &mut PathAllocator,
    options: &ExportOptions,
    wrapper: &str,
    item: &ExportItem,
) -> Result<Vec<PathBuf>, ExportError> {
    if item.record.is_folder {
        debug!(id = %item.record.id, "folder selected; nothing to export");
        return Ok(Vec::new());
    }

    let mut files = Vec::with_capacity(options.formats.len());
    for &format in &options.formats {
        let stream = transport.fetch_document(&item.record, format).await?;
        let path = allocator
            .resolve_unique_path(&options.location, wrapper, &item.path, format.as_str())
            .map_err(|source| ExportError::path(item.record.id.clone(), source))?;
        let bytes = write_stream(&path, stream).await?;
        debug!(id = %item.record.id, %format, path = %path.display(), bytes, "format written");
        files.push(path);
    }
    Ok(files)
}

/// Streams `stream` into a new file at `path`, removing the file on failure.
async fn write_stream(path: &Path, mut stream: ByteStream) -> Result<u64, ExportError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExportError::local_io(parent, e))?;
    }

    let file = File::create(path)
        .await
        .map_err(|e| ExportError::local_io(path, e))?;

    let result = copy_stream(file, &mut stream, path).await;
    if result.is_err() {
        debug!(path = %path.display(), "removing partial file after error");
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %cleanup, "failed to remove partial file");
        }
    }
    result
}

async fn copy_stream(file: File, stream: &mut ByteStream, path: &Path) -> Result<u64, ExportError> {
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ExportError::local_io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| ExportError::local_io(path, e))?;
    Ok(bytes_written)
}
