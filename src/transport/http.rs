//! Transport over the tablet's USB web interface.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument, trace};
use url::Url;

use super::{ByteStream, Transport, TransportError};
use crate::catalog::{DocumentRecord, ROOT_ID, TabletAddress, parse_documents_response, validate_address};
use crate::export::ExportFormat;
use crate::user_agent;

/// Address of the web interface when the tablet is connected over USB.
pub const DEFAULT_TABLET_ADDRESS: &str = "10.11.99.1";

const CONNECT_TIMEOUT_SECS: u64 = 5;
const LISTING_TIMEOUT_SECS: u64 = 5;
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const REQUEST_DELAY_MS: u64 = 250;

/// Timeouts and pacing for [`HttpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout for each folder listing request.
    pub listing_timeout: Duration,
    /// Whole-request timeout for a download, body included.
    pub download_timeout: Duration,
    /// Pause before each request of a fetch; the web interface drops
    /// requests that arrive back to back.
    pub request_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            listing_timeout: Duration::from_secs(LISTING_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
            request_delay: Duration::from_millis(REQUEST_DELAY_MS),
        }
    }
}

/// Returns `http://{address}/`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidAddress`] if the authority does not form a URL.
pub fn tablet_base_url(address: &TabletAddress) -> Result<Url, TransportError> {
    let authority = address.authority();
    Url::parse(&format!("http://{authority}/"))
        .map_err(|_| TransportError::invalid_address(authority))
}

/// Reads the catalog and downloads documents through the web interface.
///
/// Listing walks folders breadth-first with `POST /documents/{id}`. A fetch
/// first "opens" the parent folder the same way, because the device only
/// serves `GET /download/{id}/{format}` for documents in the folder last
/// listed.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    config: HttpConfig,
}

impl HttpTransport {
    /// Creates a transport for `address` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidAddress`] unless `address` is an IP
    /// literal (optionally with a port).
    pub fn new(address: &str) -> Result<Self, TransportError> {
        Self::with_config(address, HttpConfig::default())
    }

    /// Creates a transport with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidAddress`] for a bad address, or
    /// [`TransportError::Connection`] if the HTTP client cannot be built.
    pub fn with_config(address: &str, config: HttpConfig) -> Result<Self, TransportError> {
        let address = validate_address(address)?;
        let base_url = tablet_base_url(&address)?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| TransportError::connection(base_url.as_str(), e))?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn documents_url(&self, folder_id: &str) -> Result<Url, TransportError> {
        let path = if folder_id == ROOT_ID {
            "documents/".to_string()
        } else {
            format!("documents/{}", urlencoding::encode(folder_id))
        };
        self.base_url
            .join(&path)
            .map_err(|_| TransportError::InvalidDocumentId {
                id: folder_id.to_string(),
            })
    }

    fn download_url(&self, id: &str, format: ExportFormat) -> Result<Url, TransportError> {
        self.base_url
            .join(&format!(
                "download/{}/{}",
                urlencoding::encode(id),
                format.as_str()
            ))
            .map_err(|_| TransportError::InvalidDocumentId { id: id.to_string() })
    }

    async fn list_folder(&self, folder_id: &str) -> Result<Vec<DocumentRecord>, TransportError> {
        let url = self.documents_url(folder_id)?;
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, "*/*")
            .timeout(self.config.listing_timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::remote_status(url.as_str(), status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;
        let records = parse_documents_response(&body)?;
        trace!(folder = folder_id, count = records.len(), "folder listed");
        Ok(records)
    }

    /// Makes `folder_id` the device's current folder.
    ///
    /// Only connection failures matter here; the download that follows reports
    /// anything else.
    async fn open_folder(&self, folder_id: &str) -> Result<(), TransportError> {
        let url = self.documents_url(folder_id)?;
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, "*/*")
            .timeout(self.config.listing_timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;
        debug!(folder = folder_id, status = response.status().as_u16(), "folder opened");
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports(&self, format: ExportFormat) -> bool {
        matches!(format, ExportFormat::Pdf | ExportFormat::Rmdoc)
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, TransportError> {
        let mut pending: VecDeque<String> = VecDeque::from([ROOT_ID.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut records = Vec::new();

        while let Some(folder_id) = pending.pop_front() {
            if !visited.insert(folder_id.clone()) {
                continue;
            }
            let listed = self.list_folder(&folder_id).await?;
            pending.extend(
                listed
                    .iter()
                    .filter(|record| record.is_folder)
                    .map(|record| record.id.clone()),
            );
            records.extend(listed);
        }

        debug!(folders = visited.len(), records = records.len(), "listing complete");
        Ok(records)
    }

    #[instrument(skip(self, record), fields(id = %record.id, %format))]
    async fn fetch_document(
        &self,
        record: &DocumentRecord,
        format: ExportFormat,
    ) -> Result<ByteStream, TransportError> {
        if !self.supports(format) {
            return Err(TransportError::unsupported_format(format.as_str(), self.name()));
        }

        tokio::time::sleep(self.config.request_delay).await;
        self.open_folder(&record.parent_id).await?;
        tokio::time::sleep(self.config.request_delay).await;

        let url = self.download_url(&record.id, format)?;
        let target = url.to_string();
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "*/*")
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(target.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::remote_status(target, status.as_u16()));
        }
        debug!(content_length = ?response.content_length(), "download started");

        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| TransportError::from_reqwest(target.as_str(), e)));
        Ok(stream.boxed())
    }
}
