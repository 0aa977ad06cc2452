//! Parsing of the web interface's folder listing and address validation.

use std::net::{IpAddr, SocketAddr};

use serde::Deserialize;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::warn;

use super::record::DocumentRecord;
use crate::transport::TransportError;

const FOLDER_TYPE: &str = "CollectionType";
const DOCUMENT_TYPE: &str = "DocumentType";

/// One entry of `POST /documents/{id}` as the device sends it.
///
/// Every field is optional here so a single malformed entry can be skipped
/// instead of failing the whole listing.
#[derive(Debug, Deserialize)]
struct ListingEntry {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "Parent")]
    parent: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
    // The device really spells it this way.
    #[serde(rename = "VissibleName")]
    visible_name: Option<String>,
    #[serde(rename = "Bookmarked")]
    bookmarked: Option<bool>,
    #[serde(rename = "ModifiedClient")]
    modified_client: Option<String>,
    #[serde(rename = "fileType")]
    file_type: Option<String>,
}

impl ListingEntry {
    fn into_record(self) -> Result<DocumentRecord, &'static str> {
        let id = self.id.filter(|id| !id.is_empty()).ok_or("missing ID")?;
        let parent_id = self.parent.ok_or("missing Parent")?;
        let name = self.visible_name.ok_or("missing VissibleName")?;
        let is_folder = match self.kind.as_deref() {
            Some(FOLDER_TYPE) => true,
            Some(DOCUMENT_TYPE) => false,
            Some(_) => return Err("unknown Type"),
            None => return Err("missing Type"),
        };

        Ok(DocumentRecord {
            id,
            parent_id,
            is_folder,
            name,
            bookmarked: self.bookmarked.unwrap_or(false),
            last_modified: self.modified_client.as_deref().and_then(parse_device_timestamp),
            file_type: self.file_type.filter(|t| !t.is_empty()),
        })
    }
}

/// Parses a device timestamp (`YYYY-MM-DDTHH:MM:SS.mmmZ`) as UTC.
#[must_use]
pub fn parse_device_timestamp(value: &str) -> Option<OffsetDateTime> {
    let layout =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    PrimitiveDateTime::parse(value, layout)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Parses the JSON array returned by the web interface's folder listing.
///
/// Entries missing `ID`, `Parent`, `Type` or `VissibleName` are skipped with a
/// warning. Optional fields that fail to parse are left empty.
///
/// # Errors
///
/// Returns [`TransportError::Parse`] if the body is not a JSON array.
pub fn parse_documents_response(body: &[u8]) -> Result<Vec<DocumentRecord>, TransportError> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| TransportError::parse("document listing", e.to_string()))?;

    let mut records = Vec::with_capacity(entries.len());
    for (index, value) in entries.into_iter().enumerate() {
        let entry = match serde_json::from_value::<ListingEntry>(value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(index, error = %error, "skipping malformed listing entry");
                continue;
            }
        };
        match entry.into_record() {
            Ok(record) => records.push(record),
            Err(reason) => warn!(index, reason, "skipping incomplete listing entry"),
        }
    }
    Ok(records)
}

/// Validates a tablet address: an IP literal, optionally with a port.
///
/// # Errors
///
/// Returns [`TransportError::InvalidAddress`] for anything else (hostnames
/// included; the USB interface is always addressed by IP).
pub fn validate_address(address: &str) -> Result<TabletAddress, TransportError> {
    let trimmed = address.trim();
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(TabletAddress::Ip(ip));
    }
    if let Ok(socket) = trimmed.parse::<SocketAddr>() {
        return Ok(TabletAddress::Socket(socket));
    }
    Err(TransportError::invalid_address(address))
}

/// A validated tablet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletAddress {
    /// Bare IP, default port.
    Ip(IpAddr),
    /// IP with an explicit port.
    Socket(SocketAddr),
}

impl TabletAddress {
    /// Returns the `host[:port]` authority for a URL, bracketing IPv6.
    #[must_use]
    pub fn authority(&self) -> String {
        match self {
            Self::Ip(IpAddr::V4(ip)) => ip.to_string(),
            Self::Ip(IpAddr::V6(ip)) => format!("[{ip}]"),
            Self::Socket(socket) => socket.to_string(),
        }
    }
}
