//! Export format tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A file format a document can be exported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Rendered PDF (annotations flattened).
    Pdf,
    /// Native `.rmdoc` archive (notebook pages, metadata, source file).
    Rmdoc,
    /// Original EPUB source file.
    Epub,
}

impl ExportFormat {
    /// All known formats, in a stable order.
    pub const ALL: [Self; 3] = [Self::Pdf, Self::Rmdoc, Self::Epub];

    /// Returns the tag used in URLs and as the file extension (no leading dot).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Rmdoc => "rmdoc",
            Self::Epub => "epub",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "rmdoc" => Ok(Self::Rmdoc),
            "epub" => Ok(Self::Epub),
            _ => Err(format!(
                "unsupported export format: {s} (expected one of pdf, rmdoc, epub)"
            )),
        }
    }
}

/// Removes repeated formats, keeping the first occurrence of each.
#[must_use]
pub fn dedup_formats(formats: &[ExportFormat]) -> Vec<ExportFormat> {
    let mut result = Vec::with_capacity(formats.len());
    for format in formats {
        if !result.contains(format) {
            result.push(*format);
        }
    }
    result
}
