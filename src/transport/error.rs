//! Error types for the transport module.
//!
//! Every variant carries the request or command it came from so a failed
//! export item can be reported to the user without extra context.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed source error for connection failures (reqwest, process IO, ...).
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while talking to the tablet.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured tablet address is not a valid IP address.
    #[error("invalid tablet address: {address}")]
    InvalidAddress {
        /// The rejected address string.
        address: String,
    },

    /// Network-level or pipe-level failure (refused, reset, broken pipe).
    #[error("connection error talking to {target}: {source}")]
    Connection {
        /// The request URL or remote command that failed.
        target: String,
        /// The underlying error.
        #[source]
        source: BoxedSource,
    },

    /// The request or command did not finish within its time budget.
    #[error("timeout talking to {target}")]
    Timeout {
        /// The request URL or remote command that timed out.
        target: String,
    },

    /// The tablet's web interface answered with a non-success HTTP status.
    #[error("tablet returned HTTP {code} for {target}")]
    RemoteStatus {
        /// The request URL.
        target: String,
        /// The HTTP status code.
        code: u16,
    },

    /// A remote-shell command exited unsuccessfully.
    #[error("remote command `{command}` exited with status {code}: {stderr}")]
    RemoteCommand {
        /// The remote command line.
        command: String,
        /// Exit status (`-1` when killed by a signal).
        code: i32,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The tablet's response could not be parsed.
    #[error("could not parse response from {target}: {message}")]
    Parse {
        /// The request URL or remote command.
        target: String,
        /// What went wrong.
        message: String,
    },

    /// The transport cannot produce or accept the requested file type.
    #[error("format {format} is not supported by the {transport} transport")]
    UnsupportedFormat {
        /// The requested format or extension.
        format: String,
        /// Transport name.
        transport: &'static str,
    },

    /// A document id that cannot be used safely in a remote path.
    #[error("invalid document id: {id:?}")]
    InvalidDocumentId {
        /// The rejected id.
        id: String,
    },

    /// Local file access failed (reading an upload source, ...).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The local path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The remote-shell client binary could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program name, e.g. `ssh`.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(target: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Connection {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Maps a reqwest error, promoting timeouts to [`TransportError::Timeout`].
    pub fn from_reqwest(target: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(target)
        } else {
            Self::connection(target, source)
        }
    }

    /// Creates a timeout error.
    pub fn timeout(target: impl Into<String>) -> Self {
        Self::Timeout {
            target: target.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn remote_status(target: impl Into<String>, code: u16) -> Self {
        Self::RemoteStatus {
            target: target.into(),
            code,
        }
    }

    /// Creates a failed remote command error.
    pub fn remote_command(command: impl Into<String>, code: i32, stderr: &str) -> Self {
        Self::RemoteCommand {
            command: command.into(),
            code,
            stderr: stderr.trim().to_string(),
        }
    }

    /// Creates a parse error.
    pub fn parse(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>, transport: &'static str) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
            transport,
        }
    }

    /// Creates a local IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures where calling again later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::RemoteStatus { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_display() {
        let error = TransportError::remote_status("http://10.11.99.1/download/x/pdf", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("/download/x/pdf"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_remote_command_trims_stderr() {
        let error = TransportError::remote_command("cat 'x.pdf'", 1, "cat: x.pdf: No such file\n");
        assert_eq!(
            error.to_string(),
            "remote command `cat 'x.pdf'` exited with status 1: cat: x.pdf: No such file"
        );
    }

    #[test]
    fn test_timeout_display_and_transience() {
        let error = TransportError::timeout("http://10.11.99.1/documents/");
        assert!(error.to_string().contains("timeout"));
        assert!(error.is_transient());
    }

    #[test]
    fn test_status_transience() {
        assert!(TransportError::remote_status("u", 503).is_transient());
        assert!(!TransportError::remote_status("u", 404).is_transient());
        assert!(!TransportError::invalid_address("nope").is_transient());
    }

    #[test]
    fn test_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = TransportError::io(PathBuf::from("/tmp/upload.pdf"), io_error);
        assert!(error.to_string().contains("/tmp/upload.pdf"));
    }
}
