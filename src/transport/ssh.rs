//! Transport over a remote shell, using the system `ssh` client.
//!
//! Every operation is one `ssh` invocation running a short POSIX shell
//! script on the device. With a control path configured, invocations share a
//! single multiplexed connection.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{StreamExt, stream};
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use super::xochitl::{REMOTE_DOCUMENTS_DIR, RemoteContent, RemoteMetadata, listing_script};
use super::{ByteStream, Transport, TransportError, parse_remote_listing};
use crate::catalog::{DocumentId, DocumentRecord, ROOT_ID};
use crate::export::ExportFormat;

const DEFAULT_USER: &str = "root";
const DEFAULT_PROGRAM: &str = "ssh";
const CONNECT_TIMEOUT_SECS: u64 = 5;
const COMMAND_TIMEOUT_SECS: u64 = 30;
const TRANSFER_TIMEOUT_SECS: u64 = 300;
const CONTROL_PERSIST_SECS: u64 = 60;
const READ_CHUNK: usize = 64 * 1024;

/// `ssh` exits with this status when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Quotes `s` for a POSIX shell.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Connection settings for [`SshTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Host name or IP address of the tablet.
    pub host: String,
    /// Remote user (`root` on the device).
    pub user: Option<String>,
    /// Remote port, when not 22.
    pub port: Option<u16>,
    /// `ssh` binary to run.
    pub program: OsString,
    /// Passed to `ssh` as `ConnectTimeout`.
    pub connect_timeout: Duration,
    /// Upper bound for short commands (listing, mkdir, metadata writes).
    pub command_timeout: Duration,
    /// Upper bound for one file transfer.
    pub transfer_timeout: Duration,
    /// Socket for connection sharing (`ControlPath`); `None` disables it.
    pub control_path: Option<PathBuf>,
    /// Extra options inserted before the target, e.g. `-i key`.
    pub extra_options: Vec<OsString>,
}

impl SshConfig {
    /// Settings for `host` with default user, program and timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: Some(DEFAULT_USER.to_string()),
            port: None,
            program: OsString::from(DEFAULT_PROGRAM),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
            transfer_timeout: Duration::from_secs(TRANSFER_TIMEOUT_SECS),
            control_path: None,
            extra_options: Vec::new(),
        }
    }

    /// `[user@]host` as passed to `ssh`.
    #[must_use]
    pub fn target(&self) -> String {
        match &self.user {
            Some(user) if !user.is_empty() => format!("{user}@{}", self.host),
            _ => self.host.clone(),
        }
    }
}

/// Reads and writes the device's document store over `ssh`.
///
/// Besides the [`Transport`] contract this exposes the import side:
/// [`SshTransport::upload_file`], [`SshTransport::create_folder`],
/// [`SshTransport::delete_document`] and [`SshTransport::restart_service`].
/// The device UI only picks up changes after a restart.
#[derive(Debug, Clone)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    /// Creates a transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidAddress`] if the host is empty,
    /// contains whitespace or starts with `-`.
    pub fn new(config: SshConfig) -> Result<Self, TransportError> {
        let host = config.host.trim();
        if host.is_empty() || host.starts_with('-') || host.contains(char::is_whitespace) {
            return Err(TransportError::invalid_address(config.host.clone()));
        }
        Ok(Self { config })
    }

    /// The connection settings.
    #[must_use]
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Arguments for running `script` on the device.
    fn command_args(&self, script: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-oBatchMode=yes".into(),
            format!("-oConnectTimeout={}", self.config.connect_timeout.as_secs().max(1)).into(),
        ];
        if let Some(control_path) = &self.config.control_path {
            args.push("-oControlMaster=auto".into());
            let mut path = OsString::from("-oControlPath=");
            path.push(control_path);
            args.push(path);
            args.push(format!("-oControlPersist={CONTROL_PERSIST_SECS}").into());
        }
        if let Some(port) = self.config.port {
            args.push("-p".into());
            args.push(port.to_string().into());
        }
        args.extend(self.config.extra_options.iter().cloned());
        args.push(self.config.target().into());
        args.push(script.into());
        args
    }

    fn spawn(&self, script: &str, stdin: Stdio) -> Result<Child, TransportError> {
        trace!(script, "running remote command");
        Command::new(&self.config.program)
            .args(self.command_args(script))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.config.program.to_string_lossy().into_owned(),
                source,
            })
    }

    fn status_error(&self, script: &str, code: Option<i32>, stderr: &[u8]) -> TransportError {
        let stderr = String::from_utf8_lossy(stderr);
        match code {
            Some(SSH_CONNECTION_FAILURE) => {
                TransportError::connection(self.config.target(), stderr.trim().to_string())
            }
            code => TransportError::remote_command(script, code.unwrap_or(-1), &stderr),
        }
    }

    /// Runs `script` and returns its stdout.
    async fn run(&self, script: &str) -> Result<Vec<u8>, TransportError> {
        let child = self.spawn(script, Stdio::null())?;
        let output = tokio::time::timeout(self.config.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| TransportError::timeout(self.config.target()))?
            .map_err(|e| TransportError::connection(self.config.target(), e))?;

        if !output.status.success() {
            return Err(self.status_error(script, output.status.code(), &output.stderr));
        }
        Ok(output.stdout)
    }

    /// Runs `script` with `input` piped to its stdin.
    async fn run_with_input<R>(
        &self,
        script: &str,
        mut input: R,
        limit: Duration,
    ) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut child = self.spawn(script, Stdio::piped())?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::connection(self.config.target(), "stdin unavailable"))?;

        let feed = async move {
            let copied = tokio::io::copy(&mut input, &mut stdin).await?;
            stdin.shutdown().await?;
            Ok::<u64, std::io::Error>(copied)
        };
        let (fed, output) = tokio::time::timeout(limit, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| TransportError::timeout(self.config.target()))?;

        let output = output.map_err(|e| TransportError::connection(self.config.target(), e))?;
        if !output.status.success() {
            return Err(self.status_error(script, output.status.code(), &output.stderr));
        }
        let copied = fed.map_err(|e| TransportError::connection(self.config.target(), e))?;
        trace!(bytes = copied, "remote write complete");
        Ok(())
    }

    /// Copies a local PDF or EPUB into the document store and returns its new id.
    ///
    /// The visible name defaults to the file stem. Metadata, content and the
    /// cache directories are written alongside; if any step fails the partial
    /// document is removed again.
    ///
    /// # Errors
    ///
    /// - [`TransportError::UnsupportedFormat`] for anything but `.pdf`/`.epub`
    /// - [`TransportError::Io`] if the local file cannot be opened
    /// - any remote command failure
    #[instrument(skip(self), fields(target = %self.config.target()))]
    pub async fn upload_file(
        &self,
        local_path: &Path,
        visible_name: Option<&str>,
        parent_id: &str,
    ) -> Result<DocumentId, TransportError> {
        let extension = local_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let file_type = match extension.as_str() {
            "pdf" => ExportFormat::Pdf,
            "epub" => ExportFormat::Epub,
            other => return Err(TransportError::unsupported_format(other, self.name())),
        };
        validate_parent_id(parent_id)?;

        let name = match visible_name {
            Some(name) => name.to_string(),
            None => local_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| TransportError::io(local_path, e))?;

        let id = Uuid::new_v4().to_string();
        info!(id = %id, name = %name, parent = parent_id, "uploading document");

        let result = self
            .write_document(&id, file, &name, parent_id, file_type)
            .await;
        if let Err(error) = &result {
            warn!(id = %id, error = %error, "upload failed; removing partial document");
            if let Err(cleanup) = self.delete_document(&id).await {
                warn!(id = %id, error = %cleanup, "cleanup after failed upload failed");
            }
        }
        result.map(|()| id)
    }

    async fn write_document(
        &self,
        id: &str,
        file: tokio::fs::File,
        name: &str,
        parent_id: &str,
        file_type: ExportFormat,
    ) -> Result<(), TransportError> {
        let data_path = remote_path(id, file_type.as_str());
        self.run_with_input(
            &format!(
                "mkdir -p {dir} && cat > {path}",
                dir = shell_quote(REMOTE_DOCUMENTS_DIR),
                path = shell_quote(&data_path)
            ),
            file,
            self.config.transfer_timeout,
        )
        .await?;

        let metadata = RemoteMetadata::document(name, parent_id, OffsetDateTime::now_utc());
        self.write_json(&remote_path(id, "metadata"), &metadata).await?;
        let content = RemoteContent::for_file_type(file_type.as_str());
        self.write_json(&remote_path(id, "content"), &content).await?;

        let dirs = ["cache", "highlights", "thumbnails"]
            .iter()
            .map(|suffix| shell_quote(&remote_path(id, suffix)))
            .collect::<Vec<_>>()
            .join(" ");
        self.run(&format!("mkdir -p {dirs}")).await?;
        Ok(())
    }

    async fn write_json<T: serde::Serialize>(&self, path: &str, value: &T) -> Result<(), TransportError> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| TransportError::parse(path, e.to_string()))?;
        self.run_with_input(
            &format!("cat > {}", shell_quote(path)),
            json.as_slice(),
            self.config.command_timeout,
        )
        .await
    }

    /// Creates a folder and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidDocumentId`] for a malformed parent,
    /// or any remote command failure.
    #[instrument(skip(self), fields(target = %self.config.target()))]
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<DocumentId, TransportError> {
        validate_parent_id(parent_id)?;
        let id = Uuid::new_v4().to_string();

        self.run(&format!("mkdir -p {}", shell_quote(REMOTE_DOCUMENTS_DIR)))
            .await?;
        let metadata = RemoteMetadata::folder(name, parent_id, OffsetDateTime::now_utc());
        self.write_json(&remote_path(&id, "metadata"), &metadata).await?;
        self.write_json(&remote_path(&id, "content"), &serde_json::json!({}))
            .await?;

        info!(id = %id, name, parent = parent_id, "folder created");
        Ok(id)
    }

    /// Removes a document or folder and every file belonging to it.
    ///
    /// Children of a deleted folder are left in place and show up at the root.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidDocumentId`] for a malformed id, or
    /// any remote command failure.
    #[instrument(skip(self), fields(target = %self.config.target()))]
    pub async fn delete_document(&self, id: &str) -> Result<(), TransportError> {
        validate_document_id(id)?;
        let base = shell_quote(&format!("{REMOTE_DOCUMENTS_DIR}/{id}"));
        self.run(&format!("rm -rf {base} {base}.*")).await?;
        info!(id, "document deleted");
        Ok(())
    }

    /// Restarts the device UI so it reloads the document store.
    ///
    /// # Errors
    ///
    /// Any remote command failure.
    #[instrument(skip(self), fields(target = %self.config.target()))]
    pub async fn restart_service(&self) -> Result<(), TransportError> {
        self.run("systemctl restart xochitl").await?;
        info!("device UI restarted");
        Ok(())
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn supports(&self, format: ExportFormat) -> bool {
        matches!(format, ExportFormat::Pdf | ExportFormat::Epub)
    }

    #[instrument(skip(self), fields(target = %self.config.target()))]
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, TransportError> {
        let stdout = self.run(&listing_script()).await?;
        let records = parse_remote_listing(&String::from_utf8_lossy(&stdout));
        debug!(records = records.len(), "listing complete");
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
        validate_document_id(&record.id)?;

        let script = format!("cat {}", shell_quote(&remote_path(&record.id, format.as_str())));
        let mut child = self.spawn(&script, Stdio::null())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::connection(self.config.target(), "stdout unavailable"))?;

        // Drained alongside stdout so a chatty ssh cannot fill the pipe and stall the copy.
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                let _ = pipe.read_to_end(&mut buffer).await;
                buffer
            })
        });

        let mut chunks = cat_stream(CatProcess {
            transport: self.clone(),
            script,
            child,
            stdout,
            stderr,
            deadline: Instant::now() + self.config.transfer_timeout,
            done: false,
        });

        // Surface a missing file before the caller creates anything locally.
        match chunks.next().await {
            None => Ok(stream::empty().boxed()),
            Some(Err(error)) => Err(error),
            Some(Ok(first)) => Ok(stream::once(async move { Ok(first) }).chain(chunks).boxed()),
        }
    }
}

struct CatProcess {
    transport: SshTransport,
    script: String,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<Vec<u8>>>,
    deadline: Instant,
    done: bool,
}

impl CatProcess {
    async fn finish(&mut self) -> Result<(), TransportError> {
        let status = tokio::time::timeout_at(self.deadline, self.child.wait())
            .await
            .map_err(|_| TransportError::timeout(self.transport.config.target()))?
            .map_err(|e| TransportError::connection(self.transport.config.target(), e))?;
        let stderr = match self.stderr.take() {
            Some(task) => tokio::time::timeout_at(self.deadline, task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if status.success() {
            Ok(())
        } else {
            Err(self
                .transport
                .status_error(&self.script, status.code(), &stderr))
        }
    }
}

fn cat_stream(process: CatProcess) -> ByteStream {
    stream::unfold(process, |mut process| async move {
        if process.done {
            return None;
        }
        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        let read = tokio::time::timeout_at(process.deadline, process.stdout.read_buf(&mut buffer)).await;
        match read {
            Err(_) => {
                process.done = true;
                let error = TransportError::timeout(process.transport.config.target());
                Some((Err(error), process))
            }
            Ok(Err(e)) => {
                process.done = true;
                let error = TransportError::connection(process.transport.config.target(), e);
                Some((Err(error), process))
            }
            Ok(Ok(0)) => {
                process.done = true;
                match process.finish().await {
                    Ok(()) => None,
                    Err(error) => Some((Err(error), process)),
                }
            }
            Ok(Ok(_)) => Some((Ok(buffer.freeze()), process)),
        }
    })
    .boxed()
}

/// `{store}/{id}.{suffix}`, relative to the remote home directory.
fn remote_path(id: &str, suffix: &str) -> String {
    format!("{REMOTE_DOCUMENTS_DIR}/{id}.{suffix}")
}

/// Ids end up in remote paths; only the characters the device itself uses pass.
fn validate_document_id(id: &str) -> Result<&str, TransportError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(id)
    } else {
        Err(TransportError::InvalidDocumentId { id: id.to_string() })
    }
}

fn validate_parent_id(id: &str) -> Result<&str, TransportError> {
    if id == ROOT_ID {
        Ok(id)
    } else {
        validate_document_id(id)
    }
}
