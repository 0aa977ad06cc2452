//! Configuration loading for CLI defaults.
//!
//! Precedence: command-line flags, then `config.toml`, then built-in defaults.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use rmexport_core::export::{ExportFormat, dedup_formats};
use rmexport_core::transport::{
    DEFAULT_TABLET_ADDRESS, HttpConfig, HttpTransport, SshConfig, SshTransport, Transport,
};
use serde::Deserialize;

const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LISTING_TIMEOUT_SECS: u64 = 5;

/// Which transport reaches the tablet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// USB web interface.
    #[default]
    Http,
    /// Remote shell over `ssh`.
    Ssh,
}

impl TransportKind {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Ssh => "ssh",
        }
    }
}

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Web interface address (IP, optionally with port).
    pub address: Option<String>,
    /// Default transport.
    pub transport: Option<TransportKind>,
    /// SSH host; defaults to `address` without its port.
    pub ssh_host: Option<String>,
    /// SSH user.
    pub ssh_user: Option<String>,
    /// SSH port.
    pub ssh_port: Option<u16>,
    /// `ssh` binary.
    pub ssh_program: Option<PathBuf>,
    /// Private key passed as `ssh -i`.
    pub ssh_identity: Option<PathBuf>,
    /// Directory exports are written under.
    pub output_dir: Option<PathBuf>,
    /// Default export formats.
    pub formats: Option<Vec<ExportFormat>>,
    /// Connect timeout in seconds (HTTP and SSH).
    pub connect_timeout_secs: Option<u64>,
    /// Per-download timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Per-folder listing timeout in seconds.
    pub listing_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout_secs("listing_timeout_secs", self.listing_timeout_secs)?;
        if self.formats.as_ref().is_some_and(Vec::is_empty) {
            bail!("Invalid config value for `formats`: expected at least one format");
        }
        if self
            .address
            .as_deref()
            .is_some_and(|address| address.trim().is_empty())
        {
            bail!("Invalid config value for `address`: must not be empty");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/rmexport/config.toml`
/// 2. the platform config directory (`~/.config` on Linux)
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    let base = env_var_non_empty_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    Some(base.join("rmexport").join("config.toml"))
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` if given (it must exist), else the default path if present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match resolve_default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(Some(config))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Values given on the command line; `None` defers to the file or defaults.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub transport: Option<TransportKind>,
    pub address: Option<String>,
    pub ssh_host: Option<String>,
    pub ssh_user: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub formats: Vec<ExportFormat>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub transport: TransportKind,
    pub address: String,
    pub ssh_host: String,
    pub ssh_user: String,
    pub ssh_port: Option<u16>,
    pub ssh_program: Option<PathBuf>,
    pub ssh_identity: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub formats: Vec<ExportFormat>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub listing_timeout: Duration,
}

impl Settings {
    /// Merges CLI overrides over the file config over defaults.
    #[must_use]
    pub fn resolve(file: Option<&FileConfig>, cli: &CliOverrides) -> Self {
        let file = file.cloned().unwrap_or_default();

        let address = cli
            .address
            .clone()
            .or(file.address)
            .unwrap_or_else(|| DEFAULT_TABLET_ADDRESS.to_string());
        let ssh_host = cli
            .ssh_host
            .clone()
            .or(file.ssh_host)
            .unwrap_or_else(|| host_of(&address));
        let formats = if cli.formats.is_empty() {
            file.formats.unwrap_or_else(|| vec![ExportFormat::Pdf])
        } else {
            cli.formats.clone()
        };

        Self {
            transport: cli.transport.or(file.transport).unwrap_or_default(),
            address,
            ssh_host,
            ssh_user: cli
                .ssh_user
                .clone()
                .or(file.ssh_user)
                .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            ssh_port: file.ssh_port,
            ssh_program: file.ssh_program,
            ssh_identity: file.ssh_identity,
            output_dir: cli
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            formats: dedup_formats(&formats),
            connect_timeout: secs(file.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: secs(file.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS),
            listing_timeout: secs(file.listing_timeout_secs, DEFAULT_LISTING_TIMEOUT_SECS),
        }
    }

    /// Timeouts for the web interface.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: self.connect_timeout,
            listing_timeout: self.listing_timeout,
            download_timeout: self.request_timeout,
            ..HttpConfig::default()
        }
    }

    /// Connection settings for `ssh`, sharing one control socket per user/host/port.
    #[must_use]
    pub fn ssh_config(&self) -> SshConfig {
        let mut config = SshConfig::new(self.ssh_host.clone());
        config.user = Some(self.ssh_user.clone());
        config.port = self.ssh_port;
        if let Some(program) = &self.ssh_program {
            config.program = program.clone().into_os_string();
        }
        if let Some(identity) = &self.ssh_identity {
            config.extra_options = vec!["-i".into(), identity.clone().into_os_string()];
        }
        config.connect_timeout = self.connect_timeout;
        config.transfer_timeout = self.request_timeout;
        config.control_path = Some(env::temp_dir().join("rmexport_ssh_%h_%p_%r"));
        config
    }

    /// Builds the SSH transport.
    pub fn ssh_transport(&self) -> Result<SshTransport> {
        SshTransport::new(self.ssh_config())
            .with_context(|| format!("Invalid SSH host '{}'", self.ssh_host))
    }

    /// Builds the configured transport.
    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match self.transport {
            TransportKind::Http => Arc::new(
                HttpTransport::with_config(&self.address, self.http_config())
                    .with_context(|| format!("Invalid tablet address '{}'", self.address))?,
            ),
            TransportKind::Ssh => Arc::new(self.ssh_transport()?),
        };
        Ok(transport)
    }
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

/// Strips a port from `address` (`10.11.99.1:80`, `[::1]:80`).
fn host_of(address: &str) -> String {
    address
        .parse::<std::net::SocketAddr>()
        .map_or_else(|_| address.to_string(), |socket| socket.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            address = "10.11.99.1"
            transport = "ssh"
            ssh_host = "remarkable"
            ssh_user = "root"
            ssh_port = 2222
            output_dir = "/home/me/tablet"
            formats = ["pdf", "rmdoc"]
            connect_timeout_secs = 10
            request_timeout_secs = 600
            listing_timeout_secs = 15
        "#;
        let config = parse_config_str(raw).unwrap();
        assert_eq!(config.transport, Some(TransportKind::Ssh));
        assert_eq!(config.ssh_port, Some(2222));
        assert_eq!(
            config.formats,
            Some(vec![ExportFormat::Pdf, ExportFormat::Rmdoc])
        );
        assert_eq!(config.output_dir, Some(PathBuf::from("/home/me/tablet")));
    }

    #[test]
    fn test_parse_rejects_unknown_keys_and_bad_values() {
        assert!(parse_config_str("adress = \"10.11.99.1\"").is_err());
        assert!(parse_config_str("formats = [\"docx\"]").is_err());
        assert!(parse_config_str("formats = []").is_err());
        assert!(parse_config_str("transport = \"ftp\"").is_err());

        let err = parse_config_str("request_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"), "got: {err}");
        assert!(parse_config_str("listing_timeout_secs = 3601").is_err());
    }

    #[test]
    fn test_defaults_without_file_or_flags() {
        let settings = Settings::resolve(None, &CliOverrides::default());
        assert_eq!(settings.transport, TransportKind::Http);
        assert_eq!(settings.address, "10.11.99.1");
        assert_eq!(settings.ssh_host, "10.11.99.1");
        assert_eq!(settings.ssh_user, "root");
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert_eq!(settings.formats, vec![ExportFormat::Pdf]);
        assert_eq!(settings.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_cli_overrides_file_overrides_defaults() {
        let file = FileConfig {
            address: Some("192.168.1.20:8080".to_string()),
            output_dir: Some(PathBuf::from("/from/file")),
            formats: Some(vec![ExportFormat::Rmdoc]),
            connect_timeout_secs: Some(9),
            ..FileConfig::default()
        };
        let cli = CliOverrides {
            output_dir: Some(PathBuf::from("/from/cli")),
            formats: vec![ExportFormat::Pdf, ExportFormat::Pdf, ExportFormat::Rmdoc],
            ..CliOverrides::default()
        };

        let settings = Settings::resolve(Some(&file), &cli);
        assert_eq!(settings.address, "192.168.1.20:8080");
        assert_eq!(settings.ssh_host, "192.168.1.20");
        assert_eq!(settings.output_dir, PathBuf::from("/from/cli"));
        assert_eq!(settings.formats, vec![ExportFormat::Pdf, ExportFormat::Rmdoc]);
        assert_eq!(settings.connect_timeout, Duration::from_secs(9));
        assert_eq!(settings.http_config().connect_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_ssh_config_carries_identity_and_control_path() {
        let file = FileConfig {
            ssh_identity: Some(PathBuf::from("/keys/rm")),
            ssh_port: Some(2022),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(Some(&file), &CliOverrides::default());
        let ssh = settings.ssh_config();
        assert_eq!(ssh.target(), "root@10.11.99.1");
        assert_eq!(ssh.port, Some(2022));
        assert_eq!(ssh.extra_options, vec![OsString::from("-i"), OsString::from("/keys/rm")]);
        assert!(ssh.control_path.is_some());
    }

    #[test]
    fn test_transport_rejects_bad_address() {
        let cli = CliOverrides {
            address: Some("not an ip".to_string()),
            ..CliOverrides::default()
        };
        let settings = Settings::resolve(None, &cli);
        assert!(settings.transport().is_err());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(load_file_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "address = \"127.0.0.1:9000\"\n").unwrap();
        let config = load_file_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.address.as_deref(), Some("127.0.0.1:9000"));
    }
}
