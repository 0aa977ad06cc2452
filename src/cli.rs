//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use rmexport_core::export::ExportFormat;

use crate::config::TransportKind;

/// Browse and export documents from an e-ink tablet.
///
/// Reads the tablet's folder tree over the USB web interface or SSH, exports
/// the selected documents to a local folder, and imports files over SSH.
#[derive(Parser, Debug)]
#[command(name = "rmexport")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/rmexport/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// How to reach the tablet
    #[arg(short = 't', long, global = true, value_enum)]
    pub transport: Option<TransportKind>,

    /// Web interface address (IP, optionally with port)
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// SSH host (defaults to the address)
    #[arg(long, global = true)]
    pub ssh_host: Option<String>,

    /// SSH user
    #[arg(long, global = true)]
    pub ssh_user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the folder tree with document ids
    List(ListArgs),
    /// Export selected documents to a local folder
    Export(ExportArgs),
    /// Upload a PDF or EPUB (ssh only)
    Upload(UploadArgs),
    /// Create a folder (ssh only)
    Mkdir(MkdirArgs),
    /// Delete a document or folder (ssh only)
    Delete(DeleteArgs),
    /// Restart the tablet UI so it picks up changes (ssh only)
    Restart,
}

/// Arguments for `list`.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only list below this folder (id or path such as `Work/Papers`)
    #[arg(long, value_name = "ID|PATH")]
    pub folder: Option<String>,

    /// Print records as JSON instead of a tree
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `export`.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Select everything on the tablet
    #[arg(short, long)]
    pub all: bool,

    /// Select a document or folder (id or path); repeatable
    #[arg(short, long, value_name = "ID|PATH")]
    pub select: Vec<String>,

    /// Deselect a document or folder after selecting; repeatable
    #[arg(short, long, value_name = "ID|PATH")]
    pub deselect: Vec<String>,

    /// Export format (pdf, rmdoc, epub); repeatable, in order
    #[arg(short, long = "format", value_name = "FORMAT")]
    pub formats: Vec<ExportFormat>,

    /// Directory the export folder is created in
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Write straight into the output directory instead of a timestamped folder
    #[arg(long)]
    pub no_wrapper: bool,

    /// Times to retry the item an export halted on (0-10)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub retries: u8,

    /// Skip an item that still fails after all retries and carry on
    #[arg(long)]
    pub skip_failed: bool,
}

/// Arguments for `upload`.
#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Local `.pdf` or `.epub` file
    pub file: PathBuf,

    /// Destination folder id (default: root)
    #[arg(long, default_value = "")]
    pub parent: String,

    /// Name shown on the tablet (default: file name without extension)
    #[arg(long)]
    pub name: Option<String>,

    /// Restart the tablet UI afterwards
    #[arg(long)]
    pub restart: bool,
}

/// Arguments for `mkdir`.
#[derive(Args, Debug, Clone)]
pub struct MkdirArgs {
    /// Folder name
    pub name: String,

    /// Parent folder id (default: root)
    #[arg(long, default_value = "")]
    pub parent: String,

    /// Restart the tablet UI afterwards
    #[arg(long)]
    pub restart: bool,
}

/// Arguments for `delete`.
#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Document or folder id
    pub id: String,

    /// Restart the tablet UI afterwards
    #[arg(long)]
    pub restart: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["rmexport", "-vv", "list"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["rmexport", "list", "--verbose"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let cli = Cli::try_parse_from(["rmexport", "-q", "restart"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Restart));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["rmexport", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["rmexport"]).is_err());
    }

    #[test]
    fn test_export_args_parse() {
        let cli = Cli::try_parse_from([
            "rmexport",
            "--transport",
            "ssh",
            "export",
            "--select",
            "Work/Papers",
            "-s",
            "abc",
            "--deselect",
            "Work/Papers/Draft",
            "-f",
            "pdf",
            "--format",
            "EPUB",
            "-o",
            "/tmp/out",
            "--retries",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.transport, Some(TransportKind::Ssh));
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert!(!args.all);
        assert_eq!(args.select, ["Work/Papers", "abc"]);
        assert_eq!(args.deselect, ["Work/Papers/Draft"]);
        assert_eq!(args.formats, [ExportFormat::Pdf, ExportFormat::Epub]);
        assert_eq!(args.output, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.retries, 2);
    }

    #[test]
    fn test_export_rejects_unknown_format() {
        let err = Cli::try_parse_from(["rmexport", "export", "--all", "-f", "docx"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_export_retries_range() {
        assert!(Cli::try_parse_from(["rmexport", "export", "--all", "-r", "11"]).is_err());
    }

    #[test]
    fn test_upload_args_defaults() {
        let cli = Cli::try_parse_from(["rmexport", "upload", "paper.pdf"]).unwrap();
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.file, PathBuf::from("paper.pdf"));
        assert_eq!(args.parent, "");
        assert!(args.name.is_none());
        assert!(!args.restart);
    }
}
