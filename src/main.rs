//! CLI entry point for rmexport.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;
mod config;
mod terminal;

use cli::{Cli, Command};
use config::{CliOverrides, Settings, load_file_config};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    terminal::init_tracing(terminal::default_log_level(cli.quiet, cli.verbose));
    debug!(?cli, "CLI arguments parsed");

    let file_config = load_file_config(cli.config.as_deref())?;
    let settings = Settings::resolve(file_config.as_ref(), &overrides(&cli));
    debug!(transport = settings.transport.as_str(), ?settings, "settings resolved");

    match &cli.command {
        Command::List(args) => commands::run_list_command(&settings, args).await,
        Command::Export(args) => commands::run_export_command(&settings, args, cli.quiet).await,
        Command::Upload(args) => commands::run_upload_command(&settings, args).await,
        Command::Mkdir(args) => commands::run_mkdir_command(&settings, args).await,
        Command::Delete(args) => commands::run_delete_command(&settings, args).await,
        Command::Restart => commands::run_restart_command(&settings).await,
    }
}

fn overrides(cli: &Cli) -> CliOverrides {
    let mut overrides = CliOverrides {
        transport: cli.transport,
        address: cli.address.clone(),
        ssh_host: cli.ssh_host.clone(),
        ssh_user: cli.ssh_user.clone(),
        ..CliOverrides::default()
    };
    if let Command::Export(args) = &cli.command {
        overrides.output_dir.clone_from(&args.output);
        overrides.formats.clone_from(&args.formats);
    }
    overrides
}
