//! Handlers for the ssh-only commands that change the tablet.

use anyhow::{Context, Result, bail};
use rmexport_core::transport::SshTransport;
use tracing::info;

use crate::cli::{DeleteArgs, MkdirArgs, UploadArgs};
use crate::config::Settings;

pub async fn run_upload_command(settings: &Settings, args: &UploadArgs) -> Result<()> {
    if !args.file.is_file() {
        bail!("Not a file: {}", args.file.display());
    }
    let transport = settings.ssh_transport()?;
    let id = transport
        .upload_file(&args.file, args.name.as_deref(), &args.parent)
        .await
        .with_context(|| format!("Failed to upload {}", args.file.display()))?;
    info!(id = %id, file = %args.file.display(), "uploaded");
    println!("{id}");
    finish(&transport, args.restart).await
}

pub async fn run_mkdir_command(settings: &Settings, args: &MkdirArgs) -> Result<()> {
    if args.name.trim().is_empty() {
        bail!("Folder name must not be empty");
    }
    let transport = settings.ssh_transport()?;
    let id = transport
        .create_folder(&args.name, &args.parent)
        .await
        .with_context(|| format!("Failed to create folder '{}'", args.name))?;
    info!(id = %id, name = %args.name, "folder created");
    println!("{id}");
    finish(&transport, args.restart).await
}

pub async fn run_delete_command(settings: &Settings, args: &DeleteArgs) -> Result<()> {
    let transport = settings.ssh_transport()?;
    transport
        .delete_document(&args.id)
        .await
        .with_context(|| format!("Failed to delete '{}'", args.id))?;
    info!(id = %args.id, "deleted");
    finish(&transport, args.restart).await
}

pub async fn run_restart_command(settings: &Settings) -> Result<()> {
    let transport = settings.ssh_transport()?;
    finish(&transport, true).await
}

async fn finish(transport: &SshTransport, restart: bool) -> Result<()> {
    if restart {
        transport
            .restart_service()
            .await
            .context("Failed to restart the tablet UI")?;
        info!("tablet UI restarted");
    } else {
        info!("changes appear on the tablet after its UI restarts (--restart)");
    }
    Ok(())
}
