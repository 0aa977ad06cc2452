//! Export command handler: select, then drive an [`ExportJob`] to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rmexport_core::catalog::{Catalog, ROOT_ID};
use rmexport_core::export::{ExportEvent, ExportJob, ExportOptions, RunOutcome};
use rmexport_core::selection::SelectionTree;
use tracing::{info, warn};

use crate::cli::ExportArgs;
use crate::config::Settings;
use crate::terminal::item_progress_bar;

pub async fn run_export_command(settings: &Settings, args: &ExportArgs, quiet: bool) -> Result<()> {
    if !args.all && args.select.is_empty() {
        bail!("Nothing selected. Pass --all or at least one --select <ID|PATH>.");
    }

    let transport = settings.transport()?;
    let catalog = Catalog::load(transport.as_ref())
        .await
        .context("Failed to read documents from the tablet")?;
    let tree = build_selection(&catalog, args)?;

    let items = catalog.checked_items(&tree);
    if items.is_empty() {
        info!("No documents selected; nothing to export");
        return Ok(());
    }

    let options = ExportOptions::new(settings.output_dir.clone(), settings.formats.clone());
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut job = ExportJob::begin(options, items, transport)?.with_cancellation(Arc::clone(&interrupted));
    if args.no_wrapper {
        job = job.with_wrapper_folder("");
    }

    let signal_flag = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let bar = item_progress_bar(job.len(), quiet);
    let mut attempts: u8 = 0;
    let mut attempt_index = usize::MAX;
    let mut skipped = 0usize;

    loop {
        let mut failure: Option<(String, bool)> = None;
        let outcome = job
            .run(|event| match event {
                ExportEvent::Started { item, .. } => bar.set_message(item.record.name.clone()),
                ExportEvent::Finished { files, .. } => {
                    bar.inc(1);
                    for file in files {
                        bar.suspend(|| println!("{}", file.display()));
                    }
                }
                ExportEvent::Failed { cause, .. } => {
                    failure = Some((cause.to_string(), cause.is_retryable()));
                }
            })
            .await;

        match outcome {
            RunOutcome::Completed => break,
            RunOutcome::Cancelled { index } => {
                bar.abandon();
                bail!("Export interrupted before item {}/{}", index + 1, job.len());
            }
            RunOutcome::Halted { index } => {
                let (message, retryable) = failure.unwrap_or_else(|| ("unknown error".to_string(), false));
                if index != attempt_index {
                    attempt_index = index;
                    attempts = 0;
                }
                if retryable && attempts < args.retries {
                    attempts += 1;
                    warn!(index, attempt = attempts, error = %message, "retrying item");
                    tokio::time::sleep(Duration::from_secs(u64::from(attempts))).await;
                    continue;
                }
                if args.skip_failed {
                    warn!(index, error = %message, "skipping failed item");
                    job.skip_current();
                    bar.inc(1);
                    skipped += 1;
                    continue;
                }
                bar.abandon();
                bail!("Export halted at item {}/{}: {message}", index + 1, job.len());
            }
        }
    }

    bar.finish_and_clear();
    let location = job.output_dir();
    info!(
        items = job.len(),
        skipped,
        location = %location.display(),
        "export finished"
    );
    Ok(())
}

/// Applies `--all`, then each `--select`, then each `--deselect`.
fn build_selection(catalog: &Catalog, args: &ExportArgs) -> Result<SelectionTree> {
    let mut tree = SelectionTree::build(catalog.children_by_parent());

    if args.all {
        tree.select(ROOT_ID, true);
    }
    for selector in &args.select {
        let record = catalog
            .resolve(selector)
            .with_context(|| format!("No document or folder matches '{selector}'"))?;
        tree.select(&record.id, true);
    }
    for selector in &args.deselect {
        let record = catalog
            .resolve(selector)
            .with_context(|| format!("No document or folder matches '{selector}'"))?;
        tree.select(&record.id, false);
    }
    Ok(tree)
}
