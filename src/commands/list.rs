//! List command handler: print the tablet's folder tree.

use anyhow::{Context, Result, bail};
use rmexport_core::catalog::{Catalog, DocumentRecord, ROOT_ID};

use crate::cli::ListArgs;
use crate::config::Settings;

pub async fn run_list_command(settings: &Settings, args: &ListArgs) -> Result<()> {
    let transport = settings.transport()?;
    let catalog = Catalog::load(transport.as_ref())
        .await
        .context("Failed to read documents from the tablet")?;

    let folder_id = match args.folder.as_deref() {
        Some(selector) => {
            let record = catalog
                .resolve(selector)
                .with_context(|| format!("No folder matches '{selector}'"))?;
            if !record.is_folder {
                bail!("'{selector}' is a document, not a folder");
            }
            record.id.clone()
        }
        None => ROOT_ID.to_string(),
    };

    if args.json {
        let records: Vec<&DocumentRecord> = subtree(&catalog, &folder_id)
            .into_iter()
            .map(|(record, _)| record)
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let lines = render_tree(&catalog, &folder_id);
    if lines.is_empty() {
        println!("(empty)");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Pre-order records below `folder_id` with their depth.
fn subtree<'a>(catalog: &'a Catalog, folder_id: &str) -> Vec<(&'a DocumentRecord, usize)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&DocumentRecord, usize)> =
        catalog.folder(folder_id).iter().rev().map(|r| (r, 0)).collect();
    while let Some((record, depth)) = stack.pop() {
        // A record cannot be its own ancestor on a well-formed tablet; bound the walk anyway.
        if depth > catalog.len() {
            continue;
        }
        out.push((record, depth));
        stack.extend(
            catalog
                .folder(&record.id)
                .iter()
                .rev()
                .map(|child| (child, depth + 1)),
        );
    }
    out
}

fn render_tree(catalog: &Catalog, folder_id: &str) -> Vec<String> {
    subtree(catalog, folder_id)
        .into_iter()
        .map(|(record, depth)| {
            let indent = "  ".repeat(depth);
            let suffix = if record.is_folder { "/" } else { "" };
            format!("{indent}{}{suffix}  [{}]", record.name, record.id)
        })
        .collect()
}
