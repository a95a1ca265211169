use std::path::Path;

use anyhow::{Context as _, Result};
use comfy_table::Table;
use hyprink_core::Context;
use hyprink_schema::{EntryKind, ManifestEntry};

/// Show the manifest of a package file
pub fn list(ctx: &mut Context, package: &Path, json: bool) -> Result<()> {
    let manifest = ctx.list(package)?;

    if json {
        let out = serde_json::to_string_pretty(&manifest).context("Failed to encode manifest")?;
        println!("{out}");
        return Ok(());
    }

    if manifest.is_empty() {
        println!("{}: empty package", package.display());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Path", "Kind", "Size", "Mode", "Content"]);
    for entry in &manifest {
        table.add_row(vec![
            entry.path.clone(),
            entry.kind.to_string(),
            entry.size.to_string(),
            format!("{:04o}", entry.permissions),
            content_column(entry),
        ]);
    }
    println!("{table}");
    println!(
        "{} entries, {} payload bytes",
        manifest.len(),
        manifest.payload_size()
    );
    Ok(())
}

fn content_column(entry: &ManifestEntry) -> String {
    match entry.kind {
        EntryKind::Dir => "-".to_string(),
        EntryKind::Symlink => format!("-> {}", entry.link_target.as_deref().unwrap_or_default()),
        EntryKind::File => entry
            .content_hash
            .as_ref()
            .map(|h| h.as_str()[..12].to_string())
            .unwrap_or_default(),
    }
}
