use std::path::Path;

use anyhow::Result;
use hyprink_core::Context;

/// Extract a package file into `target`
pub fn unpack(ctx: &mut Context, package: &Path, target: &Path) -> Result<()> {
    let summary = ctx.unpack(package, target)?;
    println!(
        "Extracted {} entries ({} files, {} bytes) into {}",
        summary.entries,
        summary.files,
        summary.bytes,
        target.display()
    );
    Ok(())
}
