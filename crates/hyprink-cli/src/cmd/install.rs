use std::path::Path;

use anyhow::Result;
use hyprink_core::Context;

/// Install a package file or directory
pub fn install(ctx: &mut Context, path: &Path) -> Result<()> {
    let report = ctx.install(path)?;
    let verb = if report.replaced { "Replaced" } else { "Installed" };
    println!(
        "{verb} {} ({} files, {} bytes) at {}",
        report.name,
        report.files,
        report.bytes,
        report.path.display()
    );
    Ok(())
}
