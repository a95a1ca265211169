use std::path::Path;

use anyhow::Result;
use hyprink_core::Context;

/// Check a package file end to end
pub fn verify(ctx: &mut Context, package: &Path) -> Result<()> {
    let manifest = ctx.verify(package)?;
    println!(
        "{}: OK ({} entries, {} payload bytes)",
        package.display(),
        manifest.len(),
        manifest.payload_size()
    );
    Ok(())
}
