use std::path::{Path, PathBuf};

use anyhow::Result;
use hyprink_core::Context;

/// Pack `src` into `output`, or `<dirname>.pkg` in the working directory
pub fn pack(ctx: &mut Context, src: &Path, output: Option<&Path>) -> Result<()> {
    let output = output.map_or_else(|| default_output(src), Path::to_path_buf);
    let summary = ctx.pack(src, &output)?;
    println!(
        "Packed {} entries ({} files, {} bytes) into {}",
        summary.entries,
        summary.files,
        summary.payload_bytes,
        output.display()
    );
    Ok(())
}

/// `<dirname>.pkg`, resolving `.` and trailing slashes to the real name.
fn default_output(src: &Path) -> PathBuf {
    let name = std::fs::canonicalize(src)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .or_else(|| src.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "package".to_string());
    PathBuf::from(format!("{name}.pkg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_uses_directory_name() {
        assert_eq!(
            default_output(Path::new("/no/such/project")),
            PathBuf::from("project.pkg")
        );
        assert_eq!(default_output(Path::new("/")), PathBuf::from("package.pkg"));
    }

    #[test]
    fn default_output_resolves_dot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("named");
        std::fs::create_dir(&dir).unwrap();
        assert_eq!(
            default_output(&dir.join(".")),
            PathBuf::from("named.pkg")
        );
    }
}
