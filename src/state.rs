use crate::error::SyncError;
use anyhow::Context;
use std::path::Path;

/// Returns the build number recorded by an earlier job of the same
/// workflow run, if any.
pub fn load_build_number(path: &Path) -> Result<Option<String>, SyncError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SyncError::StateFile {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let value = data.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}

pub fn save_build_number(path: &Path, build_number: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(path, build_number)
        .with_context(|| format!("writing build number to {}", path.display()))?;
    Ok(())
}
