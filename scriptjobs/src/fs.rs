use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Replace `path` with `contents` by writing a sibling temp file and renaming it over.
///
/// Readers see either the old file or the new one, and a process that already opened
/// the old file keeps reading the old contents.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, contents)
        .await
        .map_err(|e| Error::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(Error::io(path, e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}
