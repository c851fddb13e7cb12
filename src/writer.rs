use crate::error::{Error, Result};
use serde::Serialize;
use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::trace;

/// Creates the parent directories of `path`.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    Ok(())
}

/// Writes a text file atomically, replacing whatever was there.
///
/// # Process
///
/// 1. Creates missing parent directories
/// 2. Writes content to a hidden sibling temp file
/// 3. Syncs the temp file to disk
/// 4. Renames the temp file over the target path
pub(crate) fn write_text(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;

    let temp_path = temp_path_for(path)?;
    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .sync_all()
        .map_err(|e| Error::io(&temp_path, e))?;

    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })?;

    trace!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Writes `value` as pretty JSON, atomically.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json)
}

/// `dir/name` becomes `dir/.name.tmp`.
fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("Invalid file path: {}", path.display())))?;

    let mut temp_name = OsString::from(".");
    temp_name.push(name);
    temp_name.push(".tmp");

    Ok(path.with_file_name(temp_name))
}
