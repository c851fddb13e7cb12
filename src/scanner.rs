use crate::{
    error::{Error, Result},
    file::SourceFile,
    filter::FileFilter,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// The input root and the folder units found beneath it.
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    folders: Vec<PathBuf>,
}

impl SourceTree {
    /// Lists every directory below `root` (the root itself excluded),
    /// parents before children, siblings by name.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the tree cannot be walked.
    pub fn discover(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut folders = Vec::new();

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                Error::io(path, e.into())
            })?;

            if entry.file_type().is_dir() {
                folders.push(entry.into_path());
            }
        }

        debug!(
            "Discovered {} folders under {}",
            folders.len(),
            root.display()
        );

        Ok(Self { root, folders })
    }

    /// Returns the discovered folders as absolute (root-joined) paths.
    #[must_use]
    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Returns `folder` relative to the root.
    #[must_use]
    pub fn relative(&self, folder: &Path) -> PathBuf {
        pathdiff::diff_paths(folder, &self.root).unwrap_or_else(|| folder.to_path_buf())
    }
}

/// Counters for the files a folder read left out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SkipStats {
    pub(crate) filtered: usize,
    pub(crate) unreadable: usize,
}

/// One folder unit: the regular files directly inside a directory.
#[derive(Debug, Clone)]
pub struct SourceFolder {
    /// Path relative to the input root
    pub relative: PathBuf,

    /// Files in name order
    pub files: Vec<SourceFile>,

    pub(crate) skipped: SkipStats,
}

impl SourceFolder {
    /// Reads the files of `dir` through `filter`.
    ///
    /// Files the filter rejects are counted and left out; they never fail
    /// the folder.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be listed.
    pub(crate) fn read(dir: &Path, relative: PathBuf, filter: &FileFilter) -> Result<Self> {
        let entries = list_files(dir)?;

        let mut files = Vec::with_capacity(entries.len());
        let mut skipped = SkipStats::default();

        for (path, size) in entries {
            if let Some(reason) = filter.check_path(&path, size) {
                trace!("Skipping {} before read: {:?}", path.display(), reason);
                skipped.filtered += 1;
                continue;
            }

            let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;

            match filter.check_content(bytes) {
                Ok(content) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    files.push(SourceFile::new(name, content));
                }
                Err(crate::filter::SkipReason::NotUtf8) => {
                    warn!("{}", Error::invalid_utf8(&path));
                    skipped.unreadable += 1;
                }
                Err(reason) => {
                    trace!("Skipping {} after read: {:?}", path.display(), reason);
                    skipped.filtered += 1;
                }
            }
        }

        Ok(Self {
            relative,
            files,
            skipped,
        })
    }

    /// Returns true if `dir` holds a regular file the path level filter
    /// accepts. Nothing is read.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be listed.
    pub(crate) fn has_candidates(dir: &Path, filter: &FileFilter) -> Result<bool> {
        Ok(list_files(dir)?
            .iter()
            .any(|(path, size)| filter.check_path(path, *size).is_none()))
    }

    /// Returns true if no file survived filtering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Regular files directly in `dir` with their sizes, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut entries: Vec<(PathBuf, u64)> = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| Error::io(&path, e))?;
        if metadata.is_file() {
            entries.push((path, metadata.len()));
        }
    }

    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(entries)
}
