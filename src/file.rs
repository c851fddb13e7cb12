use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

static BINARY_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "a", "o", "obj", "png", "jpg", "jpeg", "gif", "bmp", "ico",
        "webp", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "wasm", "pyc",
        "class",
    ]
    .into_iter()
    .collect()
});

/// A single source file of a folder unit: its name and its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// File name, without any directory component
    pub name: String,

    /// Full UTF-8 content
    pub content: String,
}

impl SourceFile {
    /// Creates a new source file.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Determines if a byte sample is likely binary.
///
/// # Algorithm
///
/// 1. Looks at the first 8KB only
/// 2. Any null byte marks the sample as binary
/// 3. Otherwise a sample whose ASCII ratio is below 85% is binary
pub(crate) fn is_likely_binary(bytes: &[u8]) -> bool {
    const SAMPLE_SIZE: usize = 8192;
    const ASCII_THRESHOLD: f64 = 0.85;

    let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
    if sample.is_empty() {
        return false;
    }

    if memchr::memchr(0, sample).is_some() {
        return true;
    }

    let ascii_count = sample.iter().filter(|&&b| b < 128).count();
    #[allow(clippy::cast_precision_loss)]
    let ascii_ratio = ascii_count as f64 / sample.len() as f64;

    ascii_ratio < ASCII_THRESHOLD
}

/// Image data (PNG) carries its signature at offset 1.
pub(crate) fn looks_like_image(bytes: &[u8]) -> bool {
    bytes.get(1..4) == Some(b"PNG".as_slice())
}

/// Checks if a file extension suggests a binary file.
#[must_use]
pub(crate) fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}
