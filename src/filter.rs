//! Source file filtering.
//!
//! Decides which files of a folder unit make it into the prompt. Path
//! level checks (name globs, size threshold, known binary extensions)
//! run before a file is read; content level checks run on the bytes.

use crate::error::{Error, Result};
use crate::file::{has_binary_extension, is_likely_binary, looks_like_image};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Size threshold used by [`FileFilterConfig::strict`].
pub const STRICT_MAX_FILE_SIZE: u64 = 10_000;

/// Content length used by [`FileFilterConfig::strict`].
pub const STRICT_MIN_CONTENT_CHARS: usize = 6;

/// Configuration for source file filtering.
///
/// The default filters nothing: every readable UTF-8 file is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilterConfig {
    /// Files whose size in bytes is at or above this value are skipped
    pub max_file_size: Option<u64>,

    /// Glob patterns matched case-insensitively against the file name
    pub exclude_files: Vec<String>,

    /// Skip files that look binary (by extension, image signature or content)
    pub skip_binary: bool,

    /// Files whose content has fewer characters than this are skipped
    pub min_content_chars: Option<usize>,
}

impl FileFilterConfig {
    /// Creates a new empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filtering suited to hosted completion services with small context
    /// windows: small text files only, no PDFs, no images.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_file_size: Some(STRICT_MAX_FILE_SIZE),
            exclude_files: vec!["*.pdf".to_string()],
            skip_binary: true,
            min_content_chars: Some(STRICT_MIN_CONTENT_CHARS),
        }
    }

    /// Sets the size threshold.
    #[must_use]
    pub const fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Adds file name globs to the exclusion list.
    #[must_use]
    pub fn exclude_files(mut self, patterns: Vec<String>) -> Self {
        self.exclude_files.extend(patterns);
        self
    }

    /// Enables or disables binary detection.
    #[must_use]
    pub const fn skip_binary(mut self, enabled: bool) -> Self {
        self.skip_binary = enabled;
        self
    }
}

/// Why a file was left out of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    Excluded,
    TooLarge,
    Binary,
    TooShort,
    NotUtf8,
}

#[derive(Debug, Clone)]
pub(crate) struct FileFilter {
    config: FileFilterConfig,
    exclude_files: GlobSet,
}

impl FileFilter {
    /// Compiles the configured globs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any glob pattern is invalid.
    pub(crate) fn new(config: FileFilterConfig) -> Result<Self> {
        let exclude_files = Self::build_globset(&config.exclude_files)?;
        Ok(Self {
            config,
            exclude_files,
        })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| Error::config(format!("Invalid glob pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Checks a file before reading it.
    pub(crate) fn check_path(&self, path: &Path, size: u64) -> Option<SkipReason> {
        let name = path.file_name().map(Path::new).unwrap_or(path);
        if self.exclude_files.is_match(name) {
            return Some(SkipReason::Excluded);
        }

        if self.config.max_file_size.is_some_and(|max| size >= max) {
            return Some(SkipReason::TooLarge);
        }

        if self.config.skip_binary && has_binary_extension(path) {
            return Some(SkipReason::Binary);
        }

        None
    }

    /// Checks a file's bytes and decodes them.
    ///
    /// Decoded text is only rejected as binary for NUL bytes; the ASCII
    /// ratio heuristic applies to bytes that are not UTF-8.
    pub(crate) fn check_content(&self, bytes: Vec<u8>) -> std::result::Result<String, SkipReason> {
        let skip_binary = self.config.skip_binary;

        if skip_binary && looks_like_image(&bytes) {
            return Err(SkipReason::Binary);
        }

        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) if skip_binary && is_likely_binary(e.as_bytes()) => {
                return Err(SkipReason::Binary);
            }
            Err(_) => return Err(SkipReason::NotUtf8),
        };

        if skip_binary && memchr::memchr(0, content.as_bytes()).is_some() {
            return Err(SkipReason::Binary);
        }

        if self
            .config
            .min_content_chars
            .is_some_and(|min| content.chars().count() < min)
        {
            return Err(SkipReason::TooShort);
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> FileFilter {
        FileFilter::new(FileFilterConfig::strict()).unwrap()
    }

    #[test]
    fn test_default_accepts_everything_readable() {
        let filter = FileFilter::new(FileFilterConfig::default()).unwrap();

        assert_eq!(filter.check_path(Path::new("dir/huge.pdf"), u64::MAX), None);
        assert_eq!(filter.check_content(b"x".to_vec()), Ok("x".to_string()));
    }

    #[test]
    fn test_default_rejects_invalid_utf8() {
        let filter = FileFilter::new(FileFilterConfig::default()).unwrap();

        assert_eq!(
            filter.check_content(vec![0xff, 0xfe, b'a']),
            Err(SkipReason::NotUtf8)
        );
    }

    #[test]
    fn test_strict_excludes_pdf_case_insensitive() {
        let filter = strict();

        assert_eq!(
            filter.check_path(Path::new("docs/Manual.PDF"), 10),
            Some(SkipReason::Excluded)
        );
        assert_eq!(filter.check_path(Path::new("docs/readme.md"), 10), None);
    }

    #[test]
    fn test_strict_size_threshold() {
        let filter = strict();

        assert_eq!(filter.check_path(Path::new("a.cs"), 9_999), None);
        assert_eq!(
            filter.check_path(Path::new("a.cs"), STRICT_MAX_FILE_SIZE),
            Some(SkipReason::TooLarge)
        );
    }

    #[test]
    fn test_strict_content_checks() {
        let filter = strict();

        assert_eq!(
            filter.check_content(b"\x89PNG\r\n\x1a\n0000".to_vec()),
            Err(SkipReason::Binary)
        );
        assert_eq!(filter.check_content(b"tiny".to_vec()), Err(SkipReason::TooShort));
        assert_eq!(
            filter.check_content(b"public class A {}".to_vec()),
            Ok("public class A {}".to_string())
        );
    }

    #[test]
    fn test_strict_keeps_non_ascii_source() {
        let filter = strict();
        let source = "// Конфигурация приложения\n// 設定を読み込む\nclass Настройки {}\n";

        assert_eq!(
            filter.check_content(source.as_bytes().to_vec()),
            Ok(source.to_string())
        );
    }

    #[test]
    fn test_strict_binary_detection() {
        let filter = strict();

        assert_eq!(
            filter.check_content(b"text\0with nul".to_vec()),
            Err(SkipReason::Binary)
        );
        assert_eq!(
            filter.check_content(vec![0xff, 0xfe, 0xfd, 0x80, 0x81, 0x82]),
            Err(SkipReason::Binary)
        );
    }

    #[test]
    fn test_invalid_glob_is_config_error() {
        let config = FileFilterConfig::new().exclude_files(vec!["a[".to_string()]);
        let err = FileFilter::new(config).unwrap_err();

        assert!(err.is_config());
    }
}
