//! Recovers named files from an LLM response and writes them to disk.
//!
//! The response is expected, but not guaranteed, to look like
//!
//! ````text
//! **`src/Program.cs`**
//! ```csharp
//! // src/Program.cs
//! class Program {}
//! ```
//! ````
//!
//! Lines are scanned in two states. While seeking, a line starting with
//! `**` names the next file and a fence opens a block; the line right
//! after an opening fence is peeked and, if it is a `//` comment, taken
//! as the file name instead of content. While capturing, every line is
//! buffered until the closing fence, which is the only point where a
//! file is produced. Prose outside fences is dropped, and a block still
//! open at end of input is discarded.

use crate::{error::Result, writer};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, trace, warn};

const FENCE: &str = "```";
const BOLD: &str = "**";
const LINE_COMMENT: &str = "//";

/// A file recovered from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path relative to the materialization base, never empty
    pub relative_path: String,

    /// File content
    pub content: String,
}

/// Result of scanning one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Files in fence order
    pub files: Vec<ExtractedFile>,

    /// True when the response ended inside an unterminated block
    pub discarded_unterminated: bool,
}

/// What a materialization wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeStats {
    /// Number of files written
    pub files_written: usize,

    /// Number of files that got an `unknownN`/`errorN` name
    pub fallback_names: usize,

    /// True when a trailing unterminated block was dropped
    pub discarded_unterminated: bool,
}

/// Writes the files found in a response below a base directory.
#[derive(Debug, Clone)]
pub struct ResponseMaterializer {
    base_dir: PathBuf,
}

impl ResponseMaterializer {
    /// Creates a materializer writing below `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Scans `response` and writes every recovered file as soon as its
    /// block closes, overwriting existing files.
    ///
    /// Malformed input never fails: unnamed or badly named blocks get
    /// fallback names and an unterminated trailing block is dropped.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a directory or file cannot be written.
    pub fn materialize(&self, response: &str) -> Result<MaterializeStats> {
        let mut stats = MaterializeStats::default();

        let outcome = scan(response, |file| {
            let target = self.base_dir.join(&file.relative_path);
            writer::write_text(&target, &file.content)?;
            debug!("Materialized {}", target.display());
            stats.files_written += 1;
            Ok(())
        })?;

        stats.fallback_names = outcome.fallback_names;
        stats.discarded_unterminated = outcome.discarded_unterminated;
        Ok(stats)
    }

    /// Scans `response` without touching the filesystem.
    #[must_use]
    pub fn extract(response: &str) -> Extraction {
        let mut files = Vec::new();
        let outcome = scan(response, |file| {
            files.push(file);
            Ok(())
        });

        // The sink above never fails.
        let discarded_unterminated = outcome.is_ok_and(|o| o.discarded_unterminated);
        Extraction {
            files,
            discarded_unterminated,
        }
    }
}

/// One input line: `text` without its terminator, `raw` with it.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    raw: &'a str,
}

impl<'a> Line<'a> {
    fn new(raw: &'a str) -> Self {
        let text = raw.strip_suffix('\n').unwrap_or(raw);
        let text = text.strip_suffix('\r').unwrap_or(text);
        Self { text, raw }
    }

    fn is_fence(&self) -> bool {
        self.text.starts_with(FENCE)
    }

    fn is_bold(&self) -> bool {
        self.text.starts_with(BOLD)
    }

    /// `**name**` or ``**`name`**``.
    fn header_name(&self) -> &'a str {
        let name = self.text.trim_matches('*');
        if name.starts_with('`') {
            name.split('`').nth(1).unwrap_or_default()
        } else {
            name
        }
    }

    /// `// name` as the first line of a block.
    fn comment_name(&self) -> Option<&'a str> {
        self.text.strip_prefix(LINE_COMMENT).map(str::trim)
    }
}

/// Line source with a single slot of lookahead.
///
/// A peeked line that turns out not to be metadata goes back through
/// [`LineCursor::requeue`] and is the next line returned.
struct LineCursor<'a> {
    lines: std::str::SplitInclusive<'a, char>,
    requeued: Option<Line<'a>>,
}

impl<'a> LineCursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lines: input.split_inclusive('\n'),
            requeued: None,
        }
    }

    fn requeue(&mut self, line: Line<'a>) {
        debug_assert!(self.requeued.is_none());
        self.requeued = Some(line);
    }
}

impl<'a> Iterator for LineCursor<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.requeued
            .take()
            .or_else(|| self.lines.next().map(Line::new))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Seeking,
    Capturing,
}

/// Working state of one scan; never outlives it.
#[derive(Debug, Default)]
struct MaterializerState {
    current_output_path: Option<String>,
    buffer: String,
    unknown_counter: usize,
}

impl MaterializerState {
    fn set_candidate(&mut self, name: &str) {
        // An empty name can't be written; leave the slot for a fallback.
        self.current_output_path = (!name.is_empty()).then(|| name.to_string());
    }

    fn next_fallback(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}.txt", self.unknown_counter);
        self.unknown_counter += 1;
        name
    }

    /// Closes the current block into a file and resets for the next one.
    fn flush(&mut self) -> (ExtractedFile, bool) {
        let mut content = std::mem::take(&mut self.buffer);

        let (relative_path, fallback) = match self.current_output_path.take() {
            Some(path) if has_invalid_chars(&path) => {
                warn!("Invalid file name '{}' in response", path);
                content.insert_str(0, &format!("{LINE_COMMENT} {path}\n"));
                (self.next_fallback("error"), true)
            }
            Some(path) => (path, false),
            None => (self.next_fallback("unknown"), true),
        };

        (
            ExtractedFile {
                relative_path,
                content,
            },
            fallback,
        )
    }
}

struct ScanOutcome {
    fallback_names: usize,
    discarded_unterminated: bool,
}

/// Drives the state machine, handing each closed block to `sink`.
fn scan<F>(input: &str, mut sink: F) -> Result<ScanOutcome>
where
    F: FnMut(ExtractedFile) -> Result<()>,
{
    let mut cursor = LineCursor::new(input);
    let mut state = State::Seeking;
    let mut working = MaterializerState::default();
    let mut fallback_names = 0;

    while let Some(line) = cursor.next() {
        match state {
            State::Seeking if line.is_bold() => {
                working.set_candidate(line.header_name());
                trace!("Candidate file name {:?}", working.current_output_path);
            }
            State::Seeking if line.is_fence() => {
                state = State::Capturing;
                if let Some(peeked) = cursor.next() {
                    match peeked.comment_name() {
                        Some(name) => working.set_candidate(name),
                        None => cursor.requeue(peeked),
                    }
                }
            }
            State::Seeking => {}
            State::Capturing if line.is_fence() => {
                state = State::Seeking;
                let (file, fallback) = working.flush();
                fallback_names += usize::from(fallback);
                sink(file)?;
            }
            State::Capturing => working.buffer.push_str(line.raw),
        }
    }

    let discarded_unterminated = state == State::Capturing;
    if discarded_unterminated {
        warn!(
            "Response ended inside a code block; discarding {} buffered bytes",
            working.buffer.len()
        );
    }

    Ok(ScanOutcome {
        fallback_names,
        discarded_unterminated,
    })
}

/// Characters no path component may contain. Separators are allowed
/// since names may place files in subdirectories.
fn has_invalid_chars(path: &str) -> bool {
    path.chars()
        .any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || c.is_ascii_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn names(extraction: &Extraction) -> Vec<&str> {
        extraction
            .files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect()
    }

    #[test]
    fn test_one_file_per_fence_pair_in_order() {
        let response = "Here you go.\n\
            **first.cs**\n```csharp\nclass First {}\n```\n\
            Some commentary.\n\
            **second.cs**\n```\nclass Second {}\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["first.cs", "second.cs"]);
        assert_eq!(extraction.files[0].content, "class First {}\n");
        assert_eq!(extraction.files[1].content, "class Second {}\n");
        assert!(!extraction.discarded_unterminated);
    }

    #[test]
    fn test_comment_name_wins_over_header() {
        let response = "**foo.cs**\n```csharp\n// bar.cs\nclass Bar {}\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["bar.cs"]);
        assert_eq!(extraction.files[0].content, "class Bar {}\n");
    }

    #[test]
    fn test_backticked_header() {
        let response = "**`baz.cs`**\n```\nx\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["baz.cs"]);
    }

    #[test]
    fn test_header_without_fence_is_replaced() {
        let response = "**orphan.cs**\nno code here\n**real.cs**\n```\nx\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["real.cs"]);
    }

    #[test]
    fn test_invalid_name_falls_back_to_error_file() {
        let response = "**a:b.cs**\n```\nclass A {}\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["error0.txt"]);
        assert_eq!(extraction.files[0].content, "// a:b.cs\nclass A {}\n");
    }

    #[test]
    fn test_unnamed_blocks_get_unknown_names() {
        let response = "```\none\n```\n```\ntwo\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["unknown0.txt", "unknown1.txt"]);
    }

    #[test]
    fn test_fallback_counter_is_shared() {
        let response = "```\none\n```\n**bad?.cs**\n```\ntwo\n```\n```\nthree\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(
            names(&extraction),
            vec!["unknown0.txt", "error1.txt", "unknown2.txt"]
        );
    }

    #[test]
    fn test_name_does_not_leak_into_next_block() {
        let response = "**named.cs**\n```\na\n```\n```\nb\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["named.cs", "unknown0.txt"]);
    }

    #[test]
    fn test_blank_lines_preserved() {
        let response = "**a.txt**\n```\nline one\n\n\nline four\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(extraction.files[0].content, "line one\n\n\nline four\n");
    }

    #[test]
    fn test_peeked_fence_closes_empty_block() {
        let response = "**empty.txt**\n```\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["empty.txt"]);
        assert_eq!(extraction.files[0].content, "");
    }

    #[test]
    fn test_bold_inside_block_is_content() {
        let response = "**notes.md**\n```markdown\n**Important**\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["notes.md"]);
        assert_eq!(extraction.files[0].content, "**Important**\n");
    }

    #[test]
    fn test_crlf_lines_kept_verbatim() {
        let response = "**a.txt**\r\n```\r\n// b.txt\r\nhello\r\n```\r\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["b.txt"]);
        assert_eq!(extraction.files[0].content, "hello\r\n");
    }

    #[test]
    fn test_unterminated_block_is_discarded() {
        let response = "**done.cs**\n```\nok\n```\n**lost.cs**\n```\nnever closed\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["done.cs"]);
        assert!(extraction.discarded_unterminated);
    }

    #[test]
    fn test_fence_at_end_of_input() {
        let extraction = ResponseMaterializer::extract("**x.cs**\n```");

        assert!(extraction.files.is_empty());
        assert!(extraction.discarded_unterminated);
    }

    #[test]
    fn test_empty_header_name_uses_fallback() {
        let response = "****\n```\nx\n```\n**``**\n```\ny\n```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(names(&extraction), vec!["unknown0.txt", "unknown1.txt"]);
    }

    #[test]
    fn test_garbage_input_makes_progress() {
        let response = "```\n```\n```\n**\n`\n//\n```\n``` ```\n";

        let extraction = ResponseMaterializer::extract(response);

        assert_eq!(extraction.files.len(), 2);
        assert!(extraction.discarded_unterminated);
    }

    #[test]
    fn test_materialize_writes_nested_paths() {
        let temp = assert_fs::TempDir::new().unwrap();
        let response = "**src/models/User.cs**\n```\nclass User {}\n```\n";

        let stats = ResponseMaterializer::new(temp.path())
            .materialize(response)
            .unwrap();

        assert_eq!(stats.files_written, 1);
        temp.child("src/models/User.cs").assert("class User {}\n");
    }

    #[test]
    fn test_materialize_overwrites_existing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("stale").unwrap();

        ResponseMaterializer::new(temp.path())
            .materialize("**a.txt**\n```\nfresh\n```\n")
            .unwrap();

        temp.child("a.txt").assert("fresh\n");
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let response = "**a.txt**\n```\none\n```\n```\ntwo\n```\n**c:d**\n```\nthree\n```\n";
        let materializer = ResponseMaterializer::new(temp.path());

        materializer.materialize(response).unwrap();
        let first: Vec<String> = ["a.txt", "unknown0.txt", "error1.txt"]
            .iter()
            .map(|n| std::fs::read_to_string(temp.path().join(n)).unwrap())
            .collect();

        let stats = materializer.materialize(response).unwrap();
        let second: Vec<String> = ["a.txt", "unknown0.txt", "error1.txt"]
            .iter()
            .map(|n| std::fs::read_to_string(temp.path().join(n)).unwrap())
            .collect();

        assert_eq!(first, second);
        assert_eq!(stats.files_written, 3);
        assert_eq!(stats.fallback_names, 2);
    }

    #[test]
    fn test_materialize_truncated_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();

        let stats = ResponseMaterializer::new(temp.path())
            .materialize("**a.txt**\n```\nhalf a file\n")
            .unwrap();

        assert_eq!(stats.files_written, 0);
        assert!(stats.discarded_unterminated);
        assert!(!temp.child("a.txt").path().exists());
    }

    #[test]
    fn test_has_invalid_chars() {
        assert!(has_invalid_chars("a:b.cs"));
        assert!(has_invalid_chars("what?.txt"));
        assert!(has_invalid_chars("tab\there"));
        assert!(!has_invalid_chars("src/models/User.cs"));
        assert!(!has_invalid_chars("src\\win\\User.cs"));
    }
}
