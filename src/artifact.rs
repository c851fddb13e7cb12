use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// The three files one folder unit's LLM round-trip leaves in its output
/// folder.
///
/// `response_text_path` is the durable marker: while it exists the
/// folder is never sent to the completion service again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifact {
    /// Rendered prompt
    pub prompt_path: PathBuf,

    /// Raw structured payload returned by the service
    pub raw_response_path: PathBuf,

    /// Response text
    pub response_text_path: PathBuf,
}

impl RunArtifact {
    /// Derives the artifact paths for `output_folder` from the template
    /// file name.
    ///
    /// The prompt takes the template name without its last extension
    /// (`Prompt.md.tera` gives `Prompt.md`), the response text inserts
    /// `.response` before the remaining extension (`Prompt.response.md`)
    /// and the payload swaps it for `.response.json`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the template path has no file name.
    pub fn for_folder(output_folder: &Path, template_path: &Path) -> Result<Self> {
        let stem = template_path.file_stem().ok_or_else(|| {
            Error::config(format!(
                "Template path has no file name: {}",
                template_path.display()
            ))
        })?;

        let prompt_path = output_folder.join(stem);

        let response_text_path = match prompt_path.extension() {
            Some(ext) => {
                let mut with_marker = std::ffi::OsString::from("response.");
                with_marker.push(ext);
                prompt_path.with_extension(with_marker)
            }
            None => prompt_path.with_extension("response"),
        };
        let raw_response_path = prompt_path.with_extension("response.json");

        Ok(Self {
            prompt_path,
            raw_response_path,
            response_text_path,
        })
    }

    /// Returns true once the folder's round-trip has completed.
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.response_text_path.is_file()
    }
}
