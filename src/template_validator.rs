use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;
use tracing::warn;

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Context fields a prompt template is expected to use.
const EXPECTED_VARIABLES: &[&str] = &["files"];

/// Validates the prompt template before any folder is processed.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates a template file.
    ///
    /// Checks that the file exists, is within the size limit, is not
    /// empty and compiles. A template that never mentions `files` only
    /// produces a warning since a fixed prompt is legal.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file can't be read and a validation
    /// error for every other failed check.
    pub(crate) fn validate_template(path: &Path) -> Result<()> {
        let name = path.to_string_lossy().to_string();

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if !metadata.is_file() {
            return Err(Error::template_validation(name, "Path is not a file"));
        }

        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                name,
                format!(
                    "Template file too large: {} bytes (max: {MAX_TEMPLATE_SIZE} bytes)",
                    metadata.len()
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        if content.trim().is_empty() {
            return Err(Error::template_validation(name, "Template file is empty"));
        }

        let mut tera = Tera::default();
        tera.add_raw_template("validation", &content)
            .map_err(|e| {
                Error::template_validation(&name, format!("Template syntax error: {e}"))
            })?;

        for var in Self::missing_variables(&content) {
            warn!("Template {} never references '{}'", name, var);
        }

        Ok(())
    }

    /// Heuristic: a variable counts as used if its name shows up inside a
    /// `{{ }}` or `{% %}` block.
    fn missing_variables(content: &str) -> Vec<&'static str> {
        let blocks: Vec<&str> = content
            .split("{{")
            .skip(1)
            .chain(content.split("{%").skip(1))
            .filter_map(|rest| rest.split_once(['}', '%']).map(|(inner, _)| inner))
            .collect();

        EXPECTED_VARIABLES
            .iter()
            .copied()
            .filter(|var| !blocks.iter().any(|block| block.contains(var)))
            .collect()
    }
}
