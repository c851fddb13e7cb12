use crate::{
    error::{Error, Result},
    file::SourceFile,
    scanner::SourceFolder,
};
use serde::Serialize;
use std::{collections::HashMap, fs, path::Path};
use tera::{Context, Tera, Value};

/// Per-file view handed to the template.
#[derive(Debug, Clone, Serialize)]
pub struct FileView<'a> {
    /// File name
    pub name: &'a str,
    /// File content, unescaped
    pub content: &'a str,
}

/// Everything a prompt template can reference.
///
/// Templates see `files` (each with `name` and `content`), `folder`
/// (the unit's path relative to the input root) and `date`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext<'a> {
    /// Files of the folder unit, in name order
    pub files: Vec<FileView<'a>>,

    /// Folder path relative to the input root, `/`-separated
    pub folder: String,

    /// Render timestamp (RFC 3339), when populated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl<'a> PromptContext<'a> {
    /// Builds a context over a set of files.
    #[must_use]
    pub fn new(files: &'a [SourceFile]) -> Self {
        Self {
            files: files
                .iter()
                .map(|f| FileView {
                    name: &f.name,
                    content: &f.content,
                })
                .collect(),
            folder: String::new(),
            date: None,
        }
    }

    /// Builds the context for a folder unit, stamped with the current time.
    #[must_use]
    pub fn for_folder(folder: &'a SourceFolder) -> Self {
        let mut context = Self::new(&folder.files);
        context.folder = folder
            .relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        context.date = Some(chrono::Local::now().to_rfc3339());
        context
    }
}

/// Renders prompts from one template, without output escaping.
pub struct PromptBuilder {
    tera: Tera,
    name: String,
}

impl PromptBuilder {
    /// Reads and compiles the template file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a template error
    /// if it does not compile.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_source(path.display().to_string(), &source)
    }

    /// Compiles a template held in memory.
    ///
    /// # Errors
    ///
    /// Returns a template error if the source does not compile.
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let mut tera = Tera::default();

        // Prompt bodies carry code; `<` and `&` must reach the model verbatim.
        tera.autoescape_on(vec![]);
        tera.register_filter("language", language_filter);

        tera.add_raw_template(&name, source)
            .map_err(|e| Error::template(&name, &e))?;

        Ok(Self { tera, name })
    }

    /// Renders the template against `context`.
    ///
    /// # Errors
    ///
    /// Returns a template error if the template references something the
    /// context does not provide.
    pub fn render(&self, context: &PromptContext<'_>) -> Result<String> {
        let context = Context::from_serialize(context)?;
        self.tera
            .render(&self.name, &context)
            .map_err(|e| Error::template(&self.name, &e))
    }
}

/// `{{ file.name | language }}` gives the markdown fence tag for a file name.
fn language_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let name = value.as_str().unwrap_or_default();
    Ok(Value::String(language_for(name).to_string()))
}

pub(crate) fn language_for(name: &str) -> &'static str {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return "";
    };

    match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "sh" | "bash" => "bash",
        "ps1" => "powershell",
        "html" | "htm" | "cshtml" => "html",
        "css" => "css",
        "scss" => "scss",
        "xml" | "csproj" => "xml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" | "markdown" => "markdown",
        "sql" => "sql",
        _ => "",
    }
}
