use crate::error::{Error, Result};
use crate::filter::FileFilterConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3:instruct";
const DEFAULT_GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GROQ_MODEL: &str = "llama3-8b-8192";

/// Completion service backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Ollama server (`/api/generate`)
    #[default]
    Ollama,
    /// Groq cloud (OpenAI-compatible chat completions)
    Groq,
}

impl Backend {
    /// Returns the endpoint used when none is configured.
    #[must_use]
    pub const fn default_endpoint(self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_ENDPOINT,
            Self::Groq => DEFAULT_GROQ_ENDPOINT,
        }
    }

    /// Returns the model used when none is configured.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
            Self::Groq => DEFAULT_GROQ_MODEL,
        }
    }
}

/// What a run does when one folder fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and return the folder's error
    #[default]
    Abort,
    /// Record the failure in the run report and move on
    Continue,
}

/// Configuration for a rebuild run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Clone)]
#[non_exhaustive]
pub struct Config {
    /// Root of the source tree
    pub input_path: PathBuf,

    /// Root of the mirrored output tree
    pub output_path: PathBuf,

    /// Prompt template file
    pub template_path: PathBuf,

    /// Completion backend
    pub backend: Backend,

    /// Service endpoint; the backend default when unset
    pub service_endpoint: Option<String>,

    /// Model identifier; the backend default when unset
    pub model_name: Option<String>,

    /// API credential
    pub credential: Option<String>,

    /// Per-folder failure handling
    pub failure_policy: FailurePolicy,

    /// Source file filtering
    pub file_filter: FileFilterConfig,

    /// Render and persist prompts, but never call the service
    pub dry_run: bool,

    /// Only materialize folders that already have a response
    pub materialize_only: bool,

    /// Turn responses into files
    pub materialize: bool,

    /// Where to write the JSON run report
    pub report_path: Option<PathBuf>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("input_path", &self.input_path)
            .field("output_path", &self.output_path)
            .field("template_path", &self.template_path)
            .field("backend", &self.backend)
            .field("service_endpoint", &self.service_endpoint)
            .field("model_name", &self.model_name)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("failure_policy", &self.failure_policy)
            .field("file_filter", &self.file_filter)
            .field("dry_run", &self.dry_run)
            .field("materialize_only", &self.materialize_only)
            .field("materialize", &self.materialize)
            .field("report_path", &self.report_path)
            .finish()
    }
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rebuild_it::Config;
    ///
    /// let config = Config::builder()
    ///     .input_path("./legacy")
    ///     .output_path("./rebuilt")
    ///     .template_path("./prompts/Rewrite.md.tera")
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Returns the effective service endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.service_endpoint
            .as_deref()
            .unwrap_or_else(|| self.backend.default_endpoint())
    }

    /// Returns the effective model name.
    #[must_use]
    pub fn model(&self) -> &str {
        self.model_name
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }

    /// Returns true if this run may call the completion service.
    #[must_use]
    pub const fn calls_service(&self) -> bool {
        !self.dry_run && !self.materialize_only
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input path doesn't exist or isn't a directory
    /// - Input and output are the same directory
    /// - The template is missing or fails validation
    /// - Groq is selected for a run that calls the service, without a credential
    /// - `dry_run` and `materialize_only` are both set
    pub fn validate(&self) -> Result<()> {
        if !self.input_path.exists() {
            return Err(Error::config(format!(
                "Input directory does not exist: {}",
                self.input_path.display()
            )));
        }

        if !self.input_path.is_dir() {
            return Err(Error::config(format!(
                "Input path is not a directory: {}",
                self.input_path.display()
            )));
        }

        let input = resolve(&self.input_path);
        let output = resolve(&self.output_path);
        if output == input {
            return Err(Error::config(
                "Output directory must differ from the input directory",
            ));
        }
        if output.starts_with(&input) {
            return Err(Error::config(format!(
                "Output directory {} is inside the input directory {}",
                self.output_path.display(),
                self.input_path.display()
            )));
        }

        crate::template_validator::TemplateValidator::validate_template(&self.template_path)?;

        if self.dry_run && self.materialize_only {
            return Err(Error::config(
                "dry_run and materialize_only are mutually exclusive",
            ));
        }

        if self.backend == Backend::Groq
            && self.calls_service()
            && self.credential.as_deref().is_none_or(str::is_empty)
        {
            return Err(Error::config(
                "The groq backend needs an API key. Set GROQ_API_KEY or use Config::builder().credential(..)",
            ));
        }

        if self.materialize_only && !self.materialize {
            tracing::warn!("materialize_only with materialization disabled does nothing");
        }

        Ok(())
    }
}

/// Absolute form of `path` with its existing part canonicalized, so paths
/// that don't exist yet still compare against real ones.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    for existing in absolute.ancestors() {
        if let Ok(canonical) = existing.canonicalize() {
            return absolute
                .strip_prefix(existing)
                .map_or_else(|_| canonical.clone(), |rest| canonical.join(rest));
        }
    }

    absolute
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("."),
            output_path: PathBuf::from("out"),
            template_path: PathBuf::from("prompt.md.tera"),
            backend: Backend::default(),
            service_endpoint: None,
            model_name: None,
            credential: None,
            failure_policy: FailurePolicy::default(),
            file_filter: FileFilterConfig::default(),
            dry_run: false,
            materialize_only: false,
            materialize: true,
            report_path: None,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    template_path: Option<PathBuf>,
    backend: Option<Backend>,
    service_endpoint: Option<String>,
    model_name: Option<String>,
    credential: Option<String>,
    failure_policy: Option<FailurePolicy>,
    file_filter: Option<FileFilterConfig>,
    dry_run: bool,
    materialize_only: bool,
    materialize: Option<bool>,
    report_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Sets the source tree root.
    #[must_use]
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    /// Sets the output tree root.
    #[must_use]
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Sets the prompt template file.
    ///
    /// The template is read once, when the pipeline is created. Its file
    /// name also names the per-folder artifacts.
    #[must_use]
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Sets the completion backend.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the service endpoint.
    #[must_use]
    pub fn service_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.service_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Sets the API credential.
    #[must_use]
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Sets the source file filter.
    #[must_use]
    pub fn file_filter(mut self, filter: FileFilterConfig) -> Self {
        self.file_filter = Some(filter);
        self
    }

    /// Enables dry run mode (prompts only).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables materialize-only mode.
    #[must_use]
    pub fn materialize_only(mut self, enabled: bool) -> Self {
        self.materialize_only = enabled;
        self
    }

    /// Enables or disables materialization.
    #[must_use]
    pub fn materialize(mut self, enabled: bool) -> Self {
        self.materialize = Some(enabled);
        self
    }

    /// Sets the run report path.
    #[must_use]
    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let config = Config {
            input_path: self.input_path.unwrap_or(defaults.input_path),
            output_path: self.output_path.unwrap_or(defaults.output_path),
            template_path: self.template_path.unwrap_or(defaults.template_path),
            backend: self.backend.unwrap_or_default(),
            service_endpoint: self.service_endpoint,
            model_name: self.model_name,
            credential: self.credential,
            failure_policy: self.failure_policy.unwrap_or_default(),
            file_filter: self.file_filter.unwrap_or_default(),
            dry_run: self.dry_run,
            materialize_only: self.materialize_only,
            materialize: self.materialize.unwrap_or(true),
            report_path: self.report_path,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn fixture() -> assert_fs::TempDir {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("in/src/a.cs").write_str("class A {}").unwrap();
        temp.child("Rewrite.md.tera")
            .write_str("{% for file in files %}{{ file.content }}{% endfor %}")
            .unwrap();
        temp
    }

    fn builder(temp: &assert_fs::TempDir) -> ConfigBuilder {
        Config::builder()
            .input_path(temp.child("in").path())
            .output_path(temp.child("out").path())
            .template_path(temp.child("Rewrite.md.tera").path())
    }

    #[test]
    fn test_default_config() {
        let temp = fixture();
        let config = builder(&temp).build().unwrap();

        assert_eq!(config.backend, Backend::Ollama);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.endpoint(), DEFAULT_OLLAMA_ENDPOINT);
        assert_eq!(config.model(), DEFAULT_OLLAMA_MODEL);
        assert!(config.materialize);
        assert!(config.calls_service());
    }

    #[test]
    fn test_overrides() {
        let temp = fixture();
        let config = builder(&temp)
            .service_endpoint("http://192.168.1.170:11434")
            .model_name("codellama")
            .failure_policy(FailurePolicy::Continue)
            .build()
            .unwrap();

        assert_eq!(config.endpoint(), "http://192.168.1.170:11434");
        assert_eq!(config.model(), "codellama");
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_invalid_input_dir() {
        let temp = fixture();
        let result = builder(&temp).input_path(temp.path().join("missing")).build();

        assert!(result.is_err_and(|e| e.is_config()));
    }

    #[test]
    fn test_same_input_and_output() {
        let temp = fixture();
        let result = builder(&temp).output_path(temp.child("in").path()).build();

        assert!(result.is_err_and(|e| e.is_config()));
    }

    #[test]
    fn test_output_inside_input() {
        let temp = fixture();

        let nested = builder(&temp).output_path(temp.child("in/out").path()).build();
        assert!(nested.is_err_and(|e| e.is_config() && e.to_string().contains("inside")));

        let via_dots = builder(&temp)
            .output_path(temp.path().join("in/src/../rebuilt"))
            .build();
        assert!(via_dots.is_err_and(|e| e.is_config()));
    }

    #[test]
    fn test_output_beside_input() {
        let temp = fixture();

        assert!(
            builder(&temp)
                .output_path(temp.path().join("in-rebuilt"))
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_missing_template() {
        let temp = fixture();
        let result = builder(&temp)
            .template_path(temp.path().join("nope.tera"))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_groq_requires_credential() {
        let temp = fixture();

        assert!(builder(&temp).backend(Backend::Groq).build().is_err());
        assert!(builder(&temp).backend(Backend::Groq).credential("gsk_test").build().is_ok());
        assert!(builder(&temp).backend(Backend::Groq).dry_run(true).build().is_ok());
    }

    #[test]
    fn test_dry_run_and_materialize_only_conflict() {
        let temp = fixture();
        let result = builder(&temp).dry_run(true).materialize_only(true).build();

        assert!(result.is_err_and(|e| e.is_config()));
    }

    #[test]
    fn test_debug_redacts_credential() {
        let temp = fixture();
        let config = builder(&temp)
            .backend(Backend::Groq)
            .credential("gsk_secret")
            .build()
            .unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(config.endpoint(), DEFAULT_GROQ_ENDPOINT);
    }
}
