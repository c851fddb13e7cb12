//! # rebuild-it
//!
//! Batch code rewriting through an LLM, one folder at a time.
//!
//! ## Features
//!
//! - One prompt per folder, rendered from a Tera template
//! - Ollama and Groq completion backends
//! - Resumable runs: a folder that already has a response is never sent again
//! - Responses turned back into files from fenced code blocks
//! - Atomic artifact writes
//!
//! ## Quick Start
//!
//! ```no_run
//! use rebuild_it::{AnyGateway, Config, Pipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input_path("./legacy")
//!     .output_path("./rebuilt")
//!     .template_path("./prompts/Rewrite.md.tera")
//!     .build()?;
//!
//! let gateway = AnyGateway::from_config(&config)?;
//! let report = Pipeline::new(config, gateway)?.run().await?;
//! report.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Every directory below the input root is a folder unit:
//! 1. **Scanner**: Reads the folder's files through the filter
//! 2. **Template**: Renders the prompt
//! 3. **Gateway**: Requests the completion
//! 4. **Materializer**: Writes the files named in the response
//!
//! Each unit leaves its prompt, raw payload and response text next to
//! the generated files in the mirrored output folder.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod artifact;
mod config;
mod error;
mod file;
mod filter;
mod materializer;
mod pipeline;
mod scanner;
mod template;
mod template_validator;
mod writer;

pub mod gateway;

pub use artifact::RunArtifact;
pub use config::{Backend, Config, ConfigBuilder, FailurePolicy};
pub use error::{Error, Result};
pub use file::SourceFile;
pub use filter::{FileFilterConfig, STRICT_MAX_FILE_SIZE, STRICT_MIN_CONTENT_CHARS};
pub use gateway::{AnyGateway, Completion, CompletionGateway, GroqGateway, OllamaGateway};
pub use materializer::{ExtractedFile, Extraction, MaterializeStats, ResponseMaterializer};
pub use pipeline::{FolderOutcome, FolderStatus, Pipeline, RunReport};
pub use scanner::{SourceFolder, SourceTree};
pub use template::{FileView, PromptBuilder, PromptContext};

/// Runs the complete pipeline with the given configuration and gateway.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The template can't be read or compiled
/// - The input tree can't be walked
/// - A folder fails and the policy is [`FailurePolicy::Abort`]
///
/// # Examples
///
/// ```no_run
/// use rebuild_it::{AnyGateway, Config, run};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .input_path("./legacy")
///     .output_path("./rebuilt")
///     .template_path("./Rewrite.md.tera")
///     .dry_run(true)
///     .build()?;
///
/// let gateway = AnyGateway::from_config(&config)?;
/// run(config, gateway).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run<G: CompletionGateway>(config: Config, gateway: G) -> Result<RunReport> {
    Pipeline::new(config, gateway)?.run().await
}
