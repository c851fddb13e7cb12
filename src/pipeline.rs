use crate::{
    artifact::RunArtifact,
    config::{Config, FailurePolicy},
    error::{Error, Result},
    filter::FileFilter,
    gateway::CompletionGateway,
    materializer::ResponseMaterializer,
    scanner::{SourceFolder, SourceTree},
    template::{PromptBuilder, PromptContext},
    writer,
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};

/// How a folder unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    /// No usable files; nothing was written
    SkippedEmpty,
    /// Prompt rendered, service called, response persisted
    Completed,
    /// Response already on disk from an earlier run
    Resumed,
    /// Prompt rendered and persisted (dry run)
    PromptOnly,
    /// No response yet and this run doesn't call the service
    Pending,
    /// Processing failed
    Failed,
}

/// Per-folder entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderOutcome {
    /// Folder path relative to the input root
    pub folder: PathBuf,

    /// How processing ended
    pub status: FolderStatus,

    /// Files the materializer wrote
    pub files_written: usize,

    /// Failure message for [`FolderStatus::Failed`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FolderOutcome {
    fn new(folder: PathBuf, status: FolderStatus) -> Self {
        Self {
            folder,
            status,
            files_written: 0,
            error: None,
        }
    }

    fn failed(folder: PathBuf, error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(folder, FolderStatus::Failed)
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Outcomes in processing order
    pub folders: Vec<FolderOutcome>,

    /// Number of folder units visited
    pub total_folders: usize,

    /// Folders that went through the service in this run
    pub completed: usize,

    /// Folders answered by an earlier run
    pub resumed: usize,

    /// Folders with nothing to do (empty, prompt-only or pending)
    pub skipped: usize,

    /// Folders that failed
    pub failed: usize,

    /// Files materialized across all folders
    pub files_written: usize,

    /// Total execution time
    pub duration: Duration,
}

impl RunReport {
    fn record(&mut self, outcome: FolderOutcome) {
        self.total_folders += 1;
        match outcome.status {
            FolderStatus::Completed => self.completed += 1,
            FolderStatus::Resumed => self.resumed += 1,
            FolderStatus::SkippedEmpty | FolderStatus::PromptOnly | FolderStatus::Pending => {
                self.skipped += 1;
            }
            FolderStatus::Failed => self.failed += 1,
        }
        self.files_written += outcome.files_written;
        self.folders.push(outcome);
    }

    /// Returns true if no folder failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                 Rebuild Run Summary                   ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Folders visited:      {:>8}                        ║",
            self.total_folders
        );
        println!(
            "║   - Completed:        {:>8}                        ║",
            self.completed
        );
        println!(
            "║   - Resumed:          {:>8}                        ║",
            self.resumed
        );
        println!(
            "║   - Skipped:          {:>8}                        ║",
            self.skipped
        );
        println!(
            "║   - Failed:           {:>8}                        ║",
            self.failed
        );
        println!("║                                                       ║");
        println!(
            "║ Files materialized:   {:>8}                        ║",
            self.files_written
        );
        println!(
            "║ Total time:           {:>8.2}s                       ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for outcome in self.folders.iter().filter(|o| o.status == FolderStatus::Failed) {
            println!(
                "  ✗ {}: {}",
                outcome.folder.display(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// Runs every folder unit of the input tree through prompt, completion,
/// persistence and materialization, one folder at a time.
pub struct Pipeline<G> {
    config: Config,
    prompt_builder: PromptBuilder,
    filter: FileFilter,
    gateway: G,
}

impl<G: CompletionGateway> Pipeline<G> {
    /// Creates a pipeline, reading and compiling the template once.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The template can't be read or compiled
    /// - A filter glob is invalid
    pub fn new(config: Config, gateway: G) -> Result<Self> {
        config.validate()?;

        let prompt_builder = PromptBuilder::from_file(&config.template_path)?;
        let filter = FileFilter::new(config.file_filter.clone())?;

        Ok(Self {
            config,
            prompt_builder,
            filter,
            gateway,
        })
    }

    /// Returns the gateway.
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Processes every folder unit in order.
    ///
    /// # Process
    ///
    /// For each folder with at least one usable file:
    /// 1. **Resume**: if the response text exists, skip straight to step 4
    /// 2. **Prompt**: render the template and persist the prompt
    /// 3. **Complete**: call the service, persist text and raw payload
    /// 4. **Materialize**: write the files named in the response
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::Abort`] the first folder failure ends the run
    /// and is returned. With [`FailurePolicy::Continue`] failures are only
    /// recorded; errors walking the tree or writing the report still fail.
    #[instrument(skip(self), fields(input = %self.config.input_path.display()))]
    pub async fn run(&self) -> Result<RunReport> {
        let start_time = Instant::now();

        info!(
            "Starting run with {} ({})",
            self.gateway.backend(),
            self.config.model()
        );

        let tree = SourceTree::discover(&self.config.input_path)?;
        let mut report = RunReport::default();

        for dir in tree.folders() {
            let relative = tree.relative(dir);

            match self.process_folder(dir, &relative).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(Error::folder_failed(relative, e)),
                    FailurePolicy::Continue => {
                        error!("{}: {}", dir.display(), e);
                        report.record(FolderOutcome::failed(relative, &e));
                    }
                },
            }
        }

        report.duration = start_time.elapsed();

        if let Some(path) = &self.config.report_path {
            writer::write_json(path, &report)?;
            info!("Wrote run report to {}", path.display());
        }

        info!(
            "✓ Run finished in {:.2}s: {} completed, {} resumed, {} skipped, {} failed",
            report.duration.as_secs_f64(),
            report.completed,
            report.resumed,
            report.skipped,
            report.failed
        );

        Ok(report)
    }

    /// Takes one folder unit through its lifecycle.
    ///
    /// Source files are only read when a prompt has to be rendered.
    async fn process_folder(&self, dir: &Path, relative: &Path) -> Result<FolderOutcome> {
        let out_folder = self.config.output_path.join(relative);
        let artifact = RunArtifact::for_folder(&out_folder, &self.config.template_path)?;

        let status = if artifact.has_response() {
            debug!(
                "Found {}, skipping completion",
                artifact.response_text_path.display()
            );
            FolderStatus::Resumed
        } else if self.config.materialize_only {
            let status = if SourceFolder::has_candidates(dir, &self.filter)? {
                debug!("No response yet for {}", dir.display());
                FolderStatus::Pending
            } else {
                FolderStatus::SkippedEmpty
            };
            return Ok(FolderOutcome::new(relative.to_path_buf(), status));
        } else {
            info!("reading: {}", dir.display());

            let folder = SourceFolder::read(dir, relative.to_path_buf(), &self.filter)?;
            if folder.is_empty() {
                debug!(
                    "No usable files in {} ({} filtered, {} unreadable)",
                    dir.display(),
                    folder.skipped.filtered,
                    folder.skipped.unreadable
                );
                return Ok(FolderOutcome::new(
                    relative.to_path_buf(),
                    FolderStatus::SkippedEmpty,
                ));
            }

            fs::create_dir_all(&out_folder).map_err(|e| Error::io(&out_folder, e))?;

            info!("generate prompt: {}", dir.display());
            let prompt = self.prompt_builder.render(&PromptContext::for_folder(&folder))?;
            writer::write_text(&artifact.prompt_path, &prompt)?;

            if self.config.dry_run {
                return Ok(FolderOutcome::new(
                    relative.to_path_buf(),
                    FolderStatus::PromptOnly,
                ));
            }

            info!("request completion: {}", dir.display());
            let completion = self.gateway.complete(&prompt).await?;

            // The response text is the completion marker, so it goes last.
            info!("write files: {}", dir.display());
            writer::write_json(&artifact.raw_response_path, &completion.raw)?;
            writer::write_text(&artifact.response_text_path, &completion.text)?;
            FolderStatus::Completed
        };

        let mut outcome = FolderOutcome::new(relative.to_path_buf(), status);
        if self.config.materialize {
            outcome.files_written = Self::materialize(&artifact, &out_folder)?;
        }

        Ok(outcome)
    }

    fn materialize(artifact: &RunArtifact, out_folder: &Path) -> Result<usize> {
        info!("create output: {}", out_folder.display());

        let response = fs::read_to_string(&artifact.response_text_path)
            .map_err(|e| Error::io(&artifact.response_text_path, e))?;

        let stats = ResponseMaterializer::new(out_folder).materialize(&response)?;

        if stats.discarded_unterminated {
            warn!(
                "{} ends inside a code block; the last block was not written",
                artifact.response_text_path.display()
            );
        }
        debug!(
            "Materialized {} files ({} with fallback names)",
            stats.files_written, stats.fallback_names
        );

        Ok(stats.files_written)
    }
}
