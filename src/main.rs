use anyhow::{Context, bail};
use clap::Parser;
use rebuild_it::{AnyGateway, Backend, Config, FailurePolicy, FileFilterConfig, Pipeline};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "rebuild-it",
    version,
    about = "Rewrite a source tree folder by folder with an LLM",
    long_about = "Rewrite a source tree folder by folder with an LLM.\n\n\
    Every directory below the input root becomes one prompt. The completion \
    is stored next to the prompt in the mirrored output folder and the files \
    it names are written there. Folders that already have a response are not \
    sent again, so an interrupted run can simply be restarted.\n\n\
    USAGE EXAMPLES:\n  \
      # Rewrite with a local Ollama server\n  \
      rebuild-it -i ./legacy -o ./rebuilt -t ./prompts/Rewrite.md.tera\n\n  \
      # Use Groq (reads GROQ_API_KEY)\n  \
      rebuild-it -i ./legacy -o ./rebuilt -t ./Rewrite.md.tera --backend groq\n\n  \
      # Only render the prompts\n  \
      rebuild-it -i ./legacy -o ./rebuilt -t ./Rewrite.md.tera --dry-run"
)]
struct Cli {
    /// Root of the source tree
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    /// Root of the output tree
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Prompt template (Tera); its file name names the prompt artifacts
    #[arg(short, long, value_name = "FILE")]
    template: PathBuf,

    /// Completion backend
    #[arg(short, long, value_enum, default_value = "ollama")]
    backend: CliBackend,

    /// Service endpoint (defaults to the backend's standard endpoint)
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Model identifier (defaults to the backend's standard model)
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the groq backend
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// What to do when a folder fails
    #[arg(long, value_enum, default_value = "abort")]
    on_error: CliPolicy,

    /// Skip files at or above this size in bytes
    #[arg(long, value_name = "BYTES")]
    max_file_size: Option<u64>,

    /// Skip files whose name matches this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Small text files only, no PDFs or images
    #[arg(long)]
    strict: bool,

    /// Render and write prompts, but do not call the service
    #[arg(long, conflicts_with = "materialize_only")]
    dry_run: bool,

    /// Only materialize folders that already have a response
    #[arg(long)]
    materialize_only: bool,

    /// Keep responses, do not write the files they name
    #[arg(long)]
    no_materialize: bool,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliBackend {
    Ollama,
    Groq,
}

impl From<CliBackend> for Backend {
    fn from(b: CliBackend) -> Self {
        match b {
            CliBackend::Ollama => Self::Ollama,
            CliBackend::Groq => Self::Groq,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPolicy {
    /// Stop at the first failing folder
    Abort,
    /// Record the failure and go on
    Continue,
}

impl From<CliPolicy> for FailurePolicy {
    fn from(p: CliPolicy) -> Self {
        match p {
            CliPolicy::Abort => Self::Abort,
            CliPolicy::Continue => Self::Continue,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    let mut file_filter = if cli.strict {
        FileFilterConfig::strict()
    } else {
        FileFilterConfig::new()
    };
    if let Some(bytes) = cli.max_file_size {
        file_filter = file_filter.max_file_size(bytes);
    }
    file_filter = file_filter.exclude_files(cli.exclude);

    let mut builder = Config::builder()
        .input_path(cli.input)
        .output_path(cli.output)
        .template_path(cli.template)
        .backend(cli.backend.into())
        .failure_policy(cli.on_error.into())
        .file_filter(file_filter)
        .dry_run(cli.dry_run)
        .materialize_only(cli.materialize_only)
        .materialize(!cli.no_materialize);

    if let Some(endpoint) = cli.endpoint {
        builder = builder.service_endpoint(endpoint);
    }
    if let Some(model) = cli.model {
        builder = builder.model_name(model);
    }
    if let Some(key) = cli.api_key {
        builder = builder.credential(key);
    }
    if let Some(report) = cli.report {
        builder = builder.report_path(report);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let gateway = AnyGateway::from_config(&config).context("Failed to set up the backend")?;

    let report = Pipeline::new(config, gateway)
        .context("Failed to create pipeline")?
        .run()
        .await
        .context("Pipeline execution failed")?;

    report.print_summary();

    if !report.is_success() {
        bail!("{} folder(s) failed", report.failed);
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
        0 => EnvFilter::new("rebuild_it=info"),
        1 => EnvFilter::new("rebuild_it=debug"),
        _ => EnvFilter::new("rebuild_it=trace"),
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}
