//! `simon-nb`: send an image and a prompt through the agent pipeline and
//! save the generated image.

mod args;
mod project_root;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nb_pipeline::{ImageSource, Orchestrator, PipelineConfig, PipelineError, PipelineReport};
use tracing::{info, warn};

use crate::args::Args;
use crate::project_root::{ROOT_ENV, discover, env_files};

/// Exit code when no project root can be located.
const PROJECT_ROOT_EXIT_CODE: u8 = 2;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(
        "Could not find project root.\nPlease run this command from within the project directory, or set the {ROOT_ENV} environment variable."
    )]
    ProjectRootNotFound,
    #[error("cannot read the working directory: {0}")]
    WorkingDir(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::ProjectRootNotFound | Self::WorkingDir(_) => PROJECT_ROOT_EXIT_CODE,
            Self::Pipeline(err) => err.exit_code(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(report) => {
            println!("Generated image URL: {}", report.reported_url);
            println!(
                "Processing complete. Image saved as {}",
                report.saved_to.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_failure(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<PipelineReport, CliError> {
    let cwd = std::env::current_dir().map_err(|e| CliError::WorkingDir(e.to_string()))?;
    let explicit_root = args
        .project_root
        .clone()
        .or_else(|| std::env::var_os(ROOT_ENV).map(PathBuf::from));
    let discovery = discover(explicit_root.as_deref(), &cwd);
    let Some(root) = discovery.root else {
        return Err(CliError::ProjectRootNotFound);
    };

    let loaded: Vec<PathBuf> = env_files(&root, &cwd)
        .into_iter()
        .filter(|path| dotenvy::from_path(path).is_ok())
        .collect();
    nb_pipeline::init_observability();

    if let Some(ignored) = &discovery.ignored {
        warn!(
            event = "cli.project_root_ignored",
            domain = "cli",
            path = %ignored.display(),
            "{ROOT_ENV} is set but has no Makefile; searched upward instead"
        );
    }
    info!(
        event = "cli.started",
        domain = "cli",
        project_root = %root.display(),
        env_files = loaded.len()
    );

    let config = args.apply(PipelineConfig::from_env()?)?;
    let orchestrator = Orchestrator::http(config)?;
    let source = ImageSource::parse(&args.image_url_or_path);
    Ok(orchestrator.run(&source, &args.prompt).await?)
}

fn report_failure(err: &CliError) {
    match err {
        CliError::Pipeline(PipelineError::AgentErrorFound { message }) => {
            eprintln!("\n--- Agent Error ---\n{message}\n-------------------");
            eprintln!("Agent failed to process the image. See error message above.");
        }
        CliError::Pipeline(PipelineError::NotFound) => {
            eprintln!("Could not get the final image URL.");
        }
        _ => eprintln!("Error: {err}"),
    }
}
