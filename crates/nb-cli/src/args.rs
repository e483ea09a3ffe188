use std::path::PathBuf;

use clap::Parser;
use nb_pipeline::{HostRewrite, PipelineConfig, PipelineError};

#[derive(Debug, Parser)]
#[command(
    name = "simon-nb",
    about = "Process an image with the nano-banana agent and save the generated result"
)]
pub struct Args {
    /// URL or local path of the image to process.
    pub image_url_or_path: String,
    /// Prompt for the image generation.
    pub prompt: String,

    /// Project root holding the `.env` file (defaults to searching upward for a Makefile).
    #[arg(long)]
    pub project_root: Option<PathBuf>,
    /// Base URL of the upload/static image service.
    #[arg(long)]
    pub upload_url: Option<String>,
    /// Base URL of the agent runtime.
    #[arg(long)]
    pub agent_url: Option<String>,
    #[arg(long)]
    pub app_name: Option<String>,
    #[arg(long)]
    pub user_id: Option<String>,
    /// Tool whose function response carries the result.
    #[arg(long)]
    pub tool_name: Option<String>,
    /// Host rewrite rules for artifact URLs, e.g. `localhost=127.0.0.1`. Empty disables.
    #[arg(long)]
    pub host_rewrite: Option<String>,
    /// Seconds to wait for stream data before giving up (0 waits forever).
    #[arg(long)]
    pub stream_idle_timeout_secs: Option<u64>,
    /// Directory the generated image is saved in.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl Args {
    /// Layers command-line overrides on top of an environment-derived config.
    pub fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig, PipelineError> {
        if let Some(url) = &self.upload_url {
            config = config.upload_base_url(url)?;
        }
        if let Some(url) = &self.agent_url {
            config = config.agent_base_url(url)?;
        }
        if let Some(app_name) = &self.app_name {
            config.app_name = app_name.clone();
        }
        if let Some(user_id) = &self.user_id {
            config.user_id = user_id.clone();
        }
        if let Some(tool_name) = &self.tool_name {
            config = config.tool_name(tool_name.clone());
        }
        if let Some(rules) = &self.host_rewrite {
            config = config.host_rewrite(HostRewrite::parse(rules)?);
        }
        if let Some(secs) = self.stream_idle_timeout_secs {
            config = config.stream_idle_timeout_secs(secs);
        }
        if let Some(dir) = &self.output_dir {
            config = config.output_dir(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }
}
