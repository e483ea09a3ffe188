use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{HostRewrite, PipelineConfig};
use crate::errors::PipelineError;
use crate::services::{ByteStream, ImageService};

/// The downloaded artifact as persisted on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalArtifact {
    /// URL actually fetched, after host rewriting.
    pub url: Url,
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Downloads the resolved artifact and writes it under `output_dir`.
#[derive(Clone)]
pub struct ArtifactFetcher {
    images: Arc<dyn ImageService>,
    host_rewrite: HostRewrite,
    output_dir: PathBuf,
}

impl ArtifactFetcher {
    pub fn new(images: Arc<dyn ImageService>, config: &PipelineConfig) -> Self {
        Self {
            images,
            host_rewrite: config.host_rewrite.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Parses the agent-reported URL and applies the host rewrite rules.
    pub fn target_url(&self, raw: &str) -> Result<Url, PipelineError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| PipelineError::download_failed(raw, format!("invalid URL: {e}")))?;
        let rewritten = self.host_rewrite.apply(&url)?;
        if rewritten != url {
            debug!(event = "artifact.host_rewritten", domain = "artifact", from = %url, to = %rewritten);
        }
        Ok(rewritten)
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<FinalArtifact, PipelineError> {
        let url = self.target_url(raw_url)?;
        let file_name = artifact_file_name(&url).ok_or_else(|| {
            PipelineError::download_failed(url.as_str(), "URL path has no file name")
        })?;
        info!(event = "artifact.downloading", domain = "artifact", url = %url);
        let stream = self.images.download(&url).await?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PipelineError::io(&self.output_dir, &e))?;
        let path = self.output_dir.join(&file_name);
        let bytes_written = write_atomically(&path, stream).await?;
        info!(
            event = "artifact.saved",
            domain = "artifact",
            path = %path.display(),
            bytes = bytes_written
        );
        Ok(FinalArtifact {
            url,
            path,
            bytes_written,
        })
    }
}

/// File name derived from the last path segment, ignoring any query string.
pub fn artifact_file_name(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(ToOwned::to_owned)
}

/// Streams into `<path>.part` and renames on success, so a failed download
/// never leaves a file at `path`.
async fn write_atomically(path: &Path, stream: ByteStream) -> Result<u64, PipelineError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = copy_stream(&partial, stream).await;
    match result {
        Ok(written) => {
            tokio::fs::rename(&partial, path)
                .await
                .map_err(|e| PipelineError::io(path, &e))?;
            Ok(written)
        }
        Err(err) => {
            if let Err(e) = tokio::fs::remove_file(&partial).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(event = "artifact.cleanup_failed", domain = "artifact", path = %partial.display(), error = %e);
            }
            Err(err)
        }
    }
}

async fn copy_stream(path: &Path, mut stream: ByteStream) -> Result<u64, PipelineError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| PipelineError::io(path, &e))?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| PipelineError::io(path, &e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| PipelineError::io(path, &e))?;
    Ok(written)
}
