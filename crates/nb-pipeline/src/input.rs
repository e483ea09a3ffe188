use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::PipelineError;

/// Where the input image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    RemoteUrl(String),
    LocalPath(PathBuf),
}

impl ImageSource {
    /// `http://` and `https://` inputs are remote; everything else is a path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::RemoteUrl(raw.to_string())
        } else {
            Self::LocalPath(PathBuf::from(raw))
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteUrl(url) => f.write_str(url),
            Self::LocalPath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Turns an `ImageSource` into raw bytes.
#[derive(Clone, Debug)]
pub struct InputResolver {
    client: reqwest::Client,
    timeout: Duration,
}

impl InputResolver {
    /// `timeout` bounds the whole remote download.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn resolve(&self, source: &ImageSource) -> Result<Vec<u8>, PipelineError> {
        let bytes = match source {
            ImageSource::RemoteUrl(url) => {
                info!(event = "input.downloading", domain = "input", url = %url);
                self.fetch_remote(url).await?
            }
            ImageSource::LocalPath(path) => {
                info!(event = "input.reading", domain = "input", path = %path.display());
                read_local(path).await?
            }
        };
        if bytes.is_empty() {
            return Err(PipelineError::source_not_found(format!(
                "{source} (could not read image data)"
            )));
        }
        debug!(event = "input.resolved", domain = "input", bytes = bytes.len() as u64);
        Ok(bytes)
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::download_failed(url, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::download_failed(
                url,
                format!("server responded with status {status}"),
            ));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::download_failed(url, e.to_string()))?;
        Ok(body.to_vec())
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, PipelineError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(PipelineError::source_not_found(path.display().to_string())),
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| unreadable_source(path, &e))
}

/// An existing but unreadable input still fails the resolve stage.
fn unreadable_source(path: &Path, err: &std::io::Error) -> PipelineError {
    PipelineError::source_not_found(format!(
        "{} (could not read image data: {err})",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Stage;

    fn resolver() -> InputResolver {
        InputResolver::new(reqwest::Client::new(), Duration::from_secs(5))
    }

    #[test]
    fn parse_distinguishes_urls_from_paths() {
        assert_eq!(
            ImageSource::parse("https://example.com/a.jpg"),
            ImageSource::RemoteUrl("https://example.com/a.jpg".into())
        );
        assert_eq!(
            ImageSource::parse("http://example.com/a.jpg"),
            ImageSource::RemoteUrl("http://example.com/a.jpg".into())
        );
        assert_eq!(
            ImageSource::parse("./httpdocs/a.jpg"),
            ImageSource::LocalPath(PathBuf::from("./httpdocs/a.jpg"))
        );
        assert_eq!(
            ImageSource::parse("ftp://example.com/a.jpg"),
            ImageSource::LocalPath(PathBuf::from("ftp://example.com/a.jpg"))
        );
    }

    #[tokio::test]
    async fn local_file_bytes_are_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jpg");
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::write(&path, &content).unwrap();

        let bytes = resolver()
            .resolve(&ImageSource::LocalPath(path.clone()))
            .await
            .unwrap();
        assert_eq!(bytes, std::fs::read(&path).unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver()
            .resolve(&ImageSource::LocalPath(dir.path().join("missing.jpg")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn directory_is_not_an_image_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver()
            .resolve(&ImageSource::LocalPath(dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();
        let err = resolver()
            .resolve(&ImageSource::LocalPath(path))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { input } if input.contains("could not read")));
    }

    #[tokio::test]
    async fn unreachable_remote_is_download_failed() {
        let err = resolver()
            .resolve(&ImageSource::RemoteUrl("http://127.0.0.1:1/a.jpg".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DownloadFailed { .. }));
    }

    #[test]
    fn unreadable_file_fails_the_resolve_stage() {
        let err = unreadable_source(
            Path::new("/data/locked.jpg"),
            &std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(&err, PipelineError::SourceNotFound { input } if input.starts_with("/data/locked.jpg (could not read image data")));
        assert_eq!(err.stage(), Stage::Resolve);
        assert_eq!(err.exit_code(), PipelineError::source_not_found("x").exit_code());
    }

    #[tokio::test]
    async fn silent_remote_times_out_as_download_failed() {
        // Accepted by the kernel backlog, never answered.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/a.jpg", listener.local_addr().unwrap());
        let resolver = InputResolver::new(reqwest::Client::new(), Duration::from_millis(200));

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve(&ImageSource::RemoteUrl(url.clone())),
        )
        .await
        .expect("remote download should be bounded by the request timeout")
        .unwrap_err();
        assert!(matches!(err, PipelineError::DownloadFailed { url: failed, .. } if failed == url));
        drop(listener);
    }
}
