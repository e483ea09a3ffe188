use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::event::ResolvedOutcome;
use crate::fetch::ArtifactFetcher;
use crate::input::{ImageSource, InputResolver};
use crate::runner::StreamRunner;
use crate::services::{AgentRuntime, ImageService, ImageUpload, RunRequest};
use crate::session::HttpAgentRuntime;
use crate::upload::HttpImageService;

/// Summary of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineReport {
    pub session_id: String,
    /// Artifact URL as reported by the agent.
    pub reported_url: String,
    /// URL actually downloaded, after host rewriting.
    pub artifact_url: Url,
    pub saved_to: PathBuf,
    pub bytes_written: u64,
}

/// Runs the stages strictly in order and stops at the first failure.
pub struct Orchestrator {
    config: PipelineConfig,
    input: InputResolver,
    images: Arc<dyn ImageService>,
    agent: Arc<dyn AgentRuntime>,
    runner: StreamRunner,
    fetcher: ArtifactFetcher,
}

impl Orchestrator {
    /// Wires the HTTP implementations of every stage from `config`.
    pub fn http(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        // No client-wide timeout: it would also cut off the long-lived run
        // stream. Non-streaming requests set their own.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {e}")))?;
        let images: Arc<dyn ImageService> =
            Arc::new(HttpImageService::new(client.clone(), &config)?);
        let agent: Arc<dyn AgentRuntime> = Arc::new(HttpAgentRuntime::new(client.clone(), &config)?);
        let input = InputResolver::new(client, config.request_timeout);
        Ok(Self::with_services(
            config,
            input,
            images,
            agent,
        ))
    }

    /// Builds an orchestrator over caller-provided service implementations.
    pub fn with_services(
        config: PipelineConfig,
        input: InputResolver,
        images: Arc<dyn ImageService>,
        agent: Arc<dyn AgentRuntime>,
    ) -> Self {
        let runner = StreamRunner::from_config(&config);
        let fetcher = ArtifactFetcher::new(Arc::clone(&images), &config);
        Self {
            config,
            input,
            images,
            agent,
            runner,
            fetcher,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve, upload, create a session, stream the run, fetch the artifact.
    pub async fn run(
        &self,
        source: &ImageSource,
        prompt: &str,
    ) -> Result<PipelineReport, PipelineError> {
        let bytes = self.input.resolve(source).await?;

        info!(event = "pipeline.uploading", domain = "pipeline", bytes = bytes.len() as u64);
        let uploaded = self
            .images
            .upload(ImageUpload {
                bytes,
                filename: self.config.upload_filename.clone(),
                mime: self.config.upload_mime.clone(),
            })
            .await?;

        info!(event = "pipeline.creating_session", domain = "pipeline");
        let session = self.agent.create_session().await?;

        info!(event = "pipeline.running_agent", domain = "pipeline", session_id = %session.id);
        let request = RunRequest::new(&session, &uploaded, prompt);
        let stream = self.agent.open_run(&request).await?;
        let reported_url = match self.runner.consume(stream).await? {
            ResolvedOutcome::Artifact(url) => url,
            ResolvedOutcome::AgentError(message) => {
                warn!(event = "pipeline.agent_error", domain = "pipeline", message = %message);
                return Err(PipelineError::agent(message));
            }
            ResolvedOutcome::NotFound => {
                warn!(event = "pipeline.not_found", domain = "pipeline");
                return Err(PipelineError::NotFound);
            }
        };

        info!(event = "pipeline.fetching", domain = "pipeline", url = %reported_url);
        let artifact = self.fetcher.fetch(&reported_url).await?;
        Ok(PipelineReport {
            session_id: session.id,
            reported_url,
            artifact_url: artifact.url,
            saved_to: artifact.path,
            bytes_written: artifact.bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ByteStream, Session, UploadedImage};
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeImages {
        uploads: Mutex<Vec<ImageUpload>>,
        downloads: AtomicUsize,
        fail_upload: bool,
    }

    #[async_trait::async_trait]
    impl ImageService for FakeImages {
        async fn upload(&self, image: ImageUpload) -> Result<UploadedImage, PipelineError> {
            if self.fail_upload {
                return Err(PipelineError::upload_failed("status 500", Some(500)));
            }
            self.uploads.lock().unwrap().push(image);
            Ok(UploadedImage("/tmp/abc.jpg".into()))
        }

        async fn download(&self, _url: &Url) -> Result<ByteStream, PipelineError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(stream::iter(vec![Ok(bytes::Bytes::from_static(
                b"generated",
            ))])))
        }
    }

    struct FakeAgent {
        lines: Vec<String>,
        requests: Mutex<Vec<RunRequest>>,
        sessions: AtomicUsize,
    }

    impl FakeAgent {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                lines: lines.iter().map(|l| format!("{l}\n")).collect(),
                requests: Mutex::new(Vec::new()),
                sessions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl AgentRuntime for FakeAgent {
        async fn create_session(&self) -> Result<Session, PipelineError> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                id: "s1".into(),
                app_name: "nano-banana-agent".into(),
                user_id: "simon".into(),
            })
        }

        async fn open_run(&self, request: &RunRequest) -> Result<ByteStream, PipelineError> {
            self.requests.lock().unwrap().push(request.clone());
            let chunks: Vec<Result<bytes::Bytes, PipelineError>> = self
                .lines
                .iter()
                .map(|l| Ok(bytes::Bytes::from(l.clone())))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    const SUCCESS: &str = r#"data: {"content":{"parts":[{"functionResponse":{"name":"generate_nano_banana","response":{"status":"success","report":["http://localhost:8000/images/xyz.jpg"]}}}]}}"#;
    const FAILURE: &str = r#"data: {"content":{"parts":[{"functionResponse":{"name":"generate_nano_banana","response":{"status":"error","report":"No image generated. Only get text: []"}}}]}}"#;

    fn orchestrator(
        dir: &std::path::Path,
        images: Arc<FakeImages>,
        agent: Arc<FakeAgent>,
    ) -> Orchestrator {
        Orchestrator::with_services(
            PipelineConfig::default().output_dir(dir),
            InputResolver::new(reqwest::Client::new(), std::time::Duration::from_secs(5)),
            images,
            agent,
        )
    }

    fn input_file(dir: &std::path::Path) -> ImageSource {
        let path = dir.join("input.jpg");
        std::fs::write(&path, b"source image").unwrap();
        ImageSource::LocalPath(path)
    }

    #[tokio::test]
    async fn successful_run_uploads_streams_and_saves() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let images = Arc::new(FakeImages::default());
        let agent = FakeAgent::new(&["data: {\"content\":{\"parts\":[{\"text\":\"working\"}]}}", SUCCESS]);

        let report = orchestrator(out_dir.path(), Arc::clone(&images), Arc::clone(&agent))
            .run(&input_file(input_dir.path()), "make it blue")
            .await
            .unwrap();

        assert_eq!(report.session_id, "s1");
        assert_eq!(report.reported_url, "http://localhost:8000/images/xyz.jpg");
        assert_eq!(report.artifact_url.as_str(), "http://127.0.0.1:8000/images/xyz.jpg");
        assert_eq!(report.saved_to, out_dir.path().join("xyz.jpg"));
        assert_eq!(std::fs::read(&report.saved_to).unwrap(), b"generated");

        let uploads = images.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].bytes, b"source image");
        assert_eq!(uploads[0].filename, "image.jpg");
        assert_eq!(uploads[0].mime, "image/jpeg");

        let requests = agent.requests.lock().unwrap();
        assert_eq!(requests[0].session_id, "s1");
        assert_eq!(requests[0].new_message.parts[0].text, "/tmp/abc.jpg\n\nmake it blue");
    }

    #[tokio::test]
    async fn agent_error_aborts_without_download() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let images = Arc::new(FakeImages::default());
        let err = orchestrator(out_dir.path(), Arc::clone(&images), FakeAgent::new(&[FAILURE, SUCCESS]))
            .run(&input_file(input_dir.path()), "p")
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::agent("No image generated. Only get text: []"));
        assert_eq!(images.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_stream_is_not_found_without_download() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let images = Arc::new(FakeImages::default());
        let err = orchestrator(out_dir.path(), Arc::clone(&images), FakeAgent::new(&[": ping", "data: not-json"]))
            .run(&input_file(input_dir.path()), "p")
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::NotFound);
        assert_eq!(images.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn upload_failure_halts_before_session() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let images = Arc::new(FakeImages {
            fail_upload: true,
            ..FakeImages::default()
        });
        let agent = FakeAgent::new(&[SUCCESS]);
        let err = orchestrator(out_dir.path(), images, Arc::clone(&agent))
            .run(&input_file(input_dir.path()), "p")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::UploadFailed { status_code: Some(500), .. }));
        assert_eq!(agent.sessions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_source_halts_before_upload() {
        let out_dir = tempfile::tempdir().unwrap();
        let images = Arc::new(FakeImages::default());
        let err = orchestrator(out_dir.path(), Arc::clone(&images), FakeAgent::new(&[SUCCESS]))
            .run(&ImageSource::parse("/definitely/not/here.jpg"), "p")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
        assert!(images.uploads.lock().unwrap().is_empty());
    }
}
