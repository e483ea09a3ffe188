use std::time::Duration;

use futures::StreamExt as _;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::services::{AgentRuntime, ByteStream, RunRequest, Session};

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

/// HTTP client for the agent runtime: session creation and `run_sse`.
///
/// One session per pipeline run; sessions are never reused or deleted.
#[derive(Clone, Debug)]
pub struct HttpAgentRuntime {
    client: reqwest::Client,
    session_url: Url,
    run_sse_url: Url,
    app_name: String,
    user_id: String,
    timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl HttpAgentRuntime {
    pub fn new(client: reqwest::Client, config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client,
            session_url: config.session_url()?,
            run_sse_url: config.run_sse_url()?,
            app_name: config.app_name.clone(),
            user_id: config.user_id.clone(),
            timeout: config.request_timeout,
            idle_timeout: config.stream_idle_timeout,
        })
    }
}

#[async_trait::async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn create_session(&self) -> Result<Session, PipelineError> {
        debug!(event = "session.request", domain = "session", url = %self.session_url);
        let response = self
            .client
            .post(self.session_url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::session_failed(format!("request failed: {e}"), None))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PipelineError::session_failed(
                format!("agent runtime responded with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        let parsed: SessionResponse = response.json().await.map_err(|e| {
            PipelineError::session_failed(
                format!("response did not contain a session id: {e}"),
                Some(status.as_u16()),
            )
        })?;
        info!(event = "session.created", domain = "session", session_id = %parsed.id);
        Ok(Session {
            id: parsed.id,
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
        })
    }

    /// Opens `POST /run_sse`. No overall timeout is set on this request; the
    /// wait for response headers and, in the stream runner, the wait between
    /// chunks are each bounded by the idle timeout.
    async fn open_run(&self, request: &RunRequest) -> Result<ByteStream, PipelineError> {
        debug!(event = "stream.request", domain = "stream", url = %self.run_sse_url, session_id = %request.session_id);
        let send = self
            .client
            .post(self.run_sse_url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send();
        let sent = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, send).await.map_err(|_elapsed| {
                PipelineError::transport(format!(
                    "run_sse sent no response within {}s",
                    limit.as_secs_f64()
                ))
            })?,
            None => send.await,
        };
        let response =
            sent.map_err(|e| PipelineError::transport(format!("run_sse request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PipelineError::transport(format!(
                "run_sse responded with status {status}: {body}"
            )));
        }
        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| PipelineError::transport(format!("streaming read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}
