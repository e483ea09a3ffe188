use std::time::Duration;

use futures::StreamExt as _;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::event::{AgentEvent, Resolution, ResolvedOutcome};
use crate::services::ByteStream;
use crate::transport::{LineDecoder, data_payload};

/// What a single stream line means for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    /// A valid event that does not settle the run.
    Continue,
    /// The line is not an event (or not a parseable one) and is ignored.
    Skipped(SkipReason),
    /// The run is settled; no further line may be read.
    Resolved(Resolution),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Blank line, comment, `event:` field or any other non-`data:` line.
    NotData,
    /// `data:` payload that is not a JSON event.
    InvalidJson(String),
}

/// Classifies one line of the run stream.
pub fn process_line(line: &str, tool_name: &str) -> LineVerdict {
    let Some(payload) = data_payload(line) else {
        return LineVerdict::Skipped(SkipReason::NotData);
    };
    let event: AgentEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => return LineVerdict::Skipped(SkipReason::InvalidJson(e.to_string())),
    };
    match event.resolve(tool_name) {
        Some(resolution) => LineVerdict::Resolved(resolution),
        None => LineVerdict::Continue,
    }
}

/// Consumes an agent run stream until the first resolving line.
#[derive(Clone, Debug)]
pub struct StreamRunner {
    tool_name: String,
    idle_timeout: Option<Duration>,
}

#[derive(Default, Debug)]
struct LineStats {
    lines: u64,
    events: u64,
    skipped: u64,
}

impl StreamRunner {
    pub fn new(tool_name: impl Into<String>, idle_timeout: Option<Duration>) -> Self {
        Self {
            tool_name: tool_name.into(),
            idle_timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.tool_name.clone(), config.stream_idle_timeout)
    }

    /// Reads `stream` line by line and returns the single outcome.
    ///
    /// On the first resolving line the stream is dropped, closing the
    /// connection; it is never polled again, even if more lines are already
    /// buffered. A stream that ends without a resolving line yields
    /// `ResolvedOutcome::NotFound`.
    pub async fn consume(&self, mut stream: ByteStream) -> Result<ResolvedOutcome, PipelineError> {
        let mut decoder = LineDecoder::default();
        let mut stats = LineStats::default();
        loop {
            let (lines, ended) = match self.next_chunk(&mut stream).await? {
                Some(chunk) => (decoder.push_chunk(&chunk), false),
                None => (decoder.finish().into_iter().collect(), true),
            };
            for line in lines {
                stats.lines += 1;
                match process_line(&line, &self.tool_name) {
                    LineVerdict::Continue => stats.events += 1,
                    LineVerdict::Skipped(SkipReason::NotData) => {}
                    LineVerdict::Skipped(SkipReason::InvalidJson(reason)) => {
                        stats.skipped += 1;
                        debug!(event = "stream.line_skipped", domain = "stream", reason = %reason);
                    }
                    LineVerdict::Resolved(resolution) => {
                        drop(stream);
                        info!(
                            event = "stream.resolved",
                            domain = "stream",
                            outcome = resolution_kind(&resolution),
                            lines = stats.lines,
                            events = stats.events + 1,
                            skipped = stats.skipped
                        );
                        return Ok(resolution.into());
                    }
                }
            }
            if ended {
                info!(
                    event = "stream.ended",
                    domain = "stream",
                    outcome = "not_found",
                    lines = stats.lines,
                    events = stats.events,
                    skipped = stats.skipped
                );
                return Ok(ResolvedOutcome::NotFound);
            }
        }
    }

    async fn next_chunk(
        &self,
        stream: &mut ByteStream,
    ) -> Result<Option<bytes::Bytes>, PipelineError> {
        let next = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_elapsed| {
                    PipelineError::transport(format!(
                        "no stream data received within {}s",
                        limit.as_secs_f64()
                    ))
                })?,
            None => stream.next().await,
        };
        next.transpose()
    }
}

fn resolution_kind(resolution: &Resolution) -> &'static str {
    match resolution {
        Resolution::Artifact(_) => "artifact",
        Resolution::AgentError(_) => "agent_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOOL: &str = "generate_nano_banana";

    fn runner() -> StreamRunner {
        StreamRunner::new(TOOL, Some(Duration::from_secs(5)))
    }

    fn success_line(url: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"content": {"parts": [{"functionResponse": {
                "name": TOOL, "response": {"status": "success", "report": [url]}
            }}]}})
        )
    }

    fn error_line(message: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"content": {"parts": [{"functionResponse": {
                "name": TOOL, "response": {"status": "error", "report": message}
            }}]}})
        )
    }

    /// Builds a byte stream from chunks and counts how many were polled out.
    fn counted(chunks: Vec<String>) -> (ByteStream, Arc<AtomicUsize>) {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polled);
        let stream = stream::iter(chunks).map(move |chunk| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, PipelineError>(bytes::Bytes::from(chunk))
        });
        (Box::pin(stream), polled)
    }

    #[test]
    fn process_line_classifies_lines() {
        assert_eq!(
            process_line("event: message", TOOL),
            LineVerdict::Skipped(SkipReason::NotData)
        );
        assert_eq!(process_line("", TOOL), LineVerdict::Skipped(SkipReason::NotData));
        assert!(matches!(
            process_line("data: {not json", TOOL),
            LineVerdict::Skipped(SkipReason::InvalidJson(_))
        ));
        assert_eq!(
            process_line(r#"data: {"content":{"parts":[{"text":"thinking"}]}}"#, TOOL),
            LineVerdict::Continue
        );
        assert_eq!(
            process_line(r#"data: {"content":{"parts":[{"text":"https://x/a.png"}]}}"#, TOOL),
            LineVerdict::Resolved(Resolution::Artifact("https://x/a.png".into()))
        );
    }

    #[tokio::test]
    async fn resolves_artifact_and_stops_reading() {
        let (stream, polled) = counted(vec![
            success_line("https://x/img1.jpg"),
            error_line("must never be read"),
            success_line("https://x/img2.jpg"),
        ]);
        let outcome = runner().consume(stream).await.expect("consume");
        assert_eq!(outcome, ResolvedOutcome::Artifact("https://x/img1.jpg".into()));
        assert_eq!(polled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lines_after_resolution_in_the_same_chunk_are_ignored() {
        let chunk = format!(
            "{}{}",
            success_line("https://x/img1.jpg"),
            error_line("same chunk, later line")
        );
        let (stream, _) = counted(vec![chunk]);
        let outcome = runner().consume(stream).await.expect("consume");
        assert_eq!(outcome, ResolvedOutcome::Artifact("https://x/img1.jpg".into()));
    }

    #[tokio::test]
    async fn agent_error_is_distinct_from_not_found() {
        let (stream, _) = counted(vec![
            "data: {\"content\":{\"parts\":[{\"text\":\"working\"}]}}\n\n".to_string(),
            error_line("No image generated. Only get text: []"),
        ]);
        assert_eq!(
            runner().consume(stream).await.expect("consume"),
            ResolvedOutcome::AgentError("No image generated. Only get text: []".into())
        );

        let (stream, polled) = counted(vec![
            ": keep-alive\n".to_string(),
            "data: {\"content\":{\"parts\":[{\"text\":\"done\"}]}}\n\n".to_string(),
        ]);
        assert_eq!(
            runner().consume(stream).await.expect("consume"),
            ResolvedOutcome::NotFound
        );
        assert_eq!(polled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_line_between_events_is_skipped() {
        let (stream, _) = counted(vec![
            "data: {\"content\":{\"parts\":[{\"text\":\"step 1\"}]}}\n".to_string(),
            "data: {\"content\": [oops\n".to_string(),
            success_line("https://x/img1.jpg"),
        ]);
        assert_eq!(
            runner().consume(stream).await.expect("consume"),
            ResolvedOutcome::Artifact("https://x/img1.jpg".into())
        );
    }

    #[tokio::test]
    async fn event_split_across_chunks_and_unterminated_tail_resolves() {
        let line = success_line("https://x/tail.jpg");
        let trimmed = line.trim_end().to_string();
        let (head, tail) = trimmed.split_at(20);
        let (stream, _) = counted(vec![head.to_string(), tail.to_string()]);
        assert_eq!(
            runner().consume(stream).await.expect("consume"),
            ResolvedOutcome::Artifact("https://x/tail.jpg".into())
        );
    }

    #[tokio::test]
    async fn transport_error_mid_stream_is_terminal() {
        let chunks: Vec<Result<bytes::Bytes, PipelineError>> = vec![
            Ok(bytes::Bytes::from_static(b"data: {}\n")),
            Err(PipelineError::transport("connection reset")),
        ];
        let err = runner()
            .consume(Box::pin(stream::iter(chunks)))
            .await
            .expect_err("transport error");
        assert!(matches!(err, PipelineError::StreamTransportError { message } if message.contains("reset")));
    }

    #[tokio::test]
    async fn idle_timeout_bounds_a_silent_stream() {
        let runner = StreamRunner::new(TOOL, Some(Duration::from_millis(20)));
        let err = runner
            .consume(Box::pin(stream::pending::<Result<bytes::Bytes, PipelineError>>()))
            .await
            .expect_err("idle timeout");
        assert!(matches!(err, PipelineError::StreamTransportError { message } if message.contains("no stream data")));
    }
}
