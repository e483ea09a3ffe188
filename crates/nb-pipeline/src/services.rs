use std::fmt;
use std::pin::Pin;

use serde::Serialize;
use url::Url;

use crate::errors::PipelineError;

/// Response body as a stream of byte chunks.
///
/// Dropping the stream closes the underlying connection.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, PipelineError>> + Send + 'static>>;

/// Raw image bytes plus the metadata sent with the multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: String,
}

/// Storage reference returned by the upload service.
///
/// Only meaningful inside the agent's execution environment, so it is passed
/// through untouched and never parsed here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedImage(pub String);

impl UploadedImage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent session created for one pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Opaque id; echoed verbatim in the run request.
    pub id: String,
    pub app_name: String,
    pub user_id: String,
}

/// JSON body of `POST /run_sse`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub session_id: String,
    pub app_name: String,
    pub user_id: String,
    pub new_message: NewMessage,
    pub streaming: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    pub parts: Vec<TextPart>,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextPart {
    pub text: String,
}

impl RunRequest {
    /// Builds the streaming run request: the uploaded path, a blank line,
    /// then the user's prompt, as a single user text part.
    pub fn new(session: &Session, image: &UploadedImage, prompt: &str) -> Self {
        Self {
            session_id: session.id.clone(),
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            new_message: NewMessage {
                parts: vec![TextPart {
                    text: format!("{image}\n\n{prompt}"),
                }],
                role: "user".to_string(),
            },
            streaming: true,
        }
    }
}

/// The upload/static-file service.
#[async_trait::async_trait]
pub trait ImageService: Send + Sync {
    /// Uploads the image and returns the server-side storage reference.
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage, PipelineError>;

    /// Opens a download of `url` as a byte stream.
    async fn download(&self, url: &Url) -> Result<ByteStream, PipelineError>;
}

/// The session-oriented agent runtime.
#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn create_session(&self) -> Result<Session, PipelineError>;

    /// Opens the streaming execution endpoint for `request`.
    async fn open_run(&self, request: &RunRequest) -> Result<ByteStream, PipelineError>;
}
