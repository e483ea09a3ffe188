use std::fmt;
use std::path::PathBuf;

/// Pipeline stage that produced a terminal failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Configuration or environment setup before any network call.
    Setup,
    /// Turning the user-supplied source into bytes.
    Resolve,
    /// Sending the bytes to the upload service.
    Upload,
    /// Creating the agent session.
    Session,
    /// Reading the agent run event stream.
    Stream,
    /// Downloading and persisting the final artifact.
    Fetch,
}

impl Stage {
    /// Returns a short lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Resolve => "resolve",
            Self::Upload => "upload",
            Self::Session => "session",
            Self::Stream => "stream",
            Self::Fetch => "fetch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline run.
///
/// Every variant halts the run; nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
    /// The image source is neither a URL nor an existing, readable file.
    #[error("image source '{input}' is not a valid URL or an existing file path")]
    SourceNotFound { input: String },
    /// A remote fetch failed, either for the input image or the final artifact.
    #[error("download failed ({url}): {message}")]
    DownloadFailed { url: String, message: String },
    /// Upload service rejected the image or could not be reached.
    #[error("upload failed: {message}")]
    UploadFailed {
        message: String,
        status_code: Option<u16>,
    },
    /// Agent runtime refused to create a session.
    #[error("session creation failed: {message}")]
    SessionCreateFailed {
        message: String,
        status_code: Option<u16>,
    },
    /// Connection-level failure while opening or reading the run stream.
    #[error("stream transport error: {message}")]
    StreamTransportError { message: String },
    /// The agent tool explicitly reported a failure.
    #[error("{message}")]
    AgentErrorFound { message: String },
    /// The stream ended without any resolving event.
    #[error("could not get the final image URL: the agent stream ended without a result")]
    NotFound,
    /// Local filesystem failure while persisting the artifact.
    #[error("i/o error ({}): {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn source_not_found(input: impl Into<String>) -> Self {
        Self::SourceNotFound {
            input: input.into(),
        }
    }

    pub fn download_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn upload_failed(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::UploadFailed {
            message: message.into(),
            status_code,
        }
    }

    pub fn session_failed(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::SessionCreateFailed {
            message: message.into(),
            status_code,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::StreamTransportError {
            message: message.into(),
        }
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::AgentErrorFound {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Returns the stage that produced this failure.
    ///
    /// `DownloadFailed` is reported as `Fetch` even when it was raised while
    /// resolving a remote input image.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) => Stage::Setup,
            Self::SourceNotFound { .. } => Stage::Resolve,
            Self::UploadFailed { .. } => Stage::Upload,
            Self::SessionCreateFailed { .. } => Stage::Session,
            Self::StreamTransportError { .. } | Self::AgentErrorFound { .. } | Self::NotFound => {
                Stage::Stream
            }
            Self::DownloadFailed { .. } | Self::Io { .. } => Stage::Fetch,
        }
    }

    /// Stable process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::SourceNotFound { .. } => 3,
            Self::DownloadFailed { .. } => 4,
            Self::UploadFailed { .. } => 5,
            Self::SessionCreateFailed { .. } => 6,
            Self::StreamTransportError { .. } => 7,
            Self::AgentErrorFound { .. } => 8,
            Self::NotFound => 9,
            Self::Io { .. } => 10,
        }
    }
}
