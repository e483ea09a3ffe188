//! Agent run events as they appear after the `data:` prefix.
//!
//! Parts are decoded into a closed set of shapes up front; resolution logic
//! then matches on the variant instead of probing optional JSON fields.

use serde::Deserialize;

/// Status value a tool reports when it produced an artifact.
pub const SUCCESS_STATUS: &str = "success";

/// One decoded stream event. Only `content.parts` is relevant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentEvent {
    #[serde(default)]
    pub content: Option<EventContent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventContent {
    #[serde(default)]
    pub parts: Vec<EventPart>,
}

/// A single content part.
///
/// A part carrying a function response decodes as `FunctionResponse` even if
/// it also has a `text` field; that text is still consulted when the function
/// response names a different tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EventPart {
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
        #[serde(default)]
        text: Option<String>,
    },
    Text {
        text: String,
    },
    /// Any other shape (function calls, thoughts, inline data, ...).
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    #[serde(default)]
    pub response: ToolResponse,
}

/// Result payload returned by the image tool.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ToolResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub report: Option<Report>,
}

/// The tool's `report`: URLs on success, usually a message on failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Report {
    Urls(Vec<String>),
    Message(String),
    Other(serde_json::Value),
}

/// A terminal signal found in a single stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// URL of the generated artifact.
    Artifact(String),
    /// The tool explicitly failed; carries its own message.
    AgentError(String),
}

/// The single outcome of reading a run stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOutcome {
    Artifact(String),
    AgentError(String),
    /// The stream ended without any resolving line.
    NotFound,
}

impl From<Resolution> for ResolvedOutcome {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::Artifact(url) => Self::Artifact(url),
            Resolution::AgentError(message) => Self::AgentError(message),
        }
    }
}

impl AgentEvent {
    /// Returns the first resolving part, examining parts in order.
    pub fn resolve(&self, tool_name: &str) -> Option<Resolution> {
        self.content
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.resolve(tool_name))
    }
}

impl EventPart {
    pub fn resolve(&self, tool_name: &str) -> Option<Resolution> {
        match self {
            Self::FunctionResponse {
                function_response, ..
            } if function_response.name == tool_name => Some(function_response.resolve()),
            Self::FunctionResponse {
                text: Some(text), ..
            }
            | Self::Text { text } => url_text(text),
            Self::FunctionResponse { text: None, .. } | Self::Other(_) => None,
        }
    }
}

fn url_text(text: &str) -> Option<Resolution> {
    text.starts_with("http").then(|| Resolution::Artifact(text.to_string()))
}

impl FunctionResponse {
    /// Success with at least one URL yields the first URL; anything else is
    /// an explicit agent failure.
    pub fn resolve(&self) -> Resolution {
        if self.response.is_success()
            && let Some(Report::Urls(urls)) = &self.response.report
            && let Some(first) = urls.first()
        {
            return Resolution::Artifact(first.clone());
        }
        Resolution::AgentError(self.failure_message())
    }

    fn failure_message(&self) -> String {
        let status = self.response.status.as_deref().unwrap_or("<missing>");
        match &self.response.report {
            Some(Report::Message(message)) => message.clone(),
            Some(Report::Urls(urls)) if urls.is_empty() => format!(
                "tool '{}' returned status '{status}' with an empty report",
                self.name
            ),
            Some(Report::Urls(urls)) => format!(
                "tool '{}' returned status '{status}' with report {}",
                self.name,
                urls.join(", ")
            ),
            Some(Report::Other(value)) => value.to_string(),
            None => format!(
                "tool '{}' returned status '{status}' without a report",
                self.name
            ),
        }
    }
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS_STATUS)
    }
}
