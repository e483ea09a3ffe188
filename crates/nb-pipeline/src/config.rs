use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::errors::PipelineError;

pub const DEFAULT_UPLOAD_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_APP_NAME: &str = "nano-banana-agent";
pub const DEFAULT_USER_ID: &str = "simon";
pub const DEFAULT_TOOL_NAME: &str = "generate_nano_banana";
pub const DEFAULT_HOST_REWRITE: &str = "localhost=127.0.0.1";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Ordered host substitutions applied to artifact URLs before download.
///
/// Artifact URLs are minted inside the agent's network context, so a host
/// that resolves there (for example `localhost` inside a container) may need
/// to be mapped to the host reachable from this process.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct HostRewrite {
    rules: Vec<(String, String)>,
}

impl HostRewrite {
    /// No substitutions; URLs are fetched as-is.
    pub fn none() -> Self {
        Self::default()
    }

    /// Appends a `from -> to` rule. Hosts are compared case-insensitively.
    pub fn rule(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rules.push((from.into().to_ascii_lowercase(), to.into()));
        self
    }

    /// Parses `from=to[,from=to...]`. An empty string yields no rules.
    pub fn parse(raw_rules: &str) -> Result<Self, PipelineError> {
        let mut rewrite = Self::none();
        for raw in raw_rules.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            let Some((from, to)) = raw.split_once('=') else {
                return Err(PipelineError::config(format!(
                    "host rewrite rule '{raw}' must look like from=to"
                )));
            };
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return Err(PipelineError::config(format!(
                    "host rewrite rule '{raw}' has an empty side"
                )));
            }
            if Url::parse(&format!("http://{to}/")).is_err() {
                return Err(PipelineError::config(format!(
                    "host rewrite target '{to}' is not a valid host"
                )));
            }
            rewrite = rewrite.rule(from, to);
        }
        Ok(rewrite)
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    /// Returns `url` with its host replaced by the first matching rule.
    pub fn apply(&self, url: &Url) -> Result<Url, PipelineError> {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return Ok(url.clone());
        };
        let Some((_, to)) = self.rules.iter().find(|(from, _)| *from == host) else {
            return Ok(url.clone());
        };
        let mut rewritten = url.clone();
        rewritten
            .set_host(Some(to))
            .map_err(|e| PipelineError::config(format!("cannot rewrite host to '{to}': {e}")))?;
        Ok(rewritten)
    }
}

/// Endpoints, identities and limits for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Base URL of the upload/static-file service.
    pub upload_base_url: Url,
    /// Base URL of the agent runtime (sessions and `run_sse`).
    pub agent_base_url: Url,
    pub app_name: String,
    pub user_id: String,
    /// Name of the tool whose function response carries the artifact.
    pub tool_name: String,
    pub host_rewrite: HostRewrite,
    /// Timeout for non-streaming requests (upload, session, downloads).
    pub request_timeout: Duration,
    /// Longest wait for the next chunk of the run stream. `None` waits forever.
    pub stream_idle_timeout: Option<Duration>,
    /// Directory the final artifact is written into.
    pub output_dir: PathBuf,
    /// Synthetic filename sent with the upload.
    pub upload_filename: String,
    pub upload_mime: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_base_url: default_url(DEFAULT_UPLOAD_URL),
            agent_base_url: default_url(DEFAULT_AGENT_URL),
            app_name: DEFAULT_APP_NAME.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            host_rewrite: HostRewrite::none().rule("localhost", "127.0.0.1"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_idle_timeout: Some(DEFAULT_STREAM_IDLE_TIMEOUT),
            output_dir: PathBuf::from("."),
            upload_filename: "image.jpg".to_string(),
            upload_mime: "image/jpeg".to_string(),
        }
    }
}

fn default_url(raw: &str) -> Url {
    Url::parse(raw).expect("built-in default URLs should be valid")
}

impl PipelineConfig {
    /// Builds a config from `SIMON_NB_*` environment variables, falling back
    /// to defaults for anything unset or blank.
    pub fn from_env() -> Result<Self, PipelineError> {
        let mut config = Self::default();
        if let Some(v) = env_value("SIMON_NB_UPLOAD_URL") {
            config = config.upload_base_url(&v)?;
        }
        if let Some(v) = env_value("SIMON_NB_AGENT_URL") {
            config = config.agent_base_url(&v)?;
        }
        if let Some(v) = env_value("SIMON_NB_APP_NAME") {
            config.app_name = v;
        }
        if let Some(v) = env_value("SIMON_NB_USER_ID") {
            config.user_id = v;
        }
        if let Some(v) = env_value("SIMON_NB_TOOL_NAME") {
            config.tool_name = v;
        }
        if let Ok(v) = std::env::var("SIMON_NB_HOST_REWRITE") {
            config.host_rewrite = HostRewrite::parse(&v)?;
        }
        if let Some(v) = env_value("SIMON_NB_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_secs("SIMON_NB_REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = env_value("SIMON_NB_STREAM_IDLE_TIMEOUT_SECS") {
            config = config.stream_idle_timeout_secs(parse_secs(
                "SIMON_NB_STREAM_IDLE_TIMEOUT_SECS",
                &v,
            )?);
        }
        if let Some(v) = env_value("SIMON_NB_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn upload_base_url(mut self, raw: &str) -> Result<Self, PipelineError> {
        self.upload_base_url = parse_base_url("upload", raw)?;
        Ok(self)
    }

    pub fn agent_base_url(mut self, raw: &str) -> Result<Self, PipelineError> {
        self.agent_base_url = parse_base_url("agent", raw)?;
        Ok(self)
    }

    pub fn host_rewrite(mut self, rewrite: HostRewrite) -> Self {
        self.host_rewrite = rewrite;
        self
    }

    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the stream idle timeout; `0` disables it.
    pub fn stream_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.stream_idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn stream_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Rejects blank identities that would produce malformed endpoint paths.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("app_name", &self.app_name),
            ("user_id", &self.user_id),
            ("tool_name", &self.tool_name),
            ("upload_filename", &self.upload_filename),
            ("upload_mime", &self.upload_mime),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::config(format!("{name} must not be empty")));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(PipelineError::config(
                "request_timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// `POST {upload}/upload/`
    pub fn upload_url(&self) -> Result<Url, PipelineError> {
        join_segments(&self.upload_base_url, &["upload", ""])
    }

    /// `POST {agent}/apps/{app}/users/{user}/sessions`
    pub fn session_url(&self) -> Result<Url, PipelineError> {
        join_segments(
            &self.agent_base_url,
            &["apps", &self.app_name, "users", &self.user_id, "sessions"],
        )
    }

    /// `POST {agent}/run_sse`
    pub fn run_sse_url(&self) -> Result<Url, PipelineError> {
        join_segments(&self.agent_base_url, &["run_sse"])
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, PipelineError> {
    raw.parse::<u64>()
        .map_err(|e| PipelineError::config(format!("{key}='{raw}' is not a number of seconds: {e}")))
}

fn parse_base_url(label: &str, raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| PipelineError::config(format!("invalid {label} base URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::config(format!(
            "{label} base URL '{raw}' must use http or https"
        )));
    }
    Ok(url)
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, PipelineError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| PipelineError::config(format!("'{base}' cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
