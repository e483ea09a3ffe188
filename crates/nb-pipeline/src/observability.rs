use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const ENABLED_ENV: &str = "SIMON_NB_OBSERVABILITY_ENABLED";
const LEVEL_ENV: &str = "SIMON_NB_LOG_LEVEL";
const JSON_PATH_ENV: &str = "SIMON_NB_JSON_LOG_PATH";
const DEFAULT_JSON_FILE: &str = "simon-nb.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Logging settings read from the `SIMON_NB_*` environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// `SIMON_NB_OBSERVABILITY_ENABLED`; unknown spellings keep logging on.
    pub enabled: bool,
    /// `SIMON_NB_LOG_LEVEL`, an `EnvFilter` directive.
    pub level: Option<String>,
    /// `SIMON_NB_JSON_LOG_PATH`; JSONL file instead of console output.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: None,
            json_path: None,
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            enabled: lookup(ENABLED_ENV)
                .and_then(|v| parse_bool_env(&v))
                .unwrap_or(true),
            level: non_blank(LEVEL_ENV).map(|v| v.trim().to_string()),
            json_path: non_blank(JSON_PATH_ENV).map(PathBuf::from),
        }
    }

    /// `SIMON_NB_LOG_LEVEL` if it parses, else `RUST_LOG`, else `default_level`.
    fn filter(&self, default_level: &str) -> EnvFilter {
        self.level
            .as_deref()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(default_level))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log file path into the directory and file name the appender needs.
fn json_log_target(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE)
        .to_string();
    (dir, file)
}

/// Initialize logging once per process from [`LogSettings::from_env`].
///
/// Without `SIMON_NB_JSON_LOG_PATH`, logs go to stderr in a compact format
/// so stdout stays free for command output.
pub fn init_observability() {
    init_observability_with(LogSettings::from_env(), "info");
}

/// Same as [`init_observability`] with explicit settings and default level.
/// Only the first call in a process has any effect.
pub fn init_observability_with(settings: LogSettings, default_level: &str) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let env_filter = settings.filter(default_level);
        match &settings.json_path {
            Some(path) => {
                let (dir, file) = json_log_target(path);
                let _ = std::fs::create_dir_all(&dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn empty_environment_logs_to_console() {
        assert_eq!(settings(&[]), LogSettings::default());
    }

    #[test]
    fn settings_read_prefixed_variables() {
        let parsed = settings(&[
            (ENABLED_ENV, "off"),
            (LEVEL_ENV, " debug "),
            (JSON_PATH_ENV, "logs/run.jsonl"),
        ]);
        assert!(!parsed.enabled);
        assert_eq!(parsed.level.as_deref(), Some("debug"));
        assert_eq!(parsed.json_path, Some(PathBuf::from("logs/run.jsonl")));
    }

    #[test]
    fn unknown_toggle_and_blank_values_fall_back() {
        let parsed = settings(&[(ENABLED_ENV, "maybe"), (LEVEL_ENV, "  "), (JSON_PATH_ENV, "")]);
        assert_eq!(parsed, LogSettings::default());
    }

    #[test]
    fn json_target_splits_directory_and_file() {
        assert_eq!(
            json_log_target(Path::new("logs/run.jsonl")),
            (PathBuf::from("logs"), "run.jsonl".to_string())
        );
        assert_eq!(
            json_log_target(Path::new("run.jsonl")),
            (PathBuf::from("."), "run.jsonl".to_string())
        );
        assert_eq!(
            json_log_target(Path::new("/")),
            (PathBuf::from("."), DEFAULT_JSON_FILE.to_string())
        );
    }
}
