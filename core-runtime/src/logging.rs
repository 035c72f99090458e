//! # Logging
//!
//! `tracing-subscriber` bootstrap for hosts embedding the streaming core.
//!
//! Output is pretty, compact or JSON. Workspace crates log at the configured
//! level while HTTP and codec dependencies stay at `warn` unless a custom
//! filter says otherwise. Stream open, scan and the producer run inside spans.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug);
//! init_logging(config)?;
//! tracing::info!(file = %strip_path("/music/track.mp3"), "Opening");
//! ```
//!
//! `LoggingConfig` also deserializes, so it can sit next to the streaming
//! configuration in a host's settings file:
//!
//! ```json
//! { "format": "json", "level": "debug", "filter": "core_playback=trace" }
//! ```

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{
    filter::EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, Layer,
    Registry,
};

/// Workspace crates that receive the configured level by default.
const WORKSPACE_TARGETS: &[&str] = &[
    "core_runtime",
    "core_playback",
    "bridge_desktop",
    "mp3_stream_workspace",
    "stream_demo",
];

/// Dependencies that stay at `warn` unless a custom filter says otherwise.
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls", "symphonia"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored; for development.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line text.
    Compact,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive spelling understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Subscriber settings. Every field has a default, so partial settings
/// files deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates. Ignored when `filter` is set.
    pub level: LogLevel,
    /// Full `EnvFilter` directive string, e.g. `"core_playback=trace,reqwest=debug"`.
    pub filter: Option<String>,
    /// Log span enter/exit (text formats) or the span list (JSON).
    pub enable_spans: bool,
    pub display_target: bool,
    /// Thread ids and names; useful when following the producer task.
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }

    pub fn with_spans(self, enable_spans: bool) -> Self {
        Self {
            enable_spans,
            ..self
        }
    }

    pub fn with_target(self, display_target: bool) -> Self {
        Self {
            display_target,
            ..self
        }
    }

    pub fn with_thread_info(self, display_thread_info: bool) -> Self {
        Self {
            display_thread_info,
            ..self
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// Call once at startup; a second call fails with [`Error::Config`], as does
/// an unparsable filter string.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(fmt_layer(&config).with_filter(filter))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn fmt_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = if config.enable_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Pretty => base.pretty().with_span_events(span_events).boxed(),
        LogFormat::Compact => base.compact().with_span_events(span_events).boxed(),
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = config
        .filter
        .clone()
        .unwrap_or_else(|| default_directives(config.level));

    EnvFilter::try_new(directives).map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

/// `<crate>=<level>` for workspace crates, `warn` for noisy dependencies.
fn default_directives(level: LogLevel) -> String {
    let level = level.as_str();

    WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Last path component, for logging local files without the user's
/// directory layout. Splits on both Unix and Windows separators.
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Drop the query string and fragment from a URL before logging it.
///
/// Signed media URLs often carry credentials in the query.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_filter("core_playback=trace")
            .with_spans(false)
            .with_target(false)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filter.as_deref(), Some("core_playback=trace"));
        assert!(!config.enable_spans);
        assert!(!config.display_target);
        assert!(config.display_thread_info);
    }

    #[test]
    fn partial_settings_deserialize() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{ "format": "compact", "level": "warn" }"#).unwrap();
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.filter.is_none());
        assert!(config.enable_spans);
    }

    #[test]
    fn default_format_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        };
        assert_eq!(LogFormat::default(), expected);
    }

    #[test]
    fn levels_order_from_most_verbose() {
        assert!(LogLevel::Trace < LogLevel::Error);
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
    }

    #[test]
    fn default_directives_cover_workspace_and_quiet_crates() {
        let filter = build_filter(&LoggingConfig::default().with_level(LogLevel::Debug))
            .unwrap()
            .to_string();
        assert!(filter.contains("core_playback=debug"));
        assert!(filter.contains("bridge_desktop=debug"));
        assert!(filter.contains("symphonia=warn"));
    }

    #[test]
    fn custom_filter_replaces_defaults() {
        let config = LoggingConfig::default().with_filter("core_playback=trace,reqwest=debug");
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_playback=trace"));
        assert!(!filter.contains("symphonia"));
    }

    #[test]
    fn invalid_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_playback=[");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn strip_path_keeps_file_name() {
        assert_eq!(strip_path("/home/user/music/song.mp3"), "song.mp3");
        assert_eq!(strip_path("C:\\Users\\John\\Music\\song.mp3"), "song.mp3");
        assert_eq!(strip_path("song.mp3"), "song.mp3");
        assert_eq!(strip_path("/var/log/"), "");
    }

    #[test]
    fn strip_query_removes_credentials() {
        assert_eq!(
            strip_query("https://cdn.example.com/a.mp3?sig=abc&exp=1"),
            "https://cdn.example.com/a.mp3"
        );
        assert_eq!(strip_query("http://host/a.mp3#t=10"), "http://host/a.mp3");
        assert_eq!(strip_query("http://host/a.mp3"), "http://host/a.mp3");
    }
}
