//! Unified logging module for the gateway
//!
//! Console output uses a compact `timestamp [LEVEL] message` format; the same
//! events are written to a daily rolling file under the configured log root.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Service started`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer alive for the process lifetime
static FILE_GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();

/// Logging section of the service configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log root directory (overridden by `REGOSRV_LOG_DIR`)
    pub dir: String,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Write the file log as JSON lines
    pub enable_json: bool,
    /// Disable the file log entirely (console only)
    pub console_only: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            level: "info".to_string(),
            enable_json: false,
            console_only: false,
        }
    }
}

/// Resolved logging setup
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as file prefix and default filter target
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Default level when `RUST_LOG` is not set
    pub level: Level,
    /// Enable JSON format for the file layer
    pub enable_json: bool,
    /// Enable ANSI colors on the console
    pub ansi: bool,
    /// Write a rolling file next to the console output
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            level: Level::INFO,
            enable_json: false,
            ansi: true,
            file_output: true,
        }
    }
}

impl LogConfig {
    /// Build from the config file section; `REGOSRV_LOG_DIR` wins over `dir`
    pub fn from_settings(service_name: &str, settings: &LoggingConfig) -> Self {
        let log_dir = std::env::var("REGOSRV_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(&settings.dir));

        Self {
            service_name: service_name.to_string(),
            log_dir,
            level: parse_level(&settings.level),
            enable_json: settings.enable_json,
            file_output: !settings.console_only,
            ..Default::default()
        }
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        format!("{level},{}={level},rumqttc=warn", self.service_name)
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> anyhow::Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.is_empty() => EnvFilter::try_new(env_str)?,
        _ => EnvFilter::try_new(config.default_filter())?,
    };

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let slot = FILE_GUARD.get_or_init(|| Mutex::new(None));
        match slot.lock() {
            Ok(mut slot) => *slot = Some(guard),
            Err(poisoned) => {
                eprintln!("Warning: FILE_GUARD lock was poisoned, recovering...");
                *poisoned.into_inner() = Some(guard);
            },
        }

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_level(true)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    if config.file_output {
        tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    } else {
        tracing::info!("Logging: {} (console only)", config.service_name);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::WARN), "[WARN]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }

    #[test]
    fn test_parse_level_fallback() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_default_filter_targets_service() {
        let config = LogConfig {
            service_name: "regosrv".to_string(),
            level: Level::DEBUG,
            ..Default::default()
        };
        assert_eq!(
            config.default_filter(),
            "debug,regosrv=debug,rumqttc=warn"
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingConfig {
            dir: "/var/log/regosrv".to_string(),
            level: "warn".to_string(),
            enable_json: true,
            console_only: true,
        };
        let config = LogConfig::from_settings("regosrv", &settings);
        assert_eq!(config.level, Level::WARN);
        assert!(config.enable_json);
        assert!(!config.file_output);
    }
}
