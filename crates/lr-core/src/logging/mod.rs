//! Structured logging for the liveroll CLI and library.
//!
//! Dual-mode output:
//! - Human-readable console format for interactive use
//! - Machine-parseable JSON lines for automation
//!
//! stdout is reserved for command payloads; all log output goes to
//! stderr. `LIVEROLL_LOG` (falling back to `RUST_LOG`) overrides the
//! level filter.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// Machine-parseable JSON lines.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "console" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" | "machine" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Level from `-v` count and `-q`.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            LogLevel::Error
        } else {
            match verbose {
                0 => LogLevel::Info,
                1 => LogLevel::Debug,
                _ => LogLevel::Trace,
            }
        }
    }

    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

/// Initialize the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_env("LIVEROLL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());

    let result = match config.format {
        LogFormat::Human => builder.compact().try_init(),
        LogFormat::Jsonl => builder.json().try_init(),
    };
    // Already-initialized is fine (tests, embedders with their own setup).
    let _ = result;
}
