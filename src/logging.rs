//! Logging initialisation.
//!
//! Installs a `tracing` subscriber configured from the environment:
//!
//! - `RUST_LOG` - full filter directive, wins over everything else
//! - `RSV360_LOG_LEVEL=trace|debug|info|warn|error` - minimum level
//! - `RSV360_DEBUG=1` - shorthand for debug level
//! - `RSV360_LOG_FORMAT=json|pretty|compact` - output format (default json)

use std::env;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

/// Output format for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, human friendly
    Pretty,
    /// Single line
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    /// Parse a format name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level when no `RUST_LOG` directive is set
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Raw `RUST_LOG` directive
    pub directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: Format::Json,
            directive: None,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("RSV360_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let level = lookup("RSV360_LOG_LEVEL")
            .and_then(|s| s.trim().parse::<Level>().ok())
            .unwrap_or(if debug { Level::DEBUG } else { Level::INFO });

        let format = lookup("RSV360_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let directive = lookup("RUST_LOG").filter(|s| !s.trim().is_empty());

        Self {
            level,
            format,
            directive,
        }
    }

    /// Filter directive handed to `EnvFilter`
    pub fn filter_directive(&self) -> String {
        match &self.directive {
            Some(directive) => directive.clone(),
            None => self.level.as_str().to_lowercase(),
        }
    }
}

/// Install the global subscriber from environment configuration.
///
/// Fails if a global subscriber is already set.
pub fn init() -> Result<(), TryInitError> {
    init_with(&LogConfig::from_env())
}

/// Install the global subscriber from explicit configuration.
pub fn init_with(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(config.filter_directive())
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        Format::Json => registry.with(fmt::layer().json()).try_init(),
        Format::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        Format::Compact => registry.with(fmt::layer().compact()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> LogConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.filter_directive(), "info");
    }

    #[test]
    fn test_debug_flag() {
        assert_eq!(config(&[("RSV360_DEBUG", "1")]).level, Level::DEBUG);
        assert_eq!(config(&[("RSV360_DEBUG", "TRUE")]).level, Level::DEBUG);
        assert_eq!(
            config(&[("RSV360_DEBUG", "1"), ("RSV360_LOG_LEVEL", "warn")]).level,
            Level::WARN
        );
    }

    #[test]
    fn test_rust_log_wins() {
        let config = config(&[
            ("RUST_LOG", "rsv360_payments=trace"),
            ("RSV360_LOG_LEVEL", "error"),
        ]);
        assert_eq!(config.filter_directive(), "rsv360_payments=trace");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("COMPACT"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
        assert_eq!(config(&[("RSV360_LOG_FORMAT", "xml")]).format, Format::Json);
    }
}
