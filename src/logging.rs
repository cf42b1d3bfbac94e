use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

/// Installs the global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Stdout stays reserved for reports.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => {
            let layer = subscriber_fmt::layer()
                .json()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_ansi(false);
            registry.with(layer).init();
        }
        LogFormat::Text => {
            let layer = subscriber_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(false);
            registry.with(layer).init();
        }
    }
}
