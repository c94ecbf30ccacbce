//! Logging setup and configuration
//!
//! Diagnostics always go to stderr; stdout is reserved for data read from the
//! device.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// How much diagnostic output a run produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verbosity {
    /// No diagnostics at all, regardless of `RUST_LOG`
    Quiet,
    /// Diagnostics filtered by `RUST_LOG`, falling back to the given level
    Level(String),
}

impl Verbosity {
    pub fn is_quiet(&self) -> bool {
        matches!(self, Verbosity::Quiet)
    }

    /// Build the filter this verbosity stands for
    pub fn filter(&self) -> crate::Result<EnvFilter> {
        match self {
            Verbosity::Quiet => Ok(EnvFilter::new("off")),
            Verbosity::Level(level) => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(level))
                .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e))),
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Level("debug".to_string())
    }
}

/// Setup tracing subscriber for the application
pub fn setup_logging(verbosity: &Verbosity) -> crate::Result<()> {
    let filter = verbosity.filter()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Logging already initialized: {}", e)))?;

    Ok(())
}
