//! Tracing subscriber setup and span timing.

use crate::config::LoggingConfig;
use crate::errors::ExecGraphError;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directive (e.g. `execgraph=debug`).
pub const LOG_ENV_VAR: &str = "EXECGRAPH_LOG";

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `EXECGRAPH_LOG` when set, otherwise from
/// `config.level`. Calling this again after a subscriber is installed is a
/// no-op.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ExecGraphError> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ExecGraphError::Observability(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("build_graph");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "build_graph");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LoggingConfig::default().with_level("debug");
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_init_tracing_rejects_bad_directive() {
        if std::env::var(LOG_ENV_VAR).is_ok() {
            return;
        }
        let config = LoggingConfig::default().with_level("execgraph=notalevel");
        assert!(init_tracing(&config).is_err());
    }
}
