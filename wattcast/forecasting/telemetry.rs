use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Builder for forecasting telemetry sinks.
pub struct ForecastTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
}

impl ForecastTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Info,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the minimum level written to the sink.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<ForecastTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(ForecastTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
            }),
        })
    }
}

/// Telemetry handle shared across pipeline stages and request handlers.
#[derive(Clone)]
pub struct ForecastTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for ForecastTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForecastTelemetry")
            .field("module", &self.inner.module)
            .field("enabled", &self.inner.logger.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
}

impl ForecastTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> ForecastTelemetryBuilder {
        ForecastTelemetryBuilder::new(module)
    }

    /// Telemetry that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: "wattcast".into(),
                logger: None,
            }),
        }
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Logs and swallows sink failures; telemetry never aborts a run.
    pub fn emit(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Err(err) = self.log(level, message, metadata) {
            eprintln!("telemetry write failed: {err:?}");
        }
    }
}

impl Default for ForecastTelemetry {
    fn default() -> Self {
        Self::disabled()
    }
}
