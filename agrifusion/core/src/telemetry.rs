use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};

/// Builder for [`AdvisorTelemetry`].
pub struct AdvisorTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl AdvisorTelemetryBuilder {
    /// Creates a builder scoped to a module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            sinks: Vec::new(),
        }
    }

    /// Writes JSON lines to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops file records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Adds an extra sink, e.g. an in-memory logger.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Opens the log file, if any, and builds the handle.
    pub fn build(self) -> Result<AdvisorTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::with_min_level(path, self.min_level)?));
        }
        Ok(AdvisorTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sinks,
            }),
        })
    }
}

/// Cheaply cloneable logging handle shared by the service and its pipelines.
#[derive(Clone)]
pub struct AdvisorTelemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    module: String,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl fmt::Debug for AdvisorTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorTelemetry")
            .field("module", &self.inner.module)
            .field("sinks", &self.inner.sinks.len())
            .finish()
    }
}

impl AdvisorTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> AdvisorTelemetryBuilder {
        AdvisorTelemetryBuilder::new(module)
    }

    /// Handle that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: String::new(),
                sinks: Vec::new(),
            }),
        }
    }

    /// Same sinks under another module label.
    #[must_use]
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                sinks: self.inner.sinks.clone(),
            }),
        }
    }

    /// Module label attached to records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Writes a record to every sink, stopping at the first failure.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if self.inner.sinks.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        for sink in &self.inner.sinks {
            sink.log(&record)?;
        }
        Ok(())
    }

    /// Like [`Self::log`], but a failing sink never reaches the caller.
    pub fn record(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Err(err) = self.log(level, message, metadata) {
            eprintln!("telemetry sink failed: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_logging::MemoryLogger;
    use tempfile::tempdir;

    #[test]
    fn writes_file_and_extra_sinks() {
        let tmp = tempdir().unwrap();
        let log_path = tmp.path().join("advisor.log");
        let memory = Arc::new(MemoryLogger::new());
        let telemetry = AdvisorTelemetry::builder("advisor")
            .log_path(&log_path)
            .sink(memory.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "artifact.load.start", json!({ "pipeline": "crop" }))
            .unwrap();
        assert!(std::fs::read_to_string(&log_path)
            .unwrap()
            .contains("artifact.load.start"));
        let records = memory.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module, "advisor");
        assert_eq!(records[0].metadata["pipeline"], json!("crop"));
    }

    #[test]
    fn scoped_handles_share_sinks() {
        let memory = Arc::new(MemoryLogger::new());
        let telemetry = AdvisorTelemetry::builder("advisor")
            .sink(memory.clone())
            .build()
            .unwrap();
        telemetry
            .scoped("fertility")
            .record(LogLevel::Warn, "pipeline.run.failed", json!({}));
        assert_eq!(memory.snapshot()[0].module, "fertility");
        assert_eq!(telemetry.module(), "advisor");
    }

    #[test]
    fn disabled_handle_is_silent() {
        AdvisorTelemetry::disabled()
            .log(LogLevel::Error, "ignored", json!({}))
            .unwrap();
    }
}
