//! Structured logging for the request path.
//!
//! - [`serializer`]: total, bounded conversion of arbitrary values to JSON
//! - [`logger`]: named loggers feeding console/file/remote sinks through one
//!   background dispatcher
//! - [`track`]: invoke/return/error records around a unit of work
//! - [`context`]: per-request correlation ids (task-local)
//!
//! Process diagnostics (sink failures, startup problems) go through
//! `tracing`, configured by [`init`].

pub mod config;
pub mod context;
pub mod logger;
pub mod record;
pub mod serializer;
pub mod sinks;
pub mod time;
pub mod track;
pub mod tracing;
pub mod value;

pub use config::{LoggingConfig, ObservabilityError, TeamsConfig, TelemetryConfig};
pub use context::CorrelationContext;
pub use logger::{Logger, LoggerFactory, LoggerFactoryBuilder, LoggerOptions, RecordBuilder};
pub use record::{CallSite, LogLevel, LogRecord, LogType};
pub use serializer::{SafeSerializer, SerializerLimits};
pub use sinks::{MemorySink, Sink, SinkError};
pub use track::CallInfo;
pub use value::{LogValue, Loggable, SharedValue};

/// Initialize process-wide `tracing` diagnostics.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
