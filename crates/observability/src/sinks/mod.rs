//! Record destinations.
//!
//! Local sinks (console, file, memory) are cheap and may run on the
//! caller. Remote sinks (telemetry, alert webhooks) only ever run on the
//! dispatcher thread.

mod alert;
mod console;
mod file;
mod memory;
mod telemetry;

pub use alert::{AlertSink, AlertTransport, ReqwestTransport, teams_card};
pub use console::{ConsoleSink, format_console_line};
pub use file::RotatingFileSink;
pub use memory::MemorySink;
pub use telemetry::{TelemetrySink, telemetry_batch};

use thiserror::Error;

use crate::record::LogRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("http: {0}")]
    Http(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this sink wants the record at all.
    fn accepts(&self, _record: &LogRecord) -> bool {
        true
    }

    fn write(&self, record: &LogRecord) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn accepts(&self, record: &LogRecord) -> bool {
        (**self).accepts(record)
    }

    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        (**self).write(record)
    }

    fn flush(&self) -> Result<(), SinkError> {
        (**self).flush()
    }
}
