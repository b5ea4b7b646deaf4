use serde_json::{Value, json};

use super::alert::AlertTransport;
use super::{Sink, SinkError};
use crate::config::TelemetryConfig;
use crate::record::LogRecord;

/// One-event batch for the log collector. The stream is the logger's
/// configured stream name.
pub fn telemetry_batch(log_group: &str, record: &LogRecord) -> Result<Value, SinkError> {
    let message = serde_json::to_string(&record.to_json())?;
    Ok(json!({
        "logGroup": log_group,
        "logStream": record.stream,
        "events": [{
            "timestamp": record.audit_at.timestamp_millis(),
            "message": message,
        }],
    }))
}

pub struct TelemetrySink {
    config: TelemetryConfig,
    transport: Box<dyn AlertTransport>,
}

impl TelemetrySink {
    pub fn new(config: TelemetryConfig, transport: Box<dyn AlertTransport>) -> Self {
        Self { config, transport }
    }
}

impl Sink for TelemetrySink {
    fn name(&self) -> &str {
        "telemetry"
    }

    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let batch = telemetry_batch(&self.config.log_group, record)?;
        self.transport.post(&self.config.endpoint, &batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample;

    #[test]
    fn batch_carries_stream_and_record() {
        let mut record = sample();
        record.stream = "request-stream".into();
        let batch = telemetry_batch("habbot", &record).unwrap();

        assert_eq!(batch["logGroup"], "habbot");
        assert_eq!(batch["logStream"], "request-stream");
        let message: Value = serde_json::from_str(batch["events"][0]["message"].as_str().unwrap()).unwrap();
        assert_eq!(message["message"], "hello");
    }
}
