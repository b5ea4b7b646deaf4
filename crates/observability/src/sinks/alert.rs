//! Chat alerts: MS Teams message cards, one webhook per level.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use super::{Sink, SinkError};
use crate::config::TeamsConfig;
use crate::record::{LogLevel, LogRecord};

/// Delivery of one JSON body to a URL.
pub trait AlertTransport: Send + Sync {
    fn post(&self, url: &str, body: &Value) -> Result<(), SinkError>;
}

/// Blocking reqwest client, built on first use (on the dispatcher thread).
#[derive(Default)]
pub struct ReqwestTransport {
    client: OnceLock<reqwest::blocking::Client>,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            timeout: Some(timeout),
        }
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(|| {
            let builder = reqwest::blocking::Client::builder();
            let builder = match self.timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            };
            builder.build().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default http client");
                reqwest::blocking::Client::new()
            })
        })
    }
}

impl AlertTransport for ReqwestTransport {
    fn post(&self, url: &str, body: &Value) -> Result<(), SinkError> {
        let response = self
            .client()
            .post(url)
            .json(body)
            .send()
            .map_err(|e| SinkError::Http(e.to_string()))?;
        response
            .error_for_status()
            .map(drop)
            .map_err(|e| SinkError::Http(e.to_string()))
    }
}

fn theme_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "3B8EEA",
        LogLevel::Info => "39FF14",
        LogLevel::Warning => "E5E510",
        LogLevel::Error => "CD3131",
        LogLevel::Critical => "8B0000",
    }
}

/// The `<pre>`-wrapped, 4-space indented JSON body of an alert card.
fn card_text(record: &LogRecord) -> Result<String, SinkError> {
    let details = json!({
        "process": record.logger,
        "message": record.message,
        "fullPath": record.call_site.file_path,
        "lineNo": record.call_site.line,
        "auditAt": Utc::now().to_rfc3339(),
    });

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    details.serialize(&mut ser)?;
    Ok(format!("<pre>{}</pre>", String::from_utf8_lossy(&buf)))
}

pub fn teams_card(record: &LogRecord) -> Result<Value, SinkError> {
    Ok(json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "themeColor": theme_color(record.level),
        "summary": record.message,
        "text": card_text(record)?,
    }))
}

pub struct AlertSink {
    webhooks: BTreeMap<LogLevel, String>,
    retries: u32,
    retry_delay: Duration,
    transport: Box<dyn AlertTransport>,
}

impl AlertSink {
    pub fn new(config: &TeamsConfig, transport: Box<dyn AlertTransport>) -> Self {
        Self {
            webhooks: config.webhooks.clone(),
            retries: config.retries.max(1),
            retry_delay: config.retry_delay,
            transport,
        }
    }

    pub fn with_reqwest(config: &TeamsConfig) -> Self {
        Self::new(config, Box::new(ReqwestTransport::new(Duration::from_secs(10))))
    }
}

impl Sink for AlertSink {
    fn name(&self) -> &str {
        "teams"
    }

    fn accepts(&self, record: &LogRecord) -> bool {
        record.alert && self.webhooks.contains_key(&record.level)
    }

    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let Some(url) = self.webhooks.get(&record.level) else {
            return Ok(());
        };
        let card = teams_card(record)?;

        let mut last = String::new();
        for attempt in 1..=self.retries {
            match self.transport.post(url, &card) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last = e.to_string();
                    if attempt < self.retries {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(SinkError::Exhausted {
            attempts: self.retries,
            last,
        })
    }
}
