use std::panic::Location;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::CorrelationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl core::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical event type of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    Startup,
    RequestInit,
    RequestEnd,
    FunctionInvoke,
    FunctionReturn,
    FunctionError,
    #[default]
    Default,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Startup => "STARTUP",
            LogType::RequestInit => "REQUEST_INIT",
            LogType::RequestEnd => "REQUEST_END",
            LogType::FunctionInvoke => "FUNCTION_INVOKE",
            LogType::FunctionReturn => "FUNCTION_RETURN",
            LogType::FunctionError => "FUNCTION_ERROR",
            LogType::Default => "DEFAULT",
        }
    }
}

impl core::fmt::Display for LogType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file_name: String,
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub module: Option<String>,
}

impl CallSite {
    pub fn from_location(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line(), location.column())
    }

    pub fn new(file: &str, line: u32, column: u32) -> Self {
        let file_name = std::path::Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());
        Self {
            file_name,
            file_path: file.to_string(),
            line,
            column,
            function_name: None,
            class_name: None,
            module: None,
        }
    }

    /// `<class or logger>.<function or N/A>`.
    pub fn qualname(&self, logger_name: &str) -> String {
        let owner = self.class_name.as_deref().unwrap_or(logger_name);
        let function = self.function_name.as_deref().unwrap_or("N/A");
        format!("{owner}.{function}")
    }
}

/// One emitted log event. Shared read-only between sinks.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub logger: String,
    pub stream: String,
    pub level: LogLevel,
    pub message: String,
    pub log_type: LogType,
    pub audit_at: DateTime<Local>,
    pub context: CorrelationContext,
    pub call_site: CallSite,
    /// Already passed through the safe serializer.
    pub payload: Map<String, Value>,
    pub extra_details: Option<String>,
    pub elapsed: Option<Duration>,
    pub alert: bool,
}

pub const AUDIT_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

impl LogRecord {
    pub fn audit_at_text(&self) -> String {
        self.audit_at.format(AUDIT_AT_FORMAT).to_string()
    }

    pub fn qualname(&self) -> String {
        self.call_site.qualname(&self.logger)
    }

    pub fn elapsed_ms(&self) -> Option<f64> {
        self.elapsed.map(|d| d.as_secs_f64() * 1000.0)
    }

    /// The JSON-lines shape. Null members are dropped at every depth.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        let mut put = |key: &str, value: Value| {
            out.insert(key.to_string(), value);
        };

        put("auditAt", Value::String(self.audit_at.to_rfc3339()));
        put("name", Value::String(self.logger.clone()));
        put("level", Value::String(self.level.as_str().to_string()));
        put("logType", Value::String(self.log_type.as_str().to_string()));
        put("message", Value::String(self.message.clone()));
        put("requestId", self.context.request_tag().into());
        put("userId", self.context.user_tag().into());
        put("sessionId", self.context.session_tag().into());
        put("qualName", self.qualname().into());
        put("fileName", self.call_site.file_name.clone().into());
        put("fullPath", self.call_site.file_path.clone().into());
        put("lineNo", self.call_site.line.into());
        put("colNo", self.call_site.column.into());
        put("functionName", self.call_site.function_name.clone().into());
        put("className", self.call_site.class_name.clone().into());
        put("module", self.call_site.module.clone().into());
        put("extraDetails", self.extra_details.clone().into());
        put("executionTimeMs", self.elapsed_ms().into());
        put("sendInTeams", self.alert.into());

        for (key, value) in &self.payload {
            out.insert(key.clone(), value.clone());
        }
        drop_nulls(Value::Object(out))
    }
}

fn drop_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, drop_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(drop_nulls).collect()),
        other => other,
    }
}
