//! Human-readable, colorized console lines:
//!
//! `auditAt | LEVEL | uid-.. | rid-.. | sid-.. | LOG_TYPE | qualname | message | details`

use std::io::Write;
use std::sync::Mutex;

use super::{Sink, SinkError};
use crate::record::{LogLevel, LogRecord, LogType};
use crate::time::readable_duration;

mod ansi {
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &str = "\x1b[95m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
    pub const BRIGHT_ORANGE: &str = "\x1b[38;2;255;165;0m";
    pub const NEON_GREEN: &str = "\x1b[38;2;57;255;20m";
    pub const BOLD_YELLOW: &str = "\x1b[1;33m";
    pub const BOLD_RED: &str = "\x1b[1;31m";
    pub const BOLD_GREEN: &str = "\x1b[1;32m";
    pub const BOLD_MAGENTA: &str = "\x1b[1;35m";
    pub const BOLD_CYAN: &str = "\x1b[1;38;2;0;255;255m";
    pub const BOLD_GOLD: &str = "\x1b[1;38;2;255;215;0m";
    pub const UNDERLINE_BOLD_RED: &str = "\x1b[4;1;31m";
    pub const RESET: &str = "\x1b[0;0;37m";
}

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => ansi::BRIGHT_BLUE,
        LogLevel::Info => ansi::NEON_GREEN,
        LogLevel::Warning => ansi::BOLD_YELLOW,
        LogLevel::Error => ansi::BOLD_RED,
        LogLevel::Critical => ansi::UNDERLINE_BOLD_RED,
    }
}

fn type_color(log_type: LogType) -> &'static str {
    match log_type {
        LogType::Startup => ansi::NEON_GREEN,
        LogType::RequestInit | LogType::RequestEnd => ansi::BOLD_CYAN,
        LogType::FunctionInvoke => ansi::BOLD_MAGENTA,
        LogType::FunctionReturn => ansi::BOLD_GREEN,
        LogType::FunctionError => ansi::BOLD_RED,
        LogType::Default => ansi::BRIGHT_WHITE,
    }
}

pub fn format_console_line(record: &LogRecord, colored: bool) -> String {
    let paint = |color: &str, text: &str| {
        if colored {
            format!("{color}{text}{}", ansi::RESET)
        } else {
            text.to_string()
        }
    };

    let details = match (&record.extra_details, record.elapsed_ms()) {
        (Some(details), Some(ms)) => {
            // The readable duration leads the details as "(..)".
            let prefix = format!("({})", readable_duration(ms));
            match details.strip_prefix(&prefix) {
                Some(rest) => format!("{}{rest}", paint(ansi::BOLD_GOLD, &prefix)),
                None => details.clone(),
            }
        }
        (Some(details), None) => details.clone(),
        (None, Some(ms)) => paint(ansi::BOLD_GOLD, &format!("({})", readable_duration(ms))),
        (None, None) => String::new(),
    };

    let mut fields = vec![
        paint(ansi::BRIGHT_MAGENTA, &record.audit_at_text()),
        paint(level_color(record.level), record.level.as_str()),
        paint(ansi::BRIGHT_YELLOW, &record.context.user_tag()),
        paint(ansi::BRIGHT_BLUE, &record.context.request_tag()),
        paint(ansi::BRIGHT_ORANGE, &record.context.session_tag()),
        paint(type_color(record.log_type), record.log_type.as_str()),
        paint(ansi::BRIGHT_WHITE, &record.qualname()),
        record.message.clone(),
    ];
    if !details.is_empty() {
        fields.push(details);
    }
    fields.join(" | ")
}

/// Writes one line per record to stdout (or any writer, in tests).
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    colored: bool,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()), true)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, colored: bool) -> Self {
        Self {
            out: Mutex::new(out),
            colored,
        }
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = format_console_line(record, self.colored);
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{line}")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.flush()?;
        Ok(())
    }
}
