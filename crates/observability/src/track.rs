//! Invoke/return/error records around a unit of work.
//!
//! ```ignore
//! let employee = logger
//!     .track_async(call_info!("create").in_class("EmployeeService").arg("input", &input), async {
//!         store.insert(record).await
//!     })
//!     .await?;
//! ```

use std::fmt::{Debug, Display};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;

use crate::logger::Logger;
use crate::panic_message;
use crate::record::{CallSite, LogLevel, LogType};
use crate::time::readable_duration;
use crate::value::{LogValue, Loggable};

/// Argument names never recorded.
pub const EXCLUDED_ARGS: [&str; 4] = ["assistant_name", "user_id", "self", "cls"];

/// Call-site metadata for a tracked unit. Build it with [`call_info!`].
#[derive(Debug, Clone)]
pub struct CallInfo {
    function: String,
    file: &'static str,
    line: u32,
    column: u32,
    module: &'static str,
    class: Option<String>,
    args: Vec<(String, LogValue)>,
}

/// `CallInfo` for the current source location.
#[macro_export]
macro_rules! call_info {
    ($function:expr) => {
        $crate::CallInfo::new($function, file!(), line!(), column!(), module_path!())
    };
}

impl CallInfo {
    pub fn new(function: &str, file: &'static str, line: u32, column: u32, module: &'static str) -> Self {
        Self {
            function: function.to_string(),
            file,
            line,
            column,
            module,
            class: None,
            args: Vec::new(),
        }
    }

    pub fn in_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn arg<T: Loggable + ?Sized>(mut self, name: &str, value: &T) -> Self {
        if EXCLUDED_ARGS.contains(&name) {
            return self;
        }
        let value = catch_unwind(AssertUnwindSafe(|| value.to_log_value())).unwrap_or_else(|payload| {
            LogValue::Opaque(format!("<unserializable: {}>", panic_message(&*payload)))
        });
        self.args.push((name.to_string(), value));
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn call_site(&self) -> CallSite {
        let mut site = CallSite::new(self.file, self.line, self.column);
        site.function_name = Some(self.function.clone());
        site.class_name = self.class.clone();
        site.module = Some(self.module.to_string());
        site
    }
}

impl Logger {
    /// Run `work`, recording its arguments, result or failure and duration.
    ///
    /// The result is returned unchanged; a panic is resumed after it is
    /// recorded.
    pub fn track<T, E, F>(&self, call: CallInfo, work: F) -> Result<T, E>
    where
        T: Loggable,
        E: Display + Debug,
        F: FnOnce() -> Result<T, E>,
    {
        let started = self.invoked(&call);
        match catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => {
                self.returned(&call, started.elapsed(), &value);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.failed(&call, started.elapsed(), &err.to_string(), format!("{err:?}"));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                self.failed(&call, started.elapsed(), &message, format!("panicked: {message}"));
                resume_unwind(payload)
            }
        }
    }

    /// Async counterpart of [`Logger::track`]; elapsed time spans every
    /// suspension of `work`.
    pub async fn track_async<T, E, Fut>(&self, call: CallInfo, work: Fut) -> Result<T, E>
    where
        T: Loggable,
        E: Display + Debug,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = self.invoked(&call);
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => {
                self.returned(&call, started.elapsed(), &value);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.failed(&call, started.elapsed(), &err.to_string(), format!("{err:?}"));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                self.failed(&call, started.elapsed(), &message, format!("panicked: {message}"));
                resume_unwind(payload)
            }
        }
    }

    fn invoked(&self, call: &CallInfo) -> Instant {
        let args = self
            .serializer()
            .serialize_entry("arguments", &LogValue::Map(call.args.clone()));

        self.record(LogLevel::Debug, "Function called...")
            .log_type(LogType::FunctionInvoke)
            .call_site(call.call_site())
            .extra_details(format!("args: {args}"))
            .payload_json("arguments", args)
            .emit();
        Instant::now()
    }

    fn returned<T: Loggable>(&self, call: &CallInfo, elapsed: Duration, value: &T) {
        let returns = self.serializer().serialize_entry("returns", value);
        let readable = readable_duration(elapsed.as_secs_f64() * 1000.0);

        self.record(LogLevel::Debug, "Function returned")
            .log_type(LogType::FunctionReturn)
            .call_site(call.call_site())
            .extra_details(format!("({readable}), returns: {returns}"))
            .payload_json("returns", returns)
            .payload_json("executionTime", Value::String(readable))
            .elapsed(elapsed)
            .emit();
    }

    fn failed(&self, call: &CallInfo, elapsed: Duration, message: &str, stack: String) {
        let readable = readable_duration(elapsed.as_secs_f64() * 1000.0);

        self.record(LogLevel::Error, message)
            .log_type(LogType::FunctionError)
            .call_site(call.call_site())
            .extra_details(format!("({readable}), {message}"))
            .payload_json("errorStack", Value::String(stack))
            .payload_json("executionTime", Value::String(readable))
            .elapsed(elapsed)
            .emit();
    }
}
