//! Named loggers and the background dispatcher.
//!
//! A [`LoggerFactory`] owns the sinks and one dispatcher thread. Loggers
//! are cheap handles: building a record snapshots the correlation context
//! and call site, serializes the payload, then hands an `Arc<LogRecord>` to
//! the sinks (through the queue, or inline for local sinks when queueing is
//! off). Remote sinks only run on the dispatcher thread.

use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Local;
use serde_json::Map;

use crate::config::{LoggingConfig, ObservabilityError};
use crate::context::CorrelationContext;
use crate::panic_message;
use crate::record::{CallSite, LogLevel, LogRecord, LogType};
use crate::serializer::SafeSerializer;
use crate::sinks::{AlertSink, ConsoleSink, ReqwestTransport, RotatingFileSink, Sink, TelemetrySink};
use crate::value::Loggable;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const DISPATCHER_THREAD: &str = "habbot-log-dispatcher";

type SinkList = Arc<[Arc<dyn Sink>]>;

enum Message {
    Deliver {
        record: Arc<LogRecord>,
        /// Local sinks riding along with a queued record.
        local: Option<SinkList>,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// Write one record to one sink; failures and panics end here.
fn deliver(sink: &dyn Sink, record: &LogRecord) {
    if !sink.accepts(record) {
        return;
    }
    match catch_unwind(AssertUnwindSafe(|| sink.write(record))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(sink = sink.name(), logger = %record.logger, error = %e, "log sink failed"),
        Err(payload) => tracing::warn!(
            sink = sink.name(),
            logger = %record.logger,
            panic = %panic_message(&*payload),
            "log sink panicked"
        ),
    }
}

fn flush_sink(sink: &dyn Sink) {
    match catch_unwind(AssertUnwindSafe(|| sink.flush())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(sink = sink.name(), error = %e, "log sink flush failed"),
        Err(payload) => tracing::warn!(sink = sink.name(), panic = %panic_message(&*payload), "log sink flush panicked"),
    }
}

fn run_dispatcher(rx: Receiver<Message>, remote: Vec<Box<dyn Sink>>) {
    let handle = |msg: Message| -> bool {
        match msg {
            Message::Deliver { record, local } => {
                for sink in local.iter().flat_map(|sinks| sinks.iter()) {
                    deliver(sink.as_ref(), &record);
                }
                for sink in &remote {
                    deliver(sink.as_ref(), &record);
                }
                true
            }
            Message::Flush(ack) => {
                for sink in &remote {
                    flush_sink(sink.as_ref());
                }
                let _ = ack.send(());
                true
            }
            Message::Shutdown => false,
        }
    };

    while let Ok(msg) = rx.recv() {
        if !handle(msg) {
            break;
        }
    }
    // Whatever raced the shutdown still gets written.
    while let Ok(msg) = rx.try_recv() {
        handle(msg);
    }
    for sink in &remote {
        flush_sink(sink.as_ref());
    }
}

struct Dispatcher {
    tx: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    warned: AtomicBool,
    has_remote: bool,
}

impl Dispatcher {
    fn spawn(remote: Vec<Box<dyn Sink>>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let has_remote = !remote.is_empty();
        let handle = std::thread::Builder::new()
            .name(DISPATCHER_THREAD.to_string())
            .spawn(move || run_dispatcher(rx, remote))?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            warned: AtomicBool::new(false),
            has_remote,
        })
    }

    fn send(&self, msg: Message) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.warn_closed();
            return false;
        }
        if self.tx.send(msg).is_err() {
            self.warn_closed();
            return false;
        }
        true
    }

    fn warn_closed(&self) {
        if !self.warned.swap(true, Ordering::AcqRel) {
            tracing::warn!("log dispatcher is shut down; writing local sinks inline, remote sinks skipped");
        }
    }

    fn flush(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(Message::Flush(ack_tx)).is_ok() && ack_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
            tracing::warn!(timeout_secs = FLUSH_TIMEOUT.as_secs(), "log flush timed out");
        }
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Message::Shutdown);

        let handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("log dispatcher thread panicked");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerOptions {
    /// Route every record through the dispatcher queue.
    pub queue_logger: bool,
    /// Attach the request's correlation ids.
    pub is_request: bool,
    pub log_stream_name: Option<String>,
    pub console: bool,
    pub file: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            queue_logger: true,
            is_request: true,
            log_stream_name: None,
            console: true,
            file: true,
        }
    }
}

impl LoggerOptions {
    /// Options for loggers outside any request (startup, auth helpers).
    pub fn non_request() -> Self {
        Self {
            is_request: false,
            ..Self::default()
        }
    }

    pub fn unqueued(mut self) -> Self {
        self.queue_logger = false;
        self
    }

    pub fn stream(mut self, name: impl Into<String>) -> Self {
        self.log_stream_name = Some(name.into());
        self
    }
}

#[derive(Default)]
pub struct LoggerFactoryBuilder {
    console: Option<Arc<dyn Sink>>,
    file: Option<Arc<dyn Sink>>,
    extra: Vec<Arc<dyn Sink>>,
    remote: Vec<Box<dyn Sink>>,
    serializer: SafeSerializer,
}

impl LoggerFactoryBuilder {
    pub fn console(mut self, sink: impl Sink + 'static) -> Self {
        self.console = Some(Arc::new(sink));
        self
    }

    pub fn file(mut self, sink: impl Sink + 'static) -> Self {
        self.file = Some(Arc::new(sink));
        self
    }

    /// An additional local sink attached to every logger.
    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.extra.push(Arc::new(sink));
        self
    }

    /// A sink that is only ever written from the dispatcher thread.
    pub fn remote(mut self, sink: impl Sink + 'static) -> Self {
        self.remote.push(Box::new(sink));
        self
    }

    pub fn serializer(mut self, serializer: SafeSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn build(self) -> Result<LoggerFactory, ObservabilityError> {
        let dispatcher = Dispatcher::spawn(self.remote)?;
        Ok(LoggerFactory {
            console: self.console,
            file: self.file,
            extra: self.extra,
            serializer: self.serializer,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

pub struct LoggerFactory {
    console: Option<Arc<dyn Sink>>,
    file: Option<Arc<dyn Sink>>,
    extra: Vec<Arc<dyn Sink>>,
    serializer: SafeSerializer,
    dispatcher: Arc<Dispatcher>,
}

impl LoggerFactory {
    pub fn builder() -> LoggerFactoryBuilder {
        LoggerFactoryBuilder::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Result<Self, ObservabilityError> {
        let mut builder = Self::builder();
        if config.console_enabled {
            builder = builder.console(ConsoleSink::stdout());
        }
        if config.file_enabled {
            builder = builder.file(RotatingFileSink::open(
                &config.log_dir,
                config.file_max_bytes,
                config.file_backups,
            )?);
        }
        if let Some(telemetry) = &config.telemetry {
            let transport = ReqwestTransport::new(Duration::from_secs(10));
            builder = builder.remote(TelemetrySink::new(telemetry.clone(), Box::new(transport)));
        }
        if let Some(teams) = &config.teams {
            builder = builder.remote(AlertSink::with_reqwest(teams));
        }
        builder.build()
    }

    pub fn get_logger(&self, name: &str, options: LoggerOptions) -> Logger {
        let mut local: Vec<Arc<dyn Sink>> = Vec::new();
        if options.console {
            local.extend(self.console.clone());
        }
        if options.file {
            local.extend(self.file.clone());
        }
        local.extend(self.extra.iter().cloned());

        let stream = options.log_stream_name.clone().unwrap_or_else(|| name.to_string());
        Logger {
            name: Arc::from(name),
            stream: Arc::from(stream),
            queued: options.queue_logger,
            is_request: options.is_request,
            local: local.into(),
            serializer: self.serializer,
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    pub fn serializer(&self) -> SafeSerializer {
        self.serializer
    }

    /// Drain the queue and flush every sink.
    pub fn flush(&self) {
        self.dispatcher.flush();
        for sink in self.console.iter().chain(self.file.iter()).chain(self.extra.iter()) {
            flush_sink(sink.as_ref());
        }
    }

    /// Drain, stop and join the dispatcher. Later records go to local
    /// sinks inline.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
        for sink in self.console.iter().chain(self.file.iter()).chain(self.extra.iter()) {
            flush_sink(sink.as_ref());
        }
    }
}

impl Drop for LoggerFactory {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    stream: Arc<str>,
    queued: bool,
    is_request: bool,
    local: SinkList,
    serializer: SafeSerializer,
    dispatcher: Arc<Dispatcher>,
}

impl core::fmt::Debug for Logger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("stream", &self.stream)
            .field("queued", &self.queued)
            .field("is_request", &self.is_request)
            .field("sinks", &self.local.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serializer(&self) -> SafeSerializer {
        self.serializer
    }

    /// Start a record at the caller's location.
    #[track_caller]
    pub fn record(&self, level: LogLevel, message: impl Into<String>) -> RecordBuilder<'_> {
        let context = if self.is_request {
            CorrelationContext::current()
        } else {
            CorrelationContext::default()
        };

        RecordBuilder {
            logger: self,
            record: LogRecord {
                logger: self.name.to_string(),
                stream: self.stream.to_string(),
                level,
                message: message.into(),
                log_type: LogType::Default,
                audit_at: Local::now(),
                context,
                call_site: CallSite::from_location(Location::caller()),
                payload: Map::new(),
                extra_details: None,
                elapsed: None,
                alert: false,
            },
        }
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.record(LogLevel::Debug, message).emit();
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message).emit();
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) {
        self.record(LogLevel::Warning, message).emit();
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message).emit();
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        self.record(LogLevel::Critical, message).emit();
    }

    /// Block until everything queued so far has been handed to the sinks.
    pub fn flush(&self) {
        self.dispatcher.flush();
        for sink in self.local.iter() {
            flush_sink(sink.as_ref());
        }
    }

    fn dispatch(&self, record: LogRecord) {
        let record = Arc::new(record);
        if self.queued {
            let msg = Message::Deliver {
                record: Arc::clone(&record),
                local: Some(Arc::clone(&self.local)),
            };
            if !self.dispatcher.send(msg) {
                self.write_local(&record);
            }
            return;
        }

        self.write_local(&record);
        if self.dispatcher.has_remote {
            self.dispatcher.send(Message::Deliver { record, local: None });
        }
    }

    fn write_local(&self, record: &LogRecord) {
        for sink in self.local.iter() {
            deliver(sink.as_ref(), record);
        }
    }
}

#[must_use = "a record is only logged by `emit`"]
pub struct RecordBuilder<'a> {
    logger: &'a Logger,
    record: LogRecord,
}

impl RecordBuilder<'_> {
    pub fn log_type(mut self, log_type: LogType) -> Self {
        self.record.log_type = log_type;
        self
    }

    /// Add a payload member, passed through the safe serializer.
    pub fn payload<T: Loggable + ?Sized>(mut self, key: &str, value: &T) -> Self {
        let safe = self.logger.serializer.serialize_entry(key, value);
        self.record.payload.insert(key.to_string(), safe);
        self
    }

    /// Add a payload member that is already JSON-safe.
    pub fn payload_json(mut self, key: &str, value: serde_json::Value) -> Self {
        self.record.payload.insert(key.to_string(), value);
        self
    }

    pub fn extra_details(mut self, details: impl Into<String>) -> Self {
        self.record.extra_details = Some(details.into());
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.record.elapsed = Some(elapsed);
        self
    }

    /// Also deliver to the chat-alert sink.
    pub fn alert(mut self) -> Self {
        self.record.alert = true;
        self
    }

    pub fn call_site(mut self, call_site: CallSite) -> Self {
        self.record.call_site = call_site;
        self
    }

    pub fn emit(self) {
        self.logger.dispatch(self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{MemorySink, SinkError};
    use serde_json::json;

    fn factory(mem: &MemorySink) -> LoggerFactory {
        LoggerFactory::builder().sink(mem.clone()).build().unwrap()
    }

    /// Remote sink that remembers which thread wrote each record.
    #[derive(Clone, Default)]
    struct ThreadRecorder(Arc<Mutex<Vec<String>>>);

    impl Sink for ThreadRecorder {
        fn name(&self) -> &str {
            "thread-recorder"
        }

        fn write(&self, _record: &LogRecord) -> Result<(), SinkError> {
            let name = std::thread::current().name().unwrap_or("").to_string();
            self.0.lock().unwrap().push(name);
            Ok(())
        }
    }

    struct Exploding;

    impl Sink for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn write(&self, _record: &LogRecord) -> Result<(), SinkError> {
            panic!("sink blew up");
        }
    }

    struct Failing;

    impl Sink for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn write(&self, _record: &LogRecord) -> Result<(), SinkError> {
            Err(SinkError::Http("down".into()))
        }
    }

    #[test]
    fn queued_records_arrive_in_order_after_flush() {
        let mem = MemorySink::new();
        let factory = factory(&mem);
        let logger = factory.get_logger("Svc", LoggerOptions::default());

        for i in 0..20 {
            logger.info(format!("m{i}"));
        }
        logger.flush();

        let expected: Vec<_> = (0..20).map(|i| format!("m{i}")).collect();
        assert_eq!(mem.messages(), expected);
    }

    #[test]
    fn unqueued_loggers_write_inline_and_remote_sinks_stay_on_the_dispatcher() {
        let mem = MemorySink::new();
        let recorder = ThreadRecorder::default();
        let factory = LoggerFactory::builder()
            .sink(mem.clone())
            .remote(recorder.clone())
            .build()
            .unwrap();
        let logger = factory.get_logger("Svc", LoggerOptions::default().unqueued());

        logger.info("inline");
        assert_eq!(mem.messages(), ["inline"]);

        logger.flush();
        assert_eq!(*recorder.0.lock().unwrap(), [DISPATCHER_THREAD]);
    }

    #[test]
    fn failing_sinks_do_not_affect_others() {
        let mem = MemorySink::new();
        let factory = LoggerFactory::builder()
            .sink(Exploding)
            .sink(Failing)
            .sink(mem.clone())
            .build()
            .unwrap();
        let logger = factory.get_logger("Svc", LoggerOptions::default());

        logger.error("still delivered");
        logger.error("and again");
        logger.flush();
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn records_survive_shutdown_through_local_sinks() {
        let mem = MemorySink::new();
        let factory = factory(&mem);
        let logger = factory.get_logger("Svc", LoggerOptions::default());

        logger.info("before");
        factory.shutdown();
        logger.info("after");
        logger.flush();
        assert_eq!(mem.messages(), ["before", "after"]);
    }

    #[test]
    fn request_loggers_read_the_correlation_scope() {
        let mem = MemorySink::new();
        let factory = factory(&mem);
        let request = factory.get_logger("Req", LoggerOptions::default());
        let startup = factory.get_logger("Startup", LoggerOptions::non_request());

        CorrelationContext::new("r-42")
            .with_user(Some("u-1".into()))
            .sync_scope(|| {
                request.info("in request");
                startup.info("not a request logger");
            });
        factory.flush();

        let records = mem.records();
        assert_eq!(records[0].context.request_tag(), "rid-r-42");
        assert_eq!(records[0].context.user_tag(), "uid-u-1");
        assert_eq!(records[1].context.request_tag(), "rid-None");
    }

    #[test]
    fn builder_fills_the_record() {
        let mem = MemorySink::new();
        let factory = factory(&mem);
        let logger = factory.get_logger("Svc", LoggerOptions::default().stream("svc-stream"));

        let line = line!() + 1;
        let builder = logger.record(LogLevel::Warning, "built");
        builder
            .log_type(LogType::RequestEnd)
            .payload("body", &json!({"password": "x", "ok": true}))
            .payload("token", "abc")
            .extra_details("details")
            .elapsed(Duration::from_millis(3))
            .alert()
            .emit();
        factory.flush();

        let record = &mem.records()[0];
        assert_eq!(record.stream, "svc-stream");
        assert_eq!(record.log_type, LogType::RequestEnd);
        assert_eq!(record.payload["body"], json!({"password": "***redacted***", "ok": true}));
        assert_eq!(record.payload["token"], "***redacted***");
        assert!(record.alert);
        assert_eq!(record.call_site.line, line);
        assert!(record.call_site.file_path.ends_with("logger.rs"));
    }

    #[test]
    fn logger_options_select_factory_sinks() {
        let console = MemorySink::new();
        let file = MemorySink::new();
        let factory = LoggerFactory::builder()
            .console(console.clone())
            .file(file.clone())
            .build()
            .unwrap();
        let options = LoggerOptions {
            file: false,
            ..LoggerOptions::default()
        };
        factory.get_logger("Svc", options).info("console only");
        factory.flush();

        assert_eq!(console.len(), 1);
        assert!(file.is_empty());
    }
}
