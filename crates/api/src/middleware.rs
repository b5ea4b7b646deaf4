//! Request logging: one `REQUEST_INIT` and one `REQUEST_END` record per
//! request, every record in between tagged with the request's correlation
//! ids.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequestParts, Query, RawPathParams, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header, request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::{FutureExt, Stream};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Value, json};

use habbot_auth::JwtValidator;
use habbot_observability::time::readable_duration;
use habbot_observability::track::EXCLUDED_ARGS;
use habbot_observability::{
    CorrelationContext, LogLevel, LogType, LogValue, Logger, LoggerFactory, LoggerOptions, panic_message,
};

use crate::context::bearer_token;

/// Served without request logging.
pub const EXCLUDED_PATHS: [&str; 2] = ["/", "/api/health"];

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub static SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Largest request body buffered for logging; axum's default extractor limit.
pub const MAX_REQUEST_BODY: usize = 2 * 1024 * 1024;

const STREAM_COMPLETED: &str = "✅ Streaming request completed successfully";

#[derive(Clone)]
pub struct RequestLogState {
    jwt: Arc<dyn JwtValidator>,
    logger: Logger,
}

impl RequestLogState {
    pub fn new(jwt: Arc<dyn JwtValidator>, logs: &LoggerFactory) -> Self {
        Self {
            jwt,
            logger: logs.get_logger("AppMiddleware", LoggerOptions::default()),
        }
    }
}

pub async fn request_logging(State(state): State<RequestLogState>, req: Request, next: Next) -> Response {
    if EXCLUDED_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }
    let started = Instant::now();

    // Best effort: a bad token only costs the user id.
    let (user_id, decode_error) = match bearer_token(req.headers()).map(|t| state.jwt.decode(t)) {
        None => (None, None),
        Some(Ok(claims)) => (claims.user_id.map(|id| id.to_string()), None),
        Some(Err(err)) => (None, Some(err)),
    };
    let request_id =
        header_text(req.headers(), &REQUEST_ID_HEADER).unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let context = CorrelationContext::new(request_id)
        .with_session(header_text(req.headers(), &SESSION_ID_HEADER))
        .with_user(user_id);

    context
        .clone()
        .scope(async move {
            if let Some(err) = decode_error {
                state
                    .logger
                    .warning(format!("Error in decoding jwt token in middleware - {err}"));
            }
            let mut response = handle(&state.logger, &context, req, next, started).await;
            if let Some(value) = context.request_id.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
                response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
            }
            response
        })
        .await
}

async fn handle(
    logger: &Logger,
    context: &CorrelationContext,
    req: Request,
    next: Next,
    started: Instant,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_REQUEST_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => {
            return failed(
                logger,
                started,
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {MAX_REQUEST_BODY} bytes"),
            );
        }
        Err(err) => {
            return failed(
                logger,
                started,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read request body: {err}"),
            );
        }
    };
    log_request_init(logger, &mut parts, &body).await;

    let req = Request::from_parts(parts, Body::from(body));
    let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            return failed(logger, started, StatusCode::INTERNAL_SERVER_ERROR, panic_message(&*payload));
        }
    };

    if is_event_stream(response.headers()) {
        return with_stream_end_log(response, logger.clone(), context.clone(), started);
    }

    let (parts, body) = response.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return failed(
                logger,
                started,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read response body: {err}"),
            );
        }
    };
    log_request_end(
        logger,
        LogLevel::Info,
        "✅ Request completed successfully",
        parts.status,
        &parts.headers,
        body_value(&body),
        started.elapsed(),
    );
    Response::from_parts(parts, Body::from(body))
}

async fn log_request_init(logger: &Logger, parts: &mut request::Parts, body: &Bytes) {
    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();

    let body: Value = match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({}),
    };
    let args: serde_json::Map<String, Value> = body
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(key, _)| !EXCLUDED_ARGS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let args = logger.serializer().serialize(&LogValue::from(Value::Object(args)));

    let params: Vec<(String, LogValue)> = match RawPathParams::from_request_parts(parts, &()).await {
        Ok(raw) => raw.iter().map(|(k, v)| (k.to_string(), LogValue::Str(v.to_string()))).collect(),
        Err(_) => Vec::new(),
    };
    let query: Vec<(String, LogValue)> = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q.into_iter().map(|(k, v)| (k, LogValue::Str(v))).collect())
        .unwrap_or_default();
    let callee = match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => LogValue::map([
            ("host", LogValue::Str(addr.ip().to_string())),
            ("port", LogValue::UInt(u64::from(addr.port()))),
        ]),
        None => LogValue::Null,
    };

    let request = LogValue::map([
        ("method", LogValue::Str(method.clone())),
        ("path", LogValue::Str(path.clone())),
        ("headers", header_values(&parts.headers)),
        ("body", LogValue::from(body)),
        ("params", LogValue::Map(params)),
        ("query", LogValue::Map(query)),
        ("calleeDetails", callee),
    ]);

    logger
        .record(LogLevel::Info, "🚀 Request initiated...")
        .log_type(LogType::RequestInit)
        .payload("request", &request)
        .extra_details(format!("'{method} {path}', {args}"))
        .emit();
}

fn log_request_end(
    logger: &Logger,
    level: LogLevel,
    message: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: Value,
    elapsed: Duration,
) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    let readable = format!("({})", readable_duration(ms));
    let response = LogValue::map([
        ("statusCode", LogValue::UInt(u64::from(status.as_u16()))),
        ("headers", header_values(headers)),
        ("body", LogValue::from(body)),
        ("executionTimeMs", LogValue::Float(ms)),
        ("executionTime", LogValue::Str(readable.clone())),
    ]);

    logger
        .record(level, message)
        .log_type(LogType::RequestEnd)
        .payload("response", &response)
        .extra_details(format!("{} {readable}", status.as_u16()))
        .elapsed(elapsed)
        .emit();
}

/// 500 `{"success": false, "error": ..}` for a request that blew up.
fn failed(logger: &Logger, started: Instant, status: StatusCode, message: String) -> Response {
    let body = json!({ "success": false, "error": message });
    let response = (status, axum::Json(body.clone())).into_response();
    log_request_end(
        logger,
        LogLevel::Error,
        "❌ Request failed...",
        response.status(),
        response.headers(),
        body,
        started.elapsed(),
    );
    response
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn with_stream_end_log(response: Response, logger: Logger, context: CorrelationContext, started: Instant) -> Response {
    let (parts, body) = response.into_parts();
    let end = StreamEnd {
        logger,
        context,
        status: parts.status,
        headers: parts.headers.clone(),
        started,
        body: json!({}),
    };
    let stream = EndLoggedStream {
        inner: Box::pin(body.into_data_stream()),
        end: Some(end),
        final_seen: false,
    };
    Response::from_parts(parts, Body::from_stream(stream))
}

/// The pending `REQUEST_END` of a streamed response.
struct StreamEnd {
    logger: Logger,
    context: CorrelationContext,
    status: StatusCode,
    headers: HeaderMap,
    started: Instant,
    body: Value,
}

impl StreamEnd {
    fn emit(self) {
        // The body is polled by the server after the middleware returned, so
        // the request's scope has to be re-entered.
        let context = self.context.clone();
        context.sync_scope(|| {
            log_request_end(
                &self.logger,
                LogLevel::Info,
                STREAM_COMPLETED,
                self.status,
                &self.headers,
                self.body,
                self.started.elapsed(),
            )
        });
    }
}

/// Forwards chunks untouched. The end record is written once: on the poll
/// after the `is_final` chunk went downstream, at end of stream, or on drop.
struct EndLoggedStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, axum::Error>> + Send>>,
    end: Option<StreamEnd>,
    final_seen: bool,
}

impl EndLoggedStream {
    fn finish(&mut self) {
        if let Some(end) = self.end.take() {
            end.emit();
        }
    }
}

impl Stream for EndLoggedStream {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.final_seen {
            this.finish();
        }

        let polled = this.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(body) = final_payload(chunk) {
                    if let Some(end) = this.end.as_mut() {
                        end.body = body;
                    }
                    this.final_seen = true;
                }
            }
            Poll::Ready(None) => this.finish(),
            _ => {}
        }
        polled
    }
}

impl Drop for EndLoggedStream {
    fn drop(&mut self) {
        self.finish();
    }
}

/// The chunk's JSON, raw or on an SSE `data:` line, when it says `is_final: true`.
fn final_payload(chunk: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(chunk).ok()?;
    let data_lines = text
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("data:"))
        .map(str::trim);

    std::iter::once(text.trim())
        .chain(data_lines)
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find(|value| value.get("is_final").and_then(Value::as_bool) == Some(true))
}

fn body_value(body: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

fn header_values(headers: &HeaderMap) -> LogValue {
    LogValue::Map(
        headers
            .iter()
            .map(|(name, value)| {
                let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
                (name.as_str().to_string(), LogValue::Str(text))
            })
            .collect(),
    )
}

fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http;
    use axum::routing::{get, post};
    use chrono::Duration as ChronoDuration;
    use habbot_auth::{AccessClaims, Hs256Jwt, SupportedRole, TokenPurpose};
    use habbot_core::UserId;
    use habbot_observability::{LogRecord, MemorySink};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const SECRET: &str = "middleware-secret";

    struct Harness {
        app: Router,
        logs: LoggerFactory,
        mem: MemorySink,
    }

    impl Harness {
        fn new(routes: Router) -> Self {
            let mem = MemorySink::new();
            let logs = LoggerFactory::builder().sink(mem.clone()).build().unwrap();
            let state = RequestLogState::new(Arc::new(Hs256Jwt::new(SECRET)), &logs);
            let app = routes.layer(axum::middleware::from_fn_with_state(state, request_logging));
            Self { app, logs, mem }
        }

        fn records(&self, log_type: LogType) -> Vec<LogRecord> {
            self.logs.flush();
            self.mem.of_type(log_type)
        }
    }

    async fn whoami() -> axum::Json<Value> {
        let ctx = CorrelationContext::current();
        axum::Json(json!({ "user_id": ctx.user_id, "request_id": ctx.request_id }))
    }

    async fn echo(body: String) -> String {
        body
    }

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    fn token() -> (UserId, String) {
        let user_id = UserId::new();
        let claims = AccessClaims::for_user(user_id, "a@b.io", SupportedRole::User, true, TokenPurpose::Access);
        let issued = Hs256Jwt::new(SECRET).issue(claims, ChronoDuration::minutes(5)).unwrap();
        (user_id, issued.token)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn malformed_bearer_still_runs_the_handler_without_a_user() {
        let harness = Harness::new(Router::new().route("/whoami", get(whoami)));
        let req = http::Request::get("/whoami")
            .header("authorization", "Bearer not-a-jwt")
            .header("x-request-id", "req-1")
            .body(Body::empty())
            .unwrap();

        let response = harness.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-1");
        let body = json_body(response).await;
        assert_eq!(body["user_id"], Value::Null);
        assert_eq!(body["request_id"], "req-1");

        let warnings: Vec<_> = harness
            .records(LogType::Default)
            .into_iter()
            .filter(|r| r.level == LogLevel::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("Error in decoding jwt token in middleware"));
        assert_eq!(warnings[0].context.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn valid_bearer_sets_the_user_for_every_record() {
        let harness = Harness::new(Router::new().route("/whoami", get(whoami)));
        let (user_id, token) = token();
        let req = http::Request::get("/whoami")
            .header("authorization", format!("bearer {token}"))
            .header("x-session-id", "s-9")
            .body(Body::empty())
            .unwrap();

        let body = json_body(harness.app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(body["user_id"], user_id.to_string());

        let init = harness.records(LogType::RequestInit);
        let end = harness.records(LogType::RequestEnd);
        assert_eq!(init.len(), 1);
        assert_eq!(end.len(), 1);
        for record in [&init[0], &end[0]] {
            assert_eq!(record.context.user_id.as_deref(), Some(user_id.to_string().as_str()));
            assert_eq!(record.context.session_id.as_deref(), Some("s-9"));
        }
        assert_eq!(end[0].payload["response"]["statusCode"], 200);
    }

    #[tokio::test]
    async fn bodies_pass_through_and_secrets_are_redacted_in_logs() {
        let harness = Harness::new(Router::new().route("/echo/:id", post(echo)));
        let payload = r#"{"email":"a@b.io","password":"hunter2","user_id":"u1"}"#;
        let req = http::Request::post("/echo/42?verbose=1")
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .unwrap();

        let response = harness.app.clone().oneshot(req).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, payload.as_bytes());

        let init = harness.records(LogType::RequestInit);
        let request = &init[0].payload["request"];
        assert_eq!(request["method"], "POST");
        assert_eq!(request["body"]["password"], "***redacted***");
        assert_eq!(request["params"]["id"], "42");
        assert_eq!(request["query"]["verbose"], "1");

        let details = init[0].extra_details.as_deref().unwrap();
        assert!(details.starts_with("'POST /echo/42', "));
        assert!(!details.contains("hunter2"));
        assert!(!details.contains("user_id"));
    }

    #[tokio::test]
    async fn excluded_paths_are_not_logged() {
        let harness = Harness::new(Router::new().route("/api/health", get(|| async { "ok" })));
        let req = http::Request::get("/api/health").body(Body::empty()).unwrap();
        let response = harness.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        harness.logs.flush();
        assert!(harness.mem.is_empty());
    }

    #[tokio::test]
    async fn panics_become_a_500_envelope() {
        let harness = Harness::new(Router::new().route("/boom", get(explode)));
        let req = http::Request::get("/boom").body(Body::empty()).unwrap();

        let response = harness.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "success": false, "error": "handler exploded" })
        );

        let end = harness.records(LogType::RequestEnd);
        assert_eq!(end.len(), 1);
        assert_eq!(end[0].message, "❌ Request failed...");
        assert_eq!(end[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn oversized_request_bodies_are_rejected_before_the_handler() {
        let harness = Harness::new(Router::new().route("/echo", post(echo)));
        let req = http::Request::post("/echo")
            .body(Body::from(vec![b'x'; MAX_REQUEST_BODY + 1]))
            .unwrap();

        let response = harness.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);

        assert!(harness.records(LogType::RequestInit).is_empty());
        let end = harness.records(LogType::RequestEnd);
        assert_eq!(end.len(), 1);
        assert_eq!(end[0].payload["response"]["statusCode"], 413);

        let at_limit = http::Request::post("/echo")
            .body(Body::from(vec![b'y'; MAX_REQUEST_BODY]))
            .unwrap();
        let response = harness.app.clone().oneshot(at_limit).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn events() -> Response {
        let chunks: Vec<Result<&'static str, std::convert::Infallible>> = vec![
            Ok("data: {\"n\": 1}\n\n"),
            Ok("data: {\"n\": 2, \"is_final\": true}\n\n"),
        ];
        Response::builder()
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(Body::from_stream(tokio_stream::iter(chunks)))
            .unwrap()
    }

    #[tokio::test]
    async fn final_stream_chunk_produces_exactly_one_end_record_after_it_is_yielded() {
        let harness = Harness::new(Router::new().route("/events", get(events)));
        let req = http::Request::get("/events").body(Body::empty()).unwrap();
        let mut body = harness.app.clone().oneshot(req).await.unwrap().into_body();

        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert!(final_payload(&first).is_none());
        let last = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(last, "data: {\"n\": 2, \"is_final\": true}\n\n");
        assert!(harness.records(LogType::RequestEnd).is_empty());

        assert!(body.frame().await.is_none());
        let end = harness.records(LogType::RequestEnd);
        assert_eq!(end.len(), 1);
        assert_eq!(end[0].message, STREAM_COMPLETED);
        assert_eq!(end[0].payload["response"]["body"]["n"], 2);

        drop(body);
        assert_eq!(harness.records(LogType::RequestEnd).len(), 1);
    }

    #[test]
    fn final_payload_reads_raw_json_and_data_lines() {
        assert!(final_payload(br#"{"is_final": true}"#).is_some());
        assert!(final_payload(b"event: msg\ndata: {\"is_final\": true}\n\n").is_some());
        assert!(final_payload(br#"{"is_final": false}"#).is_none());
        assert!(final_payload(b"data: not json\n\n").is_none());
    }
}
