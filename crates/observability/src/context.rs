//! Per-request correlation ids.
//!
//! The middleware runs each request inside [`CorrelationContext::scope`];
//! every record built on that task (across `.await`s) reads the same ids.
//! Spawned tasks do not inherit the scope.

use std::future::Future;

tokio::task_local! {
    static CURRENT: CorrelationContext;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationContext {
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl CorrelationContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Snapshot of the ambient context; empty outside any scope.
    pub fn current() -> Self {
        CURRENT.try_with(Clone::clone).unwrap_or_default()
    }

    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    pub fn request_tag(&self) -> String {
        tag("rid", self.request_id.as_deref())
    }

    pub fn session_tag(&self) -> String {
        tag("sid", self.session_id.as_deref())
    }

    pub fn user_tag(&self) -> String {
        tag("uid", self.user_id.as_deref())
    }
}

fn tag(prefix: &str, value: Option<&str>) -> String {
    format!("{prefix}-{}", value.unwrap_or("None"))
}
