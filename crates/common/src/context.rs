//! Request-scoped correlation context.
//!
//! Every request runs inside a task-local [`LogContext`] carrying a
//! correlation id plus an open key/value map (endpoint, method, userId, …).
//! The logger snapshots this context on every call so all entries produced
//! while handling one request share the same correlation id without the id
//! being threaded through function signatures.
//!
//! Task-locals do not cross `tokio::spawn`; work spawned off the request
//! task must be re-wrapped explicitly:
//!
//! ```no_run
//! use mercadito_common::context;
//!
//! # async fn doc() {
//! let ctx = context::current().unwrap_or_default();
//! tokio::spawn(context::scope(ctx, async {
//!     // logger calls in here still carry the correlation id
//! }));
//! # }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;

use http::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

/// Header carrying the correlation id on requests and responses.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

tokio::task_local! {
    static REQUEST_CONTEXT: RefCell<LogContext>;
}

/// Correlation id plus an open map of structured fields attached to every
/// log entry produced within a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContext {
    correlation_id: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl LogContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with a correlation id and nothing else.
    pub fn with_correlation_id(id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(id.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// In-place field insertion
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Correlation id, if one has been set
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Replace the correlation id
    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = Some(id.into());
    }

    /// Structured fields, sorted by key
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Whether neither a correlation id nor any field is set
    pub fn is_empty(&self) -> bool {
        self.correlation_id.is_none() && self.fields.is_empty()
    }

    /// Merge `incoming` into `self`. Incoming fields win key-wise; an
    /// incoming correlation id replaces the existing one.
    pub fn merge(&mut self, incoming: LogContext) {
        if incoming.correlation_id.is_some() {
            self.correlation_id = incoming.correlation_id;
        }
        self.fields.extend(incoming.fields);
    }

    /// Non-destructive merge, used when entering a nested scope.
    pub fn merged(&self, incoming: LogContext) -> LogContext {
        let mut out = self.clone();
        out.merge(incoming);
        out
    }
}

/// Run `future` with `context` as the ambient request context.
///
/// Inside an existing scope the new context is merged onto the enclosing
/// one (incoming values win); the enclosing context is restored when the
/// returned future completes.
pub async fn scope<F>(context: LogContext, future: F) -> F::Output
where
    F: Future,
{
    let merged = match current() {
        Some(outer) => outer.merged(context),
        None => context,
    };
    REQUEST_CONTEXT.scope(RefCell::new(merged), future).await
}

/// Merge `partial` into the current context in place.
///
/// No-op when called outside any scope; later log calls on the same task
/// observe the merged values.
pub fn enter_with(partial: LogContext) {
    let _ = REQUEST_CONTEXT.try_with(|ctx| ctx.borrow_mut().merge(partial));
}

/// Snapshot of the current context, `None` outside any scope.
pub fn current() -> Option<LogContext> {
    REQUEST_CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok()
}

/// Correlation id of the current context, if any.
pub fn correlation_id() -> Option<String> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.borrow().correlation_id().map(str::to_owned))
        .ok()
        .flatten()
}

/// Build a request context from inbound headers: reuse the caller's
/// `X-Correlation-ID` when present, otherwise mint a fresh UUID v4.
pub fn seed_from_headers(headers: &HeaderMap) -> LogContext {
    let id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    LogContext::with_correlation_id(id)
}
