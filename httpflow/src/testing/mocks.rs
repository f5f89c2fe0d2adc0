//! Mock policies and transports for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::CallContext;
use crate::errors::{PipelineError, TransportError};
use crate::http::HttpResponse;
use crate::policy::{Next, Policy};
use crate::transport::Transport;

/// A shared, ordered log of labels, cloned into every recorder of one test.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a label.
    pub fn push(&self, label: impl Into<String>) {
        self.entries.lock().push(label.into());
    }

    /// Returns a copy of the labels in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops all labels.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A policy that logs its label and forwards the call.
#[derive(Debug, Clone)]
pub struct RecordingPolicy {
    label: String,
    log: CallLog,
}

impl RecordingPolicy {
    /// Creates a recorder writing `label` into `log`.
    #[must_use]
    pub fn new(label: impl Into<String>, log: CallLog) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }

    /// Wraps the recorder for use in a pipeline.
    #[must_use]
    pub fn shared(label: impl Into<String>, log: &CallLog) -> Arc<dyn Policy> {
        Arc::new(Self::new(label, log.clone()))
    }
}

#[async_trait]
impl Policy for RecordingPolicy {
    fn default_name(&self) -> String {
        self.label.clone()
    }

    async fn process(
        &self,
        ctx: &mut CallContext,
        mut next: Next,
    ) -> Result<HttpResponse, PipelineError> {
        self.log.push(self.label.clone());
        next.process(ctx).await
    }
}

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with this status and an empty body.
    Status(u16),
    /// Fail with this transport error.
    Fault(TransportError),
}

/// A transport that replays a script of replies, then answers 200.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<ScriptedReply>>,
    fallback: u16,
    calls: AtomicUsize,
    log: Option<(CallLog, String)>,
    urls: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Creates a transport that always answers 200.
    #[must_use]
    pub fn ok() -> Self {
        Self::with_status(200)
    }

    /// Creates a transport that always answers `status`.
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: status,
            calls: AtomicUsize::new(0),
            log: None,
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a transport that plays `replies` in order, then answers 200.
    #[must_use]
    pub fn scripted(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        let transport = Self::ok();
        transport.script.lock().extend(replies);
        transport
    }

    /// Creates a transport that answers the given statuses in order.
    #[must_use]
    pub fn statuses(statuses: &[u16]) -> Self {
        Self::scripted(statuses.iter().map(|s| ScriptedReply::Status(*s)))
    }

    /// Also logs `label` into `log` on every call.
    #[must_use]
    pub fn with_log(mut self, log: &CallLog, label: impl Into<String>) -> Self {
        self.log = Some((log.clone(), label.into()));
        self
    }

    /// Number of times `send` was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs of every request sent, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, ctx: &mut CallContext) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(ctx.request().url().to_string());
        if let Some((log, label)) = &self.log {
            log.push(label.clone());
        }

        let reply = self.script.lock().pop_front();
        match reply {
            Some(ScriptedReply::Status(status)) => Ok(HttpResponse::new(status)),
            Some(ScriptedReply::Fault(err)) => Err(err),
            None => Ok(HttpResponse::new(self.fallback)),
        }
    }
}

/// A transport that always fails with the same error.
#[derive(Debug)]
pub struct FailingTransport {
    error: TransportError,
    calls: AtomicUsize,
}

impl FailingTransport {
    /// Creates a failing transport.
    #[must_use]
    pub fn new(error: TransportError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `send` was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _ctx: &mut CallContext) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A transport that waits before answering 200.
#[derive(Debug)]
pub struct SlowTransport {
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowTransport {
    /// Creates a transport that sleeps for `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Number of sends that began.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of sends that ran to completion.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for SlowTransport {
    async fn send(&self, _ctx: &mut CallContext) -> Result<HttpResponse, TransportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(HttpResponse::new(200))
    }
}
