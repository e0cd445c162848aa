//! Pending-request tracking.
//!
//! Every network call the store makes goes through [`TrackedClient`], which
//! registers the request in the shared [`RequestTracker`] before sending and
//! removes it when the call settles.  Removal is tied to a drop guard, so a
//! failed, errored or abandoned call never leaves a stale entry behind.
//!
//! Busy flags (`have_pending_requests`) are derived from the tracker with a
//! URL **prefix** match: an index URL is a prefix of every query on it, so two
//! different queries to the same index are indistinguishable while pending.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::protocol::{Method, Request, Response, Transport};
use crate::query::TransportQuery;
use crate::reactive::{Source, Version};

/// One in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Issue order; strictly increasing per tracker.
    pub seq: u64,
    pub method: Method,
    pub url: String,
}

/// True if any pending request's URL starts with `prefix`.
pub fn queue_contains(queue: &[PendingRequest], prefix: &str) -> bool {
    queue.iter().any(|r| r.url.starts_with(prefix))
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Queue {
    pending: Source<Vec<PendingRequest>>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct RequestTracker {
    queue: Mutex<Queue>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                pending: Source::new(Vec::new()),
                next_seq: 1,
            }),
        }
    }

    /// Register a request.  It stays pending until the guard is dropped.
    pub fn begin(self: &Arc<Self>, method: Method, url: impl Into<String>) -> RequestGuard {
        let mut q = self.queue.lock();
        let seq = q.next_seq;
        q.next_seq += 1;
        q.pending.update(|pending| {
            pending.push(PendingRequest {
                seq,
                method,
                url: url.into(),
            })
        });
        RequestGuard {
            tracker: Arc::clone(self),
            seq,
        }
    }

    fn finish(&self, seq: u64) {
        let mut q = self.queue.lock();
        if q.pending.get().iter().any(|r| r.seq == seq) {
            q.pending.update(|pending| pending.retain(|r| r.seq != seq));
        }
    }

    pub fn pending(&self) -> Vec<PendingRequest> {
        self.queue.lock().pending.get().clone()
    }

    pub fn version(&self) -> Version {
        self.queue.lock().pending.version()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().pending.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        queue_contains(self.queue.lock().pending.get(), prefix)
    }

    /// Forget every pending entry.  Outstanding guards become no-ops.
    pub fn clear(&self) {
        let mut q = self.queue.lock();
        q.pending.set(Vec::new());
    }
}

/// Removes its request from the tracker on drop.
#[derive(Debug)]
pub struct RequestGuard {
    tracker: Arc<RequestTracker>,
    seq: u64,
}

impl RequestGuard {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.seq);
    }
}

// ---------------------------------------------------------------------------
// Tracked client
// ---------------------------------------------------------------------------

/// A settled tracked call: the response plus the request's issue number.
#[derive(Debug, Clone)]
pub struct Settled {
    pub seq: u64,
    pub response: Response,
}

/// Transport wrapper that registers every call with the tracker.
#[derive(Clone)]
pub struct TrackedClient {
    transport: Arc<dyn Transport>,
    tracker: Arc<RequestTracker>,
}

impl TrackedClient {
    pub fn new(transport: Arc<dyn Transport>, tracker: Arc<RequestTracker>) -> Self {
        Self { transport, tracker }
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }

    pub async fn send(&self, request: Request) -> Result<Settled, TransportError> {
        let guard = self.tracker.begin(request.method, request.url.clone());
        let seq = guard.seq();
        debug!("[ajax] #{} {} {}", seq, request.method, request.url);

        let result = self.transport.send(request).await;
        drop(guard);

        match &result {
            Ok(resp) => debug!("[ajax] #{} settled with {}", seq, resp.status),
            Err(e) => debug!("[ajax] #{} failed: {}", seq, e),
        }
        result.map(|response| Settled { seq, response })
    }

    pub async fn get(&self, url: &str, params: TransportQuery) -> Result<Settled, TransportError> {
        self.send(Request::new(Method::Get, url).with_params(params))
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<Settled, TransportError> {
        self.send(Request::new(Method::Post, url).with_body(body)).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<Settled, TransportError> {
        self.send(Request::new(Method::Patch, url).with_body(body))
            .await
    }

    pub async fn delete(&self, url: &str) -> Result<Settled, TransportError> {
        self.send(Request::new(Method::Delete, url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_removes_request() {
        let tracker = Arc::new(RequestTracker::new());
        let a = tracker.begin(Method::Get, "/api/robots?page=1");
        let b = tracker.begin(Method::Get, "/api/monsters");
        assert_eq!(tracker.len(), 2);
        assert!(a.seq() < b.seq());

        drop(a);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.contains_prefix("/api/robots"));
        assert!(tracker.contains_prefix("/api/monsters"));

        drop(b);
        assert!(tracker.is_empty());
    }

    #[test]
    fn prefix_match_cannot_tell_queries_apart() {
        let tracker = Arc::new(RequestTracker::new());
        let first = tracker.begin(Method::Get, "/api/robots");
        let _second = tracker.begin(Method::Get, "/api/robots");
        drop(first);
        // Still busy: the other query on the same index is pending.
        assert!(tracker.contains_prefix("/api/robots"));
    }

    #[test]
    fn clear_makes_outstanding_guards_noops() {
        let tracker = Arc::new(RequestTracker::new());
        let guard = tracker.begin(Method::Delete, "/api/robots/1");
        tracker.clear();
        let v = tracker.version();
        drop(guard);
        assert_eq!(tracker.version(), v);
        assert!(tracker.is_empty());
    }
}
