//! Notification queue with TTL expiry.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertCategory::Success => "success",
            AlertCategory::Info => "info",
            AlertCategory::Warning => "warning",
            AlertCategory::Error => "error",
        };
        f.write_str(s)
    }
}

pub type AlertId = u64;

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: AlertId,
    pub message: String,
    pub category: AlertCategory,
    pub created: Instant,
}

/// Fire-and-forget notification target.
pub trait NotificationSink: Send + Sync {
    fn add_item(&self, message: String, category: AlertCategory);
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<Alert>,
    next_id: AlertId,
}

/// In-memory alert queue; oldest entries are dropped beyond `max`.
#[derive(Debug)]
pub struct AlertQueue {
    inner: Mutex<Inner>,
    ttl: Duration,
    max: usize,
}

impl AlertQueue {
    pub const DEFAULT_MAX: usize = 32;

    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                next_id: 1,
            }),
            ttl,
            max: Self::DEFAULT_MAX,
        }
    }

    pub fn push(&self, message: impl Into<String>, category: AlertCategory, now: Instant) -> AlertId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.queue.push_back(Alert {
            id,
            message: message.into(),
            category,
            created: now,
        });
        while inner.queue.len() > self.max {
            inner.queue.pop_front();
        }
        id
    }

    /// Drop alerts whose TTL has elapsed at `now`.
    pub fn expire(&self, now: Instant) {
        let ttl = self.ttl;
        self.inner
            .lock()
            .queue
            .retain(|a| now.saturating_duration_since(a.created) < ttl);
    }

    pub fn dismiss(&self, id: AlertId) {
        self.inner.lock().queue.retain(|a| a.id != id);
    }

    /// Live alerts, oldest first.  Expired entries are dropped on read.
    pub fn items(&self) -> Vec<Alert> {
        self.expire(Instant::now());
        self.inner.lock().queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.expire(Instant::now());
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().queue.clear();
    }
}

impl NotificationSink for AlertQueue {
    fn add_item(&self, message: String, category: AlertCategory) {
        self.push(message, category, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_expire() {
        let q = AlertQueue::new(Duration::from_secs(5));
        let t0 = Instant::now();
        q.push("saved", AlertCategory::Success, t0);
        q.push("oops", AlertCategory::Error, t0 + Duration::from_secs(3));
        assert_eq!(q.len(), 2);

        q.expire(t0 + Duration::from_secs(6));
        let left = q.items();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "oops");
    }

    #[test]
    fn reads_drop_expired_alerts() {
        let q = AlertQueue::new(Duration::ZERO);
        q.push("gone", AlertCategory::Info, Instant::now());
        assert!(q.items().is_empty());

        q.push("also gone", AlertCategory::Info, Instant::now());
        assert!(q.is_empty());
    }

    #[test]
    fn queue_is_bounded() {
        let q = AlertQueue::new(Duration::from_secs(5));
        let now = Instant::now();
        for i in 0..(AlertQueue::DEFAULT_MAX + 3) {
            q.push(format!("a{i}"), AlertCategory::Info, now);
        }
        assert_eq!(q.len(), AlertQueue::DEFAULT_MAX);
        assert_eq!(q.items()[0].message, "a3");
    }

    #[test]
    fn dismiss_by_id() {
        let q = AlertQueue::new(Duration::from_secs(5));
        let id = q.push("x", AlertCategory::Warning, Instant::now());
        q.dismiss(id);
        assert!(q.is_empty());
    }
}
