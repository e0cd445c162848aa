//! Keyed trailing-edge debouncer.
//!
//! Each call for a key supersedes the previous pending call for the same key;
//! only the last call within the window runs, `delay` after it was made.
//! Calls for other keys are independent.  Requires a Tokio runtime.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    generations: Arc<Mutex<HashMap<K, u64>>>,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            generations: Arc::clone(&self.generations),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `f` to run after the delay unless another call for `key`
    /// arrives first.
    pub fn call<F>(&self, key: K, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.bump(&key);
        let generations = Arc::clone(&self.generations);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let latest = generations.lock().get(&key).copied();
            if latest == Some(generation) {
                f();
            }
        });
    }

    /// Drop any pending call for `key`.
    pub fn cancel(&self, key: &K) {
        self.bump(key);
    }

    fn bump(&self, key: &K) -> u64 {
        let mut generations = self.generations.lock();
        let counter = generations.entry(key.clone()).or_insert(0);
        *counter += 1;
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn only_last_call_in_window_runs() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let runs = Arc::new(Mutex::new(Vec::new()));

        for value in ["Z", "Ze", "Zed"] {
            let runs = runs.clone();
            debouncer.call("name", move || runs.lock().push(value));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(*runs.lock(), vec!["Zed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let count = Arc::new(AtomicUsize::new(0));
        for key in ["name", "manufacturer"] {
            let count = count.clone();
            debouncer.call(key, move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_call() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        debouncer.call("name", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel(&"name");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
