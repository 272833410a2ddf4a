//! Shared request state observed by the viewer.
//!
//! A `Shared<T>` is a mutex-protected value plus a list of subscribers;
//! each `update` sends one notification to every live subscriber.
//! The LLM worker thread writes replies here and the event loop picks
//! them up on its next tick.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;

struct Inner<T> {
    value: T,
    subscribers: Vec<mpsc::Sender<()>>,
}

pub struct Shared<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read through a closure; the lock is held only for its duration.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock().value)
    }

    /// Mutate and notify subscribers. Disconnected receivers are pruned.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner.value);
        inner.subscribers.retain(|tx| tx.send(()).is_ok());
        trace!("store: notified {} subscriber(s)", inner.subscribers.len());
        out
    }

    pub fn subscribe(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }
}

impl<T: Clone> Shared<T> {
    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }
}

/// In-flight request state.
///
/// `request` tags the active request so a late reply from a cancelled
/// worker cannot land on a newer one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub loading: bool,
    pub request: u64,
    pub prompt: String,
    pub thought: String,
    pub answer: String,
    pub error: Option<String>,
}

impl ChatState {
    /// Start a new request; returns its tag.
    pub fn begin(&mut self, prompt: &str) -> u64 {
        self.request += 1;
        self.loading = true;
        self.prompt = prompt.to_string();
        self.thought.clear();
        self.answer.clear();
        self.error = None;
        self.request
    }

    /// Record a reply for `request`; ignored if a newer request started.
    pub fn complete(&mut self, request: u64, answer: String, thought: Option<String>) -> bool {
        if request != self.request || !self.loading {
            return false;
        }
        self.answer = answer;
        self.thought = thought.unwrap_or_default();
        true
    }

    pub fn fail(&mut self, request: u64, error: String) -> bool {
        if request != self.request || !self.loading {
            return false;
        }
        self.error = Some(error);
        true
    }

    pub fn finish(&mut self) {
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_notifies_each_subscriber() {
        let store = Shared::new(ChatState::default());
        let a = store.subscribe();
        let b = store.subscribe();
        store.update(|s| s.begin("hi"));
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
        assert!(a.try_recv().is_err());
        assert!(store.read(|s| s.loading));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let store = Shared::new(0u32);
        drop(store.subscribe());
        let live = store.subscribe();
        store.update(|v| *v += 1);
        assert_eq!(store.lock().subscribers.len(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn clones_share_state() {
        let store = Shared::new(ChatState::default());
        let worker = store.clone();
        let rx = store.subscribe();
        std::thread::spawn(move || worker.update(|s| s.prompt = "from worker".into()))
            .join()
            .unwrap();
        assert!(rx.try_recv().is_ok());
        assert_eq!(store.snapshot().prompt, "from worker");
    }

    #[test]
    fn stale_reply_is_ignored() {
        let mut state = ChatState::default();
        let first = state.begin("one");
        let second = state.begin("two");
        assert!(!state.complete(first, "late".into(), None));
        assert!(state.answer.is_empty());
        assert!(state.complete(second, "fresh".into(), Some("why".into())));
        assert_eq!(state.answer, "fresh");
        assert_eq!(state.thought, "why");
    }

    #[test]
    fn finished_request_rejects_errors() {
        let mut state = ChatState::default();
        let id = state.begin("q");
        state.finish();
        assert!(!state.fail(id, "boom".into()));
        assert_eq!(state.error, None);
    }
}
