//! Single-assignment deferred values.
//!
//! A [`Deferred`] starts empty and transitions to resolved exactly once.
//! The first writer wins; later writes are no-ops. Callbacks registered
//! before resolution fire in registration order; callbacks registered after
//! resolution fire immediately with the stored value.
//!
//! Every drive of a source resolves the sink's deferred value on
//! end-of-stream, so this is the completion signal for whole sessions.
//!
//! # Examples
//!
//! ```rust
//! use streamfeed::Deferred;
//!
//! let value: Deferred<i32> = Deferred::new();
//! assert!(value.resolve(1));
//! assert!(!value.resolve(2)); // first writer wins
//! assert_eq!(value.try_get(), Some(1));
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Error, Result};

type Callback<T> = Box<dyn FnOnce(T) + Send>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Resolved(T),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// A single-assignment future with callback and combinator support.
///
/// Cloning a `Deferred` clones the handle, not the value; all clones observe
/// the same resolution.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Create an unresolved deferred value
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                notify: Notify::new(),
            }),
        }
    }

    /// Create an already-resolved deferred value
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// Resolve with `value`. Returns `true` if this call won the write;
    /// concurrent and repeated resolutions serialize and only the first
    /// succeeds.
    pub fn resolve(&self, value: T) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock().unwrap();
            match &mut *state {
                State::Resolved(_) => return false,
                State::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = State::Resolved(value.clone());
                    callbacks
                }
            }
        };
        self.inner.notify.notify_waiters();
        for callback in callbacks {
            run_callback(callback, value.clone());
        }
        true
    }

    /// Whether the value has been resolved yet
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.inner.state.lock().unwrap(), State::Resolved(_))
    }

    /// The resolved value, if any
    pub fn try_get(&self) -> Option<T> {
        match &*self.inner.state.lock().unwrap() {
            State::Resolved(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    /// Register a callback to run with the resolved value.
    ///
    /// Callbacks run in registration order; a callback registered after
    /// resolution runs immediately on the caller's thread.
    pub fn on_resolved<F>(&self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        match &mut *state {
            State::Pending(callbacks) => callbacks.push(Box::new(f)),
            State::Resolved(value) => {
                let value = value.clone();
                drop(state);
                run_callback(Box::new(f), value);
            }
        }
    }

    /// Suspend until the value resolves
    pub async fn wait(&self) -> T {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = self.try_get() {
                return value;
            }
            notified.as_mut().await;
        }
    }

    /// Suspend until the value resolves, or give up after `duration`.
    ///
    /// Timing out only stops this caller from waiting; the underlying
    /// session keeps running.
    pub async fn wait_timeout(&self, duration: Duration) -> Result<T> {
        tokio::time::timeout(duration, self.wait())
            .await
            .map_err(|_| Error::timeout(duration.as_millis() as u64))
    }

    /// Derive a deferred value by mapping the resolution through `f`.
    ///
    /// If `f` panics the panic is caught and logged and the derived value
    /// stays unresolved.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let derived = Deferred::new();
        let out = derived.clone();
        self.on_resolved(move |value| {
            out.resolve(f(value));
        });
        derived
    }

    /// Derive a deferred value that resolves only if `predicate` accepts
    /// the resolution.
    pub fn filter<F>(&self, predicate: F) -> Deferred<T>
    where
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        let derived = Deferred::new();
        let out = derived.clone();
        self.on_resolved(move |value| {
            if predicate(&value) {
                out.resolve(value);
            }
        });
        derived
    }

    /// Derive a deferred value by chaining into another deferred
    /// computation.
    pub fn and_then<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Deferred<U> + Send + 'static,
    {
        let derived = Deferred::new();
        let out = derived.clone();
        self.on_resolved(move |value| {
            f(value).on_resolved(move |inner| {
                out.resolve(inner);
            });
        });
        derived
    }

    /// Fan-in: resolve with every value, in input order, once the last
    /// input resolves.
    pub fn join_all(deferreds: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
        let result = Deferred::new();
        if deferreds.is_empty() {
            result.resolve(Vec::new());
            return result;
        }
        let remaining = Arc::new(AtomicUsize::new(deferreds.len()));
        let all = Arc::new(deferreds);
        for deferred in all.iter() {
            let remaining = remaining.clone();
            let all = all.clone();
            let result = result.clone();
            deferred.on_resolved(move |_| {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values = all.iter().filter_map(|d| d.try_get()).collect();
                    result.resolve(values);
                }
            });
        }
        result
    }

    /// Race: resolve with whichever input resolves first, ignoring the
    /// rest.
    pub fn race(deferreds: Vec<Deferred<T>>) -> Deferred<T> {
        let result = Deferred::new();
        for deferred in deferreds {
            let result = result.clone();
            deferred.on_resolved(move |value| {
                result.resolve(value);
            });
        }
        result
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn run_callback<T>(callback: Callback<T>, value: T) {
    if catch_unwind(AssertUnwindSafe(move || callback(value))).is_err() {
        tracing::error!("deferred callback panicked; derived value left unresolved");
    }
}
