//! Externally-fed sources: the push queue and its timer-driven variant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::protocol::SessionHandle;
use crate::runtime::Runtime;
use crate::traits::Source;

struct PushShared<T> {
    queue: Mutex<VecDeque<T>>,
    open: AtomicBool,
    session: Mutex<Option<SessionHandle>>,
}

/// A queue-backed source fed by external [`push`](PushSource::push) calls.
///
/// Cloning yields another handle onto the same queue, so callers can keep
/// one handle to feed and stop the source while a clone is being driven.
/// Safe to attach to any number of sequential sessions, but to at most one
/// at a time.
pub struct PushSource<T> {
    shared: Arc<PushShared<T>>,
}

impl<T> Clone for PushSource<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> PushSource<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PushShared {
                queue: Mutex::new(VecDeque::new()),
                open: AtomicBool::new(true),
                session: Mutex::new(None),
            }),
        }
    }

    /// Enqueue an element and wake the attached session, if any.
    ///
    /// Elements pushed after [`stop`](PushSource::stop) are dropped.
    pub fn push(&self, item: T) {
        if !self.shared.open.load(Ordering::Acquire) {
            tracing::debug!("push after stop, element dropped");
            return;
        }
        self.shared.queue.lock().unwrap().push_back(item);
        if let Some(session) = self.shared.session.lock().unwrap().as_ref() {
            session.resume();
        }
    }

    /// Close the source. The attached session drains whatever is still
    /// queued, then sees end-of-stream. Idempotent: repeated calls are
    /// no-ops and produce no second end-of-stream.
    pub fn stop(&self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }
        // nudge the source side so it drains the queue and emits Eof itself,
        // keeping queued elements ordered ahead of the end-of-stream
        if let Some(session) = self.shared.session.lock().unwrap().as_ref() {
            session.resume();
        }
    }

    /// Whether the source has been stopped
    pub fn is_stopped(&self) -> bool {
        !self.shared.open.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Default for PushSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> Source for PushSource<T> {
    type Item = T;

    fn has_next(&self) -> bool {
        !self.shared.queue.lock().unwrap().is_empty() || self.shared.open.load(Ordering::Acquire)
    }

    async fn next(&mut self) -> Result<Option<T>> {
        Ok(self.shared.queue.lock().unwrap().pop_front())
    }

    fn on_attach(&mut self, session: SessionHandle) {
        *self.shared.session.lock().unwrap() = Some(session);
    }
}

/// A push source driven by a periodic callback.
///
/// Every `period` the callback runs; a `Some` result is pushed into the
/// queue. The schedule starts lazily on the first session attach (including
/// adoption by a hub) and runs exactly once no matter how many sessions
/// attach; [`stop`](TimedSource::stop) cancels it.
pub struct TimedSource<T> {
    push: PushSource<T>,
    period: Duration,
    callback: Arc<dyn Fn() -> Option<T> + Send + Sync>,
    scheduled: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl<T> Clone for TimedSource<T> {
    fn clone(&self) -> Self {
        Self {
            push: self.push.clone(),
            period: self.period,
            callback: self.callback.clone(),
            scheduled: self.scheduled.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Send + 'static> TimedSource<T> {
    pub fn new<F>(period: Duration, callback: F) -> Self
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        Self {
            push: PushSource::new(),
            period,
            callback: Arc::new(callback),
            scheduled: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// Enqueue an element out of band, in addition to the timed ones
    pub fn push(&self, item: T) {
        self.push.push(item);
    }

    /// Close the source and cancel the schedule
    pub fn stop(&self) {
        self.push.stop();
        self.cancel.cancel();
    }

    fn schedule(&self, runtime: &Runtime) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let push = self.push.clone();
        let callback = self.callback.clone();
        let cancel = self.cancel.clone();
        let period = self.period;
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(item) = callback() {
                            push.push(item);
                        }
                    }
                }
            }
            tracing::trace!("timed source schedule cancelled");
        });
    }
}

#[async_trait]
impl<T: Send + 'static> Source for TimedSource<T> {
    type Item = T;

    fn has_next(&self) -> bool {
        self.push.has_next()
    }

    async fn next(&mut self) -> Result<Option<T>> {
        self.push.next().await
    }

    fn on_attach(&mut self, session: SessionHandle) {
        let runtime = session.runtime().clone();
        self.push.on_attach(session);
        self.schedule(&runtime);
    }
}
