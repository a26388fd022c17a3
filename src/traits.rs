//! Core traits for the streaming protocol.
//!
//! This module defines the two halves of a session: a [`Source`] that
//! yields elements one turn at a time, and a [`Sink`] that reacts to them.
//! Connecting the two with [`Source::run_into`] starts the token protocol
//! described in [`crate::protocol`] and returns the sink's deferred result.

use async_trait::async_trait;

use crate::deferred::Deferred;
use crate::error::Result;
use crate::protocol::{SessionHandle, Step};
use crate::runtime::Runtime;
use crate::sources::ChainSource;
use crate::transform::{DecoratedSource, Pipe};

/// A pull-driven element source.
///
/// Sources answer one element per flow-control token, which is the sole
/// backpressure mechanism: until the sink replies, no second element is
/// produced.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use streamfeed::{Result, Source};
///
/// struct Countdown {
///     remaining: u32,
/// }
///
/// #[async_trait]
/// impl Source for Countdown {
///     type Item = u32;
///
///     fn has_next(&self) -> bool {
///         self.remaining > 0
///     }
///
///     async fn next(&mut self) -> Result<Option<u32>> {
///         self.remaining -= 1;
///         Ok(Some(self.remaining + 1))
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send {
    /// The type of elements this source yields
    type Item: Send + 'static;

    /// Whether the source may still yield elements.
    ///
    /// Must be side-effect free and safely callable repeatedly; once it
    /// returns `false` it keeps returning `false`.
    fn has_next(&self) -> bool;

    /// Yield the next element.
    ///
    /// Called at most once per flow-control token. `Ok(None)` means no
    /// data available this turn (not end-of-stream — exhaustion is
    /// signalled through [`has_next`](Source::has_next)). An `Err`
    /// terminates the session with an error token.
    async fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Hook invoked when a session attaches to this source.
    ///
    /// The default does nothing. Externally-fed sources keep the handle to
    /// wake the session; timer sources start their schedule here.
    fn on_attach(&mut self, session: SessionHandle) {
        let _ = session;
    }

    /// Drive this source into `sink`, starting a new session on `runtime`.
    ///
    /// Returns the sink's deferred result, resolved at end-of-stream (or
    /// on the sink finishing early). A source representing an exclusive
    /// resource must only be driven by one session at a time.
    fn run_into<K>(self, sink: K, runtime: &Runtime) -> Deferred<K::Output>
    where
        Self: Sized + 'static,
        K: Sink<Item = Self::Item> + 'static,
    {
        crate::protocol::drive(runtime, self, sink)
    }

    /// Present this source followed by `then` as one source
    fn and_then<S2>(self, then: S2) -> ChainSource<Self, S2>
    where
        Self: Sized,
        S2: Source<Item = Self::Item>,
    {
        ChainSource::new(self, then)
    }

    /// Attach an in-flight transform, yielding a new composite source
    fn through<O>(self, pipe: Pipe<Self::Item, O>) -> DecoratedSource<Self, O>
    where
        Self: Sized,
        O: Send + 'static,
    {
        DecoratedSource::new(self, pipe)
    }
}

#[async_trait]
impl<T: Send + 'static> Source for Box<dyn Source<Item = T>> {
    type Item = T;

    fn has_next(&self) -> bool {
        (**self).has_next()
    }

    async fn next(&mut self) -> Result<Option<T>> {
        (**self).next().await
    }

    fn on_attach(&mut self, session: SessionHandle) {
        (**self).on_attach(session)
    }
}

/// A sink that reacts to inbound tokens and resolves a deferred result on
/// completion.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use streamfeed::{Sink, Step};
///
/// struct Sum {
///     total: i64,
/// }
///
/// #[async_trait]
/// impl Sink for Sum {
///     type Item = i64;
///     type Output = i64;
///
///     async fn on_elem(&mut self, item: i64) -> Step<i64> {
///         self.total += item;
///         Step::Cont
///     }
///
///     async fn on_eof(&mut self) -> i64 {
///         self.total
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send {
    /// The type of elements this sink accepts
    type Item: Send + 'static;
    /// The result this sink resolves with on completion
    type Output: Clone + Send + 'static;

    /// Handle one element and decide how to proceed.
    ///
    /// Replying [`Step::Cont`] is the backpressure signal that lets the
    /// source produce the next element.
    async fn on_elem(&mut self, item: Self::Item) -> Step<Self::Output>;

    /// Handle end-of-stream and produce the final result
    async fn on_eof(&mut self) -> Self::Output;
}
