//! Sink implementations.

use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::Error;
use crate::protocol::Step;
use crate::traits::Sink;

/// A sink that runs an action on every element and resolves with unit at
/// end-of-stream
pub struct ForEach<F, T> {
    action: F,
    _phantom: PhantomData<T>,
}

impl<F, T> ForEach<F, T>
where
    F: FnMut(T) + Send,
    T: Send + 'static,
{
    pub fn new(action: F) -> Self {
        Self {
            action,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, T> Sink for ForEach<F, T>
where
    F: FnMut(T) + Send,
    T: Send + 'static,
{
    type Item = T;
    type Output = ();

    async fn on_elem(&mut self, item: T) -> Step<()> {
        (self.action)(item);
        Step::Cont
    }

    async fn on_eof(&mut self) {}
}

/// A sink that discards every element
pub struct Ignore<T> {
    _phantom: PhantomData<T>,
}

impl<T> Ignore<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for Ignore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> Sink for Ignore<T> {
    type Item = T;
    type Output = ();

    async fn on_elem(&mut self, _item: T) -> Step<()> {
        Step::Cont
    }

    async fn on_eof(&mut self) {}
}

/// A sink that resolves with the first element, or `None` on an immediately
/// empty stream. Sees exactly one token either way; the source is released
/// without being drained.
pub struct Head<T> {
    _phantom: PhantomData<T>,
}

impl<T> Head<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for Head<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Sink for Head<T> {
    type Item = T;
    type Output = Option<T>;

    async fn on_elem(&mut self, item: T) -> Step<Option<T>> {
        Step::Done(Some(item))
    }

    async fn on_eof(&mut self) -> Option<T> {
        None
    }
}

/// A sink that gathers every element and resolves with the collection
pub struct Collect<T> {
    items: Vec<T>,
}

impl<T> Collect<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Default for Collect<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Sink for Collect<T> {
    type Item = T;
    type Output = Vec<T>;

    async fn on_elem(&mut self, item: T) -> Step<Vec<T>> {
        self.items.push(item);
        Step::Cont
    }

    async fn on_eof(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }
}

/// A sink that writes byte chunks to an async writer, flushing and shutting
/// it down at end-of-stream. A write failure is signalled upstream as an
/// error token.
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    type Item = Bytes;
    type Output = ();

    async fn on_elem(&mut self, item: Bytes) -> Step<()> {
        match self.writer.write_all(&item).await {
            Ok(()) => Step::Cont,
            Err(error) => Step::Fail(Error::sink(error)),
        }
    }

    async fn on_eof(&mut self) {
        if let Err(error) = self.writer.flush().await {
            tracing::error!(%error, "failed to flush writer at end-of-stream");
        }
        if let Err(error) = self.writer.shutdown().await {
            tracing::error!(%error, "failed to close writer at end-of-stream");
        }
    }
}

/// A sink that forwards elements into a bounded channel.
///
/// The channel's capacity becomes the session's pacing: `on_elem` suspends
/// until there is room, so a slow receiver slows the source. If the
/// receiving side goes away the sink finishes early and releases the
/// source.
pub struct ChannelSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> ChannelSink<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl<T: Send + 'static> Sink for ChannelSink<T> {
    type Item = T;
    type Output = ();

    async fn on_elem(&mut self, item: T) -> Step<()> {
        match self.tx.send(item).await {
            Ok(()) => Step::Cont,
            // receiver dropped: finish early rather than erroring
            Err(_) => Step::Done(()),
        }
    }

    async fn on_eof(&mut self) {}
}
