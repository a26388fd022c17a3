//! Adapters that connect pipelines to external output channels.
//!
//! The core has no wire protocol of its own; these helpers wrap the common
//! delivery shapes — chunked byte output, server-push event streams,
//! comet-style callback streams and duplex sockets — around an ordinary
//! drive. Each returns the session's deferred result so the caller can
//! close its channel when the stream completes.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::deferred::Deferred;
use crate::error::Error;
use crate::hub::Hub;
use crate::protocol::Step;
use crate::runtime::Runtime;
use crate::sinks::{ForEach, WriterSink};
use crate::sources::PushSource;
use crate::traits::{Sink, Source};
use crate::transform::Pipe;

/// Drive a byte source into `writer` as a chunked body.
///
/// The writer is flushed and shut down when the source completes; the
/// returned deferred resolves once that has happened.
pub fn stream_bytes<S, W>(source: S, writer: W, runtime: &Runtime) -> Deferred<()>
where
    S: Source<Item = Bytes> + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    source.run_into(WriterSink::new(writer), runtime)
}

/// Drive any source into `writer`, turning each element into a byte chunk
/// with `build`
pub fn stream_text<S, W, F>(source: S, writer: W, build: F, runtime: &Runtime) -> Deferred<()>
where
    S: Source + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnMut(S::Item) -> Bytes + Send + 'static,
{
    source
        .through(Pipe::map(move |item| build(item)))
        .run_into(WriterSink::new(writer), runtime)
}

/// [`stream_text`] with the default builder: each element's display form
pub fn stream_display<S, W>(source: S, writer: W, runtime: &Runtime) -> Deferred<()>
where
    S: Source + 'static,
    S::Item: std::fmt::Display,
    W: AsyncWrite + Unpin + Send + 'static,
{
    stream_text(source, writer, |item| Bytes::from(item.to_string()), runtime)
}

/// The default event text for a structured payload: a JSON string value
/// renders as the raw string, everything else as its JSON text.
pub fn event_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn event_frame(text: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", text))
}

/// Drive a source into `writer` as a server-push event stream, framing each
/// element as `data: <built text>\n\n`
pub fn event_source<S, W, F>(source: S, writer: W, build: F, runtime: &Runtime) -> Deferred<()>
where
    S: Source + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnMut(S::Item) -> String + Send + 'static,
{
    source
        .through(Pipe::map(move |item| event_frame(&build(item))))
        .run_into(WriterSink::new(writer), runtime)
}

/// [`event_source`] for JSON payloads, using [`event_text`]
pub fn event_source_json<S, W>(source: S, writer: W, runtime: &Runtime) -> Deferred<()>
where
    S: Source<Item = serde_json::Value> + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    event_source(source, writer, |value| event_text(&value), runtime)
}

/// [`event_source`] for plain payloads, using their display form
pub fn event_source_display<S, W>(source: S, writer: W, runtime: &Runtime) -> Deferred<()>
where
    S: Source + 'static,
    S::Item: std::fmt::Display,
    W: AsyncWrite + Unpin + Send + 'static,
{
    event_source(source, writer, |item| item.to_string(), runtime)
}

/// Subscribe `writer` to a hub as a server-push event stream.
///
/// The returned deferred resolves when this subscriber's session ends; the
/// hub and its other subscribers are unaffected.
pub async fn event_source_hub<T, W, F>(hub: &Hub<T>, writer: W, build: F) -> Deferred<()>
where
    T: Clone + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnMut(T) -> String + Send + 'static,
{
    hub.add(EventWriter {
        writer,
        build,
        _phantom: std::marker::PhantomData,
    })
    .await
}

/// Sink used by the hub event-stream adapter: frames and writes each
/// element, closing the writer at end-of-stream.
struct EventWriter<W, F, T> {
    writer: W,
    build: F,
    _phantom: std::marker::PhantomData<T>,
}

#[async_trait]
impl<W, F, T> Sink for EventWriter<W, F, T>
where
    W: AsyncWrite + Unpin + Send,
    F: FnMut(T) -> String + Send,
    T: Send + 'static,
{
    type Item = T;
    type Output = ();

    async fn on_elem(&mut self, item: T) -> Step<()> {
        let frame = event_frame(&(self.build)(item));
        match self.writer.write_all(&frame).await {
            Ok(()) => Step::Cont,
            Err(error) => Step::Fail(Error::sink(error)),
        }
    }

    async fn on_eof(&mut self) {
        if let Err(error) = self.writer.shutdown().await {
            tracing::error!(%error, "failed to close event stream writer");
        }
    }
}

/// Drive a source through a comet-style callback: each element is built
/// into a string and handed to `send`.
///
/// Call this when the client's connected signal fires; resolve-time cleanup
/// (closing the channel) is the caller's, via the returned deferred.
pub fn comet<S, B, F>(source: S, build: B, send: F, runtime: &Runtime) -> Deferred<()>
where
    S: Source + 'static,
    B: FnMut(S::Item) -> String + Send + 'static,
    F: FnMut(String) + Send + 'static,
{
    source.run_into(ForEach::new(move |item| send(build(item))), runtime)
}

/// Subscribe a comet-style callback to a hub
pub async fn comet_hub<T, B, F>(hub: &Hub<T>, build: B, send: F) -> Deferred<()>
where
    T: Clone + Send + 'static,
    B: FnMut(T) -> String + Send + 'static,
    F: FnMut(String) + Send + 'static,
{
    hub.add(ForEach::new(move |item| send(build(item)))).await
}

/// A duplex (socket-like) hookup: one inbound pipeline fed by external
/// message events, one outbound pipeline writing through a callback.
pub struct DuplexConnection<W: Send + 'static> {
    inbound: PushSource<W>,
    inbound_done: Deferred<()>,
    outbound_done: Deferred<()>,
}

impl<W: Send + 'static> DuplexConnection<W> {
    /// Feed one incoming wire message into the inbound pipeline
    pub fn message(&self, message: W) {
        self.inbound.push(message);
    }

    /// Signal that the peer went away: the inbound pipeline drains and
    /// completes. Idempotent.
    pub fn close(&self) {
        self.inbound.stop();
    }

    /// Resolves when the inbound pipeline has completed
    pub fn inbound_done(&self) -> &Deferred<()> {
        &self.inbound_done
    }

    /// Resolves when the outbound pipeline has completed
    pub fn outbound_done(&self) -> &Deferred<()> {
        &self.outbound_done
    }
}

/// Wire up a duplex connection.
///
/// Incoming wire messages (pushed via
/// [`message`](DuplexConnection::message)) flow through `decode` into
/// `inbound_sink`; `outbound` is driven into `send`, one call per outgoing
/// element. For an untranslated inbound side pass `Pipe::map(|m| m)`.
pub fn duplex<W, I, O, K, S, F>(
    decode: Pipe<W, I>,
    inbound_sink: K,
    outbound: S,
    send: F,
    runtime: &Runtime,
) -> DuplexConnection<W>
where
    W: Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
    K: Sink<Item = I, Output = ()> + 'static,
    S: Source<Item = O> + 'static,
    F: FnMut(O) + Send + 'static,
{
    let inbound: PushSource<W> = PushSource::new();
    let inbound_done = inbound
        .clone()
        .through(decode)
        .run_into(inbound_sink, runtime);
    let outbound_done = outbound.run_into(ForEach::new(move |item| send(item)), runtime);
    DuplexConnection {
        inbound,
        inbound_done,
        outbound_done,
    }
}
