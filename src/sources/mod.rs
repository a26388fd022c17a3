//! Source implementations.
//!
//! Pull sources wrap something finite (an iterator, a file, a stream) and
//! exhaust it; push sources (see [`push`]) are fed externally and live
//! until stopped.

pub mod push;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::protocol::{self, emit_to, Emit, SessionHandle, Token};
use crate::runtime::Runtime;
use crate::traits::{Sink, Source};

pub use push::{PushSource, TimedSource};

/// Default chunk size for byte-stream sources, in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// A source that yields the items of an iterator
pub struct IterSource<I: Iterator> {
    iter: I,
    peeked: Option<I::Item>,
}

impl<I> IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    /// Create a source over anything iterable
    pub fn new<T>(items: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        let mut iter = items.into_iter();
        let peeked = iter.next();
        Self { iter, peeked }
    }
}

#[async_trait]
impl<I> Source for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    fn has_next(&self) -> bool {
        self.peeked.is_some()
    }

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        let item = self.peeked.take();
        self.peeked = self.iter.next();
        Ok(item)
    }
}

/// An effectively infinite source of incrementing numbers
pub struct CounterSource {
    current: u64,
}

impl CounterSource {
    /// Create a counter starting at 1
    pub fn new() -> Self {
        Self { current: 0 }
    }
}

#[async_trait]
impl Source for CounterSource {
    type Item = u64;

    fn has_next(&self) -> bool {
        self.current < u64::MAX
    }

    async fn next(&mut self) -> Result<Option<u64>> {
        self.current += 1;
        Ok(Some(self.current))
    }
}

impl Default for CounterSource {
    fn default() -> Self {
        Self::new()
    }
}

/// A source that reads fixed-size byte chunks from an async reader.
///
/// Single-pass: the reader is released on exhaustion or on a read error
/// and is never reopened.
pub struct ChunkedReadSource<R> {
    reader: Option<R>,
    chunk_size: usize,
}

impl<R> ChunkedReadSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a chunked source with the default chunk size of 2048 bytes
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Create a chunked source with an explicit chunk size
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            chunk_size,
        }
    }
}

impl ChunkedReadSource<tokio::fs::File> {
    /// Open a file as a chunked byte source
    pub async fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self::new(tokio::fs::File::open(path).await?))
    }
}

#[async_trait]
impl<R> Source for ChunkedReadSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    type Item = Bytes;

    fn has_next(&self) -> bool {
        self.reader.is_some()
    }

    async fn next(&mut self) -> Result<Option<Bytes>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        let mut buf = vec![0u8; self.chunk_size];
        match reader.read(&mut buf).await {
            Ok(0) => {
                self.reader = None;
                Ok(None)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Err(error) => {
                self.reader = None;
                Err(Error::source(error))
            }
        }
    }
}

/// A source that yields lines from an async reader.
///
/// Single-pass, released on exhaustion like [`ChunkedReadSource`].
pub struct LineSource<R> {
    lines: Option<Lines<BufReader<R>>>,
}

impl<R> LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        use tokio::io::AsyncBufReadExt;
        Self {
            lines: Some(BufReader::new(reader).lines()),
        }
    }
}

impl LineSource<tokio::fs::File> {
    /// Open a file as a line source
    pub async fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self::new(tokio::fs::File::open(path).await?))
    }
}

#[async_trait]
impl<R> Source for LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    type Item = String;

    fn has_next(&self) -> bool {
        self.lines.is_some()
    }

    async fn next(&mut self) -> Result<Option<String>> {
        let lines = match self.lines.as_mut() {
            Some(lines) => lines,
            None => return Ok(None),
        };
        match lines.next_line().await {
            Ok(Some(line)) => Ok(Some(line)),
            Ok(None) => {
                self.lines = None;
                Ok(None)
            }
            Err(error) => {
                self.lines = None;
                Err(Error::source(error))
            }
        }
    }
}

/// A source wrapping any [`futures_core::Stream`]
pub struct StreamSource<St> {
    stream: Option<St>,
}

impl<St> StreamSource<St>
where
    St: futures_core::Stream + Unpin + Send,
    St::Item: Send + 'static,
{
    pub fn new(stream: St) -> Self {
        Self {
            stream: Some(stream),
        }
    }
}

#[async_trait]
impl<St> Source for StreamSource<St>
where
    St: futures_core::Stream + Unpin + Send,
    St::Item: Send + 'static,
{
    type Item = St::Item;

    fn has_next(&self) -> bool {
        self.stream.is_some()
    }

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(None),
        };
        match stream.next().await {
            Some(item) => Ok(Some(item)),
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }
}

/// Two sources presented as one: the first until exhausted, then the
/// second. The result of [`Source::and_then`].
pub struct ChainSource<S1, S2> {
    first: S1,
    second: S2,
}

impl<S1, S2> ChainSource<S1, S2>
where
    S1: Source,
    S2: Source<Item = S1::Item>,
{
    pub(crate) fn new(first: S1, second: S2) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl<S1, S2> Source for ChainSource<S1, S2>
where
    S1: Source,
    S2: Source<Item = S1::Item>,
{
    type Item = S1::Item;

    fn has_next(&self) -> bool {
        self.first.has_next() || self.second.has_next()
    }

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        if self.first.has_next() {
            self.first.next().await
        } else {
            self.second.next().await
        }
    }

    fn on_attach(&mut self, session: SessionHandle) {
        self.first.on_attach(session.clone());
        self.second.on_attach(session);
    }
}

/// Interleave several sources of the same element type into one.
pub fn interleave<T: Send + 'static>(sources: Vec<Box<dyn Source<Item = T>>>) -> Interleaved<T> {
    Interleaved {
        sources,
        buffer: VecDeque::new(),
    }
}

/// N sources presented as one, in availability order.
///
/// When driven, each inner source gets its own session feeding a shared
/// relay; the relay requests the next element from an inner source as soon
/// as it forwards the previous one, and signals end-of-stream only once
/// every inner source is exhausted. Element order across sources is
/// unspecified.
pub struct Interleaved<T> {
    sources: Vec<Box<dyn Source<Item = T>>>,
    buffer: VecDeque<T>,
}

#[async_trait]
impl<T: Send + 'static> Source for Interleaved<T> {
    type Item = T;

    fn has_next(&self) -> bool {
        !self.buffer.is_empty() || self.sources.iter().any(|s| s.has_next())
    }

    async fn next(&mut self) -> Result<Option<T>> {
        if self.buffer.is_empty() {
            for source in self.sources.iter_mut() {
                if source.has_next() {
                    if let Some(item) = source.next().await? {
                        self.buffer.push_back(item);
                    }
                }
            }
        }
        Ok(self.buffer.pop_front())
    }

    fn on_attach(&mut self, session: SessionHandle) {
        for source in self.sources.iter_mut() {
            source.on_attach(session.clone());
        }
    }

    fn run_into<K>(self, sink: K, runtime: &Runtime) -> Deferred<K::Output>
    where
        Self: Sized + 'static,
        K: Sink<Item = T> + 'static,
    {
        let deferred = Deferred::new();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel::<(usize, Token<T>)>();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel::<Token<T>>();

        let count = self.sources.len();
        let mut inner_txs = Vec::with_capacity(count);
        for (index, mut source) in self.sources.into_iter().enumerate() {
            let (tx, rx) = mpsc::unbounded_channel::<Token<T>>();
            source.on_attach(SessionHandle::for_mailbox(runtime.clone(), tx.clone()));
            let relay = relay_tx.clone();
            let emit: Emit<T> = Arc::new(move |token| {
                let _ = relay.send((index, token));
            });
            runtime.spawn(protocol::run_source(source, rx, emit));
            inner_txs.push(tx);
        }

        // the outer sink replies into the relay under a sentinel index
        let relay = relay_tx.clone();
        let reply: Emit<T> = Arc::new(move |token| {
            let _ = relay.send((usize::MAX, token));
        });
        runtime.spawn(protocol::run_sink(sink, sink_rx, reply, deferred.clone()));

        for tx in &inner_txs {
            let _ = tx.send(Token::Run);
        }
        runtime.spawn(relay_loop(relay_rx, inner_txs, emit_to(sink_tx), count));

        deferred
    }
}

/// Relay between the inner source sessions and the outer sink. Finalizes
/// with a remaining-source count decremented on each inner end-of-stream.
async fn relay_loop<T: Send + 'static>(
    mut mailbox: mpsc::UnboundedReceiver<(usize, Token<T>)>,
    inners: Vec<mpsc::UnboundedSender<Token<T>>>,
    to_sink: Emit<T>,
    mut remaining: usize,
) {
    if remaining == 0 {
        to_sink(Token::Eof);
        return;
    }
    while let Some((index, token)) = mailbox.recv().await {
        if index == usize::MAX {
            match token {
                // pacing is per inner source; the outer sink's readiness
                // signal carries no extra information here
                Token::Cont => {}
                Token::Done => {
                    for tx in &inners {
                        let _ = tx.send(Token::Done);
                    }
                    break;
                }
                Token::Error(error) => {
                    for tx in &inners {
                        let _ = tx.send(Token::Error(error.clone()));
                    }
                    break;
                }
                _ => {}
            }
        } else {
            match token {
                Token::Elem(item) => {
                    to_sink(Token::Elem(item));
                    let _ = inners[index].send(Token::Cont);
                }
                Token::Eof => {
                    remaining -= 1;
                    if remaining == 0 {
                        to_sink(Token::Eof);
                        for tx in &inners {
                            let _ = tx.send(Token::Done);
                        }
                        break;
                    }
                }
                // the inner's own push machinery resumes it
                Token::Empty => {}
                Token::Error(error) => {
                    to_sink(Token::Error(error.clone()));
                    for (i, tx) in inners.iter().enumerate() {
                        if i != index {
                            let _ = tx.send(Token::Error(error.clone()));
                        }
                    }
                    break;
                }
                _ => {}
            }
        }
    }
    tracing::trace!("interleave relay terminated");
}
